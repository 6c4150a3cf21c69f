use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::clock::Clock;
use crate::pending::{PendingQueue, Resolution};
use crate::record::RecordSink;

/// Keyboard rows in binding order: top row, home row, bottom row.
pub const KEY_SEQUENCE: [char; 26] = [
    'Q', 'W', 'E', 'R', 'T', 'Y', 'U', 'I', 'O', 'P', 'A', 'S', 'D', 'F', 'G', 'H', 'J', 'K', 'L',
    'Z', 'X', 'C', 'V', 'B', 'N', 'M',
];

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Resolved(Resolution),
    /// Key carries Ctrl/Alt/Super or similar.
    Ignored,
    Unbound,
    Offline,
    Empty,
}

#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    bound: Vec<(char, String)>,
    unreachable: Vec<String>,
}

impl KeyBindings {
    pub fn new(assigned: &[String]) -> Self {
        let mut bound = Vec::with_capacity(assigned.len().min(KEY_SEQUENCE.len()));
        let mut unreachable = Vec::new();
        for (idx, event_type) in assigned.iter().enumerate() {
            match KEY_SEQUENCE.get(idx) {
                Some(key) => bound.push((*key, event_type.clone())),
                None => unreachable.push(event_type.clone()),
            }
        }
        Self { bound, unreachable }
    }

    pub fn binding_for(&self, key: char) -> Option<&str> {
        let key = key.to_ascii_uppercase();
        self.bound
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, event_type)| event_type.as_str())
    }

    pub fn key_for(&self, event_type: &str) -> Option<char> {
        self.bound
            .iter()
            .find(|(_, t)| t == event_type)
            .map(|(k, _)| *k)
    }

    pub fn bindings(&self) -> &[(char, String)] {
        &self.bound
    }

    /// Assigned types past the 26th key; the UI flags these.
    pub fn unreachable(&self) -> &[String] {
        &self.unreachable
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Resolves the oldest pending slot with the type bound to `key`.
    /// At most one slot per call.
    pub fn dispatch<C: Clock, S: RecordSink>(
        &self,
        key: KeyEvent,
        online: bool,
        queue: &mut PendingQueue<C, S>,
    ) -> DispatchOutcome {
        if has_intent_modifier(key.modifiers) {
            return DispatchOutcome::Ignored;
        }
        let KeyCode::Char(c) = key.code else {
            return DispatchOutcome::Unbound;
        };
        let Some(event_type) = self.binding_for(c) else {
            return DispatchOutcome::Unbound;
        };
        if !online {
            return DispatchOutcome::Offline;
        }
        if queue.is_empty() {
            return DispatchOutcome::Empty;
        }
        DispatchOutcome::Resolved(queue.resolve_head(event_type))
    }
}

fn has_intent_modifier(modifiers: KeyModifiers) -> bool {
    modifiers.intersects(
        KeyModifiers::CONTROL
            | KeyModifiers::ALT
            | KeyModifiers::SUPER
            | KeyModifiers::HYPER
            | KeyModifiers::META,
    )
}
