use chrono::{DateTime, Utc};

use crate::roster::PlayerRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PossessionChange {
    pub player: PlayerRef,
    pub timestamp: DateTime<Utc>,
}

/// Who has the ball, as reported by the ball-tracker operator.
#[derive(Debug, Clone, Default)]
pub struct PossessionTracker {
    holder: Option<PlayerRef>,
    since: Option<DateTime<Utc>>,
    changes: u64,
}

impl PossessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a change only when the holder differs from the current one.
    pub fn observe(&mut self, player: PlayerRef, at: DateTime<Utc>) -> Option<PossessionChange> {
        if self.holder.as_ref().is_some_and(|p| p.id == player.id) {
            return None;
        }
        self.holder = Some(player.clone());
        self.since = Some(at);
        self.changes += 1;
        Some(PossessionChange {
            player,
            timestamp: at,
        })
    }

    /// Ball out of play; the next report always counts as a change.
    pub fn clear(&mut self) {
        self.holder = None;
        self.since = None;
    }

    pub fn holder(&self) -> Option<&PlayerRef> {
        self.holder.as_ref()
    }

    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    pub fn changes(&self) -> u64 {
        self.changes
    }
}
