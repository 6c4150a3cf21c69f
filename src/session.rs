use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use crossterm::event::KeyEvent;

use crate::catalog;
use crate::clock::Clock;
use crate::keymap::{DispatchOutcome, KeyBindings};
use crate::pending::{FailedRecordPolicy, PendingId, PendingQueue, Resolution};
use crate::possession::PossessionTracker;
use crate::record::{RecordEventRequest, RecordSink};
use crate::roster::{PlayerRef, Roster};

const MAX_LOGS: usize = 200;

/// Inbound work for a tracker session, produced by the ball-tracker feed,
/// the record writer and the assignment loader.
#[derive(Debug, Clone)]
pub enum Delta {
    Possession {
        player_id: String,
        at: DateTime<Utc>,
    },
    BallOut,
    SetOnline(bool),
    SetAssignment(Vec<String>),
    SetRoster(Roster),
    RecordFailed {
        request: RecordEventRequest,
        error: String,
    },
    Log(String),
}

pub struct TrackerSession<C, S> {
    pub queue: PendingQueue<C, S>,
    pub possession: PossessionTracker,
    pub bindings: KeyBindings,
    pub roster: Roster,
    pub online: bool,
    pub default_event_type: String,
    pub max_pending_secs: f64,
    pub selected: usize,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
    pub type_counts: BTreeMap<String, usize>,
}

impl<C: Clock, S: RecordSink> TrackerSession<C, S> {
    pub fn new(
        queue: PendingQueue<C, S>,
        roster: Roster,
        assigned: &[String],
        default_event_type: impl Into<String>,
        max_pending_secs: f64,
    ) -> Self {
        let mut session = Self {
            queue,
            possession: PossessionTracker::new(),
            bindings: KeyBindings::default(),
            roster,
            online: true,
            default_event_type: default_event_type.into(),
            max_pending_secs,
            selected: 0,
            logs: VecDeque::with_capacity(MAX_LOGS),
            help_overlay: false,
            type_counts: BTreeMap::new(),
        };
        session.set_assignment(assigned);
        session
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn recorded_total(&self) -> usize {
        self.type_counts.values().sum()
    }

    pub fn set_assignment(&mut self, assigned: &[String]) {
        self.bindings = KeyBindings::new(assigned);
        for event_type in assigned {
            if !catalog::is_known(event_type) {
                self.push_log(format!("[INFO] Custom event type: {event_type}"));
            }
        }
        if !self.bindings.unreachable().is_empty() {
            let rest = self.bindings.unreachable().join(", ");
            self.push_log(format!("[WARN] No key left for: {rest}"));
        }
    }

    pub fn set_online(&mut self, online: bool) {
        if self.online != online {
            self.online = online;
            self.push_log(if online {
                "[INFO] Online"
            } else {
                "[WARN] Offline: resolution paused"
            });
        }
    }

    pub fn on_possession(&mut self, player: PlayerRef, at: DateTime<Utc>) -> Option<PendingId> {
        let change = self.possession.observe(player, at)?;
        Some(self.queue.enqueue(change.player, change.timestamp))
    }

    pub fn on_key(&mut self, key: KeyEvent) -> DispatchOutcome {
        let outcome = self.bindings.dispatch(key, self.online, &mut self.queue);
        if let DispatchOutcome::Resolved(resolution) = &outcome {
            let resolution = resolution.clone();
            self.report(&resolution);
        }
        outcome
    }

    /// Classifies the oldest slot. `None` when offline or nothing is pending.
    pub fn resolve_head(&mut self, event_type: &str) -> Option<Resolution> {
        if !self.online || self.queue.is_empty() {
            return None;
        }
        let resolution = self.queue.resolve_head(event_type);
        self.report(&resolution);
        Some(resolution)
    }

    pub fn resolve(&mut self, id: PendingId, event_type: &str) -> Option<Resolution> {
        if !self.online {
            return None;
        }
        let resolution = self.queue.resolve(id, event_type);
        self.report(&resolution);
        Some(resolution)
    }

    /// Records everything pending as the configured default type.
    pub fn resolve_all_default(&mut self) -> usize {
        if !self.online {
            return 0;
        }
        let event_type = self.default_event_type.clone();
        let resolutions = self.queue.resolve_all_as_default(&event_type);
        let recorded = resolutions.iter().filter(|r| r.is_recorded()).count();
        for resolution in &resolutions {
            self.report(resolution);
        }
        if !resolutions.is_empty() {
            self.push_log(format!(
                "[INFO] Marked {recorded}/{} as {}",
                resolutions.len(),
                catalog::label_for(&event_type)
            ));
        }
        recorded
    }

    pub fn discard_head(&mut self) -> bool {
        match self.queue.discard_head() {
            Some(event) => {
                self.push_log(format!("[INFO] Skipped {}", event.player.short_label()));
                true
            }
            None => false,
        }
    }

    pub fn discard_all(&mut self) -> usize {
        let count = self.queue.discard_all();
        if count > 0 {
            self.push_log(format!("[INFO] Cleared {count} pending"));
        }
        count
    }

    /// Periodic housekeeping: drop slots nobody can still attribute.
    pub fn tick(&mut self) -> usize {
        let expired = self.queue.expire_now(self.max_pending_secs);
        if !expired.is_empty() {
            self.push_log(format!(
                "[WARN] {} pending expired after {:.0}s",
                expired.len(),
                self.max_pending_secs
            ));
        }
        expired.len()
    }

    /// A record accepted earlier was later rejected by storage.
    pub fn on_record_failed(&mut self, request: RecordEventRequest, error: &str) {
        if let Some(count) = self.type_counts.get_mut(&request.event_type) {
            *count = count.saturating_sub(1);
        }
        let label = catalog::label_for(&request.event_type);
        if self.queue.policy() == FailedRecordPolicy::Drop {
            self.push_log(format!("[WARN] Record failed ({label}): {error}"));
            return;
        }
        let Some(player) = self.roster.find(&request.player_id) else {
            self.push_log(format!(
                "[WARN] Record failed ({label}) for unknown player {}: {error}",
                request.player_id
            ));
            return;
        };
        let short = player.short_label();
        self.queue.restore(player, request.timestamp);
        self.push_log(format!("[WARN] Record failed ({label}), {short} back in queue: {error}"));
    }

    pub fn select_next(&mut self) {
        let len = self.roster.len();
        if len > 0 {
            self.selected = (self.selected + 1) % len;
        }
    }

    pub fn select_prev(&mut self) {
        let len = self.roster.len();
        if len > 0 {
            self.selected = (self.selected + len - 1) % len;
        }
    }

    pub fn selected_player(&self) -> Option<PlayerRef> {
        self.roster.players().into_iter().nth(self.selected)
    }

    /// The operator acting as their own ball tracker.
    pub fn possession_from_selection(&mut self) -> Option<PendingId> {
        let player = self.selected_player()?;
        let now = self.queue.now();
        self.on_possession(player, now)
    }

    fn report(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Recorded(request) => {
                *self
                    .type_counts
                    .entry(request.event_type.clone())
                    .or_insert(0) += 1;
            }
            Resolution::Failed {
                request,
                error,
                requeued,
            } => {
                let label = catalog::label_for(&request.event_type);
                if *requeued {
                    self.push_log(format!("[WARN] Record failed ({label}), kept pending: {error}"));
                } else {
                    self.push_log(format!("[WARN] Record failed ({label}), dropped: {error}"));
                }
            }
            Resolution::NotFound => {}
        }
    }
}

pub fn apply_delta<C: Clock, S: RecordSink>(session: &mut TrackerSession<C, S>, delta: Delta) {
    match delta {
        Delta::Possession { player_id, at } => match session.roster.find(&player_id) {
            Some(player) => {
                session.on_possession(player, at);
            }
            None => session.push_log(format!("[WARN] Unknown player id {player_id}")),
        },
        Delta::BallOut => session.possession.clear(),
        Delta::SetOnline(online) => session.set_online(online),
        Delta::SetAssignment(types) => {
            session.set_assignment(&types);
            session.push_log(format!("[INFO] Assignment loaded ({} types)", types.len()));
        }
        Delta::SetRoster(roster) => {
            session.roster = roster;
            session.selected = 0;
            session.possession.clear();
        }
        Delta::RecordFailed { request, error } => session.on_record_failed(request, &error),
        Delta::Log(msg) => session.push_log(msg),
    }
}
