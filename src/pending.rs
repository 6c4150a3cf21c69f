use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, age_seconds};
use crate::record::{RecordEventRequest, RecordSink};
use crate::roster::PlayerRef;

pub const URGENT_BELOW_SECS: f64 = 5.0;
pub const NORMAL_BELOW_SECS: f64 = 15.0;
pub const DEFAULT_MAX_AGE_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingId(u64);

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Display urgency of a pending slot. Never affects resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Urgent,
    Normal,
    Old,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Urgent => "URGENT",
            Priority::Normal => "NORMAL",
            Priority::Old => "OLD",
        }
    }
}

pub fn priority_for_age(age_secs: f64) -> Priority {
    if age_secs < URGENT_BELOW_SECS {
        Priority::Urgent
    } else if age_secs < NORMAL_BELOW_SECS {
        Priority::Normal
    } else {
        Priority::Old
    }
}

pub fn priority_of(event: &PendingEvent, now: DateTime<Utc>) -> Priority {
    priority_for_age(event.age_seconds(now))
}

/// One possession still waiting for the tracker to say what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub id: PendingId,
    pub player: PlayerRef,
    pub timestamp: DateTime<Utc>,
}

impl PendingEvent {
    pub fn age_seconds(&self, now: DateTime<Utc>) -> f64 {
        age_seconds(self.timestamp, now)
    }

    pub fn priority(&self, now: DateTime<Utc>) -> Priority {
        priority_of(self, now)
    }
}

/// What happens to a slot whose record submission is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailedRecordPolicy {
    /// Put it back at its original position so it can be classified again.
    #[default]
    Requeue,
    /// Lose it; only the failure notice remains.
    Drop,
}

impl FailedRecordPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "requeue" | "retry" => Some(FailedRecordPolicy::Requeue),
            "drop" | "discard" => Some(FailedRecordPolicy::Drop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordContext {
    pub match_id: String,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Recorded(RecordEventRequest),
    NotFound,
    Failed {
        request: RecordEventRequest,
        error: String,
        requeued: bool,
    },
}

impl Resolution {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Resolution::Recorded(_))
    }

    pub fn request(&self) -> Option<&RecordEventRequest> {
        match self {
            Resolution::Recorded(request) | Resolution::Failed { request, .. } => Some(request),
            Resolution::NotFound => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingRow<'a> {
    pub event: &'a PendingEvent,
    pub age_seconds: f64,
    pub priority: Priority,
}

/// FIFO of unresolved possession slots for one tracker.
pub struct PendingQueue<C, S> {
    events: VecDeque<PendingEvent>,
    next_id: u64,
    clock: C,
    sink: S,
    context: RecordContext,
    policy: FailedRecordPolicy,
}

impl<C: Clock, S: RecordSink> PendingQueue<C, S> {
    pub fn new(clock: C, sink: S, context: RecordContext) -> Self {
        Self {
            events: VecDeque::with_capacity(32),
            next_id: 1,
            clock,
            sink,
            context,
            policy: FailedRecordPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailedRecordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn context(&self) -> &RecordContext {
        &self.context
    }

    pub fn policy(&self) -> FailedRecordPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn head(&self) -> Option<&PendingEvent> {
        self.events.front()
    }

    pub fn get(&self, id: PendingId) -> Option<&PendingEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEvent> {
        self.events.iter()
    }

    /// Queue contents with age and tier computed against `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<PendingRow<'_>> {
        self.events
            .iter()
            .map(|event| PendingRow {
                event,
                age_seconds: event.age_seconds(now),
                priority: event.priority(now),
            })
            .collect()
    }

    /// Appends a slot. A repeat of an existing (player, timestamp) pair
    /// returns the id already queued.
    pub fn enqueue(&mut self, player: PlayerRef, timestamp: DateTime<Utc>) -> PendingId {
        if let Some(existing) = self.find_slot(&player.id, timestamp) {
            return existing;
        }
        let id = self.allocate_id();
        self.events.push_back(PendingEvent {
            id,
            player,
            timestamp,
        });
        id
    }

    /// Re-inserts a slot at its timestamp position, for submissions that
    /// failed after they left the queue.
    pub fn restore(&mut self, player: PlayerRef, timestamp: DateTime<Utc>) -> PendingId {
        if let Some(existing) = self.find_slot(&player.id, timestamp) {
            return existing;
        }
        let id = self.allocate_id();
        self.reinsert(PendingEvent {
            id,
            player,
            timestamp,
        });
        id
    }

    pub fn resolve(&mut self, id: PendingId, event_type: &str) -> Resolution {
        let Some(pos) = self.position(id) else {
            return Resolution::NotFound;
        };
        let Some(event) = self.events.remove(pos) else {
            return Resolution::NotFound;
        };
        self.submit(event, event_type)
    }

    pub fn resolve_head(&mut self, event_type: &str) -> Resolution {
        let Some(event) = self.events.pop_front() else {
            return Resolution::NotFound;
        };
        self.submit(event, event_type)
    }

    pub fn discard(&mut self, id: PendingId) -> bool {
        match self.position(id) {
            Some(pos) => self.events.remove(pos).is_some(),
            None => false,
        }
    }

    pub fn discard_head(&mut self) -> Option<PendingEvent> {
        self.events.pop_front()
    }

    pub fn discard_all(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    /// Records every queued slot as `event_type`, oldest first.
    pub fn resolve_all_as_default(&mut self, event_type: &str) -> Vec<Resolution> {
        let drained = self.events.drain(..).collect::<Vec<_>>();
        drained
            .into_iter()
            .map(|event| self.submit(event, event_type))
            .collect()
    }

    /// Drops slots older than `max_age_secs` without recording them.
    pub fn expire(&mut self, now: DateTime<Utc>, max_age_secs: f64) -> Vec<PendingEvent> {
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.events.len());
        for event in self.events.drain(..) {
            if event.age_seconds(now) > max_age_secs {
                expired.push(event);
            } else {
                kept.push_back(event);
            }
        }
        self.events = kept;
        expired
    }

    pub fn expire_now(&mut self, max_age_secs: f64) -> Vec<PendingEvent> {
        let now = self.clock.now();
        self.expire(now, max_age_secs)
    }

    fn submit(&mut self, event: PendingEvent, event_type: &str) -> Resolution {
        let request = RecordEventRequest {
            match_id: self.context.match_id.clone(),
            event_type: event_type.to_string(),
            player_id: event.player.id.clone(),
            team: event.player.team_key(),
            timestamp: event.timestamp,
            created_by: self.context.created_by.clone(),
        };
        match self.sink.submit(&request) {
            Ok(()) => Resolution::Recorded(request),
            Err(err) => {
                let requeued = match self.policy {
                    FailedRecordPolicy::Requeue => {
                        self.reinsert(event);
                        true
                    }
                    FailedRecordPolicy::Drop => false,
                };
                Resolution::Failed {
                    request,
                    error: format!("{err:#}"),
                    requeued,
                }
            }
        }
    }

    fn reinsert(&mut self, event: PendingEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.timestamp > event.timestamp)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    fn position(&self, id: PendingId) -> Option<usize> {
        self.events.iter().position(|e| e.id == id)
    }

    fn find_slot(&self, player_id: &str, timestamp: DateTime<Utc>) -> Option<PendingId> {
        self.events
            .iter()
            .find(|e| e.player.id == player_id && e.timestamp == timestamp)
            .map(|e| e.id)
    }

    fn allocate_id(&mut self) -> PendingId {
        let id = PendingId(self.next_id);
        self.next_id += 1;
        id
    }
}
