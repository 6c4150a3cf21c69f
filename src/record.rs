use std::sync::mpsc::Sender;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row handed to the event log once a pending slot is classified.
///
/// `timestamp` is when possession began, not when the operator pressed the
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEventRequest {
    pub match_id: String,
    pub event_type: String,
    pub player_id: String,
    pub team: String,
    pub timestamp: DateTime<Utc>,
    pub created_by: String,
}

/// Downstream collaborator that persists resolved events.
pub trait RecordSink {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()> {
        (**self).submit(request)
    }
}

/// Keeps every accepted request in memory. `fail_next` rejects the next N
/// submissions, which is how tests exercise the failure path.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<RecordEventRequest>,
    pub rejected: Vec<RecordEventRequest>,
    pub fail_next: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        Self {
            fail_next: times,
            ..Self::default()
        }
    }
}

impl RecordSink for MemorySink {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            self.rejected.push(request.clone());
            return Err(anyhow!("event log unavailable"));
        }
        self.records.push(request.clone());
        Ok(())
    }
}

/// Hands requests to the background record writer. Only fails when the
/// writer thread is gone; storage failures come back later as deltas.
pub struct ChannelSink {
    tx: Sender<RecordEventRequest>,
}

impl ChannelSink {
    pub fn new(tx: Sender<RecordEventRequest>) -> Self {
        Self { tx }
    }
}

impl RecordSink for ChannelSink {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()> {
        self.tx
            .send(request.clone())
            .map_err(|_| anyhow!("record writer stopped"))
    }
}

/// Writes to `primary` first; the submission succeeds once the primary has
/// it. A `secondary` failure does not fail the submission and is kept for
/// `take_mirror_errors`.
pub struct MirroredSink<A, B> {
    pub primary: A,
    pub secondary: Option<B>,
    mirror_errors: Vec<String>,
}

impl<A, B> MirroredSink<A, B> {
    pub fn new(primary: A, secondary: Option<B>) -> Self {
        Self {
            primary,
            secondary,
            mirror_errors: Vec::new(),
        }
    }

    /// Secondary failures since the last call, oldest first.
    pub fn take_mirror_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.mirror_errors)
    }
}

impl<A: RecordSink, B: RecordSink> RecordSink for MirroredSink<A, B> {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()> {
        self.primary.submit(request)?;
        if let Some(secondary) = self.secondary.as_mut()
            && let Err(err) = secondary.submit(request)
        {
            self.mirror_errors.push(format!("{err:#}"));
        }
        Ok(())
    }
}
