use std::cell::Cell;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Source of "now" for anything that ages pending events.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get() + ChronoDuration::milliseconds(ms));
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Seconds elapsed from `since` to `now`, never negative.
pub fn age_seconds(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = (now - since).num_milliseconds();
    (ms.max(0) as f64) / 1000.0
}
