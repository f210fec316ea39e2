//! Wall-clock access behind one injectable capability.
//!
//! Everything in the alert pipeline works in naive local time for a single
//! fixed offset. Production code uses [`SystemClock`]; tests drive the
//! pipeline with a [`ManualClock`].

use std::sync::Mutex;

use chrono::{Duration, FixedOffset, NaiveDateTime, Offset, Utc};

pub trait Clock: Send + Sync {
    /// Current local wall time.
    fn now(&self) -> NaiveDateTime;

    /// The fixed offset local times are expressed in.
    fn offset(&self) -> FixedOffset;

    /// Milliseconds since the Unix epoch for a local wall time.
    fn epoch_millis(&self, local: NaiveDateTime) -> i64 {
        let shift = i64::from(self.offset().local_minus_utc()) * 1_000;
        local.and_utc().timestamp_millis() - shift
    }
}

/// Reads the system clock and projects it into the configured offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    pub fn with_offset(now: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
