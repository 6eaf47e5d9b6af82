//! Wall-clock abstraction used to stamp transcript lines.

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;

/// `DD/MM HH:MM:SS`, the transcript line prefix. No year, no zone.
pub const TRANSCRIPT_STAMP_FORMAT: &str = "%d/%m %H:%M:%S";

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Current time rendered as a transcript line prefix.
    fn stamp(&self) -> String {
        self.now().format(TRANSCRIPT_STAMP_FORMAT).to_string()
    }
}

/// Local time of the serving process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually driven clock for tests and replays.
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}
