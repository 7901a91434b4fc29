use std::cell::Cell;
use web_time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock timestamps (milliseconds since the Unix epoch).
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// Real clock. Backed by `Date.now()` in the browser.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.get()
    }
}
