use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike};
use std::sync::{Mutex, PoisonError};

/// Source of wall-clock time for schedule evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to. Useful for driving cycles at a
/// chosen minute.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Noon on a fixed date, at the given minute of the hour.
    pub fn at_minute(minute: u32) -> Option<Self> {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 15)?.and_hms_opt(12, minute, 0)?;
        Local.from_local_datetime(&naive).earliest().map(Self::new)
    }

    pub fn set(&self, now: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves to `minute` within the current hour. Returns false for values outside 0-59.
    pub fn set_minute(&self, minute: u32) -> bool {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        match now.with_minute(minute) {
            Some(moved) => {
                *now = moved;
                true
            }
            None => false,
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
