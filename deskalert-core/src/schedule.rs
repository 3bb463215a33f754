//! Minute-of-hour schedules.
//!
//! Alerts are stored with a free-text minutes column such as `"0,30"` or
//! `"5 15 45"`. A schedule fires during any cycle whose wall-clock minute is
//! one of the listed values.

use crate::ScheduleError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const MINUTES_PER_HOUR: u8 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinuteSchedule {
    minutes: BTreeSet<u8>,
}

impl MinuteSchedule {
    pub fn new(minutes: impl IntoIterator<Item = u8>) -> Result<Self, ScheduleError> {
        let mut set = BTreeSet::new();
        for minute in minutes {
            if minute >= MINUTES_PER_HOUR {
                return Err(ScheduleError::OutOfRange {
                    minute: i64::from(minute),
                });
            }
            set.insert(minute);
        }
        Ok(Self { minutes: set })
    }

    /// True when `minute` is one of the scheduled minutes. An empty schedule is never due.
    pub fn is_due(&self, minute: u32) -> bool {
        u8::try_from(minute)
            .map(|m| self.minutes.contains(&m))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.minutes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.minutes.len()
    }

    pub fn minutes(&self) -> impl Iterator<Item = u8> + '_ {
        self.minutes.iter().copied()
    }
}

impl FromStr for MinuteSchedule {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut minutes = BTreeSet::new();
        for token in raw
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: i64 = token.parse().map_err(|_| ScheduleError::NotANumber {
                token: token.to_string(),
            })?;
            if !(0..i64::from(MINUTES_PER_HOUR)).contains(&value) {
                return Err(ScheduleError::OutOfRange { minute: value });
            }
            minutes.insert(value as u8);
        }
        Ok(Self { minutes })
    }
}

impl fmt::Display for MinuteSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for minute in &self.minutes {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}", minute)?;
            first = false;
        }
        Ok(())
    }
}
