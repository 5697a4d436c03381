//! Wall-clock time-of-day for card scheduling.
//!
//! Cards carry a start and end as plain clock times within their board's day.
//! There is deliberately no date or timezone here — boards *are* the days,
//! and different boards may legitimately reuse the same clock times. An end
//! earlier than its start is tolerated (the overlap sweep treats it as a
//! zero/negative-length interval); nothing in the model normalizes it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes since midnight, `00:00..=23:59`.
///
/// Serializes as `"HH:MM"` — the form the backend and UI exchange.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayTime(u16);

/// Failed to parse a `"HH:MM"` clock string.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid clock time {input:?} (expected HH:MM, 00:00..=23:59)")]
pub struct DayTimeParseError {
    pub input: String,
}

impl DayTime {
    /// Build from hour and minute. Returns `None` out of range.
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    /// Total minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.0
    }

    /// Parse `"HH:MM"`.
    pub fn parse(s: &str) -> Result<Self, DayTimeParseError> {
        let err = || DayTimeParseError { input: s.to_string() };
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        Self::new(hour, minute).ok_or_else(err)
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

// Debug delegates to Display: `09:30` reads better in test diffs than a
// tuple-struct wrapper around a minute count.
impl fmt::Debug for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl TryFrom<String> for DayTime {
    type Error = DayTimeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DayTime> for String {
    fn from(t: DayTime) -> String {
        t.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
