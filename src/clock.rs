//! Time-of-day arithmetic on a 24-hour cycle
//!
//! A [`ClockTime`] is an hour and minute with no date attached. Adding minutes
//! wraps modulo 1440, so "23:00 yesterday" and "23:00 in two days" are the same
//! value. Callers that care about calendar days track them separately.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::InputError;

pub const MINUTES_PER_DAY: i64 = 1440;
const HALF_DAY: i64 = 720;

/// Hour and minute of the day, stored as minutes since midnight (0..1440)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime { minutes: 0 };

    /// Build a clock time from hour (0-23) and minute (0-59)
    pub fn from_hm(hour: u8, minute: u8) -> Result<Self, InputError> {
        if hour > 23 || minute > 59 {
            return Err(InputError::malformed_time(
                format!("{}:{:02}", hour, minute),
                "hour must be 0-23 and minute 0-59",
            ));
        }
        Ok(Self::at(hour, minute))
    }

    /// Literal constructor for fixed schedule anchors
    pub(crate) const fn at(hour: u8, minute: u8) -> Self {
        ClockTime {
            minutes: hour as u16 * 60 + minute as u16,
        }
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    /// Minutes elapsed since midnight
    pub fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }

    /// Add a signed number of minutes, wrapping around midnight.
    ///
    /// Fails only when the delta overflows the underlying arithmetic; the
    /// result is never clamped.
    pub fn add_minutes(self, delta: i64) -> Result<Self, InputError> {
        let total = i64::from(self.minutes).checked_add(delta).ok_or_else(|| {
            InputError::malformed_time(
                format!("{} {:+}", self, delta),
                "minute offset overflows",
            )
        })?;

        Ok(ClockTime {
            minutes: total.rem_euclid(MINUTES_PER_DAY) as u16,
        })
    }

    /// Shortest signed distance from `self` to `target`, in `(-720, 720]`
    pub fn signed_offset_to(&self, target: ClockTime) -> i64 {
        let forward = self.minutes_later_to(target);
        if forward > HALF_DAY {
            forward - MINUTES_PER_DAY
        } else {
            forward
        }
    }

    /// Minutes to move later to reach `target`, in `0..1440`
    pub fn minutes_later_to(&self, target: ClockTime) -> i64 {
        (i64::from(target.minutes) - i64::from(self.minutes)).rem_euclid(MINUTES_PER_DAY)
    }

    /// Minutes to move earlier to reach `target`, in `0..1440`
    pub fn minutes_earlier_to(&self, target: ClockTime) -> i64 {
        (i64::from(self.minutes) - i64::from(target.minutes)).rem_euclid(MINUTES_PER_DAY)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| InputError::malformed_time(s, reason);

        let (hours, minutes) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| malformed("expected HH:mm"))?;

        let digits_only = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits_only(hours) || hours.len() > 2 || !digits_only(minutes) || minutes.len() != 2 {
            return Err(malformed("expected HH:mm"));
        }

        let hour: u8 = hours.parse().map_err(|_| malformed("invalid hour"))?;
        let minute: u8 = minutes.parse().map_err(|_| malformed("invalid minute"))?;
        if hour > 23 {
            return Err(malformed("hour must be 0-23"));
        }
        if minute > 59 {
            return Err(malformed("minute must be 0-59"));
        }

        Ok(Self::at(hour, minute))
    }
}

impl Serialize for ClockTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A `[start, end]` interval of the day; `end` may wrap past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockWindow(pub ClockTime, pub ClockTime);

impl ClockWindow {
    /// Window spanning `start_offset..end_offset` minutes from `anchor`
    pub fn around(anchor: ClockTime, start_offset: i64, end_offset: i64) -> Result<Self, InputError> {
        Ok(ClockWindow(
            anchor.add_minutes(start_offset)?,
            anchor.add_minutes(end_offset)?,
        ))
    }

    pub fn start(&self) -> ClockTime {
        self.0
    }

    pub fn end(&self) -> ClockTime {
        self.1
    }
}

impl fmt::Display for ClockWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// String-level form of [`ClockTime::add_minutes`]: `"08:30", -30 -> "08:00"`
pub fn add_minutes(clock: &str, delta: i64) -> Result<String, InputError> {
    let time: ClockTime = clock.parse()?;
    Ok(time.add_minutes(delta)?.to_string())
}
