//! Wall-clock times of day and timezone conversions.
//!
//! Schedules only ever store a time of day; a calendar date is attached at the
//! last moment so that each date is converted with the offset in force on it.

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Timezone assumed when a habit context does not name one
pub const DEFAULT_TZ: Tz = chrono_tz::Etc::UTC;

/// A minute-precision time of day, written as 24-hour `HH:mm`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Build from hour and minute, `None` when out of range
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn as_naive(self) -> NaiveTime {
        self.0
    }

    /// Shift by a signed number of minutes, wrapping across midnight
    pub fn wrapping_add_minutes(self, minutes: i64) -> Self {
        let (shifted, _) = self.0.overflowing_add_signed(Duration::minutes(minutes));
        Self(shifted)
    }

    fn truncate(time: NaiveTime) -> Self {
        // Offsets in the tz database are whole minutes for every modern zone,
        // but historical LMT offsets are not.
        Self(NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

/// Error returned when a string is not a 24-hour `HH:mm` time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseTimeOfDayError(String);

impl fmt::Display for ParseTimeOfDayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not a 24-hour HH:mm time", self.0)
    }
}

impl std::error::Error for ParseTimeOfDayError {}

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    /// Accepts exactly `HH:mm`, 00:00 through 23:59
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeOfDayError(s.to_string());

        let (hours, minutes) = s.split_once(':').ok_or_else(err)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(hours) || hours.len() != 2 || !digits(minutes) || minutes.len() != 2 {
            return Err(err());
        }

        let hour: u32 = hours.parse().map_err(|_| err())?;
        let minute: u32 = minutes.parse().map_err(|_| err())?;
        if hour > 23 || minute > 59 {
            return Err(err());
        }
        Self::from_hm(hour, minute).ok_or_else(err)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Absolute instant for a local wall-clock time on `date` in `tz`.
///
/// Uses the rule in force on that date. A time inside a spring-forward gap is
/// read with the pre-transition offset (so it lands after the gap); a time in a
/// fall-back overlap resolves to the earlier instant.
pub fn local_to_instant(tz: Tz, date: NaiveDate, time: TimeOfDay) -> DateTime<Utc> {
    let local = date.and_time(time.as_naive());
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix()
                .local_minus_utc();
            let utc = local - Duration::seconds(i64::from(before));
            tracing::debug!(
                "{} on {} does not exist in {}, shifting past the gap",
                time,
                date,
                tz
            );
            Utc.from_utc_datetime(&utc)
        }
    }
}

/// Normalise a local time of day on `date` to its UTC time of day
pub fn local_time_to_utc(tz: Tz, date: NaiveDate, time: TimeOfDay) -> TimeOfDay {
    TimeOfDay::truncate(local_to_instant(tz, date, time).time())
}

/// Offset [`local_to_instant`] applies to `time` on `date`.
///
/// Inside a gap this is the pre-transition offset, which no instant on that
/// date reads back with, so callers that must reproduce the written time keep
/// it alongside the UTC value.
pub fn offset_for_local(tz: Tz, date: NaiveDate, time: TimeOfDay) -> FixedOffset {
    let instant = local_to_instant(tz, date, time);
    let seconds = (date.and_time(time.as_naive()) - instant.naive_utc()).num_seconds();
    i32::try_from(seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| tz.offset_from_utc_datetime(&instant.naive_utc()).fix())
}

/// Shift a UTC time of day by a fixed offset
pub fn utc_time_at_offset(utc: TimeOfDay, offset: FixedOffset) -> TimeOfDay {
    let (shifted, _) = utc
        .as_naive()
        .overflowing_add_signed(Duration::seconds(i64::from(offset.local_minus_utc())));
    TimeOfDay::truncate(shifted)
}

/// Read a stored UTC time of day back as local time in `tz` on `date`
pub fn utc_time_to_local(tz: Tz, date: NaiveDate, utc: TimeOfDay) -> TimeOfDay {
    let instant = Utc.from_utc_datetime(&date.and_time(utc.as_naive()));
    TimeOfDay::truncate(instant.with_timezone(&tz).time())
}
