//! Core domain types for the medication schedule engine.
//!
//! This module defines the value types shared by every stage:
//! - Schedules and their declarative parts (time specs, frequency, end)
//! - The habit context a patient's day is anchored on
//! - Concrete occurrences and recorded doses

use crate::clock::{TimeOfDay, DEFAULT_TZ};
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Minutes between a habit event and an event-relative dose
pub const EVENT_OFFSET_MINUTES: i64 = 15;

// ============================================================================
// Habit Context
// ============================================================================

/// Snapshot of a patient's daily anchors and home timezone
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HabitContext {
    #[serde(default = "default_tz")]
    pub tz: Tz,
    #[serde(default)]
    pub events: BTreeMap<String, TimeOfDay>,
}

fn default_tz() -> Tz {
    DEFAULT_TZ
}

impl Default for HabitContext {
    fn default() -> Self {
        Self::new(DEFAULT_TZ)
    }
}

impl HabitContext {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            events: BTreeMap::new(),
        }
    }

    pub fn with_event(mut self, name: impl Into<String>, time: TimeOfDay) -> Self {
        self.events.insert(name.into(), time);
        self
    }

    pub fn event(&self, name: &str) -> Option<TimeOfDay> {
        self.events.get(name).copied()
    }
}

// ============================================================================
// Time Specs
// ============================================================================

/// Which side of a habit event a dose falls on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    Before,
    After,
}

impl When {
    pub fn as_str(self) -> &'static str {
        match self {
            When::Before => "before",
            When::After => "after",
        }
    }
}

/// One daily dosing instant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeSpec {
    /// Relative to a named habit event
    Event { event: String, when: When },
    /// Fixed wall-clock time, stored as its UTC time of day
    Exact {
        #[serde(rename = "utc_time")]
        utc: TimeOfDay,
    },
}

impl TimeSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            TimeSpec::Event { .. } => "event",
            TimeSpec::Exact { .. } => "exact",
        }
    }
}

// ============================================================================
// Recurrence
// ============================================================================

/// Whether a schedule has expected doses at all
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    AsNeeded,
    Regular,
}

/// Calendar unit a frequency counts in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyUnit {
    Day,
    Week,
    Month,
}

impl FrequencyUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            FrequencyUnit::Day => "day",
            FrequencyUnit::Week => "week",
            FrequencyUnit::Month => "month",
        }
    }
}

/// Periods skipped within a repeating block, e.g. three weeks on, one off
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exclude {
    pub exclude: Vec<u32>,
    pub repeat: u32,
}

impl Exclude {
    pub fn skips(&self, period: u64) -> bool {
        let slot = period % u64::from(self.repeat);
        self.exclude.iter().any(|&k| u64::from(k) == slot)
    }
}

/// Recurrence descriptor; every field is kept only if it was supplied
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frequency {
    pub start: Option<NaiveDate>,
    pub n: Option<u32>,
    pub unit: Option<FrequencyUnit>,
    pub exclude: Option<Exclude>,
}

impl Frequency {
    pub fn every(&self) -> u32 {
        self.n.unwrap_or(1)
    }

    pub fn unit(&self) -> FrequencyUnit {
        self.unit.unwrap_or(FrequencyUnit::Day)
    }
}

/// End of a regular schedule, in whichever shape it was written
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Until {
    /// Plain `YYYY-MM-DD` string, inclusive
    Date(NaiveDate),
    /// `{type: "forever"}`
    Forever,
    /// `{type: "date", stop: "YYYY-MM-DD"}`, inclusive
    StopDate(NaiveDate),
    /// `{type: "number", stop: N}`: N dosing days from the cycle start
    StopAfter(u32),
}

impl Until {
    /// Last calendar date that may carry an occurrence
    pub fn last_date(&self) -> Option<NaiveDate> {
        match self {
            Until::Date(d) | Until::StopDate(d) => Some(*d),
            Until::Forever | Until::StopAfter(_) => None,
        }
    }

    pub fn dosing_days(&self) -> Option<u32> {
        match self {
            Until::StopAfter(n) => Some(*n),
            _ => None,
        }
    }
}

/// Opaque reference to another medication
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MedicationRef {
    Id(i64),
    Name(String),
}

impl std::fmt::Display for MedicationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MedicationRef::Id(id) => write!(f, "{}", id),
            MedicationRef::Name(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// Schedule
// ============================================================================

/// A validated dosing regimen.
///
/// Built only by [`crate::validation::Validator`] and immutable afterwards.
/// Optional fields are `Some` exactly when the raw input carried them, which is
/// what lets [`Schedule::to_raw`] reproduce the original shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub(crate) mode: Mode,
    pub(crate) as_needed: Option<bool>,
    pub(crate) regularly: Option<bool>,
    pub(crate) until: Option<Until>,
    pub(crate) frequency: Option<Frequency>,
    pub(crate) cycle_start: NaiveDate,
    pub(crate) times: Option<Vec<TimeSpec>>,
    pub(crate) take_with_food: Option<bool>,
    pub(crate) take_with: Option<Vec<MedicationRef>>,
    pub(crate) take_without: Option<Vec<MedicationRef>>,
    /// Date whose offsets were used to normalise exact times to UTC
    pub(crate) written_on: NaiveDate,
    /// Timezone exact times were written in
    pub(crate) written_in: Tz,
    /// Offset each exact entry of `times` was normalised with, by position
    pub(crate) exact_offsets: Vec<Option<FixedOffset>>,
}

impl Schedule {
    pub(crate) fn empty(today: NaiveDate, tz: Tz) -> Self {
        Self {
            mode: Mode::AsNeeded,
            as_needed: None,
            regularly: None,
            until: None,
            frequency: None,
            cycle_start: today,
            times: None,
            take_with_food: None,
            take_with: None,
            take_without: None,
            written_on: today,
            written_in: tz,
            exact_offsets: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_regular(&self) -> bool {
        self.mode == Mode::Regular
    }

    pub fn until(&self) -> Option<&Until> {
        self.until.as_ref()
    }

    pub fn frequency(&self) -> Option<&Frequency> {
        self.frequency.as_ref()
    }

    pub fn cycle_start(&self) -> NaiveDate {
        self.cycle_start
    }

    pub fn times(&self) -> &[TimeSpec] {
        self.times.as_deref().unwrap_or_default()
    }

    pub fn take_with_food(&self) -> Option<bool> {
        self.take_with_food
    }

    pub fn take_with(&self) -> &[MedicationRef] {
        self.take_with.as_deref().unwrap_or_default()
    }

    pub fn take_without(&self) -> &[MedicationRef] {
        self.take_without.as_deref().unwrap_or_default()
    }

    pub fn written_on(&self) -> NaiveDate {
        self.written_on
    }
}

// ============================================================================
// Generation Types
// ============================================================================

/// Inclusive range of calendar dates; empty when `end < start`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `days` consecutive dates starting at `start`, stopping at the last
    /// representable date
    pub fn days(start: NaiveDate, days: u32) -> Self {
        let end = match days.checked_sub(1) {
            Some(extra) => start
                .checked_add_days(Days::new(u64::from(extra)))
                .unwrap_or(NaiveDate::MAX),
            None => match start.pred_opt() {
                Some(end) => end,
                None => return Self::new(NaiveDate::MAX, NaiveDate::MIN),
            },
        };
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// A time spec resolved to a local time of day
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedTime {
    /// Position of the source entry in the schedule's `times`
    pub index: usize,
    pub local_time: TimeOfDay,
    pub spec: TimeSpec,
}

/// One concrete expected dose
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub instant: DateTime<Utc>,
    pub local_time: TimeOfDay,
    pub index: usize,
    pub source: TimeSpec,
}

// ============================================================================
// Doses
// ============================================================================

/// A recorded intake, as fed to the matcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dose {
    pub id: Uuid,
    pub medication_id: MedicationRef,
    pub taken_at: DateTime<Utc>,
}

impl Dose {
    pub fn new(medication_id: MedicationRef, taken_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            medication_id,
            taken_at,
        }
    }
}
