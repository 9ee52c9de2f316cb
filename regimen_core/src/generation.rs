//! Occurrence generation: expanding a resolved schedule over a date range.
//!
//! ## Expansion rules
//!
//! 1. **As-needed** schedules never expect a dose: the sequence is empty.
//!
//! 2. **Window**: only dates in `range ∩ [cycle start, until]` are considered,
//!    with `until` inclusive.
//!
//! 3. **Recurrence**: a date is a dosing day when it lands on an `n`-th
//!    day/week/month boundary counted from the cycle start, and the period it
//!    opens is not excluded.
//!
//! 4. **Emission**: each dosing day yields one occurrence per time spec, in
//!    `times` order, converted with the timezone rule in force on that date.

use crate::clock;
use crate::resolver::ResolvedSchedule;
use crate::{DateRange, Exclude, FrequencyUnit, Occurrence, Schedule};
use chrono::{Datelike, NaiveDate};
use std::collections::VecDeque;

/// Recurrence rule extracted from a schedule's frequency
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recurrence {
    start: NaiveDate,
    every: u32,
    unit: FrequencyUnit,
    exclude: Option<Exclude>,
}

impl Recurrence {
    pub fn for_schedule(schedule: &Schedule) -> Self {
        let frequency = schedule.frequency();
        Self {
            start: schedule.cycle_start(),
            every: frequency.map_or(1, |f| f.every()),
            unit: frequency.map_or(FrequencyUnit::Day, |f| f.unit()),
            exclude: frequency.and_then(|f| f.exclude.clone()),
        }
    }

    /// Index of the dosing period `date` opens, if it opens one
    fn period(&self, date: NaiveDate) -> Option<u64> {
        if date < self.start {
            return None;
        }
        let every = u64::from(self.every);
        let days = u64::try_from((date - self.start).num_days()).ok()?;

        match self.unit {
            FrequencyUnit::Day => (days % every == 0).then(|| days / every),
            FrequencyUnit::Week => (days % (7 * every) == 0).then(|| days / (7 * every)),
            FrequencyUnit::Month => {
                let months = u64::try_from(months_between(self.start, date)).ok()?;
                let anchor_day = self.start.day().min(days_in_month(date));
                (months % every == 0 && date.day() == anchor_day).then(|| months / every)
            }
        }
    }

    pub fn is_dosing_day(&self, date: NaiveDate) -> bool {
        match (self.period(date), &self.exclude) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(period), Some(exclude)) => !exclude.skips(period),
        }
    }
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (i64::from(to.year()) - i64::from(from.year())) * 12 + i64::from(to.month())
        - i64::from(from.month())
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// Lazy occurrence sequence; see [`generate`]
#[derive(Clone, Debug)]
pub struct Occurrences<'r> {
    resolved: &'r ResolvedSchedule<'r>,
    recurrence: Recurrence,
    range_start: NaiveDate,
    last: NaiveDate,
    cursor: Option<NaiveDate>,
    /// Dosing days left before a count-limited schedule ends
    days_left: Option<u32>,
    pending: VecDeque<Occurrence>,
}

impl<'r> Occurrences<'r> {
    fn new(resolved: &'r ResolvedSchedule<'r>, range: DateRange) -> Self {
        let schedule = resolved.schedule();
        let recurrence = Recurrence::for_schedule(schedule);
        let until = schedule.until();
        let days_left = until.and_then(|u| u.dosing_days());

        let last = match until.and_then(|u| u.last_date()) {
            Some(until) => range.end.min(until),
            None => range.end,
        };

        // Count-limited schedules are walked from the cycle start so earlier
        // dosing days are counted even when they fall before the range.
        let first = if days_left.is_some() {
            schedule.cycle_start()
        } else {
            range.start.max(schedule.cycle_start())
        };

        let exhausted = !schedule.is_regular()
            || schedule.times().is_empty()
            || range.is_empty()
            || first > last;

        Self {
            resolved,
            recurrence,
            range_start: range.start,
            last,
            cursor: if exhausted { None } else { Some(first) },
            days_left,
            pending: VecDeque::new(),
        }
    }

    fn expand(&mut self, date: NaiveDate) {
        let tz = self.resolved.tz();
        self.pending
            .extend(self.resolved.times_on(date).into_iter().map(|t| Occurrence {
                date,
                instant: clock::local_to_instant(tz, date, t.local_time),
                local_time: t.local_time,
                index: t.index,
                source: t.spec,
            }));
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        loop {
            if let Some(occurrence) = self.pending.pop_front() {
                return Some(occurrence);
            }

            let date = self.cursor?;
            if date > self.last {
                self.cursor = None;
                return None;
            }
            self.cursor = date.succ_opt();

            if !self.recurrence.is_dosing_day(date) {
                continue;
            }

            if let Some(left) = self.days_left {
                if left == 0 {
                    self.cursor = None;
                    return None;
                }
                self.days_left = Some(left - 1);
            }

            if date >= self.range_start {
                self.expand(date);
            }
        }
    }
}

/// Expand `resolved` over `range`.
///
/// Every call starts from scratch; iterators share no state.
pub fn generate<'r>(resolved: &'r ResolvedSchedule<'r>, range: DateRange) -> Occurrences<'r> {
    tracing::debug!(
        "Generating occurrences from {} to {}",
        range.start,
        range.end
    );
    Occurrences::new(resolved, range)
}
