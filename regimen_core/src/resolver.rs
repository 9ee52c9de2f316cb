//! Time resolution: declarative time specs to local times of day.

use crate::clock::{self, TimeOfDay};
use crate::{
    Error, HabitContext, ResolvedTime, Result, Schedule, TimeSpec, When, EVENT_OFFSET_MINUTES,
};
use chrono::NaiveDate;
use chrono_tz::Tz;

/// What a time spec is pinned to once the habit context is known
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Anchor {
    /// Event-relative; independent of the calendar date
    Local(TimeOfDay),
    /// Exact; converted per date
    Utc(TimeOfDay),
}

/// A schedule bound to the habit context it is read in
#[derive(Clone, Debug)]
pub struct ResolvedSchedule<'a> {
    schedule: &'a Schedule,
    habits: &'a HabitContext,
    anchors: Vec<Anchor>,
}

impl<'a> ResolvedSchedule<'a> {
    pub fn schedule(&self) -> &'a Schedule {
        self.schedule
    }

    pub fn habits(&self) -> &'a HabitContext {
        self.habits
    }

    pub fn tz(&self) -> Tz {
        self.habits.tz
    }

    /// Local times of day for every time spec on `date`, in `times` order
    pub fn times_on(&self, date: NaiveDate) -> Vec<ResolvedTime> {
        self.schedule
            .times()
            .iter()
            .zip(&self.anchors)
            .enumerate()
            .map(|(index, (spec, anchor))| ResolvedTime {
                index,
                local_time: match *anchor {
                    Anchor::Local(time) => time,
                    Anchor::Utc(utc) => clock::utc_time_to_local(self.habits.tz, date, utc),
                },
                spec: spec.clone(),
            })
            .collect()
    }
}

/// Bind `schedule` to `habits`.
///
/// # Panics
///
/// Panics if an event-relative time names an event missing from `habits`.
/// Validation checks this against the same context, so a miss here means the
/// schedule was validated against a different one.
pub fn resolve<'a>(schedule: &'a Schedule, habits: &'a HabitContext) -> ResolvedSchedule<'a> {
    match try_resolve(schedule, habits) {
        Ok(resolved) => resolved,
        Err(e) => panic!("schedule resolved against a habit context it was not validated with: {e}"),
    }
}

/// Like [`resolve`], reporting a missing habit event as `invalid_schedule`
pub fn try_resolve<'a>(
    schedule: &'a Schedule,
    habits: &'a HabitContext,
) -> Result<ResolvedSchedule<'a>> {
    let anchors = schedule
        .times()
        .iter()
        .enumerate()
        .map(|(index, spec)| anchor_for(index, spec, habits))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedSchedule {
        schedule,
        habits,
        anchors,
    })
}

fn anchor_for(index: usize, spec: &TimeSpec, habits: &HabitContext) -> Result<Anchor> {
    match spec {
        TimeSpec::Event { event, when } => {
            let base = habits.event(event).ok_or_else(|| {
                Error::invalid_schedule(
                    format!("times[{}].event", index),
                    format!("no habit event named {:?}", event),
                )
            })?;
            let offset = match when {
                When::Before => -EVENT_OFFSET_MINUTES,
                When::After => EVENT_OFFSET_MINUTES,
            };
            Ok(Anchor::Local(base.wrapping_add_minutes(offset)))
        }
        TimeSpec::Exact { utc } => Ok(Anchor::Utc(*utc)),
    }
}
