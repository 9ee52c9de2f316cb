//! Schedule validation: raw declarative input to a canonical [`Schedule`].
//!
//! Validation is all-or-nothing. Any malformed field fails the whole call with
//! the path of the first offending field; a returned `Schedule` is always
//! fully well-formed.

use crate::clock::{self, TimeOfDay};
use crate::{
    Error, Exclude, Frequency, FrequencyUnit, HabitContext, MedicationRef, Mode, Result,
    Schedule, TimeSpec, Until, When,
};
use chrono::{FixedOffset, NaiveDate, Utc};
use serde_json::{Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validates raw schedules against one patient's habit context
#[derive(Clone, Debug)]
pub struct Validator<'h> {
    habits: &'h HabitContext,
    today: NaiveDate,
}

impl<'h> Validator<'h> {
    /// Validator whose "today" is the current date in the patient's timezone
    pub fn new(habits: &'h HabitContext) -> Self {
        let today = Utc::now().with_timezone(&habits.tz).date_naive();
        Self::with_today(habits, today)
    }

    /// Validator with an explicit reference date
    pub fn with_today(habits: &'h HabitContext, today: NaiveDate) -> Self {
        Self { habits, today }
    }

    pub fn validate(&self, raw: &Value) -> Result<Schedule> {
        let Some(data) = raw.as_object() else {
            tracing::debug!("Non-object schedule input, defaulting to as-needed");
            return Ok(Schedule::empty(self.today, self.habits.tz));
        };

        let mut schedule = Schedule::empty(self.today, self.habits.tz);
        schedule.as_needed = optional_bool(data, "as_needed")?;
        schedule.regularly = optional_bool(data, "regularly")?;
        schedule.mode = determine_mode(data, schedule.as_needed, schedule.regularly)?;

        schedule.take_with_food = optional_bool(data, "take_with_food")?;
        schedule.take_with = optional_refs(data, "take_with_medications")?;
        schedule.take_without = optional_refs(data, "take_without_medications")?;

        if schedule.mode == Mode::AsNeeded {
            if ["until", "frequency", "times"]
                .iter()
                .any(|key| field(data, key).is_some())
            {
                tracing::debug!("Ignoring recurrence fields on an as-needed schedule");
            }
            return Ok(schedule);
        }

        schedule.until = field(data, "until").map(parse_until).transpose()?;

        if let Some(raw_frequency) = field(data, "frequency") {
            let frequency = parse_frequency(raw_frequency)?;
            if let Some(start) = frequency.start {
                schedule.cycle_start = start;
            }
            schedule.frequency = Some(frequency);
        }

        if let Some(raw_times) = field(data, "times") {
            let (times, offsets): (Vec<_>, Vec<_>) =
                self.parse_times(raw_times)?.into_iter().unzip();
            schedule.times = Some(times);
            schedule.exact_offsets = offsets;
        }

        tracing::debug!(
            "Validated regular schedule: {} time(s), cycle start {}",
            schedule.times().len(),
            schedule.cycle_start
        );
        Ok(schedule)
    }

    /// Each entry with the offset an exact time was normalised with
    fn parse_times(&self, raw: &Value) -> Result<Vec<(TimeSpec, Option<FixedOffset>)>> {
        let items = raw
            .as_array()
            .ok_or_else(|| Error::invalid_schedule("times", "expected an array"))?;

        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.parse_time_spec(index, item))
            .collect()
    }

    fn parse_time_spec(
        &self,
        index: usize,
        raw: &Value,
    ) -> Result<(TimeSpec, Option<FixedOffset>)> {
        let path = format!("times[{}]", index);
        let entry = raw
            .as_object()
            .ok_or_else(|| Error::invalid_schedule(&path, "expected an object"))?;

        match entry.get("type").and_then(Value::as_str) {
            Some("event") => {
                let event = entry
                    .get("event")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::invalid_schedule(format!("{}.event", path), "expected an event name")
                    })?;
                if self.habits.event(event).is_none() {
                    return Err(Error::invalid_schedule(
                        format!("{}.event", path),
                        format!("no habit event named {:?}", event),
                    ));
                }

                let when = match entry.get("when").and_then(Value::as_str) {
                    Some("before") => When::Before,
                    Some("after") => When::After,
                    _ => {
                        return Err(Error::invalid_schedule(
                            format!("{}.when", path),
                            "expected \"before\" or \"after\"",
                        ))
                    }
                };

                Ok((
                    TimeSpec::Event {
                        event: event.to_string(),
                        when,
                    },
                    None,
                ))
            }
            Some("exact") => {
                let local: TimeOfDay = entry
                    .get("time")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        Error::invalid_schedule(format!("{}.time", path), "expected a 24-hour HH:mm time")
                    })?;

                let tz = self.habits.tz;
                Ok((
                    TimeSpec::Exact {
                        utc: clock::local_time_to_utc(tz, self.today, local),
                    },
                    Some(clock::offset_for_local(tz, self.today, local)),
                ))
            }
            _ => Err(Error::invalid_schedule(
                format!("{}.type", path),
                "expected \"event\" or \"exact\"",
            )),
        }
    }
}

/// Validate `raw` against `habits`, taking "today" from the system clock
pub fn validate(raw: &Value, habits: &HabitContext) -> Result<Schedule> {
    Validator::new(habits).validate(raw)
}

/// Present and non-null field
fn field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    data.get(key).filter(|v| !v.is_null())
}

fn determine_mode(
    data: &Map<String, Value>,
    as_needed: Option<bool>,
    regularly: Option<bool>,
) -> Result<Mode> {
    if data.is_empty() {
        return Ok(Mode::AsNeeded);
    }

    match (as_needed == Some(true), regularly == Some(true)) {
        (true, true) => {
            tracing::debug!("Both as_needed and regularly set, treating as regular");
            Ok(Mode::Regular)
        }
        (_, true) => Ok(Mode::Regular),
        (true, false) => Ok(Mode::AsNeeded),
        (false, false) => Err(Error::invalid_schedule(
            "as_needed",
            "one of as_needed or regularly must be true",
        )),
    }
}

fn optional_bool(data: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match field(data, key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::invalid_schedule(key, "expected a boolean")),
    }
}

fn optional_refs(data: &Map<String, Value>, key: &str) -> Result<Option<Vec<MedicationRef>>> {
    let Some(raw) = field(data, key) else {
        return Ok(None);
    };
    let items = raw
        .as_array()
        .ok_or_else(|| Error::invalid_schedule(key, "expected an array"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(name) => Ok(MedicationRef::Name(name.clone())),
            Value::Number(n) if n.is_i64() => Ok(MedicationRef::Id(n.as_i64().unwrap_or_default())),
            _ => Err(Error::invalid_schedule(
                format!("{}[{}]", key, index),
                "expected a medication id",
            )),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn parse_date(raw: &Value) -> Option<NaiveDate> {
    raw.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
}

fn parse_until(raw: &Value) -> Result<Until> {
    if let Value::String(_) = raw {
        return parse_date(raw)
            .map(Until::Date)
            .ok_or_else(|| Error::invalid_schedule("until", "expected a YYYY-MM-DD date"));
    }

    let obj = raw
        .as_object()
        .ok_or_else(|| Error::invalid_schedule("until", "expected a date or an object"))?;
    let stop = obj.get("stop").unwrap_or(&Value::Null);

    match obj.get("type").and_then(Value::as_str) {
        Some("forever") => Ok(Until::Forever),
        Some("date") => parse_date(stop)
            .map(Until::StopDate)
            .ok_or_else(|| Error::invalid_schedule("until.stop", "expected a YYYY-MM-DD date")),
        Some("number") => stop
            .as_u64()
            .filter(|&n| n >= 1)
            .and_then(|n| u32::try_from(n).ok())
            .map(Until::StopAfter)
            .ok_or_else(|| Error::invalid_schedule("until.stop", "expected a positive integer")),
        _ => Err(Error::invalid_schedule(
            "until.type",
            "expected \"forever\", \"date\" or \"number\"",
        )),
    }
}

fn positive_u32(raw: &Value) -> Option<u32> {
    raw.as_u64()
        .filter(|&n| n >= 1)
        .and_then(|n| u32::try_from(n).ok())
}

fn parse_frequency(raw: &Value) -> Result<Frequency> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::invalid_frequency("frequency", "expected an object"))?;

    let mut frequency = Frequency::default();

    if let Some(start) = field(obj, "start") {
        frequency.start = Some(parse_date(start).ok_or_else(|| {
            Error::invalid_frequency("frequency.start", "expected a YYYY-MM-DD date")
        })?);
    }

    if let Some(n) = field(obj, "n") {
        frequency.n = Some(positive_u32(n).ok_or_else(|| {
            Error::invalid_frequency("frequency.n", "expected a positive integer")
        })?);
    }

    if let Some(unit) = field(obj, "unit") {
        frequency.unit = Some(match unit.as_str() {
            Some("day") => FrequencyUnit::Day,
            Some("week") => FrequencyUnit::Week,
            Some("month") => FrequencyUnit::Month,
            _ => {
                return Err(Error::invalid_frequency(
                    "frequency.unit",
                    "expected \"day\", \"week\" or \"month\"",
                ))
            }
        });
    }

    if let Some(exclude) = field(obj, "exclude") {
        frequency.exclude = Some(parse_exclude(exclude)?);
    }

    Ok(frequency)
}

fn parse_exclude(raw: &Value) -> Result<Exclude> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::invalid_frequency("frequency.exclude", "expected an object"))?;

    let repeat = obj.get("repeat").and_then(positive_u32).ok_or_else(|| {
        Error::invalid_frequency("frequency.exclude.repeat", "expected a positive integer")
    })?;

    let slots = obj
        .get("exclude")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::invalid_frequency("frequency.exclude.exclude", "expected an array"))?;

    let exclude = slots
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.as_u64()
                .and_then(|k| u32::try_from(k).ok())
                .filter(|&k| k < repeat)
                .ok_or_else(|| {
                    Error::invalid_frequency(
                        format!("frequency.exclude.exclude[{}]", index),
                        format!("expected an integer below repeat ({})", repeat),
                    )
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Exclude { exclude, repeat })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn habits() -> HabitContext {
        HabitContext::new("America/New_York".parse().unwrap())
            .with_event("breakfast", "07:30".parse().unwrap())
            .with_event("sleep", "23:50".parse().unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn check(raw: Value) -> Result<Schedule> {
        let habits = habits();
        Validator::with_today(&habits, today()).validate(&raw)
    }

    fn err_path(raw: Value) -> (String, &'static str) {
        let err = check(raw).unwrap_err();
        (err.path().unwrap_or_default().to_string(), err.code())
    }

    #[test]
    fn test_empty_and_non_object_are_as_needed() {
        for raw in [json!({}), json!(null), json!("foo"), json!(42), json!([1, 2])] {
            let schedule = check(raw.clone()).unwrap();
            assert_eq!(schedule.mode(), Mode::AsNeeded, "{raw}");
            assert_eq!(schedule.cycle_start(), today());
            assert!(schedule.times().is_empty());
        }
    }

    #[test]
    fn test_regularly_wins_over_as_needed() {
        let schedule = check(json!({"as_needed": true, "regularly": true})).unwrap();
        assert_eq!(schedule.mode(), Mode::Regular);
    }

    #[test]
    fn test_neither_flag_set_is_invalid() {
        assert_eq!(
            err_path(json!({"type": "invalid"})),
            ("as_needed".to_string(), "invalid_schedule")
        );
        assert_eq!(
            err_path(json!({"as_needed": false, "regularly": false})),
            ("as_needed".to_string(), "invalid_schedule")
        );
    }

    #[test]
    fn test_flags_must_be_booleans() {
        assert_eq!(
            err_path(json!({"regularly": "yes"})),
            ("regularly".to_string(), "invalid_schedule")
        );
        assert_eq!(
            err_path(json!({"regularly": true, "take_with_food": 1})),
            ("take_with_food".to_string(), "invalid_schedule")
        );
    }

    #[test]
    fn test_exact_time_stored_as_utc() {
        let schedule =
            check(json!({"regularly": true, "times": [{"type": "exact", "time": "08:00"}]}))
                .unwrap();
        // New York is UTC-4 in July
        assert_eq!(
            schedule.times(),
            &[TimeSpec::Exact {
                utc: "12:00".parse().unwrap()
            }]
        );
    }

    #[test]
    fn test_event_time_spec() {
        let schedule = check(json!({
            "regularly": true,
            "times": [{"type": "event", "event": "breakfast", "when": "before"}]
        }))
        .unwrap();
        assert_eq!(
            schedule.times(),
            &[TimeSpec::Event {
                event: "breakfast".into(),
                when: When::Before
            }]
        );
    }

    #[test]
    fn test_bad_time_entries_report_paths() {
        let cases = [
            (json!("08:00"), "times"),
            (json!(["08:00"]), "times[0]"),
            (json!([{"type": "sometimes"}]), "times[0].type"),
            (json!([{"type": "exact", "time": "8am"}]), "times[0].time"),
            (json!([{"type": "exact", "time": "24:00"}]), "times[0].time"),
            (
                json!([{"type": "exact", "time": "08:00"}, {"type": "event", "event": "lunch", "when": "after"}]),
                "times[1].event",
            ),
            (
                json!([{"type": "event", "event": "breakfast", "when": "during"}]),
                "times[0].when",
            ),
        ];

        for (times, path) in cases {
            let (got, code) = err_path(json!({"regularly": true, "times": times}));
            assert_eq!(got, path);
            assert_eq!(code, "invalid_schedule");
        }
    }

    #[test]
    fn test_frequency_start_sets_cycle_start() {
        let schedule =
            check(json!({"regularly": true, "frequency": {"start": "2024-06-15"}})).unwrap();
        assert_eq!(
            schedule.cycle_start(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
        );
    }

    #[test]
    fn test_frequency_without_start_anchors_today() {
        let schedule = check(json!({"regularly": true, "frequency": {"n": 2}})).unwrap();
        assert_eq!(schedule.cycle_start(), today());
        assert_eq!(schedule.frequency().unwrap().start, None);
        assert_eq!(schedule.frequency().unwrap().every(), 2);
    }

    #[test]
    fn test_bad_frequency_fields() {
        let cases = [
            (json!("daily"), "frequency"),
            (json!({"start": "next monday"}), "frequency.start"),
            (json!({"start": "2024-02-30"}), "frequency.start"),
            (json!({"n": 0}), "frequency.n"),
            (json!({"n": 1.5}), "frequency.n"),
            (json!({"unit": "fortnight"}), "frequency.unit"),
            (json!({"exclude": {"exclude": [1]}}), "frequency.exclude.repeat"),
            (json!({"exclude": {"exclude": [4], "repeat": 4}}), "frequency.exclude.exclude[0]"),
        ];

        for (frequency, path) in cases {
            let (got, code) = err_path(json!({"regularly": true, "frequency": frequency}));
            assert_eq!(got, path);
            assert_eq!(code, "invalid_frequency");
        }
    }

    #[test]
    fn test_until_forms() {
        let cases = [
            (json!("2024-07-14"), Until::Date(NaiveDate::from_ymd_opt(2024, 7, 14).unwrap())),
            (json!({"type": "forever"}), Until::Forever),
            (
                json!({"type": "date", "stop": "2024-08-01"}),
                Until::StopDate(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap()),
            ),
            (json!({"type": "number", "stop": 5}), Until::StopAfter(5)),
        ];
        for (until, expected) in cases {
            let schedule = check(json!({"regularly": true, "until": until})).unwrap();
            assert_eq!(schedule.until(), Some(&expected));
        }

        assert_eq!(
            err_path(json!({"regularly": true, "until": "soon"})),
            ("until".to_string(), "invalid_schedule")
        );
        assert_eq!(
            err_path(json!({"regularly": true, "until": {"type": "number", "stop": 0}})),
            ("until.stop".to_string(), "invalid_schedule")
        );
    }

    #[test]
    fn test_as_needed_drops_recurrence_fields() {
        let schedule = check(json!({
            "as_needed": true,
            "until": "not even a date",
            "times": "ignored",
            "take_with_food": true
        }))
        .unwrap();
        assert_eq!(schedule.mode(), Mode::AsNeeded);
        assert!(schedule.until().is_none());
        assert!(schedule.times().is_empty());
        assert_eq!(schedule.take_with_food(), Some(true));
    }

    #[test]
    fn test_medication_refs() {
        let schedule = check(json!({
            "regularly": true,
            "take_with_medications": [1, "aspirin"],
            "take_without_medications": []
        }))
        .unwrap();
        assert_eq!(
            schedule.take_with(),
            &[MedicationRef::Id(1), MedicationRef::Name("aspirin".into())]
        );
        assert!(schedule.take_without().is_empty());

        assert_eq!(
            err_path(json!({"regularly": true, "take_with_medications": [{"id": 1}]})),
            ("take_with_medications[0]".to_string(), "invalid_schedule")
        );
    }

    #[test]
    fn test_null_fields_are_absent() {
        let schedule = check(json!({"regularly": true, "times": null, "until": null})).unwrap();
        assert!(schedule.times.is_none());
        assert!(schedule.until.is_none());
    }
}
