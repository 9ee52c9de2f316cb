//! Schedule serialization back to the raw declarative shape.
//!
//! Only fields the raw input carried are emitted, so
//! `serialize(validate(serialize(validate(raw))))` equals `serialize(validate(raw))`.

use crate::clock;
use crate::{Frequency, HabitContext, Schedule, TimeSpec, Until};
use serde_json::{json, Map, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Schedule {
    /// Raw-shaped form, reading exact times in `habits.tz`
    pub fn to_raw(&self, habits: &HabitContext) -> Map<String, Value> {
        let mut data = Map::new();

        if let Some(as_needed) = self.as_needed {
            data.insert("as_needed".into(), Value::Bool(as_needed));
        }
        if let Some(regularly) = self.regularly {
            data.insert("regularly".into(), Value::Bool(regularly));
        }
        if let Some(until) = &self.until {
            data.insert("until".into(), until_to_raw(until));
        }
        if let Some(frequency) = &self.frequency {
            data.insert("frequency".into(), frequency_to_raw(frequency));
        }
        if let Some(times) = &self.times {
            let times = times
                .iter()
                .enumerate()
                .map(|(index, spec)| self.time_spec_to_raw(index, spec, habits))
                .collect();
            data.insert("times".into(), Value::Array(times));
        }
        if let Some(take_with_food) = self.take_with_food {
            data.insert("take_with_food".into(), Value::Bool(take_with_food));
        }
        if let Some(refs) = &self.take_with {
            data.insert("take_with_medications".into(), json!(refs));
        }
        if let Some(refs) = &self.take_without {
            data.insert("take_without_medications".into(), json!(refs));
        }

        data
    }

    fn time_spec_to_raw(&self, index: usize, spec: &TimeSpec, habits: &HabitContext) -> Value {
        match spec {
            TimeSpec::Event { event, when } => json!({
                "type": "event",
                "event": event,
                "when": when.as_str(),
            }),
            TimeSpec::Exact { utc } => {
                // Same zone: undo exactly the offset used at write time, which
                // also restores times written inside a DST gap
                let written = self
                    .exact_offsets
                    .get(index)
                    .copied()
                    .flatten()
                    .filter(|_| habits.tz == self.written_in);
                let local = match written {
                    Some(offset) => clock::utc_time_at_offset(*utc, offset),
                    None => clock::utc_time_to_local(habits.tz, self.written_on, *utc),
                };
                json!({
                    "type": "exact",
                    "time": local.to_string(),
                })
            }
        }
    }
}

/// Free-function form of [`Schedule::to_raw`]
pub fn serialize(schedule: &Schedule, habits: &HabitContext) -> Map<String, Value> {
    schedule.to_raw(habits)
}

fn until_to_raw(until: &Until) -> Value {
    match until {
        Until::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
        Until::Forever => json!({"type": "forever"}),
        Until::StopDate(date) => json!({
            "type": "date",
            "stop": date.format(DATE_FORMAT).to_string(),
        }),
        Until::StopAfter(n) => json!({"type": "number", "stop": n}),
    }
}

fn frequency_to_raw(frequency: &Frequency) -> Value {
    let mut data = Map::new();
    if let Some(start) = frequency.start {
        data.insert(
            "start".into(),
            Value::String(start.format(DATE_FORMAT).to_string()),
        );
    }
    if let Some(n) = frequency.n {
        data.insert("n".into(), json!(n));
    }
    if let Some(unit) = frequency.unit {
        data.insert("unit".into(), Value::String(unit.as_str().into()));
    }
    if let Some(exclude) = &frequency.exclude {
        data.insert(
            "exclude".into(),
            json!({"exclude": exclude.exclude, "repeat": exclude.repeat}),
        );
    }
    Value::Object(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Validator;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn habits(tz: &str) -> HabitContext {
        HabitContext::new(tz.parse().unwrap())
            .with_event("breakfast", "07:30".parse().unwrap())
            .with_event("dinner", "18:00".parse().unwrap())
    }

    fn validate_on(raw: &Value, habits: &HabitContext, today: &str) -> Schedule {
        let today = NaiveDate::parse_from_str(today, "%Y-%m-%d").unwrap();
        Validator::with_today(habits, today).validate(raw).unwrap()
    }

    fn keys(map: &Map<String, Value>) -> BTreeSet<String> {
        map.keys().cloned().collect()
    }

    fn full_raw() -> Value {
        json!({
            "as_needed": false,
            "regularly": true,
            "until": {"type": "date", "stop": "2024-12-31"},
            "frequency": {"start": "2024-07-01", "n": 1, "unit": "week",
                          "exclude": {"exclude": [3], "repeat": 4}},
            "times": [
                {"type": "event", "event": "breakfast", "when": "before"},
                {"type": "exact", "time": "21:30"}
            ],
            "take_with_food": true,
            "take_with_medications": [4, "vitamin-d"],
            "take_without_medications": []
        })
    }

    #[test]
    fn test_full_round_trip_is_exact() {
        let habits = habits("America/New_York");
        let raw = full_raw();
        let schedule = validate_on(&raw, &habits, "2024-07-01");
        assert_eq!(Value::Object(schedule.to_raw(&habits)), raw);
    }

    #[test]
    fn test_key_set_preserved() {
        let habits = habits("Europe/Berlin");
        let cases = [
            json!({}),
            json!({"as_needed": true}),
            json!({"as_needed": true, "take_with_food": false}),
            json!({"regularly": true}),
            json!({"regularly": true, "until": "2024-09-01"}),
            json!({"regularly": true, "frequency": {"n": 3}}),
            json!({"regularly": true, "times": []}),
            json!({"regularly": true, "take_without_medications": ["x"]}),
        ];
        for raw in cases {
            let schedule = validate_on(&raw, &habits, "2024-07-01");
            let out = schedule.to_raw(&habits);
            let expected = raw.as_object().map(keys).unwrap_or_default();
            assert_eq!(keys(&out), expected, "{raw}");
        }
    }

    #[test]
    fn test_defaults_are_not_emitted() {
        let habits = habits("Etc/UTC");
        let schedule = validate_on(&json!({"regularly": true, "frequency": {}}), &habits, "2024-07-01");
        let out = schedule.to_raw(&habits);
        // cycle start defaulted to today but start was never supplied
        assert_eq!(out.get("frequency"), Some(&json!({})));
    }

    #[test]
    fn test_as_needed_omits_recurrence_fields() {
        let habits = habits("Etc/UTC");
        let raw = json!({
            "as_needed": true,
            "until": "2024-12-31",
            "frequency": {"start": "2024-07-01"},
            "times": [{"type": "exact", "time": "08:00"}]
        });
        let out = validate_on(&raw, &habits, "2024-07-01").to_raw(&habits);
        assert_eq!(Value::Object(out), json!({"as_needed": true}));
    }

    #[test]
    fn test_round_trip_is_idempotent_across_days() {
        let habits = habits("America/New_York");
        let raw = full_raw();

        let first = validate_on(&raw, &habits, "2024-07-01").to_raw(&habits);
        // Re-validated in winter: different offset, same local shape
        let second = validate_on(&Value::Object(first.clone()), &habits, "2024-12-01")
            .to_raw(&habits);
        assert_eq!(first, second);
    }

    #[test]
    fn test_exact_time_read_in_other_zone() {
        let written = habits("America/New_York");
        let schedule = validate_on(
            &json!({"regularly": true, "times": [{"type": "exact", "time": "08:00"}]}),
            &written,
            "2024-07-01",
        );
        let read = HabitContext::new("America/Los_Angeles".parse().unwrap());
        let out = schedule.to_raw(&read);
        assert_eq!(out["times"], json!([{"type": "exact", "time": "05:00"}]));
    }

    #[test]
    fn test_exact_round_trip_many_zones() {
        for tz in ["Asia/Kolkata", "Australia/Adelaide", "America/St_Johns", "Etc/UTC"] {
            let habits = habits(tz);
            for time in ["00:00", "06:45", "12:30", "23:15"] {
                let raw = json!({"regularly": true, "times": [{"type": "exact", "time": time}]});
                let out = validate_on(&raw, &habits, "2024-03-15").to_raw(&habits);
                assert_eq!(out["times"][0]["time"], json!(time), "{time} in {tz}");
            }
        }
    }

    #[test]
    fn test_exact_time_written_in_dst_gap() {
        let habits = habits("America/New_York");
        // 02:30 does not exist in New York on 2024-03-10
        let raw = json!({"regularly": true, "times": [
            {"type": "exact", "time": "02:30"},
            {"type": "exact", "time": "03:30"}
        ]});
        let schedule = validate_on(&raw, &habits, "2024-03-10");
        let out = schedule.to_raw(&habits);
        assert_eq!(Value::Object(out.clone()), raw);

        let again = validate_on(&Value::Object(out), &habits, "2024-03-10").to_raw(&habits);
        assert_eq!(Value::Object(again), raw);
    }

    #[test]
    fn test_exact_time_written_in_dst_overlap() {
        let habits = habits("America/New_York");
        let raw = json!({"regularly": true, "times": [{"type": "exact", "time": "01:30"}]});
        let out = validate_on(&raw, &habits, "2024-11-03").to_raw(&habits);
        assert_eq!(Value::Object(out), raw);
    }

    #[test]
    fn test_gap_time_read_elsewhere_uses_that_zone() {
        let written = habits("America/New_York");
        let schedule = validate_on(
            &json!({"regularly": true, "times": [{"type": "exact", "time": "02:30"}]}),
            &written,
            "2024-03-10",
        );
        // Stored as 07:30 UTC; London is still on GMT that day
        let read = HabitContext::new("Europe/London".parse().unwrap());
        let out = schedule.to_raw(&read);
        assert_eq!(out["times"], json!([{"type": "exact", "time": "07:30"}]));
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let habits = habits("Etc/UTC");
        let out = validate_on(&json!({"regularly": true, "colour": "blue"}), &habits, "2024-07-01")
            .to_raw(&habits);
        assert!(!out.contains_key("colour"));
    }

    #[test]
    fn test_serialize_free_function() {
        let habits = habits("Etc/UTC");
        let schedule = validate_on(&json!({"regularly": true, "until": {"type": "number", "stop": 3}}), &habits, "2024-07-01");
        assert_eq!(
            serialize(&schedule, &habits).get("until"),
            Some(&json!({"type": "number", "stop": 3}))
        );
    }
}
