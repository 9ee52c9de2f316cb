//! Matching gateway: hands resolved schedules and recorded doses to the
//! external matcher and returns its verdicts untouched.

use crate::clock::TimeOfDay;
use crate::config::MatcherConfig;
use crate::generation::generate;
use crate::resolver::ResolvedSchedule;
use crate::{DateRange, Dose, Error, HabitContext, MedicationRef, Mode, Result, TimeSpec};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// One expected dose as the matcher sees it
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedEntry {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub instant: DateTime<Utc>,
    pub index: usize,
    #[serde(flatten)]
    pub spec: TimeSpec,
}

/// A dose as the matcher sees it
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DoseEntry {
    pub medication_id: MedicationRef,
    pub taken_at: DateTime<Utc>,
}

/// Request body sent to the matcher
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchRequest {
    pub as_needed: bool,
    pub regularly: bool,
    pub resolved_times: Vec<ResolvedEntry>,
    pub habits: HabitContext,
    pub doses: Vec<DoseEntry>,
}

impl MatchRequest {
    /// Assemble the request for `doses`.
    ///
    /// Expected doses cover the local dates spanned by the recorded ones, or
    /// just the cycle start when there are none.
    pub fn build(resolved: &ResolvedSchedule<'_>, doses: &[Dose]) -> Self {
        let schedule = resolved.schedule();
        let tz = resolved.tz();

        let local_dates = doses.iter().map(|d| d.taken_at.with_timezone(&tz).date_naive());
        let span = match (local_dates.clone().min(), local_dates.max()) {
            (Some(first), Some(last)) => DateRange::new(first, last),
            _ => DateRange::single(schedule.cycle_start()),
        };

        let resolved_times = generate(resolved, span)
            .map(|o| ResolvedEntry {
                date: o.date,
                time: o.local_time,
                instant: o.instant,
                index: o.index,
                spec: o.source,
            })
            .collect();

        Self {
            as_needed: schedule.mode() == Mode::AsNeeded,
            regularly: schedule.mode() == Mode::Regular,
            resolved_times,
            habits: resolved.habits().clone(),
            doses: doses
                .iter()
                .map(|d| DoseEntry {
                    medication_id: d.medication_id.clone(),
                    taken_at: d.taken_at,
                })
                .collect(),
        }
    }
}

/// The external reconciliation service
pub trait Matcher {
    /// Deliver `request` and return the verdicts verbatim
    fn submit(&self, request: &MatchRequest) -> Result<Value>;
}

/// Matcher reached over HTTP: `POST <endpoint>` with a JSON body
#[derive(Clone, Debug)]
pub struct HttpMatcher {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpMatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build matcher client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &MatcherConfig) -> Result<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

fn unavailable(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::MatcherUnavailable(format!("timed out: {}", err))
    } else {
        Error::MatcherUnavailable(err.to_string())
    }
}

impl Matcher for HttpMatcher {
    fn submit(&self, request: &MatchRequest) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(unavailable)?;

        let status = response.status();
        let text = response.text().map_err(unavailable)?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            tracing::warn!("Matcher answered {} for {}", status, self.endpoint);
            return Err(Error::MatcherRejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::MatcherUnavailable(format!("malformed matcher response: {}", e)))
    }
}

/// Packages schedules and doses for a [`Matcher`]
#[derive(Clone, Debug)]
pub struct MatchingGateway<M> {
    matcher: M,
}

impl<M: Matcher> MatchingGateway<M> {
    pub fn new(matcher: M) -> Self {
        Self { matcher }
    }

    /// Forward `doses` against `resolved`; failures are not retried
    pub fn submit(&self, resolved: &ResolvedSchedule<'_>, doses: &[Dose]) -> Result<Value> {
        let request = MatchRequest::build(resolved, doses);
        tracing::info!(
            "Submitting {} dose(s) against {} expected occurrence(s)",
            request.doses.len(),
            request.resolved_times.len()
        );
        self.matcher.submit(&request)
    }
}
