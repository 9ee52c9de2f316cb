#![forbid(unsafe_code)]

//! Core schedule model and occurrence engine for medication regimens.
//!
//! This crate provides:
//! - Domain types (schedules, time specs, habit context, occurrences, doses)
//! - Validation of raw declarative schedules
//! - Time resolution and occurrence generation
//! - Round-trip serialization
//! - The matching gateway to the external dose matcher
//! - Local habit file, dose log and CSV export for the CLI

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod validation;
pub mod resolver;
pub mod generation;
pub mod serialize;
pub mod matching;
pub mod habits;
pub mod doses;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{TimeOfDay, DEFAULT_TZ};
pub use config::Config;
pub use validation::{validate, Validator};
pub use resolver::{resolve, try_resolve, ResolvedSchedule};
pub use generation::{generate, Occurrences};
pub use serialize::serialize;
pub use matching::{HttpMatcher, MatchRequest, Matcher, MatchingGateway};
pub use doses::{read_doses, DoseSink, JsonlDoseLog};
