//! Error types for the regimen_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for regimen_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed schedule input (bad `times` entry, wrong field type, missing mode flag)
    #[error("invalid schedule at `{path}`: {reason}")]
    InvalidSchedule { path: String, reason: String },

    /// Malformed recurrence descriptor
    #[error("invalid frequency at `{path}`: {reason}")]
    InvalidFrequency { path: String, reason: String },

    /// The external matcher could not be reached, timed out, or answered garbage
    #[error("matcher unavailable: {0}")]
    MatcherUnavailable(String),

    /// The external matcher answered with a non-success status
    #[error("matcher rejected the request with status {status}")]
    MatcherRejected {
        status: u16,
        body: serde_json::Value,
    },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid_schedule(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidSchedule {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_frequency(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidFrequency {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code reported at the call boundary
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidSchedule { .. } => "invalid_schedule",
            Error::InvalidFrequency { .. } => "invalid_frequency",
            Error::MatcherUnavailable(_) => "matcher_unavailable",
            Error::MatcherRejected { .. } => "matcher_rejected",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Csv(_) => "csv",
            Error::Toml(_) => "toml",
            Error::Config(_) => "config",
        }
    }

    /// Field path of a validation failure, if this is one
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::InvalidSchedule { path, .. } | Error::InvalidFrequency { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }

    /// True for errors caused by the caller's input rather than the environment
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidSchedule { .. } | Error::InvalidFrequency { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            Error::invalid_schedule("times[0]", "bad").code(),
            "invalid_schedule"
        );
        assert_eq!(
            Error::invalid_frequency("frequency.start", "bad").code(),
            "invalid_frequency"
        );
        assert_eq!(
            Error::MatcherUnavailable("down".into()).code(),
            "matcher_unavailable"
        );
    }

    #[test]
    fn test_validation_errors_carry_path() {
        let err = Error::invalid_schedule("times[2].when", "expected before or after");
        assert_eq!(err.path(), Some("times[2].when"));
        assert!(err.is_validation());
        assert!(err.to_string().contains("times[2].when"));

        let err = Error::MatcherUnavailable("timed out".into());
        assert_eq!(err.path(), None);
        assert!(!err.is_validation());
    }
}
