//! Error types.
//!
//! Only caller misconfiguration is reported as an error. Too little data
//! yields `None` or an empty result, and numerical degeneracies are absorbed
//! by documented fallbacks that are flagged in the output.

use thiserror::Error;

/// Result type for analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors surfaced to the caller.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A configuration value is outside its valid range.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// No built-in polar exists for the requested boat type.
    #[error("Unknown boat type: {0}")]
    UnknownBoatType(String),

    /// A polar table supplied by the caller is not usable.
    #[error("Malformed polar table: {0}")]
    MalformedPolar(String),

    /// Two wind fields cannot be combined.
    #[error("Incompatible wind fields: {0}")]
    IncompatibleFields(String),

    /// The track violates an input contract (e.g. timestamps not increasing).
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
