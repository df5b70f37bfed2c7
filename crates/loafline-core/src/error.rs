//! Error types for input-record construction and validation.
//!
//! The planning engine's own error enum (solver failures, infeasibility,
//! extraction validation) lives in `loafline-plan`; this module covers the
//! failures that can occur while assembling the typed input model itself.

use thiserror::Error;

/// Errors raised while building or validating input records.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A record references an entity that does not exist.
    #[error("unknown {kind} '{id}' referenced by {referrer}")]
    UnknownReference {
        kind: &'static str,
        id: String,
        referrer: String,
    },

    /// A record field holds a value outside its valid domain.
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    /// A date range is empty or inverted.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}

/// Convenience alias for results using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
