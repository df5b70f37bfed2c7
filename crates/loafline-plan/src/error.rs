//! Unified error type for the planning engine.
//!
//! Every failure mode carries the offending field or entity and, where a
//! caller can do something about it, a remediation hint in the message.
//! Preprocessor and extractor errors abort the solve; solver-interior
//! failures are caught and re-wrapped. There are no silent fallbacks: an
//! empty result is never success.

use crate::solution::OptimizationSolution;
use chrono::NaiveDate;
use loafline_core::CoreError;
use thiserror::Error;

/// Errors raised anywhere between input preprocessing and result validation.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Broken input configuration: a truck over a missing leg, an unknown
    /// node, a shelf life shorter than a required leg. Fatal.
    #[error("configuration error in {field}: {message} (hint: {hint})")]
    Config {
        field: String,
        message: String,
        hint: String,
    },

    /// The caller forced a horizon start later than the derived requirement
    /// while shortages are disabled.
    #[error(
        "infeasible horizon: forced start {forced} is after required start {required} \
         (hint: move the start to {required} or enable shortages)"
    )]
    InfeasibleHorizon {
        required: NaiveDate,
        forced: NaiveDate,
    },

    /// Underlying solver failure (crash, license, numerical breakdown).
    /// Retryable at the caller's discretion.
    #[error("solver error: {0}")]
    Solver(String),

    /// The model is infeasible. When shortages were disabled, `diagnostic`
    /// holds the one-shot shortage-enabled re-solve showing where demand
    /// cannot be met.
    #[error("model infeasible{}", infeasible_suffix(.diagnostic))]
    Infeasible {
        diagnostic: Option<Box<OptimizationSolution>>,
    },

    /// The solver reported an unbounded objective. With non-negative costs
    /// this indicates a modelling bug, not an input problem.
    #[error("model unbounded: objective has no lower bound")]
    Unbounded,

    /// Result-record validation failure. Always fatal; always names the
    /// field and gives a fix hint.
    #[error("validation failed on {field}: {message} (hint: {hint})")]
    Validation {
        field: String,
        message: String,
        hint: String,
    },

    /// Cooperative cancellation before or between solves.
    #[error("solve cancelled")]
    Cancelled,

    /// Input-record construction failure from the core model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Wrapped external error.
    #[error("{0}")]
    Other(String),
}

impl PlanError {
    pub fn config(
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        PlanError::Config {
            field: field.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn validation(
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        PlanError::Validation {
            field: field.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }
}

fn infeasible_suffix(diagnostic: &Option<Box<OptimizationSolution>>) -> &'static str {
    if diagnostic.is_some() {
        " (diagnostic shortage solve attached)"
    } else {
        ""
    }
}

impl From<anyhow::Error> for PlanError {
    fn from(err: anyhow::Error) -> Self {
        PlanError::Other(err.to_string())
    }
}

/// Convenience alias for results using [`PlanError`].
pub type PlanResult<T> = Result<T, PlanError>;
