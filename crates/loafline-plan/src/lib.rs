//! # loafline-plan: Production & Distribution Planning Engine
//!
//! Builds and interprets a mathematical program that decides, over a rolling
//! daily horizon, how much of each product to produce, how to staff labor,
//! how to route finished goods over the network (direct and through hub
//! transshipment, ambient or frozen, with freeze-at-buffer and
//! thaw-on-arrival state transitions), how to assign shipments to
//! day-of-week truck departures, and how much demand is satisfied vs short.
//!
//! ## Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Network & calendar preprocessing | [`preprocess`] |
//! | Sparse index construction | [`index`] |
//! | Constraint generation | [`model::constraints`] |
//! | Objective composition | [`model::objective`] |
//! | Warm-start rotation | [`warmstart`] |
//! | Solver driver | [`solver`] |
//! | Extraction & validation | [`extract`] |
//! | Result schema | [`solution`] |
//! | Rolling/windowed controller | [`rolling`] |
//!
//! ## Formulation
//!
//! Inventory is tracked as **state-indexed aggregate flows** (ambient /
//! frozen / thawed) with sliding-window consumption constraints enforcing
//! shelf life implicitly. An age-cohort formulation gives the same
//! freshness guarantee but its variable count grows cubically with the
//! horizon; the aggregate form keeps the program linear in horizon length
//! and leaves batch-level attribution to a FEFO post-processor outside this
//! crate.
//!
//! A solve is a pure function of its input: no global state, no
//! persistence, deterministic extraction order, byte-reproducible result
//! records for a fixed input.
//!
//! ## Example
//!
//! ```ignore
//! use loafline_plan::solve;
//!
//! let input = build_plan_input()?;
//! let solution = solve(&input)?;
//! println!("{}", solution.summary());
//! println!("fill rate: {:.1}%", solution.fill_rate * 100.0);
//! ```

pub mod error;
pub mod extract;
pub mod index;
pub mod model;
pub mod preprocess;
pub mod rolling;
pub mod solution;
pub mod solver;
pub mod warmstart;

pub use error::{PlanError, PlanResult};
pub use extract::attach_fefo_inventory;
pub use preprocess::{preprocess, NetworkPlan, ScheduledArrival};
pub use rolling::solve_windowed;
pub use solution::{
    BatchKind, CostBreakdown, DemandRecord, LaborHours, ModelType, OptimizationSolution,
    ProductionBatch, Shipment, SolutionKey, SolveStatus,
};
pub use solver::CancelToken;
pub use warmstart::WarmStartHints;

use crate::index::build_index;
use loafline_core::{PlanInput, SolveMode};
use tracing::warn;

/// Solve a planning input with the mode its configuration selects.
pub fn solve(input: &PlanInput) -> PlanResult<OptimizationSolution> {
    let token = CancelToken::new();
    match input.config.solve_mode {
        SolveMode::Monolithic => solve_plan_cancellable(input, &token),
        SolveMode::Windowed => rolling::solve_windowed(input, &token),
    }
}

/// One monolithic solve over the whole horizon.
pub fn solve_plan(input: &PlanInput) -> PlanResult<OptimizationSolution> {
    solve_plan_cancellable(input, &CancelToken::new())
}

/// One monolithic solve with cooperative cancellation.
pub fn solve_plan_cancellable(
    input: &PlanInput,
    token: &CancelToken,
) -> PlanResult<OptimizationSolution> {
    solve_once(input, &[], token, ModelType::SlidingWindow)
}

/// Shared solve path for monolithic runs and rolling windows.
pub(crate) fn solve_once(
    input: &PlanInput,
    exogenous: &[ScheduledArrival],
    token: &CancelToken,
    model_type: ModelType,
) -> PlanResult<OptimizationSolution> {
    let plan = preprocess(input, exogenous)?;
    for issue in &plan.diagnostics.issues {
        warn!(%issue, "preprocessing diagnostic");
    }

    let index = build_index(input, &plan);

    if token.is_cancelled() {
        return Err(PlanError::Cancelled);
    }
    let hints = warmstart::generate(input, &index);

    let outcome = solver::solve_model(input, &plan, &index, hints.as_ref())?;
    match outcome.status {
        status if status.has_plan() => {
            extract::extract_solution(input, &plan, &index, &outcome, model_type)
        }
        SolveStatus::Infeasible => {
            if !input.config.allow_shortages {
                // One diagnostic re-solve with shortages enabled shows the
                // caller where demand cannot be met.
                let mut diagnostic_input = input.clone();
                diagnostic_input.config.allow_shortages = true;
                let diagnostic = solve_once(&diagnostic_input, exogenous, token, model_type)
                    .ok()
                    .map(Box::new);
                Err(PlanError::Infeasible { diagnostic })
            } else {
                Err(PlanError::Infeasible { diagnostic: None })
            }
        }
        SolveStatus::Unbounded => Err(PlanError::Unbounded),
        other => Err(PlanError::Solver(format!(
            "unexpected solver status {other:?}"
        ))),
    }
}
