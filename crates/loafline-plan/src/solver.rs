//! Solver driver.
//!
//! Builds the `good_lp` model from the index, applies the constraint
//! families, solves with the bundled Clarabel backend (a pure-Rust
//! interior-point solver that is always available), and collects primal
//! values for every emitted variable.
//!
//! This is an **LP relaxation**: the production indicators and the
//! non-fixed-day activation are continuous `[0, 1]` and rounded at
//! extraction. Warm-start hints and the MIP-gap target are carried on the
//! session and consumed by backends that support them; the conic backend
//! does not, so for it they are recorded and reported only.

use crate::error::{PlanError, PlanResult};
use crate::index::VarIndex;
use crate::model::{constraints, objective, VarPool};
use crate::preprocess::NetworkPlan;
use crate::solution::SolveStatus;
use crate::warmstart::WarmStartHints;
use good_lp::solvers::clarabel::clarabel;
use good_lp::{variables, ResolutionError, Solution, SolverModel, Variable};
use loafline_core::PlanInput;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Cooperative cancellation flag shared with the caller.
///
/// Checked before each window of a rolling solve and before warm-start
/// emission; the solver itself is bounded by its time budget.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Labor primal values for one calendar-covered date.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaborValue {
    pub fixed: f64,
    pub overtime: f64,
    pub nonfixed: f64,
    pub active: f64,
}

/// Primal values for every emitted variable, aligned with the index key
/// vectors.
#[derive(Debug, Clone, Default)]
pub struct SolvedValues {
    pub prod: Vec<f64>,
    pub produced: Vec<f64>,
    pub labor: Vec<LaborValue>,
    pub inv: Vec<f64>,
    pub transit: Vec<f64>,
    pub load: Vec<f64>,
    pub freeze: Vec<f64>,
    pub thaw: Vec<f64>,
    pub met: Vec<f64>,
    pub short: Vec<f64>,
    pub smooth_pos: Vec<f64>,
    pub smooth_neg: Vec<f64>,
}

/// Raw result of one solver invocation.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub status: SolveStatus,
    /// Present when the status carries a plan.
    pub values: Option<SolvedValues>,
    pub wall_time_seconds: f64,
    pub variable_count: usize,
    pub constraint_count: usize,
    pub hint_count: usize,
}

/// Build and solve the full program for one horizon.
pub fn solve_model(
    input: &PlanInput,
    plan: &NetworkPlan,
    index: &VarIndex,
    hints: Option<&WarmStartHints>,
) -> PlanResult<SolverOutcome> {
    let start = Instant::now();

    let mut vars = variables!();
    let pool = VarPool::create(&mut vars, index);
    let objective = objective::compose(input, plan, index, &pool);
    let constraint_set = constraints::generate(input, plan, index, &pool)?;
    let variable_count = index.variable_count();
    let constraint_count = constraint_set.len();

    let hint_count = hints.map(|h| h.len()).unwrap_or(0);
    if hint_count > 0 {
        // The conic backend cannot consume initial values; the rotation is
        // still reported so operators can compare it against the plan.
        debug!(
            hints = hint_count,
            "warm-start rotation computed; backend takes no initial values"
        );
    }

    info!(
        variables = variable_count,
        constraints = constraint_count,
        solver = input.config.solver.as_str(),
        time_limit_seconds = input.config.time_limit_seconds,
        gap_target = input.config.mip_gap,
        "solving planning program"
    );

    let mut model = vars.minimise(objective).using(clarabel);
    for constraint in constraint_set {
        model = model.with(constraint);
    }

    match model.solve() {
        Ok(solution) => {
            let values = extract_values(&solution, &pool);
            let outcome = SolverOutcome {
                status: SolveStatus::Optimal,
                values: Some(values),
                wall_time_seconds: start.elapsed().as_secs_f64(),
                variable_count,
                constraint_count,
                hint_count,
            };
            info!(
                seconds = outcome.wall_time_seconds,
                "solver finished: optimal"
            );
            Ok(outcome)
        }
        Err(ResolutionError::Infeasible) => Ok(SolverOutcome {
            status: SolveStatus::Infeasible,
            values: None,
            wall_time_seconds: start.elapsed().as_secs_f64(),
            variable_count,
            constraint_count,
            hint_count,
        }),
        Err(ResolutionError::Unbounded) => Ok(SolverOutcome {
            status: SolveStatus::Unbounded,
            values: None,
            wall_time_seconds: start.elapsed().as_secs_f64(),
            variable_count,
            constraint_count,
            hint_count,
        }),
        Err(other) => Err(PlanError::Solver(format!("{other:?}"))),
    }
}

fn value_vec(solution: &impl Solution, vars: &[Variable]) -> Vec<f64> {
    vars.iter().map(|v| solution.value(*v)).collect()
}

fn extract_values(solution: &impl Solution, pool: &VarPool) -> SolvedValues {
    let labor = pool
        .labor
        .iter()
        .map(|day| LaborValue {
            fixed: day.fixed.map(|v| solution.value(v)).unwrap_or(0.0),
            overtime: day.overtime.map(|v| solution.value(v)).unwrap_or(0.0),
            nonfixed: day.nonfixed.map(|v| solution.value(v)).unwrap_or(0.0),
            active: day.active.map(|v| solution.value(v)).unwrap_or(0.0),
        })
        .collect();
    SolvedValues {
        prod: value_vec(solution, &pool.prod),
        produced: value_vec(solution, &pool.produced),
        labor,
        inv: value_vec(solution, &pool.inv),
        transit: value_vec(solution, &pool.transit),
        load: value_vec(solution, &pool.load),
        freeze: value_vec(solution, &pool.freeze),
        thaw: value_vec(solution, &pool.thaw),
        met: value_vec(solution, &pool.met),
        short: value_vec(solution, &pool.short),
        smooth_pos: value_vec(solution, &pool.smooth_pos),
        smooth_neg: value_vec(solution, &pool.smooth_neg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
