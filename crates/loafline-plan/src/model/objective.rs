//! Objective composition.
//!
//! One minimization objective:
//!
//! ```text
//! minimize   labor          reg*fixed + ot*overtime + nf*nonfixed
//!                           + min_charge * activation
//!          + production     unit_cost * total produced
//!          + changeover     optional, per production start
//!          + transport      leg unit cost * in-transit flow
//!          + shortage       penalty * unmet demand
//!          + waste          penalty * end-of-horizon non-frozen leftovers
//!          + smoothing      optional, |day-over-day production swing|
//! ```

use crate::index::VarIndex;
use crate::model::variables::VarPool;
use crate::preprocess::NetworkPlan;
use good_lp::Expression;
use loafline_core::{PlanInput, StorageState};

/// Build the full minimization objective.
pub fn compose(
    input: &PlanInput,
    plan: &NetworkPlan,
    index: &VarIndex,
    pool: &VarPool,
) -> Expression {
    let costs = &input.costs;
    let mut objective = Expression::from(0.0);

    // Labor.
    for (labor_idx, _key) in index.labor_keys.iter().enumerate() {
        let vars = &pool.labor[labor_idx];
        if let Some(fixed) = vars.fixed {
            objective += costs.regular_rate_per_hour * fixed;
        }
        if let Some(overtime) = vars.overtime {
            objective += costs.overtime_rate_per_hour * overtime;
        }
        if let Some(nonfixed) = vars.nonfixed {
            objective += costs.nonfixed_rate_per_hour * nonfixed;
        }
        if let Some(active) = vars.active {
            objective += costs.nonfixed_minimum_charge * active;
        }
    }

    // Production, plus the optional changeover charge on starts.
    for (key_idx, _) in index.prod_keys.iter().enumerate() {
        objective += costs.production_cost_per_unit * pool.prod[key_idx];
        if let Some(changeover) = costs.changeover_cost {
            objective += changeover * pool.produced[key_idx];
        }
    }

    // Transport: per-leg unit cost on every in-transit flow.
    for (key_idx, key) in index.transit_keys.iter().enumerate() {
        let leg = &plan.legs[key.leg];
        objective += leg.cost_per_unit * pool.transit[key_idx];
    }

    // Shortage.
    if index.has_shortage {
        for &short in &pool.short {
            objective += costs.shortage_penalty_per_unit * short;
        }
    }

    // Waste: end-of-horizon leftovers in states that cannot carry forward.
    let last = index.dates.len() - 1;
    for (key_idx, key) in index.inv_keys.iter().enumerate() {
        if key.date == last && key.state != StorageState::Frozen {
            objective += costs.waste_penalty_per_unit * pool.inv[key_idx];
        }
    }

    // Smoothing.
    if input.config.smoothing_penalty > 0.0 {
        for i in 0..index.smoothing_dates.len() {
            objective += input.config.smoothing_penalty * pool.smooth_pos[i];
            objective += input.config.smoothing_penalty * pool.smooth_neg[i];
        }
    }

    objective
}
