//! Cost rates and penalties for the planning objective.

use serde::{Deserialize, Serialize};

/// All cost rates consumed by the objective composer.
///
/// Per-leg transport cost lives on each [`crate::Route`]; everything else is
/// flat-rate here. Shortage and waste penalties should dominate the real
/// cost rates so the solver only leaves demand unmet or stock stranded when
/// it is structurally unavoidable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostStructure {
    /// Regular labor rate, per hour, on fixed days.
    pub regular_rate_per_hour: f64,
    /// Overtime labor rate, per hour, on fixed days.
    pub overtime_rate_per_hour: f64,
    /// Labor rate, per hour, on non-fixed days.
    pub nonfixed_rate_per_hour: f64,
    /// Fixed minimum charge incurred whenever non-fixed labor is used.
    pub nonfixed_minimum_charge: f64,
    /// Variable production cost per unit.
    pub production_cost_per_unit: f64,
    /// Penalty per unit of unmet demand.
    pub shortage_penalty_per_unit: f64,
    /// Penalty per unit of end-of-horizon leftover in non-frozen states.
    pub waste_penalty_per_unit: f64,
    /// Optional cost per product-day production start.
    #[serde(default)]
    pub changeover_cost: Option<f64>,
}

impl Default for CostStructure {
    fn default() -> Self {
        Self {
            regular_rate_per_hour: 25.0,
            overtime_rate_per_hour: 37.5,
            nonfixed_rate_per_hour: 40.0,
            nonfixed_minimum_charge: 160.0,
            production_cost_per_unit: 0.8,
            shortage_penalty_per_unit: 10_000.0,
            waste_penalty_per_unit: 100.0,
            changeover_cost: None,
        }
    }
}
