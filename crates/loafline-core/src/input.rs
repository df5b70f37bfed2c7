//! The complete input record for one planning run, and the configuration
//! surface with its defaults.

use crate::calendar::{LaborCalendar, PlanningHorizon};
use crate::cost::CostStructure;
use crate::forecast::Forecast;
use crate::network::{Network, Node, Route, TruckSchedule};
use crate::state::ShelfLifeParams;
use serde::{Deserialize, Serialize};

/// How the horizon is solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// One solve over the whole horizon.
    Monolithic,
    /// Overlapping fixed-length windows stitched sequentially.
    Windowed,
}

/// Warm-start rotation mode for the production indicator hints.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmStartMode {
    /// Spread products evenly across production days.
    Balanced,
    /// Higher-demand products get proportionally more production days.
    #[default]
    DemandWeighted,
    /// Exactly two products per production day, rotating.
    Fixed2,
    /// Exactly three products per production day, rotating.
    Fixed3,
    /// Pick 1-3 products per day based on demand concentration.
    Adaptive,
    /// Emit no hints.
    None,
}

/// Enumerated configuration options with their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub solve_mode: SolveMode,
    /// Window length in days for windowed solves.
    pub window_days: u32,
    /// Days of each window committed before the next window begins.
    pub commit_days: u32,
    /// Emit shortage variables so unmet demand is penalized, not infeasible.
    pub allow_shortages: bool,
    /// Emit the sliding-window shelf-life constraint families.
    pub enforce_shelf_life: bool,
    pub warm_start: WarmStartMode,
    /// Penalty weight on day-over-day total production swings. Zero disables
    /// the auxiliary smoothing variables entirely.
    pub smoothing_penalty: f64,
    /// When set, overrides `ShelfLifeParams::min_remaining_at_delivery`.
    pub min_delivery_remaining_days: Option<u32>,
    /// Solver backend selector. The bundled open-source backend is used for
    /// anything it does not recognize.
    pub solver: String,
    pub time_limit_seconds: f64,
    /// Relative MIP gap target, where a backend supports one.
    pub mip_gap: f64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            solve_mode: SolveMode::Monolithic,
            window_days: 28,
            commit_days: 14,
            allow_shortages: true,
            enforce_shelf_life: true,
            warm_start: WarmStartMode::DemandWeighted,
            smoothing_penalty: 0.0,
            min_delivery_remaining_days: None,
            solver: "clarabel".to_string(),
            time_limit_seconds: 300.0,
            mip_gap: 0.01,
        }
    }
}

/// The typed input record for one solve. Immutable for its duration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanInput {
    pub nodes: Vec<Node>,
    pub routes: Vec<Route>,
    pub trucks: Vec<TruckSchedule>,
    pub labor_calendar: LaborCalendar,
    pub forecast: Forecast,
    pub costs: CostStructure,
    pub shelf_life: ShelfLifeParams,
    /// Caller-forced horizon. When tighter than the derived horizon the
    /// preprocessor warns and honors it; shortages carry the slack.
    #[serde(default)]
    pub horizon_override: Option<PlanningHorizon>,
    #[serde(default)]
    pub config: PlanConfig,
}

impl PlanInput {
    /// Shelf-life parameters with the config override applied.
    pub fn effective_shelf_life(&self) -> ShelfLifeParams {
        let mut params = self.shelf_life;
        if let Some(days) = self.config.min_delivery_remaining_days {
            params.min_remaining_at_delivery = days;
        }
        params
    }

    /// The network view over this input's nodes and routes.
    pub fn network(&self) -> Network {
        Network::new(self.nodes.clone(), self.routes.clone())
    }
}
