//! Rolling/windowed controller.
//!
//! For horizons beyond what one monolithic solve handles comfortably, the
//! controller chains fixed-length overlapping windows. Each window is
//! solved monolithically; only its committed prefix (`commit_days`) becomes
//! part of the final plan, and the next window starts right after it,
//! seeded with the boundary-date inventories and with every committed
//! shipment still in flight across the boundary injected as a dated
//! arrival.
//!
//! Stitching invariants: committed slices are contiguous and disjoint, so
//! the assembled per-day production and shipment quantities reconstruct
//! exactly; the seeded opening stock of window *k+1* equals window *k*'s
//! reported boundary inventory by construction, and the assembly pass
//! re-checks that no (date, product) cell was committed twice.

use crate::error::{PlanError, PlanResult};
use crate::preprocess::{preprocess, ScheduledArrival};
use crate::solution::{
    BatchKind, CostBreakdown, DemandRecord, LaborHours, ModelType, OptimizationSolution,
    ProductionBatch, Shipment, SolutionKey, SolveStatus,
};
use crate::solver::CancelToken;
use crate::{solve_once, solve_plan_cancellable};
use chrono::{Days, NaiveDate};
use loafline_core::{Forecast, NodeId, OpeningStock, PlanInput, PlanningHorizon, StorageState};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Solve a long horizon as stitched overlapping windows.
pub fn solve_windowed(input: &PlanInput, token: &CancelToken) -> PlanResult<OptimizationSolution> {
    let config = &input.config;
    if config.window_days == 0 || config.commit_days == 0 {
        return Err(PlanError::config(
            "config.window_days",
            "window and commit lengths must be positive",
            "use the defaults (28 / 14) or any window >= commit >= 1",
        ));
    }
    if config.commit_days > config.window_days {
        return Err(PlanError::config(
            "config.commit_days",
            format!(
                "commit length {} exceeds window length {}",
                config.commit_days, config.window_days
            ),
            "the committed prefix must fit inside the window",
        ));
    }

    // The full horizon comes from a preprocessing pass over the whole input.
    let full_plan = preprocess(input, &[])?;
    let full_horizon = full_plan.horizon;
    if full_horizon.num_days() <= config.window_days as usize {
        let mut solution = solve_plan_cancellable(input, token)?;
        solution.model_type = ModelType::Windowed;
        return Ok(solution);
    }

    let thaws_at = |node: &NodeId| -> bool {
        full_plan
            .node_index
            .get(node)
            .map(|&idx| full_plan.node_thaws[idx])
            .unwrap_or(false)
    };

    let mut assembled = Assembly::default();
    let mut pipeline: Vec<ScheduledArrival> = Vec::new();
    let mut seeded_nodes: Option<Vec<loafline_core::Node>> = None;
    let mut cursor = full_horizon.start;
    let mut windows = 0usize;

    while cursor <= full_horizon.end {
        if token.is_cancelled() {
            if windows > 0 {
                info!(windows, "cancelled mid-run; returning committed prefix");
                return assembled.finish(input, SolveStatus::Cancelled, full_horizon.end);
            }
            return Err(PlanError::Cancelled);
        }

        let window_end = cursor
            .checked_add_days(Days::new(config.window_days as u64 - 1))
            .expect("window end in range")
            .min(full_horizon.end);
        let is_last = window_end == full_horizon.end;
        let commit_end = if is_last {
            window_end
        } else {
            cursor
                .checked_add_days(Days::new(config.commit_days as u64 - 1))
                .expect("commit end in range")
        };

        info!(
            window = windows + 1,
            start = %cursor,
            end = %window_end,
            commit_end = %commit_end,
            "solving window"
        );

        let mut window_input = input.clone();
        window_input.config.solve_mode = loafline_core::SolveMode::Monolithic;
        window_input.horizon_override = Some(PlanningHorizon::new(cursor, window_end)?);
        window_input.forecast = Forecast::new(
            input
                .forecast
                .entries()
                .iter()
                .filter(|e| e.date >= cursor && e.date <= window_end)
                .cloned()
                .collect(),
        );
        if let Some(nodes) = &seeded_nodes {
            window_input.nodes = nodes.clone();
        }
        let window_arrivals: Vec<ScheduledArrival> = pipeline
            .iter()
            .filter(|a| a.date >= cursor && a.date <= window_end)
            .cloned()
            .collect();

        let solution = solve_once(&window_input, &window_arrivals, token, ModelType::SlidingWindow)?;

        assembled.commit(&solution, commit_end, windows == 0);
        assembled.solve_time += solution.solve_time_seconds;

        if is_last {
            assembled.check_stitching()?;
            return assembled.finish(input, SolveStatus::Optimal, full_horizon.end);
        }

        // Seed the next window: boundary inventories become opening stock,
        // committed in-flight shipments become dated arrivals.
        seeded_nodes = Some(seed_nodes(input, &solution, commit_end));
        pipeline.retain(|a| a.date > commit_end);
        for shipment in &solution.shipments {
            if shipment.departure_date <= commit_end && shipment.delivery_date > commit_end {
                let destination = NodeId::new(shipment.destination.clone());
                let (state, freshness_date) =
                    if shipment.state == StorageState::Frozen && thaws_at(&destination) {
                        // Thawing resets the shelf-life window at arrival.
                        (StorageState::Thawed, shipment.delivery_date)
                    } else {
                        (shipment.state, shipment.departure_date)
                    };
                pipeline.push(ScheduledArrival {
                    node: destination,
                    product: shipment.product.clone().into(),
                    date: shipment.delivery_date,
                    state,
                    units: shipment.quantity,
                    freshness_date,
                });
            }
        }

        cursor = commit_end
            .checked_add_days(Days::new(1))
            .expect("cursor in range");
        windows += 1;
    }

    // The loop always returns from its last window.
    Err(PlanError::Solver("windowed controller exited without a final window".into()))
}

/// Replace every node's opening inventory with the boundary-date holdings.
fn seed_nodes(
    input: &PlanInput,
    solution: &OptimizationSolution,
    boundary: NaiveDate,
) -> Vec<loafline_core::Node> {
    let boundary_str = boundary.format("%Y-%m-%d").to_string();
    let mut nodes = input.nodes.clone();
    for node in &mut nodes {
        node.opening_inventory.clear();
    }
    for (key, units) in &solution.inventory_by_node_product_date_state {
        let segments = key.segments();
        if segments.len() != 4 || segments[2] != boundary_str {
            continue;
        }
        let Some(state) = StorageState::parse(segments[3]) else {
            continue;
        };
        if let Some(node) = nodes.iter_mut().find(|n| n.id.as_str() == segments[0]) {
            node.opening_inventory.push(OpeningStock {
                product: segments[1].into(),
                state,
                units: *units,
            });
        }
    }
    nodes
}

/// Accumulates committed slices across windows and assembles the final
/// record.
#[derive(Debug, Default)]
struct Assembly {
    batches: Vec<ProductionBatch>,
    shipments: Vec<Shipment>,
    labor: BTreeMap<SolutionKey, LaborHours>,
    inventory: BTreeMap<SolutionKey, f64>,
    demand: Vec<DemandRecord>,
    solve_time: f64,
}

impl Assembly {
    fn commit(&mut self, solution: &OptimizationSolution, commit_end: NaiveDate, first: bool) {
        let commit_end_str = commit_end.format("%Y-%m-%d").to_string();
        for batch in &solution.production_batches {
            if batch.date > commit_end {
                continue;
            }
            // Continuation windows restate their seeds as INIT batches;
            // only the first window's are real opening stock.
            if batch.kind == BatchKind::InitialInventory && !first {
                continue;
            }
            self.batches.push(batch.clone());
        }
        for shipment in &solution.shipments {
            if shipment.departure_date <= commit_end {
                self.shipments.push(shipment.clone());
            }
        }
        for (key, hours) in &solution.labor_hours_by_date {
            // ISO date keys order lexicographically.
            if key.as_str() <= commit_end_str.as_str() {
                self.labor.insert(key.clone(), *hours);
            }
        }
        for (key, units) in &solution.inventory_by_node_product_date_state {
            let segments = key.segments();
            if segments.len() == 4 && segments[2] <= commit_end_str.as_str() {
                self.inventory.insert(key.clone(), *units);
            }
        }
        for record in &solution.demand_satisfaction {
            if record.date <= commit_end {
                self.demand.push(record.clone());
            }
        }
    }

    /// No (date, product) production cell and no demand cell may be
    /// committed twice across windows.
    fn check_stitching(&self) -> PlanResult<()> {
        let mut seen = HashSet::new();
        for batch in &self.batches {
            if batch.kind == BatchKind::Production
                && !seen.insert((batch.date, batch.product.clone()))
            {
                return Err(PlanError::validation(
                    "production_batches",
                    format!(
                        "({}, {}) was committed by two windows",
                        batch.date, batch.product
                    ),
                    "committed slices must be disjoint; check commit_days handling",
                ));
            }
        }
        let mut seen = HashSet::new();
        for record in &self.demand {
            if !seen.insert((record.date, record.destination.clone(), record.product.clone())) {
                return Err(PlanError::validation(
                    "demand_satisfaction",
                    format!(
                        "({}, {}, {}) was committed by two windows",
                        record.date, record.destination, record.product
                    ),
                    "committed slices must be disjoint; check commit_days handling",
                ));
            }
        }
        Ok(())
    }

    fn finish(
        self,
        input: &PlanInput,
        status: SolveStatus,
        horizon_end: NaiveDate,
    ) -> PlanResult<OptimizationSolution> {
        let costs = &input.costs;
        let total_production: f64 = self
            .batches
            .iter()
            .filter(|b| b.kind == BatchKind::Production)
            .map(|b| b.quantity)
            .sum();

        let labor: f64 = self
            .labor
            .values()
            .map(|l| {
                let mut cost = l.fixed * costs.regular_rate_per_hour
                    + l.overtime * costs.overtime_rate_per_hour
                    + l.nonfixed * costs.nonfixed_rate_per_hour;
                if l.nonfixed > 1e-6 {
                    cost += costs.nonfixed_minimum_charge;
                }
                cost
            })
            .sum();
        let production = total_production * costs.production_cost_per_unit;
        let transport: f64 = self
            .shipments
            .iter()
            .map(|s| {
                let per_unit = input
                    .routes
                    .iter()
                    .find(|r| r.id.as_str() == s.leg_id)
                    .map(|r| r.cost_per_unit)
                    .unwrap_or(0.0);
                per_unit * s.quantity
            })
            .sum();
        let shortage: f64 = self.demand.iter().map(|d| d.shortage).sum::<f64>()
            * costs.shortage_penalty_per_unit;
        let end_str = horizon_end.format("%Y-%m-%d").to_string();
        let waste: f64 = self
            .inventory
            .iter()
            .filter(|(key, _)| {
                let segments = key.segments();
                segments.len() == 4
                    && segments[2] == end_str
                    && segments[3] != StorageState::Frozen.as_str()
            })
            .map(|(_, units)| units)
            .sum::<f64>()
            * costs.waste_penalty_per_unit;
        let total = labor + production + transport + shortage + waste;

        let demanded: f64 = self.demand.iter().map(|d| d.demanded).sum();
        let met: f64 = self.demand.iter().map(|d| d.met).sum();
        let fill_rate = if demanded > 0.0 { met / demanded } else { 1.0 };

        Ok(OptimizationSolution {
            model_type: ModelType::Windowed,
            status,
            objective_value: total,
            best_bound: None,
            mip_gap: None,
            solve_time_seconds: self.solve_time,
            total_production,
            production_batches: self.batches,
            shipments: self.shipments,
            labor_hours_by_date: self.labor,
            inventory_by_node_product_date_state: self.inventory,
            demand_satisfaction: self.demand,
            fill_rate,
            total_cost: CostBreakdown {
                labor,
                production,
                transport,
                shortage,
                waste,
                total,
            },
            fefo_batch_inventory: None,
        })
    }
}
