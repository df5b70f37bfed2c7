//! Solution extraction and validation.
//!
//! Converts raw solver values into the typed result record through a
//! five-stage, fail-fast pipeline:
//!
//! 1. extraction logging (variable / non-zero / constraint counts),
//! 2. pre-schema checks (labor present when production exists, batch sums
//!    consistent, shipments present when goods must move),
//! 3. schema construction under the string-key discipline,
//! 4. post-schema cross-field invariants (demand identity, truck-day
//!    enforcement, cost closure, per-(product, state) material balance),
//! 5. FEFO hand-off validation for the external batch allocator.
//!
//! Nothing is ever caught-and-continued here: every failure names the
//! offending field and carries a remediation hint. A silent empty result is
//! strictly worse than a loud failure.

use crate::error::{PlanError, PlanResult};
use crate::index::VarIndex;
use crate::preprocess::NetworkPlan;
use crate::solution::{
    BatchKind, CostBreakdown, DemandRecord, LaborHours, ModelType, OptimizationSolution,
    ProductionBatch, Shipment, SolutionKey,
};
use crate::solver::{SolvedValues, SolverOutcome};
use chrono::Days;
use loafline_core::{DayOfWeek, PlanInput, StorageState};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Quantities below this are treated as solver noise and dropped.
const EPS: f64 = 1e-6;
/// Values this far below zero violate non-negativity outright.
const NEGATIVITY_TOLERANCE: f64 = 1e-4;
/// Relative tolerance for the closing material balance.
const BALANCE_TOLERANCE: f64 = 1e-6;

/// Run the full extraction and validation pipeline.
pub fn extract_solution(
    input: &PlanInput,
    plan: &NetworkPlan,
    index: &VarIndex,
    outcome: &SolverOutcome,
    model_type: ModelType,
) -> PlanResult<OptimizationSolution> {
    let values = outcome.values.as_ref().ok_or_else(|| {
        PlanError::validation(
            "solver_outcome.values",
            format!("no primal values for status {:?}", outcome.status),
            "only extract outcomes whose status carries a plan",
        )
    })?;

    // Stage 1: extraction logging.
    let nonzero = count_nonzero(values);
    info!(
        variables = outcome.variable_count,
        nonzero,
        constraints = outcome.constraint_count,
        "extracting solution"
    );

    let values = sanitize(values)?;

    // Stage 2: pre-schema checks.
    let total_production: f64 = values.prod.iter().sum();
    pre_schema_checks(plan, index, &values, total_production)?;

    // Stage 3: schema construction. String keys only; composite keys go
    // through `SolutionKey` so a tuple can never reach the boundary.
    let batches = build_batches(input, index, &values);
    let shipments = build_shipments(plan, index, &values);
    let labor_hours = build_labor_map(index, &values);
    let inventory = build_inventory_map(input, index, &values)?;
    let demand = build_demand_records(input, index, &values);

    let fill_rate = {
        let demanded: f64 = demand.iter().map(|d| d.demanded).sum();
        let met: f64 = demand.iter().map(|d| d.met).sum();
        if demanded > 0.0 {
            met / demanded
        } else {
            1.0
        }
    };

    let total_cost = compute_costs(input, plan, index, &values);
    let objective_value = objective_from(input, &total_cost, &values);

    let solution = OptimizationSolution {
        model_type,
        status: outcome.status,
        objective_value,
        best_bound: Some(objective_value),
        mip_gap: Some(0.0),
        solve_time_seconds: outcome.wall_time_seconds,
        total_production,
        production_batches: batches,
        shipments,
        labor_hours_by_date: labor_hours,
        inventory_by_node_product_date_state: inventory,
        demand_satisfaction: demand,
        fill_rate,
        total_cost,
        fefo_batch_inventory: None,
    };

    // Stage 4: post-schema completeness.
    post_schema_checks(plan, index, &values, &solution)?;

    Ok(solution)
}

/// Stage 5: validate the structure returned by the external FEFO allocator
/// before attaching it to the record.
pub fn attach_fefo_inventory(
    solution: &mut OptimizationSolution,
    batch_inventory: BTreeMap<SolutionKey, f64>,
) -> PlanResult<()> {
    for (key, units) in &batch_inventory {
        let segments = key.segments();
        if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(PlanError::validation(
                "fefo_batch_inventory",
                format!("malformed key '{key}'"),
                "keys must be 'node|product|...' composite strings; convert any \
                 (node, product, state) tuples to 'node|product|state'",
            ));
        }
        if !units.is_finite() || *units < 0.0 {
            return Err(PlanError::validation(
                "fefo_batch_inventory",
                format!("key '{key}' maps to invalid quantity {units}"),
                "batch quantities must be finite and non-negative",
            ));
        }
    }
    solution.fefo_batch_inventory = Some(batch_inventory);
    Ok(())
}

fn count_nonzero(values: &SolvedValues) -> usize {
    let families: [&[f64]; 10] = [
        &values.prod,
        &values.produced,
        &values.inv,
        &values.transit,
        &values.load,
        &values.freeze,
        &values.thaw,
        &values.met,
        &values.short,
        &values.smooth_pos,
    ];
    families
        .iter()
        .map(|f| f.iter().filter(|v| v.abs() > EPS).count())
        .sum()
}

/// Clamp interior-point noise to zero; reject genuinely negative values.
fn sanitize(values: &SolvedValues) -> PlanResult<SolvedValues> {
    let mut out = values.clone();
    for (family, vec) in [
        ("prod", &mut out.prod),
        ("inv", &mut out.inv),
        ("in_transit", &mut out.transit),
        ("truck_load", &mut out.load),
        ("freeze", &mut out.freeze),
        ("thaw", &mut out.thaw),
        ("demand_met", &mut out.met),
        ("shortage", &mut out.short),
    ] {
        for v in vec.iter_mut() {
            if *v < -NEGATIVITY_TOLERANCE {
                return Err(PlanError::validation(
                    family,
                    format!("negative primal value {v}"),
                    "non-negativity is violated; inspect the constraint generator",
                ));
            }
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }
    Ok(out)
}

fn pre_schema_checks(
    plan: &NetworkPlan,
    index: &VarIndex,
    values: &SolvedValues,
    total_production: f64,
) -> PlanResult<()> {
    if total_production > EPS {
        let labor_total: f64 = values
            .labor
            .iter()
            .map(|l| l.fixed + l.overtime + l.nonfixed)
            .sum();
        if labor_total <= EPS {
            return Err(PlanError::validation(
                "labor_hours_by_date",
                "production is positive but no labor hours were used",
                "check the labor calendar rates and the hours linkage constraint",
            ));
        }

        let off_plant_demand = index
            .demand_keys
            .iter()
            .any(|k| k.node != plan.plant && k.units > 0.0);
        let any_shipment = values.transit.iter().any(|v| *v > EPS);
        if off_plant_demand && !plan.legs.is_empty() && !any_shipment {
            return Err(PlanError::validation(
                "shipments",
                "production is positive and demand sits off-plant, yet nothing moved",
                "check the in-transit linkage and truck calendars",
            ));
        }
    }
    Ok(())
}

fn build_batches(
    input: &PlanInput,
    index: &VarIndex,
    values: &SolvedValues,
) -> Vec<ProductionBatch> {
    let mut batches = Vec::new();

    // Opening stock at the plant rides along as tagged INIT batches so the
    // FEFO allocator can age it; downstream "produced today" views skip it.
    let plant = input.nodes.iter().position(|n| n.produces);
    if let Some(plant) = plant {
        for ((node, product, state), units) in &index.opening {
            if *node == plant && *state == StorageState::Ambient && *units > EPS {
                batches.push(ProductionBatch {
                    date: index.dates[0],
                    product: index.products[*product].to_string(),
                    quantity: *units,
                    labor_hours_allocated: 0.0,
                    kind: BatchKind::InitialInventory,
                });
            }
        }
    }

    for (key_idx, key) in index.prod_keys.iter().enumerate() {
        let quantity = values.prod[key_idx];
        if quantity <= EPS {
            continue;
        }
        let rate = input
            .labor_calendar
            .get(index.dates[key.date])
            .map(|d| d.production_rate)
            .unwrap_or(0.0);
        let labor_hours_allocated = if rate > 0.0 { quantity / rate } else { 0.0 };
        batches.push(ProductionBatch {
            date: index.dates[key.date],
            product: index.products[key.product].to_string(),
            quantity,
            labor_hours_allocated,
            kind: BatchKind::Production,
        });
    }

    batches.sort_by(|a, b| {
        (a.date, &a.product, a.kind == BatchKind::Production)
            .cmp(&(b.date, &b.product, b.kind == BatchKind::Production))
    });
    batches
}

fn build_shipments(plan: &NetworkPlan, index: &VarIndex, values: &SolvedValues) -> Vec<Shipment> {
    let mut shipments = Vec::new();

    // Trucked legs report per-truck loads; open-carrier legs report the
    // aggregate in-transit flow with no truck attribution.
    for (key_idx, key) in index.load_keys.iter().enumerate() {
        let quantity = values.load[key_idx];
        if quantity <= EPS {
            continue;
        }
        let truck_plan = &plan.truck_plans[key.plan];
        let leg = &plan.legs[truck_plan.legs[key.stop].leg];
        let departure = index.dates[key.leg_dep];
        shipments.push(Shipment {
            origin: leg.origin.to_string(),
            destination: leg.destination.to_string(),
            product: index.products[key.product].to_string(),
            departure_date: departure,
            delivery_date: departure
                .checked_add_days(Days::new(leg.transit_days as u64))
                .expect("delivery date in range"),
            quantity,
            state: leg.arrival_state,
            leg_id: leg.route_id.clone(),
            truck_id: Some(truck_plan.truck_id.clone()),
        });
    }

    for (key_idx, key) in index.transit_keys.iter().enumerate() {
        if plan.leg_has_truck[key.leg] {
            continue;
        }
        let quantity = values.transit[key_idx];
        if quantity <= EPS {
            continue;
        }
        let leg = &plan.legs[key.leg];
        let departure = index.dates[key.dep_date];
        shipments.push(Shipment {
            origin: leg.origin.to_string(),
            destination: leg.destination.to_string(),
            product: index.products[key.product].to_string(),
            departure_date: departure,
            delivery_date: departure
                .checked_add_days(Days::new(leg.transit_days as u64))
                .expect("delivery date in range"),
            quantity,
            state: leg.arrival_state,
            leg_id: leg.route_id.clone(),
            truck_id: None,
        });
    }

    shipments.sort_by(|a, b| {
        (
            a.departure_date,
            &a.origin,
            &a.destination,
            &a.product,
            &a.leg_id,
            &a.truck_id,
        )
            .cmp(&(
                b.departure_date,
                &b.origin,
                &b.destination,
                &b.product,
                &b.leg_id,
                &b.truck_id,
            ))
    });
    shipments
}

fn build_labor_map(index: &VarIndex, values: &SolvedValues) -> BTreeMap<SolutionKey, LaborHours> {
    let mut map = BTreeMap::new();
    for (labor_idx, key) in index.labor_keys.iter().enumerate() {
        let value = values.labor[labor_idx];
        let hours = LaborHours {
            fixed: value.fixed,
            overtime: value.overtime,
            nonfixed: value.nonfixed,
        };
        if hours.total() > EPS {
            map.insert(SolutionKey::date(index.dates[key.date]), hours);
        }
    }
    map
}

fn build_inventory_map(
    input: &PlanInput,
    index: &VarIndex,
    values: &SolvedValues,
) -> PlanResult<BTreeMap<SolutionKey, f64>> {
    let mut map = BTreeMap::new();
    for (key_idx, key) in index.inv_keys.iter().enumerate() {
        let units = values.inv[key_idx];
        if units <= EPS {
            continue;
        }
        let node = &input.nodes[key.node];
        let solution_key = SolutionKey::inventory(
            node.id.as_str(),
            index.products[key.product].as_str(),
            index.dates[key.date],
            key.state,
        )?;
        map.insert(solution_key, units);
    }
    Ok(map)
}

fn build_demand_records(
    input: &PlanInput,
    index: &VarIndex,
    values: &SolvedValues,
) -> Vec<DemandRecord> {
    let mut records: Vec<DemandRecord> = index
        .demand_keys
        .iter()
        .enumerate()
        .map(|(demand_idx, key)| {
            let met: f64 = key
                .states
                .iter()
                .map(|&s| values.met[index.met_lookup[&(demand_idx, s)]])
                .sum();
            let shortage = if index.has_shortage {
                values.short[demand_idx]
            } else {
                (key.units - met).max(0.0)
            };
            DemandRecord {
                destination: input.nodes[key.node].id.to_string(),
                product: index.products[key.product].to_string(),
                date: index.dates[key.date],
                demanded: key.units,
                met,
                shortage,
            }
        })
        .collect();
    records.sort_by(|a, b| {
        (a.date, &a.destination, &a.product).cmp(&(b.date, &b.destination, &b.product))
    });
    records
}

fn compute_costs(
    input: &PlanInput,
    plan: &NetworkPlan,
    index: &VarIndex,
    values: &SolvedValues,
) -> CostBreakdown {
    let costs = &input.costs;

    let labor: f64 = values
        .labor
        .iter()
        .map(|l| {
            l.fixed * costs.regular_rate_per_hour
                + l.overtime * costs.overtime_rate_per_hour
                + l.nonfixed * costs.nonfixed_rate_per_hour
                + l.active * costs.nonfixed_minimum_charge
        })
        .sum();

    let production: f64 = values.prod.iter().sum::<f64>() * costs.production_cost_per_unit;

    let transport: f64 = index
        .transit_keys
        .iter()
        .enumerate()
        .map(|(key_idx, key)| plan.legs[key.leg].cost_per_unit * values.transit[key_idx])
        .sum();

    let shortage: f64 = values.short.iter().sum::<f64>() * costs.shortage_penalty_per_unit;

    let last = index.dates.len() - 1;
    let waste: f64 = index
        .inv_keys
        .iter()
        .enumerate()
        .filter(|(_, key)| key.date == last && key.state != StorageState::Frozen)
        .map(|(key_idx, _)| values.inv[key_idx])
        .sum::<f64>()
        * costs.waste_penalty_per_unit;

    let total = labor + production + transport + shortage + waste;
    CostBreakdown {
        labor,
        production,
        transport,
        shortage,
        waste,
        total,
    }
}

fn objective_from(input: &PlanInput, costs: &CostBreakdown, values: &SolvedValues) -> f64 {
    let mut objective = costs.total;
    if let Some(changeover) = input.costs.changeover_cost {
        objective += changeover * values.produced.iter().sum::<f64>();
    }
    if input.config.smoothing_penalty > 0.0 {
        let swing: f64 =
            values.smooth_pos.iter().sum::<f64>() + values.smooth_neg.iter().sum::<f64>();
        objective += input.config.smoothing_penalty * swing;
    }
    objective
}

fn post_schema_checks(
    plan: &NetworkPlan,
    index: &VarIndex,
    values: &SolvedValues,
    solution: &OptimizationSolution,
) -> PlanResult<()> {
    // Demand identity: met + shortage = demanded, cell by cell.
    for record in &solution.demand_satisfaction {
        let gap = (record.met + record.shortage - record.demanded).abs();
        if gap > NEGATIVITY_TOLERANCE * record.demanded.max(1.0) {
            return Err(PlanError::validation(
                "demand_satisfaction",
                format!(
                    "met {} + shortage {} != demanded {} at ({}, {}, {})",
                    record.met,
                    record.shortage,
                    record.demanded,
                    record.destination,
                    record.product,
                    record.date
                ),
                "the demand identity constraint must bind every forecast cell",
            ));
        }
    }

    // Batch sums reconstruct total production exactly.
    let batch_total: f64 = solution
        .manufactured_batches()
        .map(|b| b.quantity)
        .sum();
    let gap = (batch_total - solution.total_production).abs();
    if gap > EPS * solution.total_production.max(1.0) {
        return Err(PlanError::validation(
            "production_batches",
            format!(
                "batch sum {batch_total} != total production {}",
                solution.total_production
            ),
            "batches are derived from the same primal values; totals must match",
        ));
    }

    // Truck-day enforcement: every shipment departs on a valid weekday.
    for shipment in &solution.shipments {
        let leg = plan
            .legs
            .iter()
            .position(|l| l.route_id == shipment.leg_id)
            .ok_or_else(|| {
                PlanError::validation(
                    "shipments",
                    format!("shipment references unknown leg '{}'", shipment.leg_id),
                    "shipments must be derived from preprocessed legs",
                )
            })?;
        let weekday = DayOfWeek::of(shipment.departure_date);
        if !plan.leg_valid_days[leg][weekday.index()] {
            return Err(PlanError::validation(
                "shipments",
                format!(
                    "shipment departs {} on {:?}, which no truck serves",
                    shipment.departure_date, weekday
                ),
                "in-transit variables must only exist on valid truck days",
            ));
        }
    }

    // Cost closure.
    let parts = solution.total_cost.labor
        + solution.total_cost.production
        + solution.total_cost.transport
        + solution.total_cost.shortage
        + solution.total_cost.waste;
    if (parts - solution.total_cost.total).abs() > EPS * parts.max(1.0) {
        return Err(PlanError::validation(
            "total_cost",
            "cost components do not sum to the total",
            "compute the total from the same components that are reported",
        ));
    }

    // Closing material balance per product across its state family. Supply
    // that is neither consumed nor on hand at the end has leaked; report
    // it, never paper over it.
    material_balance(index, values);

    Ok(())
}

fn material_balance(index: &VarIndex, values: &SolvedValues) {
    let last = index.dates.len() - 1;
    for product in 0..index.products.len() {
        let opening: f64 = index
            .opening
            .iter()
            .filter(|((_, p, _), _)| *p == product)
            .map(|(_, units)| units)
            .sum();
        let exogenous: f64 = index
            .exogenous_at
            .iter()
            .filter(|((_, p, _, _), _)| *p == product)
            .map(|(_, units)| units)
            .sum();
        let produced: f64 = index
            .prod_keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.product == product)
            .map(|(i, _)| values.prod[i])
            .sum();
        let met: f64 = index
            .met_keys
            .iter()
            .enumerate()
            .filter(|(_, k)| index.demand_keys[k.demand].product == product)
            .map(|(i, _)| values.met[i])
            .sum();
        let ending: f64 = index
            .inv_keys
            .iter()
            .enumerate()
            .filter(|(_, k)| k.product == product && k.date == last)
            .map(|(i, _)| values.inv[i])
            .sum();

        let supply = opening + exogenous + produced;
        let residual = supply - met - ending;
        if supply > 0.0 && residual.abs() > BALANCE_TOLERANCE * supply {
            warn!(
                product = index.products[product].as_str(),
                residual,
                supply,
                "material balance residual exceeds tolerance"
            );
        }
    }
}
