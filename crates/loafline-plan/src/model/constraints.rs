//! Constraint generation.
//!
//! ## Formulation
//!
//! ```text
//! Flow conservation, per existing (node, product, date, state) index:
//!
//!   inv[n,p,d,s] = inv[n,p,d-1,s]                 (opening stock at d = start)
//!                + arrivals into s on d            (in-transit with matching
//!                                                  credit state, freeze-in)
//!                - departures from s on d          (legs originating at n,
//!                                                  freeze-out of ambient)
//!                - demand_met[n,p,d,s]             (ambient / thawed only)
//!                + prod[d,p]                       (plant, ambient only)
//!
//! Sliding-window shelf life, per state with finite life L:
//!
//!   inv[n,p,d,s]                 <= sum of inflows in (d-L, d]
//!   consumption out of s on d    <= sum of inflows in (d-L, d]
//!   demand_met[n,p,d,s]          <= sum of inflows in (d-L', d],
//!                                   L' = L - min_remaining_at_delivery
//!
//! Ambient and frozen inflows are window-counted at their departure date so
//! one hop's transit ages the window; thawed inflows count at the thaw
//! (arrival) date because thawing resets the window.
//! ```
//!
//! Outbound terms of a node's balance are computed purely from the set of
//! legs originating there. Never from an "is intermediate storage"
//! predicate: a dual-role hub is a demand destination *and* a leg origin,
//! and a predicate split loses its outbound drain (stock then piles up as
//! phantom end-inventory). A hard check below rejects any model where a leg
//! origin has no balance to drain.

use crate::error::{PlanError, PlanResult};
use crate::index::VarIndex;
use crate::model::variables::VarPool;
use crate::preprocess::NetworkPlan;
use good_lp::{constraint, Constraint, Expression};
use loafline_core::{DepartureWindow, PlanInput, StorageState};
use std::collections::HashMap;

/// Generate every constraint family over the emitted indices.
pub fn generate(
    input: &PlanInput,
    plan: &NetworkPlan,
    index: &VarIndex,
    pool: &VarPool,
) -> PlanResult<Vec<Constraint>> {
    let mut out = Vec::new();

    check_origins_have_balances(plan, index)?;

    conservation(plan, index, pool, &mut out);
    if input.config.enforce_shelf_life {
        shelf_life(input, plan, index, pool, &mut out);
    }
    demand_identity(index, pool, &mut out);
    labor(index, pool, &mut out);
    production_indicators(input, index, pool, &mut out);
    truck_capacity(plan, index, pool, &mut out);
    loading_timing(plan, index, pool, &mut out);
    transit_linkage(plan, index, pool, &mut out);
    freeze_bounds(index, pool, &mut out);
    thaw_definition(index, pool, &mut out);
    storage_capacity(input, index, pool, &mut out);
    smoothing(index, pool, &mut out);

    Ok(out)
}

/// Every node appearing as a leg origin must own an inventory balance for
/// the departing state, or its outbound terms would vanish.
fn check_origins_have_balances(plan: &NetworkPlan, index: &VarIndex) -> PlanResult<()> {
    for (node, product, date, state) in index.departures_from.keys() {
        if !index.inv_lookup.contains_key(&(*node, *product, *date, *state)) {
            let name = plan
                .node_index
                .iter()
                .find(|(_, idx)| *idx == node)
                .map(|(id, _)| id.to_string())
                .unwrap_or_else(|| format!("#{node}"));
            return Err(PlanError::config(
                "routes",
                format!(
                    "leg departs '{name}' in state {state} but the node has no {state} \
                     balance for product '{}'",
                    index.products[*product]
                ),
                "check the node's storage capability flags against its outbound legs",
            ));
        }
    }
    Ok(())
}

fn conservation(plan: &NetworkPlan, index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (key_idx, key) in index.inv_keys.iter().enumerate() {
        let (n, p, d, s) = (key.node, key.product, key.date, key.state);
        let mut rhs = Expression::from(0.0);

        if d == 0 {
            if let Some(&units) = index.opening.get(&(n, p, s)) {
                rhs += Expression::from(units);
            }
        } else {
            let prev = index.inv_lookup[&(n, p, d - 1, s)];
            rhs += pool.inv[prev];
        }

        if let Some(&units) = index.exogenous_at.get(&(n, p, d, s)) {
            rhs += Expression::from(units);
        }

        if n == plan.plant && s == StorageState::Ambient {
            if let Some(&prod_idx) = index.prod_lookup.get(&(d, p)) {
                rhs += pool.prod[prod_idx];
            }
        }

        if s == StorageState::Frozen {
            if let Some(&freeze_idx) = index.freeze_lookup.get(&(n, p, d)) {
                rhs += pool.freeze[freeze_idx];
            }
        }

        if let Some(arrivals) = index.arrivals_into.get(&(n, p, d, s)) {
            for &t in arrivals {
                rhs += pool.transit[t];
            }
        }

        if let Some(departures) = index.departures_from.get(&(n, p, d, s)) {
            for &t in departures {
                rhs -= pool.transit[t];
            }
        }

        if s == StorageState::Ambient {
            if let Some(&freeze_idx) = index.freeze_lookup.get(&(n, p, d)) {
                rhs -= pool.freeze[freeze_idx];
            }
        }

        if let Some(&demand_idx) = index.demand_cell_lookup.get(&(n, p, d)) {
            if let Some(&met_idx) = index.met_lookup.get(&(demand_idx, s)) {
                rhs -= pool.met[met_idx];
            }
        }

        out.push(constraint!(pool.inv[key_idx] == rhs));
    }
}

/// Sum of shelf-life-window inflows into (node, product, state) over the
/// inclusive date-position range.
fn window_inflow(
    plan: &NetworkPlan,
    index: &VarIndex,
    pool: &VarPool,
    node: usize,
    product: usize,
    state: StorageState,
    from: usize,
    to: usize,
) -> Expression {
    let mut expr = Expression::from(0.0);
    for date in from..=to {
        if node == plan.plant && state == StorageState::Ambient {
            if let Some(&prod_idx) = index.prod_lookup.get(&(date, product)) {
                expr += pool.prod[prod_idx];
            }
        }
        // Thawed inflows count at the thaw (arrival) date; ambient and
        // frozen arrivals count at their departure date, and only once the
        // goods have physically arrived by the window's end.
        match state {
            StorageState::Thawed => {
                if let Some(arrivals) = index.arrivals_into.get(&(node, product, date, state)) {
                    for &t in arrivals {
                        expr += pool.transit[t];
                    }
                }
            }
            _ => {
                if let Some(arrivals) =
                    index.arrivals_by_freshness.get(&(node, product, date, state))
                {
                    for &t in arrivals {
                        let key = index.transit_keys[t];
                        let transit = plan.legs[key.leg].transit_days as usize;
                        if key.dep_date + transit <= to {
                            expr += pool.transit[t];
                        }
                    }
                }
            }
        }
        if state == StorageState::Frozen {
            if let Some(&freeze_idx) = index.freeze_lookup.get(&(node, product, date)) {
                expr += pool.freeze[freeze_idx];
            }
        }
        if let Some(entries) = index.exogenous_by_freshness.get(&(node, product, date, state)) {
            for &(arrival_date, units) in entries {
                if arrival_date <= to {
                    expr += Expression::from(units);
                }
            }
        }
    }
    if from == 0 {
        if let Some(&units) = index.opening.get(&(node, product, state)) {
            expr += Expression::from(units);
        }
    }
    expr
}

/// Consumption out of (node, product, date, state): demand met, outbound
/// departures, and freeze (which drains ambient).
fn consumption_out(
    index: &VarIndex,
    pool: &VarPool,
    node: usize,
    product: usize,
    date: usize,
    state: StorageState,
) -> Expression {
    let mut expr = Expression::from(0.0);
    if let Some(&demand_idx) = index.demand_cell_lookup.get(&(node, product, date)) {
        if let Some(&met_idx) = index.met_lookup.get(&(demand_idx, state)) {
            expr += pool.met[met_idx];
        }
    }
    if let Some(departures) = index.departures_from.get(&(node, product, date, state)) {
        for &t in departures {
            expr += pool.transit[t];
        }
    }
    if state == StorageState::Ambient {
        if let Some(&freeze_idx) = index.freeze_lookup.get(&(node, product, date)) {
            expr += pool.freeze[freeze_idx];
        }
    }
    expr
}

fn shelf_life(
    input: &PlanInput,
    plan: &NetworkPlan,
    index: &VarIndex,
    pool: &VarPool,
    out: &mut Vec<Constraint>,
) {
    let shelf = input.effective_shelf_life();
    let n_dates = index.dates.len();

    for (node, states) in index.node_states.iter().enumerate() {
        for &state in states {
            let life = shelf.max_age(state) as usize;
            let demand_life = shelf.demand_window(state) as usize;
            for &product in &index.node_products[node] {
                for date in 0..n_dates {
                    // Window bounds become vacuous once the window covers the
                    // whole history back to the horizon start.
                    if life > 0 && date >= life {
                        let from = date + 1 - life;
                        let inflow =
                            window_inflow(plan, index, pool, node, product, state, from, date);
                        if let Some(&inv_idx) =
                            index.inv_lookup.get(&(node, product, date, state))
                        {
                            out.push(constraint!(pool.inv[inv_idx] <= inflow.clone()));
                        }
                        let consumed = consumption_out(index, pool, node, product, date, state);
                        out.push(constraint!(consumed <= inflow));
                    }
                    // A freshness floor at or beyond the max age saturates
                    // the window to zero days; the empty inflow range then
                    // forces met to zero instead of leaving it unconstrained.
                    if date >= demand_life {
                        if let Some(&demand_idx) =
                            index.demand_cell_lookup.get(&(node, product, date))
                        {
                            if let Some(&met_idx) = index.met_lookup.get(&(demand_idx, state)) {
                                let from = date + 1 - demand_life;
                                let inflow = window_inflow(
                                    plan, index, pool, node, product, state, from, date,
                                );
                                out.push(constraint!(pool.met[met_idx] <= inflow));
                            }
                        }
                    }
                }
            }
        }
    }
}

fn demand_identity(index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (demand_idx, key) in index.demand_keys.iter().enumerate() {
        let mut lhs = Expression::from(0.0);
        for &state in &key.states {
            let met_idx = index.met_lookup[&(demand_idx, state)];
            lhs += pool.met[met_idx];
        }
        if index.has_shortage {
            lhs += pool.short[demand_idx];
        }
        out.push(constraint!(lhs == key.units));
    }
}

fn labor(index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (labor_idx, key) in index.labor_keys.iter().enumerate() {
        let rate = key.day.production_rate;
        if rate <= 0.0 {
            continue;
        }
        let mut hours = Expression::from(0.0);
        for product in 0..index.products.len() {
            if let Some(&prod_idx) = index.prod_lookup.get(&(key.date, product)) {
                hours += (1.0 / rate) * pool.prod[prod_idx];
            }
        }
        let vars = &pool.labor[labor_idx];
        if key.day.is_fixed_day {
            let fixed = vars.fixed.expect("fixed day has fixed-hours variable");
            let overtime = vars.overtime.expect("fixed day has overtime variable");
            out.push(constraint!(hours <= fixed + overtime));
        } else {
            let nonfixed = vars.nonfixed.expect("non-fixed day has callable variable");
            let active = vars.active.expect("non-fixed day has activation variable");
            out.push(constraint!(hours <= nonfixed));
            // Stepwise cost linkage: any callable hours force the activation
            // (and with it the minimum charge), and the optional block floor.
            out.push(constraint!(nonfixed <= key.day.max_overtime_hours * active));
            if let Some(block) = key.day.min_nonfixed_hours {
                out.push(constraint!(nonfixed >= block * active));
            }
        }
    }
}

fn production_indicators(
    input: &PlanInput,
    index: &VarIndex,
    pool: &VarPool,
    out: &mut Vec<Constraint>,
) {
    for (key_idx, key) in index.prod_keys.iter().enumerate() {
        let day = input
            .labor_calendar
            .get(index.dates[key.date])
            .expect("prod keys exist only on calendar-covered dates");
        let cap = day.max_units();
        out.push(constraint!(pool.prod[key_idx] <= cap * pool.produced[key_idx]));
    }
}

fn truck_capacity(plan: &NetworkPlan, index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    // Sorted emission keeps the constraint matrix, and with it the solve,
    // reproducible for identical inputs.
    let mut runs: Vec<(&(usize, usize), &Vec<usize>)> = index.loads_by_run.iter().collect();
    runs.sort_by_key(|(key, _)| **key);
    for ((plan_idx, _origin_dep), load_idxs) in runs {
        let mut total = Expression::from(0.0);
        for &l in load_idxs {
            total += pool.load[l];
        }
        let capacity = plan.truck_plans[*plan_idx].capacity_units;
        out.push(constraint!(total <= capacity));
    }
}

/// Morning trucks load production from dates <= d-1; afternoon trucks may
/// load same-day production. Only plant-origin legs are production-timed;
/// hub loading is governed by hub inventory conservation.
fn loading_timing(plan: &NetworkPlan, index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    let n_dates = index.dates.len();
    let n_products = index.products.len();
    let plant = plan.plant;

    let mut morning: HashMap<usize, Vec<Vec<usize>>> = HashMap::new();
    let mut afternoon: HashMap<usize, Vec<Vec<usize>>> = HashMap::new();
    for (load_idx, key) in index.load_keys.iter().enumerate() {
        let truck_plan = &plan.truck_plans[key.plan];
        let stop = truck_plan.legs[key.stop];
        let leg = &plan.legs[stop.leg];
        if plan.node_index[&leg.origin] != plant {
            continue;
        }
        let bucket = match truck_plan.departure {
            DepartureWindow::Morning => &mut morning,
            DepartureWindow::Afternoon => &mut afternoon,
        };
        bucket
            .entry(key.product)
            .or_insert_with(|| vec![Vec::new(); n_dates])[key.leg_dep]
            .push(load_idx);
    }

    for product in 0..n_products {
        let Some(morning_by_date) = morning.get(&product) else {
            continue;
        };
        let empty = vec![Vec::new(); n_dates];
        let afternoon_by_date = afternoon.get(&product).unwrap_or(&empty);

        // available_prev = opening ambient at the plant plus production and
        // committed arrivals strictly before the current date.
        let mut available_prev = Expression::from(
            index
                .opening
                .get(&(plant, product, StorageState::Ambient))
                .copied()
                .unwrap_or(0.0),
        );
        let mut morning_cum = Expression::from(0.0);
        let mut afternoon_cum_prev = Expression::from(0.0);

        for date in 0..n_dates {
            let new_morning = &morning_by_date[date];
            for &l in new_morning {
                morning_cum += pool.load[l];
            }
            if !new_morning.is_empty() {
                out.push(constraint!(
                    morning_cum.clone() + afternoon_cum_prev.clone() <= available_prev.clone()
                ));
            }
            if let Some(&prod_idx) = index.prod_lookup.get(&(date, product)) {
                available_prev += pool.prod[prod_idx];
            }
            if let Some(&units) =
                index
                    .exogenous_at
                    .get(&(plant, product, date, StorageState::Ambient))
            {
                available_prev += Expression::from(units);
            }
            for &l in &afternoon_by_date[date] {
                afternoon_cum_prev += pool.load[l];
            }
        }
    }
}

/// The only way goods cross a trucked leg is on a truck legally scheduled
/// for that day.
fn transit_linkage(plan: &NetworkPlan, index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (key_idx, key) in index.transit_keys.iter().enumerate() {
        if !plan.leg_has_truck[key.leg] {
            continue;
        }
        let mut loads = Expression::from(0.0);
        if let Some(load_idxs) = index
            .loads_for_leg_dep
            .get(&(key.leg, key.product, key.dep_date))
        {
            for &l in load_idxs {
                loads += pool.load[l];
            }
        }
        out.push(constraint!(pool.transit[key_idx] == loads));
    }
}

/// Freezing on a date is limited to what is actually on hand in ambient:
/// yesterday's balance plus today's ambient inflows.
fn freeze_bounds(index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (key_idx, key) in index.freeze_keys.iter().enumerate() {
        let (n, p, d) = (key.node, key.product, key.date);
        let mut available = Expression::from(0.0);
        if d == 0 {
            if let Some(&units) = index.opening.get(&(n, p, StorageState::Ambient)) {
                available += Expression::from(units);
            }
        } else if let Some(&prev) = index.inv_lookup.get(&(n, p, d - 1, StorageState::Ambient)) {
            available += pool.inv[prev];
        }
        if let Some(arrivals) = index.arrivals_into.get(&(n, p, d, StorageState::Ambient)) {
            for &t in arrivals {
                available += pool.transit[t];
            }
        }
        if let Some(&units) = index.exogenous_at.get(&(n, p, d, StorageState::Ambient)) {
            available += Expression::from(units);
        }
        out.push(constraint!(pool.freeze[key_idx] <= available));
    }
}

/// Thaw is definitional: frozen arrivals at a thawing breadroom are
/// credited to the thawed balance by conservation, and the thaw variable
/// reports exactly that quantity.
fn thaw_definition(index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (key_idx, key) in index.thaw_keys.iter().enumerate() {
        let mut arrivals = Expression::from(0.0);
        if let Some(transit_idxs) =
            index
                .arrivals_into
                .get(&(key.node, key.product, key.date, StorageState::Thawed))
        {
            for &t in transit_idxs {
                arrivals += pool.transit[t];
            }
        }
        out.push(constraint!(pool.thaw[key_idx] == arrivals));
    }
}

fn storage_capacity(input: &PlanInput, index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (node_idx, node) in input.nodes.iter().enumerate() {
        for &state in &index.node_states[node_idx] {
            let Some(cap) = node.storage_capacity(state) else {
                continue;
            };
            for date in 0..index.dates.len() {
                let mut held = Expression::from(0.0);
                let mut any = false;
                for &product in &index.node_products[node_idx] {
                    if let Some(&inv_idx) = index.inv_lookup.get(&(node_idx, product, date, state))
                    {
                        held += pool.inv[inv_idx];
                        any = true;
                    }
                }
                if any {
                    out.push(constraint!(held <= cap));
                }
            }
        }
    }
}

fn smoothing(index: &VarIndex, pool: &VarPool, out: &mut Vec<Constraint>) {
    for (i, &date) in index.smoothing_dates.iter().enumerate() {
        let mut delta = Expression::from(0.0);
        for product in 0..index.products.len() {
            if let Some(&today) = index.prod_lookup.get(&(date, product)) {
                delta += pool.prod[today];
            }
            if let Some(&yesterday) = index.prod_lookup.get(&(date - 1, product)) {
                delta -= pool.prod[yesterday];
            }
        }
        out.push(constraint!(delta == pool.smooth_pos[i] - pool.smooth_neg[i]));
    }
}
