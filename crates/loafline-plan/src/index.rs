//! Sparse variable index construction.
//!
//! Density is the single largest driver of solver time, so nothing here is
//! emitted "for every date". An in-transit index exists only on a weekday
//! some truck actually serves the leg (or daily for open-carrier legs), and
//! only when the arrival still lands inside the horizon; an inventory index
//! exists only for (node, state) pairs the node's capability flags allow;
//! ghost trucks on non-service days cannot exist because their variables are
//! never created.
//!
//! Every emitted index is recorded in a key vector with a parallel lookup
//! map; the constraint generator iterates only over emitted indices.

use crate::preprocess::NetworkPlan;
use chrono::NaiveDate;
use loafline_core::{DayOfWeek, LaborDay, PlanInput, ProductId, StorageState};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Production cell: (date, product) at the plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProdKey {
    pub date: usize,
    pub product: usize,
}

/// Labor cell for one calendar-covered date.
#[derive(Debug, Clone, Copy)]
pub struct LaborKey {
    pub date: usize,
    pub day: LaborDay,
}

/// End-of-day inventory cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvKey {
    pub node: usize,
    pub product: usize,
    pub date: usize,
    pub state: StorageState,
}

/// In-transit flow departing a leg on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitKey {
    pub leg: usize,
    pub product: usize,
    pub dep_date: usize,
}

/// Load on one truck run, one leg stop, one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadKey {
    pub plan: usize,
    pub stop: usize,
    pub product: usize,
    /// Date the truck departs its origin.
    pub origin_dep: usize,
    /// Date this stop's leg departs (origin departure plus stop offset).
    pub leg_dep: usize,
}

/// State-transition cell (freeze or thaw) at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionKey {
    pub node: usize,
    pub product: usize,
    pub date: usize,
}

/// One positive forecast cell inside the horizon.
#[derive(Debug, Clone)]
pub struct DemandKey {
    pub node: usize,
    pub product: usize,
    pub date: usize,
    pub units: f64,
    /// States demand at this node may be satisfied from.
    pub states: Vec<StorageState>,
}

/// Demand satisfied out of one specific state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandStateKey {
    pub demand: usize,
    pub state: StorageState,
}

/// The complete sparse index over which decision variables live.
#[derive(Debug, Default)]
pub struct VarIndex {
    pub dates: Vec<NaiveDate>,
    pub date_pos: HashMap<NaiveDate, usize>,
    pub weekdays: Vec<DayOfWeek>,
    pub products: Vec<ProductId>,
    pub product_pos: HashMap<ProductId, usize>,

    pub prod_keys: Vec<ProdKey>,
    pub prod_lookup: HashMap<(usize, usize), usize>,
    pub labor_keys: Vec<LaborKey>,
    pub inv_keys: Vec<InvKey>,
    pub inv_lookup: HashMap<(usize, usize, usize, StorageState), usize>,
    pub transit_keys: Vec<TransitKey>,
    pub load_keys: Vec<LoadKey>,
    pub freeze_keys: Vec<TransitionKey>,
    pub freeze_lookup: HashMap<(usize, usize, usize), usize>,
    pub thaw_keys: Vec<TransitionKey>,
    pub demand_keys: Vec<DemandKey>,
    /// (node, product, date) -> index into `demand_keys`.
    pub demand_cell_lookup: HashMap<(usize, usize, usize), usize>,
    pub met_keys: Vec<DemandStateKey>,
    pub met_lookup: HashMap<(usize, StorageState), usize>,
    /// One shortage variable per demand key; empty when shortages disabled.
    pub has_shortage: bool,
    /// Smoothing split-variable dates (positions >= 1); empty when disabled.
    pub smoothing_dates: Vec<usize>,

    /// Transit keys arriving at (node, product, arrival date, credit state).
    pub arrivals_into: HashMap<(usize, usize, usize, StorageState), Vec<usize>>,
    /// Transit keys arriving at (node, product, credit state), keyed by the
    /// *departure* date for shelf-life window accounting.
    pub arrivals_by_freshness: HashMap<(usize, usize, usize, StorageState), Vec<usize>>,
    /// Transit keys departing (node, product, departure date, travel state).
    pub departures_from: HashMap<(usize, usize, usize, StorageState), Vec<usize>>,
    /// Load keys feeding one (leg, product, leg departure date) linkage.
    pub loads_for_leg_dep: HashMap<(usize, usize, usize), Vec<usize>>,
    /// Load keys of one truck run (plan, origin departure date).
    pub loads_by_run: HashMap<(usize, usize), Vec<usize>>,

    /// Opening stock summed per (node, product, state).
    pub opening: HashMap<(usize, usize, StorageState), f64>,
    /// Exogenous committed arrivals per (node, product, date, state).
    pub exogenous_at: HashMap<(usize, usize, usize, StorageState), f64>,
    /// Exogenous arrivals keyed by their freshness date, each carrying its
    /// physical arrival date for window filtering.
    pub exogenous_by_freshness: HashMap<(usize, usize, usize, StorageState), Vec<(usize, f64)>>,

    /// States with an inventory balance at each node.
    pub node_states: Vec<Vec<StorageState>>,
    /// Products with any presence at each node.
    pub node_products: Vec<Vec<usize>>,
}

impl VarIndex {
    /// Total number of decision variables the model will create.
    pub fn variable_count(&self) -> usize {
        // Two labor variables per covered date: fixed + overtime on fixed
        // days, callable hours + activation on non-fixed days.
        let labor_vars = self.labor_keys.len() * 2;
        let shortage = if self.has_shortage {
            self.demand_keys.len()
        } else {
            0
        };
        self.prod_keys.len() * 2 // prod + produced indicator
            + labor_vars
            + self.inv_keys.len()
            + self.transit_keys.len()
            + self.load_keys.len()
            + self.freeze_keys.len()
            + self.thaw_keys.len()
            + self.met_keys.len()
            + shortage
            + self.smoothing_dates.len() * 2
    }

    /// Credit state for goods coming off a leg at its destination.
    pub fn credit_state(plan: &NetworkPlan, leg: usize) -> StorageState {
        let leg_ref = &plan.legs[leg];
        let dest = plan.node_index[&leg_ref.destination];
        if leg_ref.arrival_state == StorageState::Frozen && plan.node_thaws[dest] {
            StorageState::Thawed
        } else {
            leg_ref.arrival_state
        }
    }
}

/// Build the sparse index for one solve.
pub fn build_index(input: &PlanInput, plan: &NetworkPlan) -> VarIndex {
    let mut index = VarIndex::default();

    index.dates = plan.horizon.dates().collect();
    index.date_pos = index
        .dates
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();
    index.weekdays = index.dates.iter().map(|d| DayOfWeek::of(*d)).collect();

    // Product universe: forecast, opening stock, committed arrivals.
    let mut products: BTreeMap<ProductId, ()> = BTreeMap::new();
    for entry in input.forecast.entries() {
        products.insert(entry.product.clone(), ());
    }
    for node in &input.nodes {
        for stock in &node.opening_inventory {
            products.insert(stock.product.clone(), ());
        }
    }
    for arrival in &plan.exogenous_arrivals {
        products.insert(arrival.product.clone(), ());
    }
    index.products = products.into_keys().collect();
    index.product_pos = index
        .products
        .iter()
        .enumerate()
        .map(|(i, p)| (p.clone(), i))
        .collect();

    let n_nodes = input.nodes.len();
    let n_products = index.products.len();

    // Opening stock and exogenous arrivals, aggregated.
    for (node_idx, node) in input.nodes.iter().enumerate() {
        for stock in &node.opening_inventory {
            let product = index.product_pos[&stock.product];
            *index
                .opening
                .entry((node_idx, product, stock.state))
                .or_insert(0.0) += stock.units;
        }
    }
    for arrival in &plan.exogenous_arrivals {
        let node = plan.node_index[&arrival.node];
        let product = index.product_pos[&arrival.product];
        if let Some(&date) = index.date_pos.get(&arrival.date) {
            *index
                .exogenous_at
                .entry((node, product, date, arrival.state))
                .or_insert(0.0) += arrival.units;
            // Freshness dates before the horizon clamp to the start; the
            // window then treats the inflow as opening-fresh.
            let fresh = index
                .date_pos
                .get(&arrival.freshness_date)
                .copied()
                .unwrap_or(0);
            index
                .exogenous_by_freshness
                .entry((node, product, fresh, arrival.state))
                .or_default()
                .push((date, arrival.units));
        }
    }

    // Products with any presence at each node. Hubs and the plant carry the
    // full assortment; a pure breadroom only what it demands or holds.
    let mut node_products: Vec<HashSet<usize>> = vec![HashSet::new(); n_nodes];
    for (node_idx, node) in input.nodes.iter().enumerate() {
        if node.produces || node.is_hub {
            node_products[node_idx].extend(0..n_products);
        }
    }
    for entry in input.forecast.entries() {
        if plan.horizon.contains(entry.date) {
            let node = plan.node_index[&entry.node];
            node_products[node].insert(index.product_pos[&entry.product]);
        }
    }
    for ((node, product, _), _) in &index.opening {
        node_products[*node].insert(*product);
    }
    for ((node, product, _, _), _) in &index.exogenous_at {
        node_products[*node].insert(*product);
    }
    index.node_products = node_products
        .into_iter()
        .map(|set| {
            let mut v: Vec<usize> = set.into_iter().collect();
            v.sort_unstable();
            v
        })
        .collect();

    // States with an inventory balance at each node.
    index.node_states = input
        .nodes
        .iter()
        .enumerate()
        .map(|(node_idx, node)| {
            let mut states = Vec::new();
            if node.stores_ambient {
                states.push(StorageState::Ambient);
            }
            if node.stores_frozen {
                states.push(StorageState::Frozen);
            }
            let exo_thawed = index
                .exogenous_at
                .keys()
                .any(|(n, _, _, s)| *n == node_idx && *s == StorageState::Thawed);
            if plan.node_thaws[node_idx] || (node.stores(StorageState::Thawed) && exo_thawed) {
                states.push(StorageState::Thawed);
            }
            states
        })
        .collect();

    // Production cells: calendar-covered dates at the plant, all products.
    for (date, _) in index.dates.iter().enumerate() {
        if input.labor_calendar.get(index.dates[date]).is_none() {
            continue;
        }
        for product in 0..n_products {
            index.prod_lookup.insert((date, product), index.prod_keys.len());
            index.prod_keys.push(ProdKey { date, product });
        }
    }

    // Labor cells.
    for (date, day) in index.dates.iter().enumerate().filter_map(|(i, d)| {
        input.labor_calendar.get(*d).map(|day| (i, *day))
    }) {
        index.labor_keys.push(LaborKey { date, day });
    }

    // Inventory cells.
    for (node, states) in index.node_states.iter().enumerate() {
        for &product in &index.node_products[node] {
            for date in 0..index.dates.len() {
                for &state in states {
                    index
                        .inv_lookup
                        .insert((node, product, date, state), index.inv_keys.len());
                    index.inv_keys.push(InvKey {
                        node,
                        product,
                        date,
                        state,
                    });
                }
            }
        }
    }

    // In-transit cells: valid weekday, arrival inside the horizon.
    let n_dates = index.dates.len();
    for (leg_idx, leg) in plan.legs.iter().enumerate() {
        let origin = plan.node_index[&leg.origin];
        let dest = plan.node_index[&leg.destination];
        let products: Vec<usize> = index.node_products[origin]
            .iter()
            .copied()
            .filter(|p| index.node_products[dest].contains(p))
            .collect();
        for dep in 0..n_dates {
            if !plan.leg_valid_days[leg_idx][index.weekdays[dep].index()] {
                continue;
            }
            let arrival = dep + leg.transit_days as usize;
            if arrival >= n_dates {
                continue;
            }
            for &product in &products {
                index.transit_keys.push(TransitKey {
                    leg: leg_idx,
                    product,
                    dep_date: dep,
                });
            }
        }
    }

    // Truck-load cells, restricted to the truck's departure days.
    for (plan_idx, truck_plan) in plan.truck_plans.iter().enumerate() {
        for origin_dep in 0..n_dates {
            if !truck_plan.cadence.runs_on(index.weekdays[origin_dep]) {
                continue;
            }
            for (stop_idx, stop) in truck_plan.legs.iter().enumerate() {
                let leg_dep = origin_dep + stop.offset_days as usize;
                if leg_dep >= n_dates {
                    continue;
                }
                let leg = &plan.legs[stop.leg];
                let arrival = leg_dep + leg.transit_days as usize;
                if arrival >= n_dates {
                    continue;
                }
                let origin = plan.node_index[&leg.origin];
                let dest = plan.node_index[&leg.destination];
                for &product in &index.node_products[origin] {
                    if !index.node_products[dest].contains(&product) {
                        continue;
                    }
                    let key_idx = index.load_keys.len();
                    index.load_keys.push(LoadKey {
                        plan: plan_idx,
                        stop: stop_idx,
                        product,
                        origin_dep,
                        leg_dep,
                    });
                    index
                        .loads_for_leg_dep
                        .entry((stop.leg, product, leg_dep))
                        .or_default()
                        .push(key_idx);
                    index
                        .loads_by_run
                        .entry((plan_idx, origin_dep))
                        .or_default()
                        .push(key_idx);
                }
            }
        }
    }

    // Freeze / thaw transition cells.
    for (node_idx, node) in input.nodes.iter().enumerate() {
        if node.freezes() {
            for &product in &index.node_products[node_idx] {
                for date in 0..n_dates {
                    index
                        .freeze_lookup
                        .insert((node_idx, product, date), index.freeze_keys.len());
                    index.freeze_keys.push(TransitionKey {
                        node: node_idx,
                        product,
                        date,
                    });
                }
            }
        }
        if plan.node_thaws[node_idx] {
            for &product in &index.node_products[node_idx] {
                for date in 0..n_dates {
                    index.thaw_keys.push(TransitionKey {
                        node: node_idx,
                        product,
                        date,
                    });
                }
            }
        }
    }

    // Demand cells, summed over duplicate forecast rows, sorted.
    let mut demand_cells: BTreeMap<(usize, usize, usize), f64> = BTreeMap::new();
    for entry in input.forecast.entries() {
        if !plan.horizon.contains(entry.date) {
            continue;
        }
        let node = plan.node_index[&entry.node];
        let product = index.product_pos[&entry.product];
        let date = index.date_pos[&entry.date];
        *demand_cells.entry((date, node, product)).or_insert(0.0) += entry.units;
    }
    for ((date, node, product), units) in demand_cells {
        let states: Vec<StorageState> = index.node_states[node]
            .iter()
            .copied()
            .filter(|s| s.satisfies_demand())
            .collect();
        let demand_idx = index.demand_keys.len();
        index.demand_cell_lookup.insert((node, product, date), demand_idx);
        for &state in &states {
            index
                .met_lookup
                .insert((demand_idx, state), index.met_keys.len());
            index.met_keys.push(DemandStateKey {
                demand: demand_idx,
                state,
            });
        }
        index.demand_keys.push(DemandKey {
            node,
            product,
            date,
            units,
            states,
        });
    }
    index.has_shortage = input.config.allow_shortages;

    if input.config.smoothing_penalty > 0.0 {
        index.smoothing_dates = (1..n_dates).collect();
    }

    // Arrival / departure adjacency over the emitted transit keys.
    for (key_idx, key) in index.transit_keys.iter().enumerate() {
        let leg = &plan.legs[key.leg];
        let origin = plan.node_index[&leg.origin];
        let dest = plan.node_index[&leg.destination];
        let arrival = key.dep_date + leg.transit_days as usize;
        let credit = VarIndex::credit_state(plan, key.leg);
        index
            .arrivals_into
            .entry((dest, key.product, arrival, credit))
            .or_default()
            .push(key_idx);
        index
            .arrivals_by_freshness
            .entry((dest, key.product, key.dep_date, credit))
            .or_default()
            .push(key_idx);
        index
            .departures_from
            .entry((origin, key.product, key.dep_date, leg.arrival_state))
            .or_default()
            .push(key_idx);
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::preprocess;
    use chrono::NaiveDate;
    use loafline_core::{
        CostStructure, DayOfWeek, DepartureWindow, Forecast, LaborCalendar, LaborDay, Node,
        PlanInput, Route, ShelfLifeParams, TruckCadence, TruckSchedule,
    };

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn two_node_input() -> PlanInput {
        let nodes = vec![
            Node::new("P", "Plant").producing(),
            Node::new("H", "Hub").hub().with_demand(),
        ];
        let routes = vec![Route::new(
            "r1",
            "P",
            "H",
            1,
            loafline_core::StorageState::Ambient,
            0.1,
        )];
        let trucks = vec![TruckSchedule::new(
            "T-TUE",
            "P",
            "H",
            TruckCadence::Weekly(DayOfWeek::Tuesday),
            DepartureWindow::Morning,
            5000.0,
        )];
        let mut forecast = Forecast::default();
        forecast.push("H", "P1", date(8), 100.0); // Wednesday
        let mut calendar = LaborCalendar::new();
        for d in 5..=8 {
            calendar.insert(date(d), LaborDay::fixed(12.0, 2.0, 1400.0));
        }
        PlanInput {
            nodes,
            routes,
            trucks,
            labor_calendar: calendar,
            forecast,
            costs: CostStructure::default(),
            shelf_life: ShelfLifeParams::default(),
            horizon_override: None,
            config: Default::default(),
        }
    }

    #[test]
    fn test_transit_emitted_only_on_truck_days() {
        let input = two_node_input();
        let plan = preprocess(&input, &[]).unwrap();
        let index = build_index(&input, &plan);
        // Horizon: Jan 6 (Mon) .. Jan 8 (Wed). The only Tuesday with an
        // in-horizon arrival is Jan 7.
        assert_eq!(index.dates[0], date(6));
        assert_eq!(index.transit_keys.len(), 1);
        let key = index.transit_keys[0];
        assert_eq!(index.dates[key.dep_date], date(7));
        assert_eq!(index.weekdays[key.dep_date], DayOfWeek::Tuesday);
    }

    #[test]
    fn test_no_inventory_state_without_capability() {
        let input = two_node_input();
        let plan = preprocess(&input, &[]).unwrap();
        let index = build_index(&input, &plan);
        assert!(index
            .inv_keys
            .iter()
            .all(|k| k.state == loafline_core::StorageState::Ambient));
    }

    #[test]
    fn test_loads_align_with_transit() {
        let input = two_node_input();
        let plan = preprocess(&input, &[]).unwrap();
        let index = build_index(&input, &plan);
        assert_eq!(index.load_keys.len(), index.transit_keys.len());
        for key in &index.transit_keys {
            assert!(index
                .loads_for_leg_dep
                .contains_key(&(key.leg, key.product, key.dep_date)));
        }
    }

    #[test]
    fn test_demand_cells_sum_duplicates() {
        let mut input = two_node_input();
        input.forecast.push("H", "P1", date(8), 50.0);
        let plan = preprocess(&input, &[]).unwrap();
        let index = build_index(&input, &plan);
        assert_eq!(index.demand_keys.len(), 1);
        assert_eq!(index.demand_keys[0].units, 150.0);
    }

    #[test]
    fn test_variable_count_is_sum_of_families() {
        let input = two_node_input();
        let plan = preprocess(&input, &[]).unwrap();
        let index = build_index(&input, &plan);
        assert!(index.variable_count() > 0);
        let recount = index.prod_keys.len() * 2
            + index.labor_keys.len() * 2
            + index.inv_keys.len()
            + index.transit_keys.len()
            + index.load_keys.len()
            + index.met_keys.len()
            + index.demand_keys.len();
        assert_eq!(index.variable_count(), recount);
    }
}
