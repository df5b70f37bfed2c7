//! Network and calendar preprocessing.
//!
//! Normalizes the input graph before any variable exists: derives the
//! planning horizon from transit times, expands intermediate-stop trucks
//! into explicit per-leg routes, computes the day-of-week validity map for
//! every leg, and filters legs a product could not survive.
//!
//! Intermediate-stop expansion is not optional. A truck
//! `plant -> buffer -> hub` that is not split into `plant -> buffer` and
//! `buffer -> hub` delivers nothing to the buffer, and every destination
//! behind the buffer goes short. Each expanded leg must be backed by a
//! matching [`Route`]; a missing route is a configuration error, never a
//! silent zero.

use crate::error::{PlanError, PlanResult};
use chrono::{Days, NaiveDate};
use loafline_core::{
    DayOfWeek, DepartureWindow, Diagnostics, NodeId, PlanInput, PlanningHorizon, ProductId, Route,
    StorageState, TruckCadence,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// An atomic single-hop leg that survived preprocessing.
#[derive(Debug, Clone)]
pub struct Leg {
    pub route_id: String,
    pub origin: NodeId,
    pub destination: NodeId,
    pub transit_days: u32,
    pub arrival_state: StorageState,
    pub cost_per_unit: f64,
}

impl Leg {
    fn from_route(route: &Route) -> Self {
        Self {
            route_id: route.id.as_str().to_string(),
            origin: route.origin.clone(),
            destination: route.destination.clone(),
            transit_days: route.transit_days,
            arrival_state: route.arrival_state,
            cost_per_unit: route.cost_per_unit,
        }
    }

    pub fn label(&self) -> String {
        format!("{} -> {}", self.origin, self.destination)
    }
}

/// One leg of one truck schedule, with its departure offset from the
/// truck's origin departure.
#[derive(Debug, Clone, Copy)]
pub struct TruckLegStop {
    /// Index into [`NetworkPlan::legs`].
    pub leg: usize,
    /// Days after the origin departure at which this leg departs
    /// (cumulative transit of the preceding legs).
    pub offset_days: u32,
}

/// A truck schedule expanded onto explicit legs.
#[derive(Debug, Clone)]
pub struct TruckPlan {
    /// Index into `PlanInput::trucks`.
    pub truck: usize,
    pub truck_id: String,
    pub legs: Vec<TruckLegStop>,
    pub cadence: TruckCadence,
    pub departure: DepartureWindow,
    pub capacity_units: f64,
}

/// Dated inflow committed by an earlier window of a rolling solve.
#[derive(Debug, Clone)]
pub struct ScheduledArrival {
    pub node: NodeId,
    pub product: ProductId,
    pub date: NaiveDate,
    pub state: StorageState,
    pub units: f64,
    /// Date the shelf-life window counts this inflow at (the original
    /// departure date, or the thaw date for thawed arrivals).
    pub freshness_date: NaiveDate,
}

/// Preprocessed network: everything the index builder iterates over.
#[derive(Debug)]
pub struct NetworkPlan {
    pub horizon: PlanningHorizon,
    pub legs: Vec<Leg>,
    pub truck_plans: Vec<TruckPlan>,
    /// Per leg, per weekday (Monday = 0): whether a departure is valid.
    pub leg_valid_days: Vec<[bool; 7]>,
    /// Whether at least one scheduled truck serves the leg. Legs with no
    /// truck run daily with no capacity bound (open carrier).
    pub leg_has_truck: Vec<bool>,
    /// (leg index, weekday) -> truck-plan indices departing that leg then.
    pub trucks_for_leg_day: HashMap<(usize, DayOfWeek), Vec<usize>>,
    /// Per input-node index: thaw-on-arrival capability.
    pub node_thaws: Vec<bool>,
    /// Index of the producing node in `PlanInput::nodes`.
    pub plant: usize,
    /// Node ID -> index in `PlanInput::nodes`.
    pub node_index: HashMap<NodeId, usize>,
    pub exogenous_arrivals: Vec<ScheduledArrival>,
    pub diagnostics: Diagnostics,
}

impl NetworkPlan {
    pub fn leg_index(&self, origin: &NodeId, destination: &NodeId) -> Option<usize> {
        self.legs
            .iter()
            .position(|l| &l.origin == origin && &l.destination == destination)
    }
}

/// Run the full preprocessing pass.
pub fn preprocess(input: &PlanInput, exogenous: &[ScheduledArrival]) -> PlanResult<NetworkPlan> {
    let mut diagnostics = Diagnostics::new();

    let node_index: HashMap<NodeId, usize> = input
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();

    let plant = input
        .nodes
        .iter()
        .position(|n| n.produces)
        .ok_or_else(|| {
            PlanError::config(
                "nodes",
                "no producing node in the network",
                "mark exactly one node with produces = true",
            )
        })?;
    if input.nodes.iter().filter(|n| n.produces).count() > 1 {
        return Err(PlanError::config(
            "nodes",
            "more than one producing node in the network",
            "mark exactly one node with produces = true",
        ));
    }

    check_references(input, &node_index)?;

    let shelf_life = input.effective_shelf_life();

    // Shelf-life leg filtering: a leg the goods cannot survive is dropped
    // here, and anything reachable only through it will show up as shortage.
    let mut legs: Vec<Leg> = Vec::new();
    for route in &input.routes {
        let max_age = shelf_life.max_age(route.arrival_state);
        if route.transit_days > max_age {
            let message = format!(
                "transit of {} days exceeds the {}-day {} shelf life; leg filtered",
                route.transit_days,
                max_age,
                route.arrival_state,
            );
            warn!(route = route.id.as_str(), "{message}");
            diagnostics.add_warning_with_entity(
                "shelf_life",
                message,
                format!("leg {} -> {}", route.origin, route.destination),
            );
            continue;
        }
        check_leg_states(input, &node_index, route)?;
        legs.push(Leg::from_route(route));
    }

    let horizon = derive_horizon(input, &legs, exogenous, &mut diagnostics)?;

    let leg_lookup: HashMap<(NodeId, NodeId), usize> = legs
        .iter()
        .enumerate()
        .map(|(i, l)| ((l.origin.clone(), l.destination.clone()), i))
        .collect();

    // Intermediate-stop expansion onto explicit legs.
    let mut truck_plans: Vec<TruckPlan> = Vec::new();
    'trucks: for (truck_idx, truck) in input.trucks.iter().enumerate() {
        let sequence = truck.stop_sequence();
        let mut stops = Vec::with_capacity(sequence.len() - 1);
        let mut offset = 0u32;
        for pair in sequence.windows(2) {
            let key = (pair[0].clone(), pair[1].clone());
            let Some(&leg) = leg_lookup.get(&key) else {
                // Distinguish a route that never existed from one the
                // shelf-life filter removed.
                let existed = input
                    .routes
                    .iter()
                    .any(|r| r.origin == pair[0] && r.destination == pair[1]);
                if existed {
                    let message = format!(
                        "leg {} -> {} was filtered for shelf life; truck skipped",
                        pair[0], pair[1]
                    );
                    warn!(truck = truck.id.as_str(), "{message}");
                    diagnostics.add_warning_with_entity(
                        "routing",
                        message,
                        format!("truck {}", truck.id),
                    );
                    continue 'trucks;
                }
                return Err(PlanError::config(
                    format!("trucks[{}]", truck.id),
                    format!("no route for leg {} -> {}", pair[0], pair[1]),
                    "add a Route covering every consecutive stop pair of the truck",
                ));
            };
            stops.push(TruckLegStop {
                leg,
                offset_days: offset,
            });
            offset += legs[leg].transit_days;
        }
        truck_plans.push(TruckPlan {
            truck: truck_idx,
            truck_id: truck.id.as_str().to_string(),
            legs: stops,
            cadence: truck.cadence,
            departure: truck.departure,
            capacity_units: truck.capacity_units,
        });
    }

    // Day-of-week validity per leg: the union over all trucks serving it,
    // whether as primary leg or expanded stop. Variables for in-transit flow
    // are later emitted only on valid days, so a truck that does not run is
    // infeasible by construction rather than by constraint.
    let mut leg_valid_days = vec![[false; 7]; legs.len()];
    let mut leg_has_truck = vec![false; legs.len()];
    let mut trucks_for_leg_day: HashMap<(usize, DayOfWeek), Vec<usize>> = HashMap::new();
    for (plan_idx, plan) in truck_plans.iter().enumerate() {
        for stop in &plan.legs {
            leg_has_truck[stop.leg] = true;
            match plan.cadence {
                TruckCadence::Daily => {
                    for day in DayOfWeek::ALL {
                        leg_valid_days[stop.leg][day.index()] = true;
                        trucks_for_leg_day
                            .entry((stop.leg, day))
                            .or_default()
                            .push(plan_idx);
                    }
                }
                TruckCadence::Weekly(day) => {
                    let leg_day = day.offset(stop.offset_days);
                    leg_valid_days[stop.leg][leg_day.index()] = true;
                    trucks_for_leg_day
                        .entry((stop.leg, leg_day))
                        .or_default()
                        .push(plan_idx);
                }
            }
        }
    }
    for (leg_idx, leg) in legs.iter().enumerate() {
        if !leg_has_truck[leg_idx] {
            leg_valid_days[leg_idx] = [true; 7];
            debug!(leg = %leg.label(), "no truck serves leg; treating as daily open carrier");
            diagnostics.add_warning_with_entity(
                "routing",
                "no truck serves leg; treated as daily open carrier with no capacity bound",
                format!("leg {}", leg.label()),
            );
        }
    }

    // Thaw-on-arrival capability: a breadroom without frozen storage that
    // receives frozen inbound thaws it, resetting the shelf-life window.
    let node_thaws: Vec<bool> = input
        .nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            node.has_demand
                && !node.stores_frozen
                && legs.iter().any(|l| {
                    l.arrival_state == StorageState::Frozen
                        && node_index.get(&l.destination) == Some(&idx)
                })
        })
        .collect();

    // Demand nodes must be able to hold at least one sellable state.
    for node in &input.nodes {
        if node.has_demand && !node.stores_ambient {
            let idx = node_index[&node.id];
            let thaws = node_thaws[idx];
            if !thaws {
                return Err(PlanError::config(
                    format!("nodes[{}]", node.id),
                    "demand node holds neither ambient stock nor thawed arrivals",
                    "enable ambient storage or route frozen inbound for thaw-on-arrival",
                ));
            }
        }
    }

    // Reachability: demand behind a filtered or missing leg is not an
    // error, it just goes short.
    let network = loafline_core::Network::new(
        input.nodes.clone(),
        legs.iter()
            .map(|l| Route::new(
                l.route_id.clone(),
                l.origin.clone(),
                l.destination.clone(),
                l.transit_days,
                l.arrival_state,
                l.cost_per_unit,
            ))
            .collect(),
    );
    let reachable = network.reachable_from(&input.nodes[plant].id);
    for destination in input.forecast.destinations() {
        if !reachable.contains(&destination) {
            let message = "destination unreachable from the plant; demand will be short";
            warn!(destination = destination.as_str(), "{message}");
            diagnostics.add_warning_with_entity("coverage", message, format!("node {destination}"));
        }
    }

    // Forecast rows outside the horizon never become demand cells.
    for entry in input.forecast.entries() {
        if !horizon.contains(entry.date) {
            diagnostics.add_error(
                "coverage",
                format!(
                    "forecast row ({}, {}, {}) is outside the horizon and was dropped",
                    entry.node, entry.product, entry.date
                ),
            );
        }
    }

    Ok(NetworkPlan {
        horizon,
        legs,
        truck_plans,
        leg_valid_days,
        leg_has_truck,
        trucks_for_leg_day,
        node_thaws,
        plant,
        node_index,
        exogenous_arrivals: exogenous.to_vec(),
        diagnostics,
    })
}

/// Derive the planning horizon from the forecast and transit times, honoring
/// a caller override with a structured warning when it is tighter.
fn derive_horizon(
    input: &PlanInput,
    legs: &[Leg],
    exogenous: &[ScheduledArrival],
    diagnostics: &mut Diagnostics,
) -> PlanResult<PlanningHorizon> {
    let earliest = input.forecast.earliest_date().ok_or_else(|| {
        PlanError::config(
            "forecast",
            "forecast is empty",
            "provide at least one (destination, product, date) demand cell",
        )
    })?;
    let latest = input.forecast.latest_date().expect("non-empty forecast");

    let max_transit = legs.iter().map(|l| l.transit_days).max().unwrap_or(0);
    let required_start = earliest
        .checked_sub_days(Days::new(max_transit as u64 + 1))
        .expect("date arithmetic in range");

    match input.horizon_override {
        None => Ok(PlanningHorizon::new(required_start, latest)?),
        Some(forced) => {
            if forced.start > required_start {
                // A continuation window of a rolling solve starts late by
                // design and is covered by seeded stock; only a cold start
                // with nothing on hand is genuinely infeasible.
                let seeded = exogenous.iter().any(|a| a.units > 0.0)
                    || input
                        .nodes
                        .iter()
                        .any(|n| n.opening_inventory.iter().any(|s| s.units > 0.0));
                if !input.config.allow_shortages && !seeded {
                    return Err(PlanError::InfeasibleHorizon {
                        required: required_start,
                        forced: forced.start,
                    });
                }
                let message = format!(
                    "forced start {} is after the required start {}; early demand may go short",
                    forced.start, required_start
                );
                warn!("{message}");
                diagnostics.add_warning("horizon", message);
            }
            let end = forced.end.max(latest);
            if end > forced.end {
                diagnostics.add_warning(
                    "horizon",
                    format!("horizon end extended to {end} to cover the forecast"),
                );
            }
            Ok(PlanningHorizon::new(forced.start, end)?)
        }
    }
}

fn check_references(input: &PlanInput, node_index: &HashMap<NodeId, usize>) -> PlanResult<()> {
    for route in &input.routes {
        for node in [&route.origin, &route.destination] {
            if !node_index.contains_key(node) {
                return Err(PlanError::config(
                    format!("routes[{}]", route.id),
                    format!("unknown node '{node}'"),
                    "every route endpoint must be a declared node",
                ));
            }
        }
    }
    for truck in &input.trucks {
        for node in truck.stop_sequence() {
            if !node_index.contains_key(&node) {
                return Err(PlanError::config(
                    format!("trucks[{}]", truck.id),
                    format!("unknown node '{node}'"),
                    "every truck stop must be a declared node",
                ));
            }
        }
    }
    for entry in input.forecast.entries() {
        if !node_index.contains_key(&entry.node) {
            return Err(PlanError::config(
                "forecast",
                format!("unknown node '{}'", entry.node),
                "every forecast destination must be a declared node",
            ));
        }
    }
    Ok(())
}

/// A leg must depart a node that can hold its travel state and arrive at a
/// node that can store or thaw it.
fn check_leg_states(
    input: &PlanInput,
    node_index: &HashMap<NodeId, usize>,
    route: &Route,
) -> PlanResult<()> {
    let origin = &input.nodes[node_index[&route.origin]];
    let destination = &input.nodes[node_index[&route.destination]];
    match route.arrival_state {
        StorageState::Ambient => {
            if !origin.stores_ambient {
                return Err(PlanError::config(
                    format!("routes[{}]", route.id),
                    format!("ambient leg departs '{}' which has no ambient storage", origin.id),
                    "enable ambient storage at the origin",
                ));
            }
            if !destination.stores_ambient {
                return Err(PlanError::config(
                    format!("routes[{}]", route.id),
                    format!(
                        "ambient leg arrives at '{}' which has no ambient storage",
                        destination.id
                    ),
                    "enable ambient storage at the destination",
                ));
            }
        }
        StorageState::Frozen => {
            if !origin.stores_frozen {
                return Err(PlanError::config(
                    format!("routes[{}]", route.id),
                    format!("frozen leg departs '{}' which has no frozen storage", origin.id),
                    "enable frozen storage at the origin (frozen buffer)",
                ));
            }
            if !destination.stores_frozen && !destination.has_demand {
                return Err(PlanError::config(
                    format!("routes[{}]", route.id),
                    format!(
                        "frozen leg arrives at '{}' which can neither store frozen nor thaw",
                        destination.id
                    ),
                    "enable frozen storage, or mark the destination as a demand node",
                ));
            }
        }
        StorageState::Thawed => {
            return Err(PlanError::config(
                format!("routes[{}]", route.id),
                "routes cannot carry thawed goods; thawed is terminal at the breadroom",
                "ship ambient or frozen and thaw on arrival",
            ));
        }
    }
    Ok(())
}
