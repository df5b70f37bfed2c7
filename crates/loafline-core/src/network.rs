//! Distribution network model: nodes, route legs, and truck schedules.
//!
//! Routes are atomic single-hop legs; a truck with intermediate stops is a
//! single schedule row here and is expanded onto explicit legs by the
//! preprocessor. The petgraph view exists for topology queries only
//! (reachability from the plant); all planning iterates the typed vectors.

use crate::calendar::DayOfWeek;
use crate::state::StorageState;
use crate::{NodeId, ProductId, RouteId, TruckId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opening inventory position at a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningStock {
    pub product: ProductId,
    pub state: StorageState,
    pub units: f64,
}

/// A facility in the distribution network.
///
/// Capability flags drive which inventory-state variables exist at the node;
/// a node never gets a frozen balance unless it stores frozen, and demand
/// variables exist only where `has_demand` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// The manufacturing plant. Exactly one node should produce.
    pub produces: bool,
    pub stores_ambient: bool,
    pub stores_frozen: bool,
    pub has_demand: bool,
    /// Transshipment point. A hub may simultaneously carry its own demand.
    pub is_hub: bool,
    /// Storage bound for ambient stock, summed across products.
    #[serde(default)]
    pub ambient_capacity: Option<f64>,
    /// Storage bound for frozen stock, summed across products.
    #[serde(default)]
    pub frozen_capacity: Option<f64>,
    #[serde(default)]
    pub opening_inventory: Vec<OpeningStock>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            produces: false,
            stores_ambient: true,
            stores_frozen: false,
            has_demand: false,
            is_hub: false,
            ambient_capacity: None,
            frozen_capacity: None,
            opening_inventory: Vec::new(),
        }
    }

    pub fn producing(mut self) -> Self {
        self.produces = true;
        self
    }

    pub fn with_demand(mut self) -> Self {
        self.has_demand = true;
        self
    }

    pub fn hub(mut self) -> Self {
        self.is_hub = true;
        self
    }

    pub fn with_frozen_storage(mut self) -> Self {
        self.stores_frozen = true;
        self
    }

    pub fn with_ambient_capacity(mut self, units: f64) -> Self {
        self.ambient_capacity = Some(units);
        self
    }

    pub fn with_frozen_capacity(mut self, units: f64) -> Self {
        self.frozen_capacity = Some(units);
        self
    }

    pub fn with_opening_stock(
        mut self,
        product: impl Into<ProductId>,
        state: StorageState,
        units: f64,
    ) -> Self {
        self.opening_inventory.push(OpeningStock {
            product: product.into(),
            state,
            units,
        });
        self
    }

    /// Whether this node can hold inventory in the given state.
    /// Thawed stock can sit wherever demand is served from it.
    pub fn stores(&self, state: StorageState) -> bool {
        match state {
            StorageState::Ambient => self.stores_ambient,
            StorageState::Frozen => self.stores_frozen,
            StorageState::Thawed => self.has_demand && !self.stores_frozen,
        }
    }

    /// Frozen-buffer capability: ambient arrivals may be frozen here.
    pub fn freezes(&self) -> bool {
        self.stores_ambient && self.stores_frozen
    }

    pub fn storage_capacity(&self, state: StorageState) -> Option<f64> {
        match state {
            StorageState::Ambient => self.ambient_capacity,
            StorageState::Frozen => self.frozen_capacity,
            StorageState::Thawed => None,
        }
    }
}

/// An atomic single-hop route leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub origin: NodeId,
    pub destination: NodeId,
    pub transit_days: u32,
    /// State the goods are in when they arrive (and travel).
    pub arrival_state: StorageState,
    pub cost_per_unit: f64,
}

impl Route {
    pub fn new(
        id: impl Into<RouteId>,
        origin: impl Into<NodeId>,
        destination: impl Into<NodeId>,
        transit_days: u32,
        arrival_state: StorageState,
        cost_per_unit: f64,
    ) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            destination: destination.into(),
            transit_days,
            arrival_state,
            cost_per_unit,
        }
    }
}

/// Departure-time class. Morning trucks load only D−1 production;
/// afternoon trucks may load same-day production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartureWindow {
    Morning,
    Afternoon,
}

/// Which days a truck departs its origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruckCadence {
    Daily,
    Weekly(DayOfWeek),
}

impl TruckCadence {
    /// Whether the truck departs on the given weekday.
    pub fn runs_on(&self, day: DayOfWeek) -> bool {
        match self {
            TruckCadence::Daily => true,
            TruckCadence::Weekly(d) => *d == day,
        }
    }
}

/// A scheduled truck departure with fixed capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckSchedule {
    pub id: TruckId,
    pub origin: NodeId,
    pub final_destination: NodeId,
    /// Intermediate drop-off points, in visit order. Each consecutive pair
    /// must be backed by a matching [`Route`]; missing legs are a
    /// configuration error, not a silent zero.
    #[serde(default)]
    pub intermediate_stops: Vec<NodeId>,
    pub cadence: TruckCadence,
    pub departure: DepartureWindow,
    pub capacity_units: f64,
    pub cost_per_trip: f64,
}

impl TruckSchedule {
    pub fn new(
        id: impl Into<TruckId>,
        origin: impl Into<NodeId>,
        final_destination: impl Into<NodeId>,
        cadence: TruckCadence,
        departure: DepartureWindow,
        capacity_units: f64,
    ) -> Self {
        Self {
            id: id.into(),
            origin: origin.into(),
            final_destination: final_destination.into(),
            intermediate_stops: Vec::new(),
            cadence,
            departure,
            capacity_units,
            cost_per_trip: 0.0,
        }
    }

    pub fn via(mut self, stop: impl Into<NodeId>) -> Self {
        self.intermediate_stops.push(stop.into());
        self
    }

    pub fn with_trip_cost(mut self, cost: f64) -> Self {
        self.cost_per_trip = cost;
        self
    }

    /// Node sequence origin -> stops -> final destination.
    pub fn stop_sequence(&self) -> Vec<NodeId> {
        let mut seq = Vec::with_capacity(self.intermediate_stops.len() + 2);
        seq.push(self.origin.clone());
        seq.extend(self.intermediate_stops.iter().cloned());
        seq.push(self.final_destination.clone());
        seq
    }
}

/// The distribution network: typed nodes and legs with a graph view.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub routes: Vec<Route>,
}

impl Network {
    pub fn new(nodes: Vec<Node>, routes: Vec<Route>) -> Self {
        Self { nodes, routes }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn plant(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.produces)
    }

    /// Node IDs reachable from `from` over the route legs, including `from`.
    pub fn reachable_from(&self, from: &NodeId) -> Vec<NodeId> {
        let mut graph: DiGraph<&NodeId, ()> = DiGraph::new();
        let mut index: HashMap<&NodeId, NodeIndex> = HashMap::new();
        for node in &self.nodes {
            index.insert(&node.id, graph.add_node(&node.id));
        }
        for route in &self.routes {
            if let (Some(&a), Some(&b)) = (index.get(&route.origin), index.get(&route.destination))
            {
                graph.add_edge(a, b, ());
            }
        }
        let Some(&start) = index.get(from) else {
            return Vec::new();
        };
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&graph, start);
        while let Some(nx) = dfs.next(&graph) {
            reached.push((*graph[nx]).clone());
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_capability_flags() {
        let plant = Node::new("6122", "Plant").producing();
        assert!(plant.stores(StorageState::Ambient));
        assert!(!plant.stores(StorageState::Frozen));
        assert!(!plant.freezes());

        let buffer = Node::new("Lineage", "Frozen buffer")
            .hub()
            .with_frozen_storage();
        assert!(buffer.freezes());
        assert!(buffer.stores(StorageState::Frozen));
        assert!(!buffer.stores(StorageState::Thawed));

        let breadroom = Node::new("6130", "WA breadroom").with_demand();
        assert!(breadroom.stores(StorageState::Thawed));
    }

    #[test]
    fn test_truck_stop_sequence() {
        let truck = TruckSchedule::new(
            "T-WED",
            "6122",
            "6125",
            TruckCadence::Weekly(DayOfWeek::Wednesday),
            DepartureWindow::Morning,
            14_080.0,
        )
        .via("Lineage");
        let seq = truck.stop_sequence();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq[1], NodeId::new("Lineage"));
    }

    #[test]
    fn test_cadence_runs_on() {
        assert!(TruckCadence::Daily.runs_on(DayOfWeek::Sunday));
        let weekly = TruckCadence::Weekly(DayOfWeek::Tuesday);
        assert!(weekly.runs_on(DayOfWeek::Tuesday));
        assert!(!weekly.runs_on(DayOfWeek::Wednesday));
    }

    #[test]
    fn test_reachability() {
        let nodes = vec![
            Node::new("P", "Plant").producing(),
            Node::new("H", "Hub").hub().with_demand(),
            Node::new("S", "Spoke").with_demand(),
            Node::new("X", "Orphan").with_demand(),
        ];
        let routes = vec![
            Route::new("r1", "P", "H", 1, StorageState::Ambient, 0.1),
            Route::new("r2", "H", "S", 1, StorageState::Ambient, 0.1),
        ];
        let network = Network::new(nodes, routes);
        let reached = network.reachable_from(&NodeId::new("P"));
        assert!(reached.contains(&NodeId::new("S")));
        assert!(!reached.contains(&NodeId::new("X")));
    }
}
