//! # loafline-core: Supply Chain Planning Data Model
//!
//! Provides the typed input records for the loafline production-and-distribution
//! planning engine: the distribution network, truck schedules, labor calendar,
//! demand forecast, cost structure, and shelf-life parameters.
//!
//! ## Design Philosophy
//!
//! A planning run is a pure function of its input record: every entity here is
//! constructed once per solve from external records and stays immutable for the
//! duration of the solve. There is no global state and nothing here talks to a
//! solver; the `loafline-plan` crate consumes this model.
//!
//! The network is a directed graph where:
//! - **Nodes**: the plant, regional hubs, frozen buffers, and breadrooms
//! - **Edges**: atomic single-hop route legs with a transit time and an
//!   arrival state (ambient or frozen)
//!
//! Multi-hop paths are sequences of legs linked by intermediate hub nodes;
//! trucks with intermediate stops are expanded onto explicit legs by the
//! preprocessor in `loafline-plan`.
//!
//! ## Core Data Structures
//!
//! - [`Network`] - nodes plus route legs, with a petgraph view for reachability
//! - [`Node`] - a facility with capability flags and opening inventory
//! - [`Route`] - an atomic single-hop leg
//! - [`TruckSchedule`] - a departure calendar with capacity and stops
//! - [`LaborCalendar`] / [`LaborDay`] - daily labor availability and rates
//! - [`Forecast`] - demand by (destination, product, date)
//! - [`CostStructure`] - all cost rates and penalties
//! - [`PlanInput`] - the complete input record for one solve
//! - [`PlanConfig`] - the enumerated configuration surface with defaults
//!
//! ## ID System
//!
//! Every entity is keyed by a string-backed newtype ID ([`NodeId`],
//! [`ProductId`], [`TruckId`], [`RouteId`]). Domain keys are names (a hub is
//! "Lineage", a product is a SKU code), so the newtypes wrap `String`; the
//! planning engine assigns dense numeric indices internally. The wrappers
//! keep node keys from being confused with product keys at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod calendar;
pub mod cost;
pub mod diagnostics;
pub mod error;
pub mod forecast;
pub mod input;
pub mod network;
pub mod state;

pub use calendar::{DayOfWeek, LaborCalendar, LaborDay, PlanningHorizon};
pub use cost::CostStructure;
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{CoreError, CoreResult};
pub use forecast::{Forecast, ForecastEntry};
pub use input::{PlanConfig, PlanInput, SolveMode, WarmStartMode};
pub use network::{
    DepartureWindow, Network, Node, OpeningStock, Route, TruckCadence, TruckSchedule,
};
pub use state::{ShelfLifeParams, StorageState};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Identifier for a network node (plant, hub, frozen buffer, breadroom).
    NodeId
);
string_id!(
    /// Identifier for a finished-goods product (SKU).
    ProductId
);
string_id!(
    /// Identifier for a truck schedule row.
    TruckId
);
string_id!(
    /// Identifier for a route leg.
    RouteId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_and_accessors() {
        let node = NodeId::new("6122");
        assert_eq!(node.as_str(), "6122");
        assert_eq!(node.to_string(), "6122");
        assert_eq!(NodeId::from("6122"), node);
    }

    #[test]
    fn test_id_serde_transparent() {
        let product = ProductId::new("GF-WHITE-470");
        let json = serde_json::to_string(&product).unwrap();
        assert_eq!(json, "\"GF-WHITE-470\"");
        let back: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn test_ids_are_distinct_types() {
        // NodeId and ProductId with the same text are different keys.
        let node = NodeId::new("X");
        let product = ProductId::new("X");
        assert_eq!(node.as_str(), product.as_str());
    }
}
