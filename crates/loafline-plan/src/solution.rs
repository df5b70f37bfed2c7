//! The validated result record shared with all downstream consumers.
//!
//! Everything that leaves the planning core goes through this schema. The
//! serialization surface has one hard rule: **every map key is a string**.
//! Composite keys are joined with the reserved `|` separator and dates
//! serialize as ISO-8601 `YYYY-MM-DD`. [`SolutionKey`] is the type-level
//! enforcement of that rule; no tuple, date, or numeric key can reach the
//! boundary because no such map type exists here.
//!
//! Maps are `BTreeMap` and vectors are emitted in sorted order (date, then
//! node, then product), so serializing the same record twice is
//! byte-identical.

use crate::error::{PlanError, PlanResult};
use chrono::NaiveDate;
use loafline_core::StorageState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved separator for composite serialization keys.
pub const KEY_SEPARATOR: char = '|';

/// A string serialization key, possibly composite.
///
/// Constructors reject segments containing the separator, so a parsed key
/// always splits back into the segments it was built from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolutionKey(String);

impl SolutionKey {
    fn join(segments: &[&str]) -> PlanResult<Self> {
        for segment in segments {
            if segment.contains(KEY_SEPARATOR) {
                return Err(PlanError::validation(
                    "solution_key",
                    format!("key segment '{}' contains the reserved separator", segment),
                    "rename the entity; '|' is reserved for composite keys",
                ));
            }
        }
        Ok(SolutionKey(segments.join("|")))
    }

    /// Plain date key, `YYYY-MM-DD`.
    pub fn date(date: NaiveDate) -> Self {
        SolutionKey(date.format("%Y-%m-%d").to_string())
    }

    /// Inventory key, `node|product|YYYY-MM-DD|state`.
    pub fn inventory(
        node: &str,
        product: &str,
        date: NaiveDate,
        state: StorageState,
    ) -> PlanResult<Self> {
        let date = date.format("%Y-%m-%d").to_string();
        Self::join(&[node, product, &date, state.as_str()])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split(KEY_SEPARATOR).collect()
    }
}

impl fmt::Display for SolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which formulation produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// One monolithic sliding-window solve.
    SlidingWindow,
    /// Stitched overlapping windows.
    Windowed,
}

/// Termination status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    FeasibleWithGap,
    Infeasible,
    Unbounded,
    TimeLimit,
    Cancelled,
    Error,
}

impl SolveStatus {
    /// Whether the record carries a usable plan.
    pub fn has_plan(&self) -> bool {
        matches!(
            self,
            SolveStatus::Optimal | SolveStatus::FeasibleWithGap | SolveStatus::TimeLimit
        )
    }
}

/// Origin of a production batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Manufactured inside the horizon.
    #[default]
    Production,
    /// Opening inventory carried into the horizon. Excluded from
    /// "produced today" aggregations by downstream consumers.
    InitialInventory,
}

/// One production batch at the plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionBatch {
    pub date: NaiveDate,
    pub product: String,
    pub quantity: f64,
    pub labor_hours_allocated: f64,
    #[serde(default)]
    pub kind: BatchKind,
}

/// One leg crossing: goods leaving an origin for a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub origin: String,
    pub destination: String,
    pub product: String,
    pub departure_date: NaiveDate,
    pub delivery_date: NaiveDate,
    pub quantity: f64,
    pub state: StorageState,
    pub leg_id: String,
    /// Absent on legs served by an open carrier rather than a scheduled truck.
    #[serde(default)]
    pub truck_id: Option<String>,
}

/// Labor hours used on one date, by class.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LaborHours {
    pub fixed: f64,
    pub overtime: f64,
    pub nonfixed: f64,
}

impl LaborHours {
    pub fn total(&self) -> f64 {
        self.fixed + self.overtime + self.nonfixed
    }
}

/// Demand outcome for one (destination, product, date) cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRecord {
    pub destination: String,
    pub product: String,
    pub date: NaiveDate,
    pub demanded: f64,
    pub met: f64,
    pub shortage: f64,
}

/// Cost breakdown of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub labor: f64,
    pub production: f64,
    pub transport: f64,
    pub shortage: f64,
    pub waste: f64,
    pub total: f64,
}

/// The complete, schema-validated planning result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSolution {
    pub model_type: ModelType,
    pub status: SolveStatus,
    pub objective_value: f64,
    pub best_bound: Option<f64>,
    pub mip_gap: Option<f64>,
    pub solve_time_seconds: f64,
    pub total_production: f64,
    pub production_batches: Vec<ProductionBatch>,
    pub shipments: Vec<Shipment>,
    /// `"YYYY-MM-DD"` -> labor hours by class. String keys, always.
    pub labor_hours_by_date: BTreeMap<SolutionKey, LaborHours>,
    /// `"node|product|YYYY-MM-DD|state"` -> units. String keys, always.
    pub inventory_by_node_product_date_state: BTreeMap<SolutionKey, f64>,
    pub demand_satisfaction: Vec<DemandRecord>,
    pub fill_rate: f64,
    pub total_cost: CostBreakdown,
    /// Attached only after the external FEFO allocator runs; same
    /// string-key discipline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fefo_batch_inventory: Option<BTreeMap<SolutionKey, f64>>,
}

impl OptimizationSolution {
    /// Inventory at a cell, zero when the (sparse) map has no entry.
    pub fn inventory_at(
        &self,
        node: &str,
        product: &str,
        date: NaiveDate,
        state: StorageState,
    ) -> f64 {
        SolutionKey::inventory(node, product, date, state)
            .ok()
            .and_then(|key| self.inventory_by_node_product_date_state.get(&key).copied())
            .unwrap_or(0.0)
    }

    /// Total shortage across all demand cells.
    pub fn total_shortage(&self) -> f64 {
        self.demand_satisfaction.iter().map(|d| d.shortage).sum()
    }

    /// Production batches manufactured inside the horizon (INIT excluded).
    pub fn manufactured_batches(&self) -> impl Iterator<Item = &ProductionBatch> {
        self.production_batches
            .iter()
            .filter(|b| b.kind == BatchKind::Production)
    }

    /// Format a human-readable summary.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Plan Summary\n{}\n", "=".repeat(40)));
        s.push_str(&format!("Status: {:?}\n", self.status));
        s.push_str(&format!("Objective: {:.2}\n", self.objective_value));
        s.push_str(&format!(
            "Total Cost: {:.2} (labor {:.2}, production {:.2}, transport {:.2}, shortage {:.2}, waste {:.2})\n",
            self.total_cost.total,
            self.total_cost.labor,
            self.total_cost.production,
            self.total_cost.transport,
            self.total_cost.shortage,
            self.total_cost.waste,
        ));
        s.push_str(&format!("Total Production: {:.1} units\n", self.total_production));
        s.push_str(&format!("Fill Rate: {:.1}%\n", self.fill_rate * 100.0));
        s.push_str(&format!(
            "Batches: {}  Shipments: {}  Demand Cells: {}\n",
            self.production_batches.len(),
            self.shipments.len(),
            self.demand_satisfaction.len(),
        ));
        s.push_str(&format!("Solve Time: {:.2}s\n", self.solve_time_seconds));
        if let Some(gap) = self.mip_gap {
            s.push_str(&format!("Gap: {:.4}%\n", gap * 100.0));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_inventory_key_format() {
        let key = SolutionKey::inventory("6104", "GF-WHITE", date(6), StorageState::Ambient).unwrap();
        assert_eq!(key.as_str(), "6104|GF-WHITE|2025-01-06|ambient");
        assert_eq!(key.segments().len(), 4);
    }

    #[test]
    fn test_key_rejects_separator_in_segment() {
        let result = SolutionKey::inventory("a|b", "P", date(6), StorageState::Ambient);
        assert!(matches!(result, Err(PlanError::Validation { .. })));
    }

    #[test]
    fn test_date_key_is_iso() {
        assert_eq!(SolutionKey::date(date(6)).as_str(), "2025-01-06");
    }

    #[test]
    fn test_status_has_plan() {
        assert!(SolveStatus::Optimal.has_plan());
        assert!(SolveStatus::TimeLimit.has_plan());
        assert!(!SolveStatus::Infeasible.has_plan());
        assert!(!SolveStatus::Cancelled.has_plan());
    }

    #[test]
    fn test_batch_kind_default_is_production() {
        let json = r#"{"date":"2025-01-06","product":"P","quantity":10.0,"labor_hours_allocated":0.5}"#;
        let batch: ProductionBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.kind, BatchKind::Production);
    }

    #[test]
    fn test_solution_round_trip_is_byte_identical() {
        let mut labor = BTreeMap::new();
        labor.insert(
            SolutionKey::date(date(6)),
            LaborHours {
                fixed: 8.0,
                overtime: 1.5,
                nonfixed: 0.0,
            },
        );
        let mut inventory = BTreeMap::new();
        inventory.insert(
            SolutionKey::inventory("6104", "P", date(6), StorageState::Ambient).unwrap(),
            120.0,
        );
        let solution = OptimizationSolution {
            model_type: ModelType::SlidingWindow,
            status: SolveStatus::Optimal,
            objective_value: 1234.5,
            best_bound: Some(1234.5),
            mip_gap: Some(0.0),
            solve_time_seconds: 0.2,
            total_production: 100.0,
            production_batches: vec![ProductionBatch {
                date: date(6),
                product: "P".into(),
                quantity: 100.0,
                labor_hours_allocated: 0.07,
                kind: BatchKind::Production,
            }],
            shipments: Vec::new(),
            labor_hours_by_date: labor,
            inventory_by_node_product_date_state: inventory,
            demand_satisfaction: vec![DemandRecord {
                destination: "6104".into(),
                product: "P".into(),
                date: date(6),
                demanded: 100.0,
                met: 100.0,
                shortage: 0.0,
            }],
            fill_rate: 1.0,
            total_cost: CostBreakdown::default(),
            fefo_batch_inventory: None,
        };

        let first = serde_json::to_string(&solution).unwrap();
        let parsed: OptimizationSolution = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&parsed).unwrap();
        assert_eq!(first, second);
        assert_eq!(parsed, solution);
    }

    #[test]
    fn test_inventory_at_defaults_to_zero() {
        let solution = OptimizationSolution {
            model_type: ModelType::SlidingWindow,
            status: SolveStatus::Optimal,
            objective_value: 0.0,
            best_bound: None,
            mip_gap: None,
            solve_time_seconds: 0.0,
            total_production: 0.0,
            production_batches: Vec::new(),
            shipments: Vec::new(),
            labor_hours_by_date: BTreeMap::new(),
            inventory_by_node_product_date_state: BTreeMap::new(),
            demand_satisfaction: Vec::new(),
            fill_rate: 1.0,
            total_cost: CostBreakdown::default(),
            fefo_batch_inventory: None,
        };
        assert_eq!(
            solution.inventory_at("H", "P", date(6), StorageState::Ambient),
            0.0
        );
    }
}
