//! Demand forecast records.

use crate::{NodeId, ProductId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One forecast cell: demand at a destination for a product on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub node: NodeId,
    pub product: ProductId,
    pub date: NaiveDate,
    pub units: f64,
}

/// Demand forecast over the planning window.
///
/// Entries with zero or negative units are dropped at construction; the
/// index builder only ever sees positive demand cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    entries: Vec<ForecastEntry>,
}

impl Forecast {
    pub fn new(entries: Vec<ForecastEntry>) -> Self {
        let entries = entries.into_iter().filter(|e| e.units > 0.0).collect();
        Self { entries }
    }

    pub fn push(&mut self, node: impl Into<NodeId>, product: impl Into<ProductId>, date: NaiveDate, units: f64) {
        if units > 0.0 {
            self.entries.push(ForecastEntry {
                node: node.into(),
                product: product.into(),
                date,
                units,
            });
        }
    }

    pub fn entries(&self) -> &[ForecastEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn earliest_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|e| e.date).min()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|e| e.date).max()
    }

    pub fn total_units(&self) -> f64 {
        self.entries.iter().map(|e| e.units).sum()
    }

    /// Total demand per product, for warm-start share computation.
    pub fn units_by_product(&self) -> BTreeMap<ProductId, f64> {
        let mut totals = BTreeMap::new();
        for entry in &self.entries {
            *totals.entry(entry.product.clone()).or_insert(0.0) += entry.units;
        }
        totals
    }

    /// Distinct destination nodes carrying demand.
    pub fn destinations(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.entries.iter().map(|e| e.node.clone()).collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }
}
