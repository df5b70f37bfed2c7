//! Warm-start hint generation.
//!
//! A deterministic, forecast-aware weekly SKU rotation used as initial
//! values for the "product produced today" indicators. The solver is free
//! to deviate; hints never alter optimality, they only give branching a
//! sensible starting plan (produce the big movers most days, touch every
//! SKU at least once a week).

use crate::index::VarIndex;
use loafline_core::{DayOfWeek, PlanInput, WarmStartMode};
use std::collections::BTreeMap;

/// Initial values for `product_produced[date, product]`.
///
/// Only positive hints are recorded; anything absent defaults to zero.
#[derive(Debug, Clone, Default)]
pub struct WarmStartHints {
    pub produced: BTreeMap<(usize, usize), f64>,
    pub mode: WarmStartMode,
}

impl WarmStartHints {
    pub fn len(&self) -> usize {
        self.produced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.produced.is_empty()
    }
}

/// Compute the rotation hints, or `None` when warm starts are disabled or
/// there is nothing to rotate.
pub fn generate(input: &PlanInput, index: &VarIndex) -> Option<WarmStartHints> {
    let mode = input.config.warm_start;
    if mode == WarmStartMode::None || index.products.is_empty() || index.prod_keys.is_empty() {
        return None;
    }

    // Demand share per product, deterministic order: share descending,
    // then product ID ascending.
    let by_product = input.forecast.units_by_product();
    let total: f64 = by_product.values().sum();
    let mut shares: Vec<(usize, f64)> = index
        .products
        .iter()
        .enumerate()
        .map(|(pos, id)| {
            let units = by_product.get(id).copied().unwrap_or(0.0);
            let share = if total > 0.0 { units / total } else { 0.0 };
            (pos, share)
        })
        .collect();
    shares.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(index.products[a.0].cmp(&index.products[b.0]))
    });

    // Weekdays that actually have production capacity in the horizon.
    let mut production_weekdays: Vec<DayOfWeek> = Vec::new();
    for key in &index.prod_keys {
        let day = index.weekdays[key.date];
        if !production_weekdays.contains(&day) {
            production_weekdays.push(day);
        }
    }
    production_weekdays.sort_by_key(|d| d.index());
    if production_weekdays.is_empty() {
        return None;
    }

    let n_products = shares.len();
    let n_days = production_weekdays.len();
    let slots_per_day = slots_per_day(mode, n_products, n_days, &shares);

    // Weighted rotation sequence: every SKU at least once, extra slots to
    // the high-share SKUs by largest remainder.
    let total_slots = (slots_per_day * n_days).max(n_products);
    let weighted = matches!(
        mode,
        WarmStartMode::DemandWeighted | WarmStartMode::Adaptive
    );
    let targets: Vec<f64> = shares
        .iter()
        .map(|(_, share)| {
            if weighted {
                (share * total_slots as f64).max(1.0)
            } else {
                total_slots as f64 / n_products as f64
            }
        })
        .collect();
    let mut counts: Vec<usize> = vec![1; n_products];
    let mut remaining = total_slots.saturating_sub(n_products);
    while remaining > 0 {
        // One more slot to the most under-served SKU relative to its target.
        let pick = (0..n_products)
            .max_by(|&a, &b| {
                let da = targets[a] - counts[a] as f64;
                let db = targets[b] - counts[b] as f64;
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0);
        counts[pick] += 1;
        remaining -= 1;
    }
    let mut sequence: Vec<usize> = Vec::with_capacity(total_slots);
    let mut cursor: Vec<usize> = counts.clone();
    while sequence.len() < total_slots {
        for (rank, &(product, _)) in shares.iter().enumerate() {
            if cursor[rank] > 0 {
                sequence.push(product);
                cursor[rank] -= 1;
            }
        }
    }

    // Deal the sequence into weekdays.
    let mut per_weekday: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (slot, &product) in sequence.iter().enumerate() {
        let day = production_weekdays[slot % n_days];
        let assigned = per_weekday.entry(day.index()).or_default();
        if !assigned.contains(&product) {
            assigned.push(product);
        }
    }

    // Expand weekday assignments onto the horizon's production dates.
    let mut hints = WarmStartHints {
        produced: BTreeMap::new(),
        mode,
    };
    for key in &index.prod_keys {
        let day = index.weekdays[key.date];
        if let Some(assigned) = per_weekday.get(&day.index()) {
            if assigned.contains(&key.product) {
                hints.produced.insert((key.date, key.product), 1.0);
            }
        }
    }
    Some(hints)
}

fn slots_per_day(
    mode: WarmStartMode,
    n_products: usize,
    n_days: usize,
    shares: &[(usize, f64)],
) -> usize {
    match mode {
        WarmStartMode::Fixed2 => 2,
        WarmStartMode::Fixed3 => 3,
        WarmStartMode::Balanced | WarmStartMode::DemandWeighted => {
            (n_products.div_ceil(n_days)).clamp(1, 3)
        }
        WarmStartMode::Adaptive => {
            // Concentrated demand wants short focused runs; flat demand
            // wants broader daily variety.
            let herfindahl: f64 = shares.iter().map(|(_, s)| s * s).sum();
            if herfindahl > 0.5 {
                1
            } else if herfindahl > 0.2 {
                2
            } else {
                3
            }
        }
        WarmStartMode::None => 0,
    }
}
