//! Decision-variable creation.
//!
//! One variable per emitted index, bounds applied at creation where the
//! bound is a constant. The production indicators and the non-fixed-day
//! activation are binary decisions relaxed to `[0, 1]` under the bundled
//! conic backend; the extractor rounds them.

use crate::index::VarIndex;
use good_lp::{variable, ProblemVariables, Variable};

/// Labor variables for one calendar-covered date.
///
/// Fixed days carry `fixed` + `overtime`; non-fixed days carry `nonfixed` +
/// `active` (the minimum-block activation). The unused pair stays `None` so
/// a constraint can never reference labor that does not exist on that date.
#[derive(Debug, Clone, Copy)]
pub struct DayLaborVars {
    pub fixed: Option<Variable>,
    pub overtime: Option<Variable>,
    pub nonfixed: Option<Variable>,
    pub active: Option<Variable>,
}

/// All decision variables, in vectors parallel to the index key vectors.
#[derive(Debug)]
pub struct VarPool {
    pub prod: Vec<Variable>,
    pub produced: Vec<Variable>,
    pub labor: Vec<DayLaborVars>,
    pub inv: Vec<Variable>,
    pub transit: Vec<Variable>,
    pub load: Vec<Variable>,
    pub freeze: Vec<Variable>,
    pub thaw: Vec<Variable>,
    pub met: Vec<Variable>,
    /// Aligned with `demand_keys`; empty when shortages are disabled.
    pub short: Vec<Variable>,
    pub smooth_pos: Vec<Variable>,
    pub smooth_neg: Vec<Variable>,
}

impl VarPool {
    pub fn create(vars: &mut ProblemVariables, index: &VarIndex) -> Self {
        let prod = index
            .prod_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let produced = index
            .prod_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0).max(1.0)))
            .collect();

        let labor = index
            .labor_keys
            .iter()
            .map(|key| {
                if key.day.is_fixed_day {
                    DayLaborVars {
                        fixed: Some(vars.add(variable().min(0.0).max(key.day.fixed_hours))),
                        overtime: Some(
                            vars.add(variable().min(0.0).max(key.day.max_overtime_hours)),
                        ),
                        nonfixed: None,
                        active: None,
                    }
                } else {
                    DayLaborVars {
                        fixed: None,
                        overtime: None,
                        nonfixed: Some(
                            vars.add(variable().min(0.0).max(key.day.max_overtime_hours)),
                        ),
                        active: Some(vars.add(variable().min(0.0).max(1.0))),
                    }
                }
            })
            .collect();

        let inv = index
            .inv_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let transit = index
            .transit_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let load = index
            .load_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let freeze = index
            .freeze_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let thaw = index
            .thaw_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let met = index
            .met_keys
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let short = if index.has_shortage {
            index
                .demand_keys
                .iter()
                .map(|key| vars.add(variable().min(0.0).max(key.units)))
                .collect()
        } else {
            Vec::new()
        };
        let smooth_pos = index
            .smoothing_dates
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();
        let smooth_neg = index
            .smoothing_dates
            .iter()
            .map(|_| vars.add(variable().min(0.0)))
            .collect();

        Self {
            prod,
            produced,
            labor,
            inv,
            transit,
            load,
            freeze,
            thaw,
            met,
            short,
            smooth_pos,
            smooth_neg,
        }
    }
}
