//! Mathematical model assembly.
//!
//! The index builder decides *which* variables exist; this module creates
//! them, generates the constraint families, and composes the objective.
//! Everything is expressed through `good_lp`'s solver-independent
//! `Expression` / `Constraint` types so the driver can pick the backend.

pub mod constraints;
pub mod objective;
pub mod variables;

pub use variables::{DayLaborVars, VarPool};
