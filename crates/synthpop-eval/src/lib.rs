//! Table validation for Synthpop.
//!
//! Recomputes every declared statistic from a solved joint table, checks
//! mass conservation and negativity, and produces the per-constraint
//! residual report consumed by diagnostics.

pub mod engine;
pub mod errors;
pub mod model;

pub use engine::TableValidator;
pub use errors::EvalError;
pub use model::{CellCorrection, SpecResidual, ValidateOptions, Validation, ValidationReport};
