//! Core contracts for Synthpop.
//!
//! This crate defines the categorical data model (variables, constraint
//! specs, joint tables), the mixed-radix cell space, and the input
//! validation shared by the solve and sampling crates.

pub mod error;
pub mod space;
pub mod spec;
pub mod table;
pub mod validation;
pub mod variable;

pub use error::{Error, Result};
pub use space::CellSpace;
pub use spec::{ConstraintSpec, SpecEntry};
pub use table::JointTable;
pub use validation::validate_inputs;
pub use variable::Variable;

/// Default tolerance for mass-conservation checks (grand total, negativity).
pub const MASS_TOLERANCE: f64 = 1e-6;

/// Default ceiling on the enumerated cell space.
pub const DEFAULT_MAX_CELLS: u64 = 1_000_000;
