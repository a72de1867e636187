//! Constraint building and table solving for Synthpop.
//!
//! This crate turns declared margins and conditionals into an elastic linear
//! problem over cell masses, solves it through a swappable LP backend (exact
//! path), and offers iterative proportional fitting as the cheap approximate
//! path.

pub mod adapter;
pub mod builder;
pub mod errors;
pub mod ipf;
pub mod problem;
pub mod simplex;

pub use adapter::{SolveOptions, SolverAdapter};
pub use builder::ConstraintBuilder;
pub use errors::BuildError;
pub use ipf::{IpfEngine, IpfOptions, IpfOutcome};
pub use problem::{LpProblem, LpRow, RowResidual, Solution, SolveStatus};
pub use simplex::{BackendOutcome, BackendStatus, LpBackend, PrimalSimplex, StandardForm};
