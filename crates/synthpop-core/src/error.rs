use thiserror::Error;

/// Core error type shared across Synthpop crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The Cartesian product of level counts exceeds the configured ceiling.
    #[error("cell space too large: {cells} cells exceeds the maximum of {max_cells}")]
    SpaceOverflow { cells: u128, max_cells: u64 },
    /// The declared variables or constraint specs violate internal invariants.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias for results returned by Synthpop crates.
pub type Result<T> = std::result::Result<T, Error>;
