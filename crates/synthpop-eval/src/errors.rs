use thiserror::Error;

/// Errors emitted by the table validator.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A cell carries negative mass beyond numerical-noise tolerance; this
    /// is not correctable and points at the producing solve.
    #[error("numerical instability: cell {cell} carries mass {mass} beyond tolerance")]
    NumericalInstability { cell: usize, mass: f64 },
    #[error(transparent)]
    Core(#[from] synthpop_core::Error),
}
