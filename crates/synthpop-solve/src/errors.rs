use thiserror::Error;

/// Errors raised while resolving constraint specs into linear rows.
///
/// These are construction-time failures: they carry the offending spec ids
/// and never reach the solver.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A conditional spec whose conditioning margin cannot be determined
    /// from already-declared specs.
    #[error("spec '{spec_id}' conditions on an unresolved margin: {missing}")]
    UnresolvedConditioning { spec_id: String, missing: String },
    /// Two specs pin the same statistic (or a statistic and its marginal
    /// bound) to incompatible values.
    #[error(
        "specs '{first}' and '{second}' conflict on {label}: {first_value} vs {second_value}"
    )]
    ConflictingConstraint {
        first: String,
        second: String,
        label: String,
        first_value: f64,
        second_value: f64,
    },
    #[error(transparent)]
    Core(#[from] synthpop_core::Error),
}
