use serde::{Deserialize, Serialize};

/// One resolved linear row over cell masses.
///
/// The row constrains the summed mass of `cells` to `target` within
/// `tolerance`; slack beyond the tolerance counts as a violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpRow {
    /// Id of the spec this row was resolved from.
    pub spec_id: String,
    /// Human-readable level combination, e.g. `animal=dog,size=small`.
    pub label: String,
    /// Cells whose masses the row sums (unit coefficients).
    pub cells: Vec<usize>,
    pub target: f64,
    pub tolerance: f64,
}

/// The full linear problem: one mass variable per cell (bounded >= 0), one
/// elastic row per resolved constraint, and an implicit normalization row.
///
/// `reference` is the independence seed used as the objective tie-break for
/// underdetermined systems; it doubles as the IPF seed.
#[derive(Debug, Clone)]
pub struct LpProblem {
    pub cell_count: usize,
    pub rows: Vec<LpRow>,
    pub reference: Vec<f64>,
}

/// Outcome class of a solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Timeout,
}

/// Achieved-versus-target report for one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowResidual {
    pub spec_id: String,
    pub label: String,
    pub target: f64,
    pub achieved: f64,
    pub residual: f64,
}

/// Result of a solve attempt.
///
/// `masses` carries the best incumbent even on `Infeasible` or `Timeout`;
/// `conflicts` names the spec ids implicated in an infeasibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolveStatus,
    pub masses: Vec<f64>,
    pub residuals: Vec<RowResidual>,
    pub conflicts: Vec<String>,
    pub objective: f64,
    pub iterations: u64,
}
