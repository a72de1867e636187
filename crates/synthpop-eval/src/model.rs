use serde::{Deserialize, Serialize};

use synthpop_core::{JointTable, MASS_TOLERANCE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateOptions {
    /// Global tolerance for mass conservation and negativity noise.
    pub tolerance: f64,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            tolerance: MASS_TOLERANCE,
        }
    }
}

/// Achieved-versus-target comparison for one declared statistic entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecResidual {
    pub spec_id: String,
    pub label: String,
    pub target: f64,
    pub achieved: f64,
    pub residual: f64,
    pub within_tolerance: bool,
}

/// A negative cell clamped to zero during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellCorrection {
    pub cell: usize,
    pub mass: f64,
}

/// Per-constraint residuals plus the table-level checks. Produced on every
/// validation, pass or fail, so callers can judge partial fit quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub residuals: Vec<SpecResidual>,
    pub total_mass: f64,
    pub corrections: Vec<CellCorrection>,
    pub warnings: Vec<String>,
    pub passed: bool,
}

/// Validation outcome: the (possibly corrected) table plus its report.
#[derive(Debug, Clone)]
pub struct Validation {
    pub table: JointTable,
    pub report: ValidationReport,
}
