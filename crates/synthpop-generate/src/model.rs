use serde::{Deserialize, Serialize};

use synthpop_core::{DEFAULT_MAX_CELLS, MASS_TOLERANCE};
use synthpop_eval::{CellCorrection, SpecResidual};
use synthpop_solve::{RowResidual, SolveStatus};

/// Which reconstruction path produces the joint table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// Elastic LP through the solver adapter: exact within tolerance, with
    /// conflict diagnostics on infeasibility.
    Lp,
    /// Iterative proportional fitting: cheap, approximate for overlapping
    /// constraints.
    Ipf,
}

/// How records are drawn from the solved table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    Stochastic,
    Proportional,
}

/// Options for the reconstruction pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    pub solve_mode: SolveMode,
    /// Ceiling on the enumerated cell space.
    pub max_cells: u64,
    /// Wall-clock budget for the LP solve, in milliseconds.
    pub time_limit_ms: Option<u64>,
    /// Zero permitted slack in the LP path.
    pub exact: bool,
    /// IPF stopping threshold on the maximum relative cell change.
    pub convergence_threshold: f64,
    /// IPF iteration cap.
    pub max_iterations: u32,
    /// Number of records to sample.
    pub rows: u64,
    pub sample_mode: SampleMode,
    /// Seed for stochastic sampling; proportional mode ignores it.
    pub seed: u64,
    /// Global tolerance for table-level validation.
    pub tolerance: f64,
    /// Safety bound on the sampled row count.
    pub max_rows: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            solve_mode: SolveMode::Lp,
            max_cells: DEFAULT_MAX_CELLS,
            time_limit_ms: None,
            exact: false,
            convergence_threshold: 1e-9,
            max_iterations: 1000,
            rows: 1000,
            sample_mode: SampleMode::Stochastic,
            seed: 0,
            tolerance: MASS_TOLERANCE,
            max_rows: 5_000_000,
        }
    }
}

impl EngineOptions {
    /// Options for the cheap approximate path.
    pub fn ipf() -> Self {
        Self {
            solve_mode: SolveMode::Ipf,
            ..Self::default()
        }
    }

    /// Options for deterministic integer allocation instead of draws.
    pub fn proportional(rows: u64) -> Self {
        Self {
            sample_mode: SampleMode::Proportional,
            rows,
            ..Self::default()
        }
    }
}

/// Structured pipeline issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIssue {
    pub level: String,
    pub code: String,
    pub message: String,
}

/// IPF convergence diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfInfo {
    pub iterations: u32,
    pub max_delta: f64,
    pub converged: bool,
}

/// Diagnostics report for one reconstruction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub created_at: String,
    pub solve_mode: SolveMode,
    pub cell_count: usize,
    pub constraint_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<SolveStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<f64>,
    pub solver_iterations: u64,
    pub conflicts: Vec<String>,
    pub solver_residuals: Vec<RowResidual>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipf: Option<IpfInfo>,
    pub residuals: Vec<SpecResidual>,
    pub corrections: Vec<CellCorrection>,
    pub total_mass: f64,
    pub warnings: Vec<RunIssue>,
    pub rows_sampled: u64,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: String, created_at: String, solve_mode: SolveMode) -> Self {
        Self {
            run_id,
            created_at,
            solve_mode,
            cell_count: 0,
            constraint_rows: 0,
            solver_status: None,
            objective: None,
            solver_iterations: 0,
            conflicts: Vec::new(),
            solver_residuals: Vec::new(),
            ipf: None,
            residuals: Vec::new(),
            corrections: Vec::new(),
            total_mass: 0.0,
            warnings: Vec::new(),
            rows_sampled: 0,
            duration_ms: 0,
        }
    }

    pub fn record_warning(&mut self, code: &str, message: impl Into<String>) {
        self.warnings.push(RunIssue {
            level: "warning".to_string(),
            code: code.to_string(),
            message: message.into(),
        });
    }
}
