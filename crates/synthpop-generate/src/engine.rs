use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use synthpop_core::{CellSpace, ConstraintSpec, JointTable, Variable, validate_inputs};
use synthpop_eval::{TableValidator, ValidateOptions};
use synthpop_solve::{
    ConstraintBuilder, IpfEngine, IpfOptions, SolveOptions, SolveStatus, SolverAdapter,
};

use crate::errors::EngineError;
use crate::model::{EngineOptions, IpfInfo, RunReport, SolveMode};
use crate::sampler::{RecordSampler, SampleOptions, SyntheticDataset};

/// Result of a reconstruction run.
///
/// `dataset` is present on a fully successful run; a timed-out solve still
/// yields the incumbent table for inspection but no records.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub table: JointTable,
    pub dataset: Option<SyntheticDataset>,
    pub report: RunReport,
}

/// End-to-end pipeline: enumerate, build, solve or fit, validate, sample.
///
/// One blocking sequence per invocation; every handed-off value is
/// immutable. Construction errors fail fast and never reach the solver;
/// solver outcomes are surfaced in the report, never downgraded.
#[derive(Debug, Clone)]
pub struct ReconstructionEngine {
    options: EngineOptions,
}

impl ReconstructionEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn run(
        &self,
        variables: &[Variable],
        specs: &[ConstraintSpec],
    ) -> Result<RunResult, EngineError> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        validate_inputs(variables, specs)?;
        let space = Arc::new(CellSpace::new(variables.to_vec(), self.options.max_cells)?);
        info!(
            run_id = %run_id,
            cells = space.cell_count(),
            specs = specs.len(),
            mode = ?self.options.solve_mode,
            "reconstruction started"
        );

        let problem = ConstraintBuilder::new(Arc::clone(&space)).build(specs)?;

        let mut report = RunReport::new(run_id.clone(), created_at, self.options.solve_mode);
        report.cell_count = space.cell_count();
        report.constraint_rows = problem.rows.len();

        let masses = match self.options.solve_mode {
            SolveMode::Lp => {
                let solve_options = SolveOptions {
                    time_limit: self.options.time_limit_ms.map(Duration::from_millis),
                    exact: self.options.exact,
                };
                let solution = SolverAdapter::new().solve(&problem, &solve_options);
                report.solver_status = Some(solution.status);
                report.objective = Some(solution.objective);
                report.solver_iterations = solution.iterations;
                report.conflicts = solution.conflicts.clone();
                report.solver_residuals = solution.residuals.clone();

                match solution.status {
                    SolveStatus::Optimal => solution.masses,
                    SolveStatus::Timeout => {
                        report.record_warning(
                            "solver_timeout",
                            "time limit reached; returning the best incumbent without sampling",
                        );
                        let table =
                            JointTable::from_masses(Arc::clone(&space), solution.masses)?;
                        report.duration_ms = start.elapsed().as_millis() as u64;
                        warn!(run_id = %run_id, "reconstruction timed out");
                        return Ok(RunResult {
                            table,
                            dataset: None,
                            report,
                        });
                    }
                    SolveStatus::Infeasible | SolveStatus::Unbounded => {
                        report.duration_ms = start.elapsed().as_millis() as u64;
                        warn!(
                            run_id = %run_id,
                            status = ?solution.status,
                            conflicts = ?report.conflicts,
                            "reconstruction failed in the solver"
                        );
                        return Err(EngineError::Failed(Box::new(report)));
                    }
                }
            }
            SolveMode::Ipf => {
                let engine = IpfEngine::new(IpfOptions {
                    max_iterations: self.options.max_iterations,
                    convergence_threshold: self.options.convergence_threshold,
                });
                let outcome = engine.fit(&problem);
                report.ipf = Some(IpfInfo {
                    iterations: outcome.iterations,
                    max_delta: outcome.max_delta,
                    converged: outcome.converged,
                });
                report.solver_residuals = outcome.residuals.clone();
                if !outcome.converged {
                    report.record_warning(
                        "ipf_nonconvergence",
                        format!(
                            "ipf stopped after {} iterations with max delta {}",
                            outcome.iterations, outcome.max_delta
                        ),
                    );
                }
                outcome.masses
            }
        };

        let table = JointTable::from_masses(Arc::clone(&space), masses)?;
        let validator = TableValidator::new(ValidateOptions {
            tolerance: self.options.tolerance,
        });
        let validation = validator.validate(&table, specs)?;
        report.residuals = validation.report.residuals.clone();
        report.corrections = validation.report.corrections.clone();
        report.total_mass = validation.report.total_mass;
        for warning in &validation.report.warnings {
            report.record_warning("validation", warning.clone());
        }

        if !validation.report.passed {
            match self.options.solve_mode {
                SolveMode::Lp => {
                    report.duration_ms = start.elapsed().as_millis() as u64;
                    warn!(run_id = %run_id, "solved table failed validation");
                    return Err(EngineError::Failed(Box::new(report)));
                }
                SolveMode::Ipf => {
                    // the documented trade-off: overlapping constraints are
                    // only approximated, so partial fit stays a warning
                    report.record_warning(
                        "partial_fit",
                        "ipf table does not satisfy every constraint within tolerance",
                    );
                }
            }
        }

        let sampler = RecordSampler::new(SampleOptions {
            rows: self.options.rows,
            mode: self.options.sample_mode,
            seed: self.options.seed,
            max_rows: self.options.max_rows,
        });
        let dataset = sampler.sample(&validation.table)?;
        report.rows_sampled = dataset.records.len() as u64;
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            run_id = %run_id,
            rows = report.rows_sampled,
            duration_ms = report.duration_ms,
            "reconstruction completed"
        );

        Ok(RunResult {
            table: validation.table,
            dataset: Some(dataset),
            report,
        })
    }
}

/// Convenience entry point with default options.
pub fn reconstruct(
    variables: &[Variable],
    specs: &[ConstraintSpec],
) -> Result<RunResult, EngineError> {
    ReconstructionEngine::new(EngineOptions::default()).run(variables, specs)
}
