use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::problem::{LpProblem, LpRow, RowResidual, Solution, SolveStatus};
use crate::simplex::{BackendOutcome, BackendStatus, LpBackend, PrimalSimplex, StandardForm};

/// Penalty on constraint slack, dominating the deviation tie-break so the
/// solver always prefers satisfying declared statistics over staying close
/// to the independence seed.
const SLACK_PENALTY: f64 = 1e3;

/// Numerical-noise floor for feasibility decisions.
const FEASIBILITY_EPS: f64 = 1e-7;

/// Spec id used for the normalization row in residual reports.
pub const NORMALIZATION_ID: &str = "normalization";

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Wall-clock budget for the solve, including conflict identification.
    pub time_limit: Option<Duration>,
    /// Zero permitted slack: any residual beyond numerical noise is a
    /// violation. Best-fit mode allows each row its declared tolerance.
    pub exact: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            exact: false,
        }
    }
}

/// Translates an [`LpProblem`] into backend standard form and maps the
/// backend outcome back into a [`Solution`].
///
/// Every row is elastic (a penalized slack pair), so the backend always
/// starts from a feasible identity basis and infeasibility shows up as
/// irreducible slack rather than a solver failure.
pub struct SolverAdapter {
    backend: Box<dyn LpBackend>,
}

impl Default for SolverAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverAdapter {
    pub fn new() -> Self {
        Self {
            backend: Box::new(PrimalSimplex),
        }
    }

    pub fn with_backend(backend: Box<dyn LpBackend>) -> Self {
        Self { backend }
    }

    pub fn solve(&self, problem: &LpProblem, options: &SolveOptions) -> Solution {
        let deadline = options.time_limit.map(|limit| Instant::now() + limit);
        let form = standard_form(problem, &problem.rows);
        let outcome = self.backend.solve(&form, deadline);

        let masses: Vec<f64> = outcome.values[..problem.cell_count].to_vec();
        let residuals = compute_residuals(&problem.rows, &masses);

        match outcome.status {
            BackendStatus::Unbounded => {
                warn!("solver reported an unbounded problem");
                solution(SolveStatus::Unbounded, masses, residuals, vec![], &outcome)
            }
            BackendStatus::DeadlineExceeded => {
                warn!(
                    iterations = outcome.iterations,
                    "time limit reached, returning best incumbent"
                );
                solution(SolveStatus::Timeout, masses, residuals, vec![], &outcome)
            }
            BackendStatus::Optimal => {
                let violated: Vec<String> = residuals
                    .iter()
                    .filter(|residual| {
                        residual.residual.abs() > self.violation_band(problem, residual, options)
                    })
                    .map(|residual| residual.spec_id.clone())
                    .collect();

                if violated.is_empty() {
                    info!(
                        iterations = outcome.iterations,
                        objective = outcome.objective,
                        "solve optimal"
                    );
                    solution(SolveStatus::Optimal, masses, residuals, vec![], &outcome)
                } else {
                    let conflicts = self.identify_conflicts(problem, &violated, deadline, options);
                    warn!(conflicts = ?conflicts, "declared statistics are jointly unsatisfiable");
                    solution(SolveStatus::Infeasible, masses, residuals, conflicts, &outcome)
                }
            }
        }
    }

    fn violation_band(
        &self,
        problem: &LpProblem,
        residual: &RowResidual,
        options: &SolveOptions,
    ) -> f64 {
        if options.exact {
            return FEASIBILITY_EPS;
        }
        problem
            .rows
            .iter()
            .find(|row| row.spec_id == residual.spec_id && row.label == residual.label)
            .map(|row| row.tolerance.max(FEASIBILITY_EPS))
            .unwrap_or(FEASIBILITY_EPS)
    }

    /// Best-effort minimal conflict set: the violated specs, plus every spec
    /// group whose removal alone lets the remaining rows fit within
    /// tolerance (a relaxation pass per group).
    fn identify_conflicts(
        &self,
        problem: &LpProblem,
        violated: &[String],
        deadline: Option<Instant>,
        options: &SolveOptions,
    ) -> Vec<String> {
        let mut conflicts: Vec<String> = Vec::new();
        for id in violated {
            if !conflicts.contains(id) {
                conflicts.push(id.clone());
            }
        }

        let mut groups: Vec<&str> = Vec::new();
        for row in &problem.rows {
            if !groups.contains(&row.spec_id.as_str()) {
                groups.push(&row.spec_id);
            }
        }

        for group in groups {
            if conflicts.iter().any(|id| id == group) {
                continue;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                break;
            }

            let remaining: Vec<LpRow> = problem
                .rows
                .iter()
                .filter(|row| row.spec_id != group)
                .cloned()
                .collect();
            let form = standard_form(problem, &remaining);
            let outcome = self.backend.solve(&form, deadline);
            if outcome.status != BackendStatus::Optimal {
                continue;
            }

            let masses: Vec<f64> = outcome.values[..problem.cell_count].to_vec();
            let feasible = compute_residuals(&remaining, &masses)
                .iter()
                .all(|residual| {
                    residual.residual.abs() <= self.violation_band(problem, residual, options)
                });
            if feasible {
                conflicts.push(group.to_string());
            }
        }

        conflicts
    }
}

/// Assemble the elastic standard form: cell masses, one slack pair per row
/// (normalization included), and an L1 deviation pair per cell against the
/// independence reference.
fn standard_form(problem: &LpProblem, rows: &[LpRow]) -> StandardForm {
    let cells = problem.cell_count;
    let elastic_rows = rows.len() + 1;
    let deviation_base = cells + 2 * elastic_rows;
    let columns = deviation_base + 2 * cells;
    let total_rows = elastic_rows + cells;

    let mut coeffs = vec![vec![0.0; columns]; total_rows];
    let mut rhs = vec![0.0; total_rows];
    let mut objective = vec![0.0; columns];
    let mut basis = vec![0_usize; total_rows];

    for (index, row) in rows.iter().enumerate() {
        for &cell in &row.cells {
            coeffs[index][cell] = 1.0;
        }
        let surplus = cells + 2 * index;
        coeffs[index][surplus] = 1.0;
        coeffs[index][surplus + 1] = -1.0;
        objective[surplus] = SLACK_PENALTY;
        objective[surplus + 1] = SLACK_PENALTY;
        rhs[index] = row.target;
        basis[index] = surplus;
    }

    let normalization = rows.len();
    for cell in 0..cells {
        coeffs[normalization][cell] = 1.0;
    }
    let surplus = cells + 2 * normalization;
    coeffs[normalization][surplus] = 1.0;
    coeffs[normalization][surplus + 1] = -1.0;
    objective[surplus] = SLACK_PENALTY;
    objective[surplus + 1] = SLACK_PENALTY;
    rhs[normalization] = 1.0;
    basis[normalization] = surplus;

    for cell in 0..cells {
        let row = elastic_rows + cell;
        let positive = deviation_base + 2 * cell;
        coeffs[row][cell] = 1.0;
        coeffs[row][positive] = -1.0;
        coeffs[row][positive + 1] = 1.0;
        objective[positive] = 1.0;
        objective[positive + 1] = 1.0;
        rhs[row] = problem.reference[cell];
        basis[row] = positive + 1;
    }

    StandardForm {
        columns,
        coeffs,
        rhs,
        objective,
        basis,
    }
}

fn compute_residuals(rows: &[LpRow], masses: &[f64]) -> Vec<RowResidual> {
    let mut residuals: Vec<RowResidual> = rows
        .iter()
        .map(|row| {
            let achieved: f64 = row.cells.iter().map(|&cell| masses[cell]).sum();
            RowResidual {
                spec_id: row.spec_id.clone(),
                label: row.label.clone(),
                target: row.target,
                achieved,
                residual: achieved - row.target,
            }
        })
        .collect();

    let total: f64 = masses.iter().sum();
    residuals.push(RowResidual {
        spec_id: NORMALIZATION_ID.to_string(),
        label: "total_mass".to_string(),
        target: 1.0,
        achieved: total,
        residual: total - 1.0,
    });
    residuals
}

fn solution(
    status: SolveStatus,
    masses: Vec<f64>,
    residuals: Vec<RowResidual>,
    conflicts: Vec<String>,
    outcome: &BackendOutcome,
) -> Solution {
    Solution {
        status,
        masses,
        residuals,
        conflicts,
        objective: outcome.objective,
        iterations: outcome.iterations,
    }
}
