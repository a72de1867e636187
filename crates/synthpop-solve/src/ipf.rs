use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::problem::{LpProblem, RowResidual};

const EPS: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfOptions {
    pub max_iterations: u32,
    /// Stop once the maximum relative cell change over a full pass drops
    /// below this threshold.
    pub convergence_threshold: f64,
}

impl Default for IpfOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            convergence_threshold: 1e-9,
        }
    }
}

/// Result of an IPF fit. Non-convergence is a warning carried here, not a
/// failure: the table is still usable and the validator reports its fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpfOutcome {
    pub masses: Vec<f64>,
    pub iterations: u32,
    pub max_delta: f64,
    pub converged: bool,
    pub residuals: Vec<RowResidual>,
}

/// Iterative proportional fitting over the resolved margin rows.
///
/// Cheap alternative to the LP path: reproduces each margin exactly in
/// isolation at convergence, but overlapping higher-order constraints are
/// only approximated. Starts from the problem's independence reference.
#[derive(Debug, Clone, Default)]
pub struct IpfEngine {
    options: IpfOptions,
}

impl IpfEngine {
    pub fn new(options: IpfOptions) -> Self {
        Self { options }
    }

    pub fn fit(&self, problem: &LpProblem) -> IpfOutcome {
        let mut masses = problem.reference.clone();
        normalize(&mut masses);

        let mut iterations = 0;
        let mut max_delta = f64::INFINITY;
        let mut converged = false;

        while iterations < self.options.max_iterations {
            iterations += 1;
            let before = masses.clone();

            for row in &problem.rows {
                let achieved: f64 = row.cells.iter().map(|&cell| masses[cell]).sum();
                if achieved > EPS {
                    let factor = row.target / achieved;
                    for &cell in &row.cells {
                        masses[cell] *= factor;
                    }
                } else if row.target > EPS {
                    // margin unreachable from a zeroed seed: reseed evenly
                    let share = row.target / row.cells.len() as f64;
                    for &cell in &row.cells {
                        masses[cell] = share;
                    }
                }
            }
            normalize(&mut masses);

            max_delta = masses
                .iter()
                .zip(&before)
                .map(|(after, before)| (after - before).abs() / before.max(EPS))
                .fold(0.0, f64::max);
            if max_delta < self.options.convergence_threshold {
                converged = true;
                break;
            }
        }

        if converged {
            info!(iterations, max_delta, "ipf converged");
        } else {
            warn!(
                iterations,
                max_delta, "ipf did not converge within the iteration budget"
            );
        }

        let residuals = row_residuals(problem, &masses);
        IpfOutcome {
            masses,
            iterations,
            max_delta,
            converged,
            residuals,
        }
    }
}

fn normalize(masses: &mut [f64]) {
    let total: f64 = masses.iter().sum();
    if total > EPS {
        for mass in masses {
            *mass /= total;
        }
    }
}

fn row_residuals(problem: &LpProblem, masses: &[f64]) -> Vec<RowResidual> {
    problem
        .rows
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
        .collect()
}
