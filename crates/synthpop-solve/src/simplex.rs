use std::time::Instant;

const EPS: f64 = 1e-9;

/// An LP in solver standard form: minimize `objective . x` subject to
/// `coeffs x = rhs`, `x >= 0`, with `rhs >= 0` and an identity starting
/// basis named by `basis`.
///
/// The adapter always produces this shape (elastic slack pairs give every
/// row a basic column), so no phase-one pass is needed.
#[derive(Debug, Clone)]
pub struct StandardForm {
    pub columns: usize,
    pub coeffs: Vec<Vec<f64>>,
    pub rhs: Vec<f64>,
    pub objective: Vec<f64>,
    pub basis: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Optimal,
    Unbounded,
    DeadlineExceeded,
}

/// Raw backend result: primal values per column (the incumbent when the
/// deadline expired), objective value, and pivot count.
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub status: BackendStatus,
    pub values: Vec<f64>,
    pub objective: f64,
    pub iterations: u64,
}

/// The swappable numeric-optimization seam.
///
/// Any simplex or interior-point implementation satisfies the contract;
/// cancellation is cooperative against the supplied deadline.
pub trait LpBackend {
    fn solve(&self, form: &StandardForm, deadline: Option<Instant>) -> BackendOutcome;
}

/// Dense primal simplex on the full tableau, using Bland's rule for both
/// the entering and leaving choice so no cycling is possible.
#[derive(Debug, Clone, Default)]
pub struct PrimalSimplex;

impl LpBackend for PrimalSimplex {
    fn solve(&self, form: &StandardForm, deadline: Option<Instant>) -> BackendOutcome {
        let rows = form.rhs.len();
        let columns = form.columns;
        let mut tableau = form.coeffs.clone();
        let mut rhs = form.rhs.clone();
        let mut basis = form.basis.clone();

        // reduced costs for the starting basis
        let mut cost = form.objective.clone();
        for (row, &basic) in basis.iter().enumerate() {
            let basic_cost = form.objective[basic];
            if basic_cost != 0.0 {
                for column in 0..columns {
                    cost[column] -= basic_cost * tableau[row][column];
                }
            }
        }

        let mut iterations = 0_u64;
        loop {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return outcome(
                    BackendStatus::DeadlineExceeded,
                    form,
                    &basis,
                    &rhs,
                    iterations,
                );
            }

            let Some(entering) = (0..columns).find(|&column| cost[column] < -EPS) else {
                return outcome(BackendStatus::Optimal, form, &basis, &rhs, iterations);
            };

            let mut pivot: Option<(usize, f64)> = None;
            for row in 0..rows {
                let coefficient = tableau[row][entering];
                if coefficient > EPS {
                    let ratio = rhs[row] / coefficient;
                    pivot = match pivot {
                        None => Some((row, ratio)),
                        Some((best_row, best_ratio)) => {
                            if ratio < best_ratio - EPS
                                || (ratio < best_ratio + EPS && basis[row] < basis[best_row])
                            {
                                Some((row, ratio))
                            } else {
                                Some((best_row, best_ratio))
                            }
                        }
                    };
                }
            }
            let Some((pivot_row, _)) = pivot else {
                return outcome(BackendStatus::Unbounded, form, &basis, &rhs, iterations);
            };

            let divisor = tableau[pivot_row][entering];
            for column in 0..columns {
                tableau[pivot_row][column] /= divisor;
            }
            rhs[pivot_row] /= divisor;

            for row in 0..rows {
                if row == pivot_row {
                    continue;
                }
                let factor = tableau[row][entering];
                if factor == 0.0 {
                    continue;
                }
                for column in 0..columns {
                    tableau[row][column] -= factor * tableau[pivot_row][column];
                }
                rhs[row] -= factor * rhs[pivot_row];
                if rhs[row] < 0.0 && rhs[row] > -EPS {
                    rhs[row] = 0.0;
                }
            }
            let factor = cost[entering];
            if factor != 0.0 {
                for column in 0..columns {
                    cost[column] -= factor * tableau[pivot_row][column];
                }
            }

            basis[pivot_row] = entering;
            iterations += 1;
        }
    }
}

fn outcome(
    status: BackendStatus,
    form: &StandardForm,
    basis: &[usize],
    rhs: &[f64],
    iterations: u64,
) -> BackendOutcome {
    let mut values = vec![0.0; form.columns];
    for (row, &basic) in basis.iter().enumerate() {
        values[basic] = rhs[row].max(0.0);
    }
    let objective = basis
        .iter()
        .zip(rhs)
        .map(|(&basic, &value)| form.objective[basic] * value.max(0.0))
        .sum();
    BackendOutcome {
        status,
        values,
        objective,
        iterations,
    }
}
