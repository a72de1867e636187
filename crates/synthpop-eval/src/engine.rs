use tracing::{info, warn};

use synthpop_core::{CellSpace, ConstraintSpec, Error, JointTable};

use crate::errors::EvalError;
use crate::model::{CellCorrection, SpecResidual, ValidateOptions, Validation, ValidationReport};

const EPS: f64 = 1e-12;

/// Recomputes every declared statistic from a joint table and checks the
/// table-level invariants.
///
/// Validation never mutates its input: a within-tolerance negative cell is
/// clamped in a new corrected table carried in the outcome. Re-validating a
/// corrected table reproduces identical residuals and no new corrections.
#[derive(Debug, Clone, Default)]
pub struct TableValidator {
    options: ValidateOptions,
}

impl TableValidator {
    pub fn new(options: ValidateOptions) -> Self {
        Self { options }
    }

    pub fn validate(
        &self,
        table: &JointTable,
        specs: &[ConstraintSpec],
    ) -> Result<Validation, EvalError> {
        let tolerance = self.options.tolerance;

        let mut corrections = Vec::new();
        let mut masses = table.masses().to_vec();
        for (cell, mass) in masses.iter_mut().enumerate() {
            if *mass < -tolerance {
                return Err(EvalError::NumericalInstability { cell, mass: *mass });
            }
            if *mass < 0.0 {
                corrections.push(CellCorrection { cell, mass: *mass });
                *mass = 0.0;
            }
        }

        let table = if corrections.is_empty() {
            table.clone()
        } else {
            warn!(
                corrections = corrections.len(),
                "clamped negative noise cells to zero"
            );
            JointTable::from_masses(table.shared_space(), masses)?
        };

        let mut warnings = Vec::new();
        let mut residuals = Vec::new();
        for spec in specs {
            for index in 0..spec.entries.len() {
                residuals.push(self.entry_residual(&table, spec, index, &mut warnings)?);
            }
        }

        let total_mass = table.total_mass();
        if (total_mass - 1.0).abs() > tolerance {
            warnings.push(format!(
                "grand total {total_mass} deviates from 1 beyond tolerance {tolerance}"
            ));
        }

        let passed = (total_mass - 1.0).abs() <= tolerance
            && residuals.iter().all(|residual| residual.within_tolerance);
        if passed {
            info!(residuals = residuals.len(), "table validated");
        } else {
            warn!(
                residuals = residuals.len(),
                total_mass, "table failed validation"
            );
        }

        Ok(Validation {
            table,
            report: ValidationReport {
                residuals,
                total_mass,
                corrections,
                warnings,
                passed,
            },
        })
    }

    fn entry_residual(
        &self,
        table: &JointTable,
        spec: &ConstraintSpec,
        index: usize,
        warnings: &mut Vec<String>,
    ) -> Result<SpecResidual, EvalError> {
        let entry = &spec.entries[index];
        let space = table.space();
        let (target_subset, target_combo) = subset_combo(space, &spec.target, &entry.levels)?;

        if spec.is_conditional() {
            let (given_subset, given_combo) =
                subset_combo(space, &spec.given, &entry.given_levels)?;
            let mut joint_subset = target_subset.clone();
            joint_subset.extend(&given_subset);
            let mut joint_combo = target_combo.clone();
            joint_combo.extend(&given_combo);

            let joint_mass = table.combo_mass(&joint_subset, &joint_combo);
            let given_mass = table.combo_mass(&given_subset, &given_combo);
            let label = format!(
                "{}|{}",
                combo_label(space, &target_subset, &target_combo),
                combo_label(space, &given_subset, &given_combo)
            );

            let achieved = if given_mass > EPS {
                joint_mass / given_mass
            } else {
                warnings.push(format!(
                    "spec '{}': conditioning mass for {} is zero",
                    spec.id, label
                ));
                0.0
            };
            let residual = achieved - entry.probability;
            return Ok(SpecResidual {
                spec_id: spec.id.clone(),
                label,
                target: entry.probability,
                achieved,
                residual,
                within_tolerance: given_mass > EPS && residual.abs() <= spec.tolerance,
            });
        }

        let achieved = table.combo_mass(&target_subset, &target_combo);
        let residual = achieved - entry.probability;
        Ok(SpecResidual {
            spec_id: spec.id.clone(),
            label: combo_label(space, &target_subset, &target_combo),
            target: entry.probability,
            achieved,
            residual,
            within_tolerance: residual.abs() <= spec.tolerance,
        })
    }
}

fn subset_combo(
    space: &CellSpace,
    names: &[String],
    levels: &[String],
) -> Result<(Vec<usize>, Vec<usize>), EvalError> {
    let mut subset = Vec::with_capacity(names.len());
    let mut combo = Vec::with_capacity(names.len());
    for (name, level) in names.iter().zip(levels) {
        let variable = space
            .variable_index(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown variable '{name}'")))?;
        let level = space.variables()[variable]
            .level_index(level)
            .ok_or_else(|| Error::InvalidInput(format!("unknown level '{name}.{level}'")))?;
        subset.push(variable);
        combo.push(level);
    }
    Ok((subset, combo))
}

fn combo_label(space: &CellSpace, subset: &[usize], combo: &[usize]) -> String {
    let variables = space.variables();
    subset
        .iter()
        .zip(combo)
        .map(|(&variable, &level)| {
            format!(
                "{}={}",
                variables[variable].name,
                variables[variable].level_name(level).unwrap_or("<unknown>")
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use synthpop_core::{ConstraintSpec, Variable};

    fn space() -> Arc<CellSpace> {
        Arc::new(
            CellSpace::new(
                vec![
                    Variable::new("animal", ["dog", "cat"]),
                    Variable::new("size", ["small", "large"]),
                ],
                100,
            )
            .expect("build space"),
        )
    }

    fn product_table() -> JointTable {
        JointTable::from_masses(space(), vec![0.42, 0.18, 0.28, 0.12]).expect("build table")
    }

    fn specs() -> Vec<ConstraintSpec> {
        vec![
            ConstraintSpec::margin(
                "animal_margin",
                ["animal"],
                [(vec!["dog"], 0.6), (vec!["cat"], 0.4)],
            ),
            ConstraintSpec::conditional(
                "size_given_animal",
                ["size"],
                ["animal"],
                [(vec!["small"], vec!["dog"], 0.7)],
            ),
        ]
    }

    #[test]
    fn residuals_cover_every_entry() {
        let validation = TableValidator::default()
            .validate(&product_table(), &specs())
            .expect("validate");
        assert!(validation.report.passed);
        assert_eq!(validation.report.residuals.len(), 3);
        assert!(
            validation
                .report
                .residuals
                .iter()
                .all(|residual| residual.within_tolerance)
        );
    }

    #[test]
    fn conditional_achieved_is_joint_over_conditioning() {
        let validation = TableValidator::default()
            .validate(&product_table(), &specs())
            .expect("validate");
        let conditional = validation
            .report
            .residuals
            .iter()
            .find(|residual| residual.spec_id == "size_given_animal")
            .expect("conditional residual");
        assert_eq!(conditional.label, "size=small|animal=dog");
        assert!((conditional.achieved - 0.7).abs() < 1e-9);
    }

    #[test]
    fn noise_negatives_are_clamped_and_reported() {
        let table =
            JointTable::from_masses(space(), vec![0.42, 0.18, 0.4 + 1e-9, -1e-9]).unwrap();
        let validation = TableValidator::default()
            .validate(&table, &[])
            .expect("validate");
        assert_eq!(validation.report.corrections.len(), 1);
        assert_eq!(validation.report.corrections[0].cell, 3);
        assert!(validation.table.mass(3) >= 0.0);
    }

    #[test]
    fn deep_negative_mass_is_fatal() {
        let table = JointTable::from_masses(space(), vec![0.6, 0.5, -0.1, 0.0]).unwrap();
        let err = TableValidator::default().validate(&table, &[]).unwrap_err();
        match err {
            EvalError::NumericalInstability { cell, mass } => {
                assert_eq!(cell, 2);
                assert!((mass + 0.1).abs() < 1e-12);
            }
            other => panic!("expected NumericalInstability, got {other:?}"),
        }
    }

    #[test]
    fn validation_is_idempotent() {
        let validator = TableValidator::default();
        let first = validator
            .validate(&product_table(), &specs())
            .expect("first validation");
        let second = validator
            .validate(&first.table, &specs())
            .expect("second validation");

        assert!(second.report.corrections.is_empty());
        assert_eq!(
            first.report.residuals.len(),
            second.report.residuals.len()
        );
        for (a, b) in first.report.residuals.iter().zip(&second.report.residuals) {
            assert_eq!(a.residual.to_bits(), b.residual.to_bits());
        }
    }

    #[test]
    fn off_target_margin_fails_but_still_reports() {
        let table = JointTable::from_masses(space(), vec![0.55, 0.1, 0.23, 0.12]).unwrap();
        let validation = TableValidator::default()
            .validate(&table, &specs())
            .expect("validate");
        assert!(!validation.report.passed);
        let animal = &validation.report.residuals[0];
        assert_eq!(animal.spec_id, "animal_margin");
        assert!(!animal.within_tolerance);
    }
}
