use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use synthpop_core::{CellSpace, ConstraintSpec, Error};

use crate::errors::BuildError;
use crate::problem::{LpProblem, LpRow};

/// A resolved absolute target for one level combination of one subset.
#[derive(Debug, Clone)]
struct ResolvedTarget {
    value: f64,
    tolerance: f64,
    spec_id: String,
}

/// Subset (sorted variable indices) -> level combination -> target.
type ResolvedMargins = BTreeMap<Vec<usize>, BTreeMap<Vec<usize>, ResolvedTarget>>;

/// Resolves constraint specs into linear rows over cell masses.
///
/// Absolute specs register directly; conditional specs are converted to
/// joint targets (`P(target, given) = c * P(given)`) in dependency passes,
/// so a conditioning margin must be declared or derivable before any spec
/// that conditions on it. Cycles with no independently declared anchor stay
/// unresolved and fail the build.
pub struct ConstraintBuilder {
    space: Arc<CellSpace>,
}

impl ConstraintBuilder {
    pub fn new(space: Arc<CellSpace>) -> Self {
        Self { space }
    }

    pub fn build(&self, specs: &[ConstraintSpec]) -> Result<LpProblem, BuildError> {
        let mut resolved = ResolvedMargins::new();

        for spec in specs.iter().filter(|spec| !spec.is_conditional()) {
            for entry in &spec.entries {
                let (subset, combo) = self.subset_combo(&spec.target, &entry.levels)?;
                self.insert_target(&mut resolved, subset, combo, entry.probability, spec)?;
            }
        }

        let mut pending: Vec<&ConstraintSpec> =
            specs.iter().filter(|spec| spec.is_conditional()).collect();
        while !pending.is_empty() {
            let mut unresolved = Vec::new();
            let mut progressed = false;

            for spec in pending {
                match self.convert_conditional(spec, &resolved)? {
                    Some(targets) => {
                        for (subset, combo, value) in targets {
                            self.insert_target(&mut resolved, subset, combo, value, spec)?;
                        }
                        progressed = true;
                    }
                    None => unresolved.push(spec),
                }
            }

            if !progressed {
                let spec = unresolved[0];
                return Err(BuildError::UnresolvedConditioning {
                    spec_id: spec.id.clone(),
                    missing: format!("P({})", spec.given.join(",")),
                });
            }
            pending = unresolved;
        }

        self.check_margin_dominance(&resolved)?;

        let mut rows = Vec::new();
        for (subset, margins) in &resolved {
            for (combo, target) in margins {
                let cells: Vec<usize> = self
                    .space
                    .cells()
                    .filter(|&cell| self.space.matches(cell, subset, combo))
                    .collect();
                rows.push(LpRow {
                    spec_id: target.spec_id.clone(),
                    label: self.label(subset, combo),
                    cells,
                    target: target.value,
                    tolerance: target.tolerance,
                });
            }
        }

        let reference = self.independence_reference(&resolved);
        info!(
            rows = rows.len(),
            cells = self.space.cell_count(),
            "constraint rows resolved"
        );

        Ok(LpProblem {
            cell_count: self.space.cell_count(),
            rows,
            reference,
        })
    }

    /// Map variable/level names to a sorted-index subset and aligned combo.
    fn subset_combo(
        &self,
        names: &[String],
        levels: &[String],
    ) -> Result<(Vec<usize>, Vec<usize>), BuildError> {
        let mut pairs = Vec::with_capacity(names.len());
        for (name, level) in names.iter().zip(levels) {
            let variable = self.space.variable_index(name).ok_or_else(|| {
                Error::InvalidInput(format!("unknown variable '{name}'"))
            })?;
            let level = self.space.variables()[variable]
                .level_index(level)
                .ok_or_else(|| {
                    Error::InvalidInput(format!("unknown level '{name}.{level}'"))
                })?;
            pairs.push((variable, level));
        }
        pairs.sort_by_key(|&(variable, _)| variable);
        Ok(pairs.into_iter().unzip())
    }

    fn insert_target(
        &self,
        resolved: &mut ResolvedMargins,
        subset: Vec<usize>,
        combo: Vec<usize>,
        value: f64,
        spec: &ConstraintSpec,
    ) -> Result<(), BuildError> {
        let label = self.label(&subset, &combo);
        let margins = resolved.entry(subset).or_default();
        if let Some(existing) = margins.get(&combo) {
            let band = existing.tolerance.min(spec.tolerance);
            if (existing.value - value).abs() > band {
                return Err(BuildError::ConflictingConstraint {
                    first: existing.spec_id.clone(),
                    second: spec.id.clone(),
                    label,
                    first_value: existing.value,
                    second_value: value,
                });
            }
            // agreeing duplicate: keep the first declaration
            return Ok(());
        }
        margins.insert(
            combo,
            ResolvedTarget {
                value,
                tolerance: spec.tolerance,
                spec_id: spec.id.clone(),
            },
        );
        Ok(())
    }

    /// Convert a conditional spec to joint targets, or report it unresolved.
    fn convert_conditional(
        &self,
        spec: &ConstraintSpec,
        resolved: &ResolvedMargins,
    ) -> Result<Option<Vec<(Vec<usize>, Vec<usize>, f64)>>, BuildError> {
        let mut targets = Vec::with_capacity(spec.entries.len());
        for entry in &spec.entries {
            let (given_subset, given_combo) =
                self.subset_combo(&spec.given, &entry.given_levels)?;
            let Some(given_mass) = self.conditioning_mass(resolved, &given_subset, &given_combo)
            else {
                return Ok(None);
            };

            let mut names: Vec<String> = spec.target.clone();
            names.extend(spec.given.iter().cloned());
            let mut levels: Vec<String> = entry.levels.clone();
            levels.extend(entry.given_levels.iter().cloned());
            let (subset, combo) = self.subset_combo(&names, &levels)?;
            targets.push((subset, combo, entry.probability * given_mass));
        }
        Ok(Some(targets))
    }

    /// Resolve the mass of a conditioning combination: declared directly, or
    /// derived by summing a complete resolved margin over a superset.
    fn conditioning_mass(
        &self,
        resolved: &ResolvedMargins,
        given_subset: &[usize],
        given_combo: &[usize],
    ) -> Option<f64> {
        if let Some(margins) = resolved.get(given_subset)
            && let Some(target) = margins.get(given_combo)
        {
            return Some(target.value);
        }

        for (subset, margins) in resolved {
            if subset.len() <= given_subset.len()
                || !given_subset.iter().all(|variable| subset.contains(variable))
                || margins.len() != self.combo_count(subset)
            {
                continue;
            }
            let positions: Vec<usize> = given_subset
                .iter()
                .filter_map(|variable| subset.iter().position(|item| item == variable))
                .collect();
            if positions.len() != given_subset.len() {
                continue;
            }
            let sum = margins
                .iter()
                .filter(|(combo, _)| {
                    positions
                        .iter()
                        .zip(given_combo)
                        .all(|(&position, &level)| combo[position] == level)
                })
                .map(|(_, target)| target.value)
                .sum();
            return Some(sum);
        }
        None
    }

    /// A joint target can never exceed a resolved margin over any sub-subset
    /// of its variables; a breach pins the same mass to incompatible values.
    fn check_margin_dominance(&self, resolved: &ResolvedMargins) -> Result<(), BuildError> {
        for (narrow, narrow_margins) in resolved {
            for (wide, wide_margins) in resolved {
                if wide.len() <= narrow.len()
                    || !narrow.iter().all(|variable| wide.contains(variable))
                {
                    continue;
                }
                let positions: Vec<usize> = narrow
                    .iter()
                    .filter_map(|variable| wide.iter().position(|item| item == variable))
                    .collect();
                if positions.len() != narrow.len() {
                    continue;
                }
                for (wide_combo, wide_target) in wide_margins {
                    let narrow_combo: Vec<usize> = positions
                        .iter()
                        .map(|&position| wide_combo[position])
                        .collect();
                    let Some(narrow_target) = narrow_margins.get(&narrow_combo) else {
                        continue;
                    };
                    let band = narrow_target.tolerance.max(wide_target.tolerance);
                    if wide_target.value > narrow_target.value + band {
                        return Err(BuildError::ConflictingConstraint {
                            first: narrow_target.spec_id.clone(),
                            second: wide_target.spec_id.clone(),
                            label: self.label(wide, wide_combo),
                            first_value: narrow_target.value,
                            second_value: wide_target.value,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Product of resolved single-variable margins, uniform over variables
    /// with no complete declared margin. This is the LP tie-break seed and
    /// the IPF starting table.
    fn independence_reference(&self, resolved: &ResolvedMargins) -> Vec<f64> {
        let variables = self.space.variables();
        let mut dists: Vec<Vec<f64>> = variables
            .iter()
            .map(|variable| {
                vec![1.0 / variable.level_count() as f64; variable.level_count()]
            })
            .collect();

        for (index, variable) in variables.iter().enumerate() {
            let Some(margins) = resolved.get(&vec![index]) else {
                continue;
            };
            if margins.len() != variable.level_count() {
                continue;
            }
            let total: f64 = margins.values().map(|target| target.value).sum();
            if total <= f64::EPSILON {
                continue;
            }
            let mut dist = vec![0.0; variable.level_count()];
            for (combo, target) in margins {
                dist[combo[0]] = target.value / total;
            }
            dists[index] = dist;
        }

        self.space
            .cells()
            .map(|cell| {
                (0..variables.len())
                    .map(|variable| dists[variable][self.space.level_of(cell, variable)])
                    .product()
            })
            .collect()
    }

    fn combo_count(&self, subset: &[usize]) -> usize {
        subset
            .iter()
            .map(|&variable| self.space.variables()[variable].level_count())
            .product()
    }

    fn label(&self, subset: &[usize], combo: &[usize]) -> String {
        let variables = self.space.variables();
        subset
            .iter()
            .zip(combo)
            .map(|(&variable, &level)| {
                format!(
                    "{}={}",
                    variables[variable].name,
                    variables[variable]
                        .level_name(level)
                        .unwrap_or("<unknown>")
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthpop_core::Variable;

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

    fn animal_margin() -> ConstraintSpec {
        ConstraintSpec::margin(
            "animal_margin",
            ["animal"],
            [(vec!["dog"], 0.6), (vec!["cat"], 0.4)],
        )
    }

    #[test]
    fn absolute_margins_become_rows() {
        let builder = ConstraintBuilder::new(space());
        let problem = builder.build(&[animal_margin()]).expect("build");
        assert_eq!(problem.rows.len(), 2);
        let dog_row = &problem.rows[0];
        assert_eq!(dog_row.label, "animal=dog");
        assert_eq!(dog_row.cells, vec![0, 1]);
        assert!((dog_row.target - 0.6).abs() < 1e-12);
    }

    #[test]
    fn conditionals_convert_against_declared_margins() {
        let builder = ConstraintBuilder::new(space());
        let conditional = ConstraintSpec::conditional(
            "size_given_animal",
            ["size"],
            ["animal"],
            [
                (vec!["small"], vec!["dog"], 0.7),
                (vec!["large"], vec!["dog"], 0.3),
            ],
        );
        let problem = builder
            .build(&[animal_margin(), conditional])
            .expect("build");

        let joint = problem
            .rows
            .iter()
            .find(|row| row.label == "animal=dog,size=small")
            .expect("joint row");
        assert!((joint.target - 0.42).abs() < 1e-12);
        assert_eq!(joint.spec_id, "size_given_animal");
    }

    #[test]
    fn conditioning_margin_derives_from_complete_joint() {
        let builder = ConstraintBuilder::new(space());
        let joint = ConstraintSpec::margin(
            "joint",
            ["animal", "size"],
            [
                (vec!["dog", "small"], 0.42),
                (vec!["dog", "large"], 0.18),
                (vec!["cat", "small"], 0.28),
                (vec!["cat", "large"], 0.12),
            ],
        );
        let conditional = ConstraintSpec::conditional(
            "animal_given_size",
            ["animal"],
            ["size"],
            [(vec!["dog"], vec!["small"], 0.6)],
        );
        let problem = builder.build(&[joint, conditional]).expect("build");
        // P(size=small) derived as 0.7, so the converted target is 0.42 and
        // merges with the declared joint entry.
        assert!(
            problem
                .rows
                .iter()
                .any(|row| row.label == "animal=dog,size=small"
                    && (row.target - 0.42).abs() < 1e-9)
        );
    }

    #[test]
    fn anchorless_cycle_is_unresolved() {
        let builder = ConstraintBuilder::new(space());
        let a_given_b = ConstraintSpec::conditional(
            "animal_given_size",
            ["animal"],
            ["size"],
            [(vec!["dog"], vec!["small"], 0.5)],
        );
        let b_given_a = ConstraintSpec::conditional(
            "size_given_animal",
            ["size"],
            ["animal"],
            [(vec!["small"], vec!["dog"], 0.5)],
        );
        let err = builder.build(&[a_given_b, b_given_a]).unwrap_err();
        match err {
            BuildError::UnresolvedConditioning { spec_id, missing } => {
                assert_eq!(spec_id, "animal_given_size");
                assert_eq!(missing, "P(size)");
            }
            other => panic!("expected UnresolvedConditioning, got {other:?}"),
        }
    }

    #[test]
    fn disagreeing_duplicate_targets_conflict() {
        let builder = ConstraintBuilder::new(space());
        let duplicate =
            ConstraintSpec::margin("animal_again", ["animal"], [(vec!["dog"], 0.5)]);
        let err = builder.build(&[animal_margin(), duplicate]).unwrap_err();
        match err {
            BuildError::ConflictingConstraint { first, second, .. } => {
                assert_eq!(first, "animal_margin");
                assert_eq!(second, "animal_again");
            }
            other => panic!("expected ConflictingConstraint, got {other:?}"),
        }
    }

    #[test]
    fn agreeing_duplicate_targets_merge() {
        let builder = ConstraintBuilder::new(space());
        let duplicate =
            ConstraintSpec::margin("animal_again", ["animal"], [(vec!["dog"], 0.60001)])
                .with_tolerance(1e-3);
        let problem = builder.build(&[animal_margin(), duplicate]).expect("build");
        let dog_rows: Vec<_> = problem
            .rows
            .iter()
            .filter(|row| row.label == "animal=dog")
            .collect();
        assert_eq!(dog_rows.len(), 1);
        assert_eq!(dog_rows[0].spec_id, "animal_margin");
    }

    #[test]
    fn joint_target_exceeding_margin_conflicts() {
        let builder = ConstraintBuilder::new(space());
        let oversized = ConstraintSpec::margin(
            "dog_small",
            ["animal", "size"],
            [(vec!["dog", "small"], 0.9)],
        );
        let err = builder.build(&[animal_margin(), oversized]).unwrap_err();
        match err {
            BuildError::ConflictingConstraint {
                first,
                second,
                first_value,
                second_value,
                ..
            } => {
                assert_eq!(first, "animal_margin");
                assert_eq!(second, "dog_small");
                assert!((first_value - 0.6).abs() < 1e-12);
                assert!((second_value - 0.9).abs() < 1e-12);
            }
            other => panic!("expected ConflictingConstraint, got {other:?}"),
        }
    }

    #[test]
    fn reference_is_product_of_declared_margins() {
        let builder = ConstraintBuilder::new(space());
        let size_margin = ConstraintSpec::margin(
            "size_margin",
            ["size"],
            [(vec!["small"], 0.7), (vec!["large"], 0.3)],
        );
        let problem = builder
            .build(&[animal_margin(), size_margin])
            .expect("build");
        let expected = [0.42, 0.18, 0.28, 0.12];
        for (mass, want) in problem.reference.iter().zip(expected) {
            assert!((mass - want).abs() < 1e-12);
        }
    }

    #[test]
    fn reference_falls_back_to_uniform() {
        let builder = ConstraintBuilder::new(space());
        let problem = builder.build(&[animal_margin()]).expect("build");
        // size has no declared margin, so each animal mass splits evenly
        assert!((problem.reference[0] - 0.3).abs() < 1e-12);
        assert!((problem.reference[1] - 0.3).abs() < 1e-12);
        assert!((problem.reference[2] - 0.2).abs() < 1e-12);
    }
}
