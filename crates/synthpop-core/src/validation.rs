use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::spec::ConstraintSpec;
use crate::variable::Variable;

/// Validate internal consistency of declared variables and constraint specs.
///
/// This checks:
/// - duplicate variable names, empty or duplicate level lists
/// - duplicate spec ids, empty targets, target/given overlap
/// - references to unknown variables or levels
/// - probabilities outside [0, 1], non-finite values, negative tolerances
/// - duplicate level combinations within one spec
pub fn validate_inputs(variables: &[Variable], specs: &[ConstraintSpec]) -> Result<()> {
    let mut names = BTreeSet::new();
    for variable in variables {
        if !names.insert(variable.name.as_str()) {
            return Err(Error::InvalidInput(format!(
                "duplicate variable name: {}",
                variable.name
            )));
        }
        if variable.levels.is_empty() {
            return Err(Error::InvalidInput(format!(
                "variable '{}' has no levels",
                variable.name
            )));
        }
        let mut levels = BTreeSet::new();
        for level in &variable.levels {
            if !levels.insert(level.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate level name: {}.{}",
                    variable.name, level
                )));
            }
        }
    }

    let mut spec_ids = BTreeSet::new();
    for spec in specs {
        if !spec_ids.insert(spec.id.as_str()) {
            return Err(Error::InvalidInput(format!(
                "duplicate spec id: {}",
                spec.id
            )));
        }
        if spec.target.is_empty() {
            return Err(Error::InvalidInput(format!(
                "spec '{}' has an empty target subset",
                spec.id
            )));
        }
        if !spec.tolerance.is_finite() || spec.tolerance < 0.0 {
            return Err(Error::InvalidInput(format!(
                "spec '{}' has an invalid tolerance {}",
                spec.id, spec.tolerance
            )));
        }

        validate_subset(variables, &spec.id, "target", &spec.target)?;
        validate_subset(variables, &spec.id, "given", &spec.given)?;
        for name in &spec.target {
            if spec.given.contains(name) {
                return Err(Error::InvalidInput(format!(
                    "spec '{}' lists '{}' in both target and given",
                    spec.id, name
                )));
            }
        }

        let mut combos = BTreeSet::new();
        for entry in &spec.entries {
            if entry.levels.len() != spec.target.len() {
                return Err(Error::InvalidInput(format!(
                    "spec '{}' entry has {} levels for {} target variables",
                    spec.id,
                    entry.levels.len(),
                    spec.target.len()
                )));
            }
            if entry.given_levels.len() != spec.given.len() {
                return Err(Error::InvalidInput(format!(
                    "spec '{}' entry has {} given levels for {} given variables",
                    spec.id,
                    entry.given_levels.len(),
                    spec.given.len()
                )));
            }
            if !entry.probability.is_finite()
                || entry.probability < 0.0
                || entry.probability > 1.0
            {
                return Err(Error::InvalidInput(format!(
                    "spec '{}' has probability {} outside [0, 1]",
                    spec.id, entry.probability
                )));
            }

            validate_levels(variables, &spec.id, &spec.target, &entry.levels)?;
            validate_levels(variables, &spec.id, &spec.given, &entry.given_levels)?;

            let key = (entry.levels.clone(), entry.given_levels.clone());
            if !combos.insert(key) {
                return Err(Error::InvalidInput(format!(
                    "spec '{}' declares the combination [{}] twice",
                    spec.id,
                    entry.levels.join(",")
                )));
            }
        }
    }

    Ok(())
}

fn validate_subset(
    variables: &[Variable],
    spec_id: &str,
    role: &str,
    subset: &[String],
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in subset {
        if variables.iter().all(|variable| &variable.name != name) {
            return Err(Error::InvalidInput(format!(
                "spec '{}' references unknown {} variable '{}'",
                spec_id, role, name
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::InvalidInput(format!(
                "spec '{}' lists {} variable '{}' twice",
                spec_id, role, name
            )));
        }
    }
    Ok(())
}

fn validate_levels(
    variables: &[Variable],
    spec_id: &str,
    subset: &[String],
    levels: &[String],
) -> Result<()> {
    for (name, level) in subset.iter().zip(levels) {
        let variable = variables
            .iter()
            .find(|variable| &variable.name == name)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "spec '{}' references unknown variable '{}'",
                    spec_id, name
                ))
            })?;
        if variable.level_index(level).is_none() {
            return Err(Error::InvalidInput(format!(
                "spec '{}' references unknown level '{}.{}'",
                spec_id, name, level
            )));
        }
    }
    Ok(())
}
