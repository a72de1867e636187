use serde::{Deserialize, Serialize};

/// Default per-spec tolerance when the caller does not supply one.
pub const DEFAULT_SPEC_TOLERANCE: f64 = 1e-4;

/// One target value inside a constraint spec.
///
/// `levels` names one level per target variable, in target order;
/// `given_levels` names one level per conditioning variable and is empty for
/// absolute specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecEntry {
    pub levels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given_levels: Vec<String>,
    pub probability: f64,
}

/// A declared statistic over a subset of variables.
///
/// Absolute form: `entries` hold joint/marginal probabilities over the
/// `target` subset. Conditional form: `given` is non-empty and `entries`
/// hold `P(target levels | given levels)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub id: String,
    pub target: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
    pub entries: Vec<SpecEntry>,
    pub tolerance: f64,
}

impl ConstraintSpec {
    /// Absolute margin over `target`, with `(levels, probability)` entries.
    pub fn margin(
        id: impl Into<String>,
        target: impl IntoIterator<Item = impl Into<String>>,
        entries: impl IntoIterator<Item = (Vec<&'static str>, f64)>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into_iter().map(Into::into).collect(),
            given: Vec::new(),
            entries: entries
                .into_iter()
                .map(|(levels, probability)| SpecEntry {
                    levels: levels.into_iter().map(str::to_string).collect(),
                    given_levels: Vec::new(),
                    probability,
                })
                .collect(),
            tolerance: DEFAULT_SPEC_TOLERANCE,
        }
    }

    /// Conditional distribution of `target` given `given`, with
    /// `(levels, given_levels, probability)` entries.
    pub fn conditional(
        id: impl Into<String>,
        target: impl IntoIterator<Item = impl Into<String>>,
        given: impl IntoIterator<Item = impl Into<String>>,
        entries: impl IntoIterator<Item = (Vec<&'static str>, Vec<&'static str>, f64)>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into_iter().map(Into::into).collect(),
            given: given.into_iter().map(Into::into).collect(),
            entries: entries
                .into_iter()
                .map(|(levels, given_levels, probability)| SpecEntry {
                    levels: levels.into_iter().map(str::to_string).collect(),
                    given_levels: given_levels.into_iter().map(str::to_string).collect(),
                    probability,
                })
                .collect(),
            tolerance: DEFAULT_SPEC_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn is_conditional(&self) -> bool {
        !self.given.is_empty()
    }
}
