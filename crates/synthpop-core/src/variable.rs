use serde::{Deserialize, Serialize};

/// A categorical variable with a fixed, ordered set of levels.
///
/// Levels are addressed by position for cell arithmetic and by name at the
/// I/O boundary. A variable is immutable once declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub levels: Vec<String>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        levels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|item| item == level)
    }

    pub fn level_name(&self, index: usize) -> Option<&str> {
        self.levels.get(index).map(String::as_str)
    }
}
