use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::space::CellSpace;

/// A joint probability table over a cell space.
///
/// Built once from a solver or IPF outcome and never mutated; corrections
/// always produce a new table. Entries are expected to be non-negative and
/// to sum to one within tolerance, which the validator enforces.
#[derive(Debug, Clone)]
pub struct JointTable {
    space: Arc<CellSpace>,
    masses: Vec<f64>,
}

impl JointTable {
    pub fn from_masses(space: Arc<CellSpace>, masses: Vec<f64>) -> Result<Self> {
        if masses.len() != space.cell_count() {
            return Err(Error::InvalidInput(format!(
                "mass vector has {} entries for a space of {} cells",
                masses.len(),
                space.cell_count()
            )));
        }
        Ok(Self { space, masses })
    }

    pub fn space(&self) -> &CellSpace {
        &self.space
    }

    pub fn shared_space(&self) -> Arc<CellSpace> {
        Arc::clone(&self.space)
    }

    pub fn mass(&self, cell: usize) -> f64 {
        self.masses[cell]
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    /// Achieved margin over a variable subset: level combination (in subset
    /// order) to summed mass.
    pub fn margin(&self, subset: &[usize]) -> BTreeMap<Vec<usize>, f64> {
        let mut margin: BTreeMap<Vec<usize>, f64> = BTreeMap::new();
        for cell in self.space.cells() {
            let combo = self.space.project(cell, subset);
            *margin.entry(combo).or_insert(0.0) += self.masses[cell];
        }
        margin
    }

    /// Summed mass of every cell matching a level combination on a subset.
    pub fn combo_mass(&self, subset: &[usize], combo: &[usize]) -> f64 {
        self.space
            .cells()
            .filter(|&cell| self.space.matches(cell, subset, combo))
            .map(|cell| self.masses[cell])
            .sum()
    }

    /// Ideal real-valued record count per cell for a target row count.
    pub fn expected_counts(&self, rows: u64) -> Vec<f64> {
        let total = self.total_mass();
        if total <= 0.0 {
            return vec![0.0; self.masses.len()];
        }
        self.masses
            .iter()
            .map(|mass| mass / total * rows as f64)
            .collect()
    }
}
