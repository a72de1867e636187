use std::ops::Range;

use crate::error::{Error, Result};
use crate::variable::Variable;

/// The Cartesian-product cell space over an ordered list of variables.
///
/// A cell is a mixed-radix index `0 <= id < prod(level counts)`; the last
/// declared variable varies fastest. Cells are derived by arithmetic and
/// never materialized, so memory use is proportional to what is streamed.
#[derive(Debug, Clone)]
pub struct CellSpace {
    variables: Vec<Variable>,
    radices: Vec<usize>,
    strides: Vec<usize>,
    cell_count: usize,
}

impl CellSpace {
    /// Build the cell space, enforcing the configured ceiling.
    ///
    /// Fails with [`Error::SpaceOverflow`] when the level-count product
    /// exceeds `max_cells`. The ceiling documents the combinatorial bound of
    /// the reconstruction problem; it is a hard limit, not a heuristic.
    pub fn new(variables: Vec<Variable>, max_cells: u64) -> Result<Self> {
        if variables.is_empty() {
            return Err(Error::InvalidInput(
                "at least one variable is required".to_string(),
            ));
        }

        let mut product: u128 = 1;
        for variable in &variables {
            if variable.levels.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "variable '{}' has no levels",
                    variable.name
                )));
            }
            product = product.saturating_mul(variable.levels.len() as u128);
            if product > max_cells as u128 {
                return Err(Error::SpaceOverflow {
                    cells: product,
                    max_cells,
                });
            }
        }

        let radices: Vec<usize> = variables.iter().map(Variable::level_count).collect();
        let mut strides = vec![1_usize; radices.len()];
        for index in (0..radices.len().saturating_sub(1)).rev() {
            strides[index] = strides[index + 1] * radices[index + 1];
        }

        Ok(Self {
            variables,
            radices,
            strides,
            cell_count: product as usize,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|item| item.name == name)
    }

    /// O(1) mixed-radix decode of one variable's level within a cell.
    pub fn level_of(&self, cell: usize, variable: usize) -> usize {
        (cell / self.strides[variable]) % self.radices[variable]
    }

    /// Full level assignment for a cell, one index per variable.
    pub fn decode(&self, cell: usize) -> Vec<usize> {
        (0..self.variables.len())
            .map(|variable| self.level_of(cell, variable))
            .collect()
    }

    /// Mixed-radix encode of a full level assignment.
    pub fn encode(&self, levels: &[usize]) -> usize {
        debug_assert_eq!(levels.len(), self.variables.len());
        levels
            .iter()
            .zip(&self.strides)
            .map(|(level, stride)| level * stride)
            .sum()
    }

    /// Lazy, finite, restartable stream of every cell id.
    pub fn cells(&self) -> Range<usize> {
        0..self.cell_count
    }

    /// Projection of a cell onto a variable subset, in subset order.
    pub fn project(&self, cell: usize, subset: &[usize]) -> Vec<usize> {
        subset
            .iter()
            .map(|&variable| self.level_of(cell, variable))
            .collect()
    }

    /// Whether a cell's projection onto `subset` equals `combo`.
    pub fn matches(&self, cell: usize, subset: &[usize], combo: &[usize]) -> bool {
        subset
            .iter()
            .zip(combo)
            .all(|(&variable, &level)| self.level_of(cell, variable) == level)
    }
}
