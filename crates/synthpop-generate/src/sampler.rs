use std::cmp::Ordering;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use synthpop_core::JointTable;

use crate::errors::SampleError;
use crate::model::SampleMode;

/// One fully instantiated synthetic record: a level name per variable, in
/// variable declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticRecord {
    pub levels: Vec<String>,
}

/// An ordered sequence of synthetic records plus the column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticDataset {
    pub columns: Vec<String>,
    pub records: Vec<SyntheticRecord>,
}

impl SyntheticDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOptions {
    pub rows: u64,
    pub mode: SampleMode,
    pub seed: u64,
    /// Safety bound on the requested row count.
    pub max_rows: u64,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            rows: 1000,
            mode: SampleMode::Stochastic,
            seed: 0,
            max_rows: 5_000_000,
        }
    }
}

/// Draws synthetic records from a validated joint table.
///
/// Stochastic mode derives one RNG stream per row from the seed, so output
/// is deterministic for a fixed seed and would stay identical under any
/// parallel split of the row range. Proportional mode is deterministic
/// without a seed.
#[derive(Debug, Clone)]
pub struct RecordSampler {
    options: SampleOptions,
}

impl RecordSampler {
    pub fn new(options: SampleOptions) -> Self {
        Self { options }
    }

    pub fn sample(&self, table: &JointTable) -> Result<SyntheticDataset, SampleError> {
        if self.options.rows > self.options.max_rows {
            return Err(SampleError::SamplingOverflow {
                rows: self.options.rows,
                max_rows: self.options.max_rows,
            });
        }

        let dataset = match self.options.mode {
            SampleMode::Stochastic => self.stochastic(table),
            SampleMode::Proportional => self.proportional(table),
        };
        info!(
            rows = dataset.records.len(),
            mode = ?self.options.mode,
            "dataset sampled"
        );
        Ok(dataset)
    }

    /// N independent categorical draws over cells.
    fn stochastic(&self, table: &JointTable) -> SyntheticDataset {
        let space = table.space();
        let mut cumulative = Vec::with_capacity(space.cell_count());
        let mut total = 0.0;
        for cell in space.cells() {
            total += table.mass(cell).max(0.0);
            cumulative.push(total);
        }

        let mut records = Vec::with_capacity(self.options.rows as usize);
        for row_index in 0..self.options.rows {
            let mut rng = ChaCha8Rng::seed_from_u64(hash_row_seed(self.options.seed, row_index));
            let draw = rng.random::<f64>() * total;
            let cell = cumulative
                .partition_point(|&bound| bound <= draw)
                .min(space.cell_count() - 1);
            records.push(record_for(table, cell));
        }

        dataset(table, records)
    }

    /// Largest-remainder allocation: floor the ideal count per cell, then
    /// hand the leftover units to the largest fractional remainders,
    /// breaking ties by ascending cell id.
    fn proportional(&self, table: &JointTable) -> SyntheticDataset {
        let ideal = table.expected_counts(self.options.rows);
        let mut counts: Vec<u64> = ideal.iter().map(|count| count.floor() as u64).collect();
        let assigned: u64 = counts.iter().sum();
        let leftover = self.options.rows - assigned;

        let mut remainders: Vec<(usize, f64)> = ideal
            .iter()
            .enumerate()
            .map(|(cell, count)| (cell, count - count.floor()))
            .collect();
        remainders.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        for &(cell, _) in remainders.iter().take(leftover as usize) {
            counts[cell] += 1;
        }

        let mut records = Vec::with_capacity(self.options.rows as usize);
        for (cell, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                records.push(record_for(table, cell));
            }
        }

        dataset(table, records)
    }
}

fn record_for(table: &JointTable, cell: usize) -> SyntheticRecord {
    let space = table.space();
    let levels = space
        .decode(cell)
        .into_iter()
        .zip(space.variables())
        .map(|(level, variable)| {
            variable
                .level_name(level)
                .unwrap_or("<unknown>")
                .to_string()
        })
        .collect();
    SyntheticRecord { levels }
}

fn dataset(table: &JointTable, records: Vec<SyntheticRecord>) -> SyntheticDataset {
    SyntheticDataset {
        columns: table
            .space()
            .variables()
            .iter()
            .map(|variable| variable.name.clone())
            .collect(),
        records,
    }
}

fn hash_row_seed(seed: u64, row_index: u64) -> u64 {
    let mut hash = seed ^ row_index.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= 0xcbf29ce484222325;
    hash.wrapping_mul(0x100000001b3)
}
