use thiserror::Error;

use synthpop_solve::BuildError;

use crate::model::RunReport;

/// Errors emitted by the record sampler.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The requested row count exceeds the configured safety bound.
    #[error("requested {rows} rows exceeds the sampling safety bound of {max_rows}")]
    SamplingOverflow { rows: u64, max_rows: u64 },
}

/// Errors emitted by the reconstruction pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input error: {0}")]
    Input(#[from] synthpop_core::Error),
    #[error("constraint build error: {0}")]
    Build(#[from] BuildError),
    #[error("validation error: {0}")]
    Eval(#[from] synthpop_eval::EvalError),
    #[error("sampling error: {0}")]
    Sample(#[from] SampleError),
    /// Solve or validation failure with full diagnostics attached.
    #[error("reconstruction failed")]
    Failed(Box<RunReport>),
}
