//! Pipeline error type.
//!
//! The three fatal conditions of a run each get their own variant so callers
//! (and tests) can match on them. Anything else a data source reports is
//! carried through `Source`.

use crate::data::provider::DataError;
use crate::domain::Interval;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no candles returned for {symbol} {interval}")]
    DataUnavailable { symbol: String, interval: Interval },

    #[error("base interval {base} and interval {other} share no timestamps")]
    MisalignedData { base: Interval, other: Interval },

    #[error("calibration needs both label classes, found {classes} distinct class(es) in {samples} samples")]
    InsufficientData { classes: usize, samples: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("data source error: {0}")]
    Source(DataError),
}

impl From<DataError> for PipelineError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Unavailable { symbol, interval } => {
                PipelineError::DataUnavailable { symbol, interval }
            }
            other => PipelineError::Source(other),
        }
    }
}
