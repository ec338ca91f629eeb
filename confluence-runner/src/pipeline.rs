//! Wires a `PipelineConfig` to a data source and the decision engine.

use std::sync::Arc;

use confluence_core::data::{
    BinanceFuturesSource, CsvSource, DataError, MarketDataSource, MemorySource, SyntheticSource,
};
use confluence_core::engine::{PipelineOutcome, StrategyConfig, TradeDecisionEngine};
use confluence_core::PipelineError;
use thiserror::Error;

use crate::config::{ConfigError, DataConfig};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("every one of {trials} search trials failed; last error: {last_error}")]
    NoSuccessfulTrials { trials: usize, last_error: String },
}

impl From<DataError> for RunError {
    fn from(err: DataError) -> Self {
        RunError::Pipeline(err.into())
    }
}

/// Instantiate the configured candle source.
pub fn build_source(data: &DataConfig) -> Result<Arc<dyn MarketDataSource>, RunError> {
    let source: Arc<dyn MarketDataSource> = match data {
        DataConfig::Binance { base_url } => Arc::new(BinanceFuturesSource::new(base_url.as_str())?),
        DataConfig::Csv { dir } => Arc::new(CsvSource::new(dir)),
        DataConfig::Synthetic { volatility } => {
            let mut source = SyntheticSource::new();
            if let Some(v) = volatility {
                source = source.with_volatility(*v);
            }
            Arc::new(source)
        }
    };
    tracing::debug!(source = source.name(), "data source ready");
    Ok(source)
}

/// Fetch every interval of `config` once into memory.
///
/// Repeated runs over the same range (search trials, the final run after a
/// search) then never touch the network again.
pub fn snapshot(
    source: &dyn MarketDataSource,
    config: &StrategyConfig,
) -> Result<Arc<dyn MarketDataSource>, RunError> {
    let memory = MemorySource::snapshot(
        source,
        &config.symbol,
        &config.sorted_intervals(),
        config.start,
        config.end,
    )?;
    Ok(Arc::new(memory))
}

/// One full pipeline run.
pub fn run_strategy(
    config: StrategyConfig,
    source: Arc<dyn MarketDataSource>,
) -> Result<PipelineOutcome, RunError> {
    let engine = TradeDecisionEngine::new(config, source)?;
    Ok(engine.run()?)
}
