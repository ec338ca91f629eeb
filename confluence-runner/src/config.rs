//! TOML run configuration.
//!
//! ```toml
//! symbol = "BTCUSDT"
//! intervals = ["5m", "15m", "1h"]
//! start = "2024-01-01"
//! end = "2024-03-01"
//! probability_threshold = 0.8
//!
//! [weights]
//! sig_5m = 0.5
//! sig_15m = 0.3
//! sig_1h = 0.2
//!
//! [strategy]
//! rsi_period = 3
//! sl_pct = 0.005
//! rr = 1.5
//!
//! [broker]
//! cash = 100000.0
//! commission = 0.005
//! leverage = 10.0
//!
//! [data]
//! source = "binance"
//!
//! [search]
//! trials = 50
//! seed = 42
//! ```
//!
//! Every section is optional. Missing fields take the engine defaults, and an
//! empty `[weights]` table means uniform weights.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use confluence_core::bracket::BracketParams;
use confluence_core::broker::BrokerConfig;
use confluence_core::data::binance::DEFAULT_BASE_URL;
use confluence_core::domain::Interval;
use confluence_core::engine::StrategyConfig;
use confluence_core::signals::{SignalParams, WeightSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field} '{value}': expected YYYY-MM-DD or RFC 3339")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub symbol: String,
    #[serde(default = "default_intervals")]
    pub intervals: Vec<Interval>,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub weights: WeightSet,
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f64,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_intervals() -> Vec<Interval> {
    vec![Interval::M5, Interval::M15, Interval::H1]
}

fn default_probability_threshold() -> f64 {
    0.8
}

/// Signal and risk overrides. Unset fields keep the engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySection {
    pub rsi_period: Option<usize>,
    pub rsi_overbought: Option<f64>,
    pub rsi_oversold: Option<f64>,
    pub st_period: Option<usize>,
    pub st_multiplier: Option<f64>,
    pub sl_pct: Option<f64>,
    pub rr: Option<f64>,
}

impl StrategySection {
    pub fn signal_params(&self) -> SignalParams {
        let d = SignalParams::default();
        SignalParams {
            rsi_period: self.rsi_period.unwrap_or(d.rsi_period),
            rsi_overbought: self.rsi_overbought.unwrap_or(d.rsi_overbought),
            rsi_oversold: self.rsi_oversold.unwrap_or(d.rsi_oversold),
            st_period: self.st_period.unwrap_or(d.st_period),
            st_multiplier: self.st_multiplier.unwrap_or(d.st_multiplier),
        }
    }

    pub fn bracket_params(&self) -> BracketParams {
        let d = BracketParams::default();
        BracketParams {
            sl_pct: self.sl_pct.unwrap_or(d.sl_pct),
            rr: self.rr.unwrap_or(d.rr),
        }
    }
}

/// Where candles come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum DataConfig {
    Binance {
        #[serde(default = "default_base_url")]
        base_url: String,
    },
    Csv {
        dir: PathBuf,
    },
    Synthetic {
        #[serde(default)]
        volatility: Option<f64>,
    },
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::Binance {
            base_url: default_base_url(),
        }
    }
}

impl DataConfig {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataConfig::Synthetic { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub trials: usize,
    pub seed: u64,
    /// Also sample signal and bracket parameters, not just weights and threshold.
    pub tune_strategy: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            trials: 50,
            seed: 42,
            tune_strategy: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&s)
    }

    /// Minimal config for flag-only invocations.
    pub fn new(symbol: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            intervals: default_intervals(),
            start: start.into(),
            end: end.into(),
            weights: WeightSet::new(),
            probability_threshold: default_probability_threshold(),
            strategy: StrategySection::default(),
            broker: BrokerConfig::default(),
            data: DataConfig::default(),
            search: SearchConfig::default(),
        }
    }

    pub fn start_time(&self) -> Result<DateTime<Utc>, ConfigError> {
        parse_bound("start", &self.start, NaiveTime::default())
    }

    /// A bare date as `end` covers that whole day.
    pub fn end_time(&self) -> Result<DateTime<Utc>, ConfigError> {
        let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::default());
        parse_bound("end", &self.end, last_second)
    }

    /// Resolve into the engine's immutable config and validate it.
    pub fn to_strategy(&self) -> Result<StrategyConfig, ConfigError> {
        let config = StrategyConfig::new(
            self.symbol.clone(),
            self.intervals.clone(),
            self.start_time()?,
            self.end_time()?,
        )
        .with_weights(self.weights.clone())
        .with_probability_threshold(self.probability_threshold)
        .with_signal(self.strategy.signal_params())
        .with_bracket(self.strategy.bracket_params())
        .with_broker(self.broker);

        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.search.trials == 0 {
            return Err(ConfigError::Invalid("search.trials must be at least 1".into()));
        }
        Ok(config)
    }
}

fn parse_bound(field: &'static str, value: &str, time: NaiveTime) -> Result<DateTime<Utc>, ConfigError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(time).and_utc())
        .map_err(|_| ConfigError::InvalidDate {
            field,
            value: value.to_string(),
        })
}
