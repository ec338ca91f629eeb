//! Immutable run configuration.

use crate::bracket::BracketParams;
use crate::broker::BrokerConfig;
use crate::calibration::CalibratorConfig;
use crate::domain::Interval;
use crate::error::PipelineError;
use crate::signals::{SignalParams, WeightSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything one pipeline run needs, fixed at construction.
///
/// An empty `weights` set means uniform `1/n` weights over `intervals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub symbol: String,
    pub intervals: Vec<Interval>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub weights: WeightSet,
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f64,
    #[serde(default)]
    pub signal: SignalParams,
    #[serde(default)]
    pub bracket: BracketParams,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub calibrator: CalibratorConfig,
}

fn default_probability_threshold() -> f64 {
    0.8
}

impl StrategyConfig {
    pub fn new(
        symbol: impl Into<String>,
        intervals: Vec<Interval>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            intervals,
            start,
            end,
            weights: WeightSet::new(),
            probability_threshold: default_probability_threshold(),
            signal: SignalParams::default(),
            bracket: BracketParams::default(),
            broker: BrokerConfig::default(),
            calibrator: CalibratorConfig::default(),
        }
    }

    pub fn with_weights(mut self, weights: WeightSet) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_probability_threshold(mut self, threshold: f64) -> Self {
        self.probability_threshold = threshold;
        self
    }

    pub fn with_signal(mut self, signal: SignalParams) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_bracket(mut self, bracket: BracketParams) -> Self {
        self.bracket = bracket;
        self
    }

    pub fn with_broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }

    /// Intervals sorted by duration, duplicates removed.
    pub fn sorted_intervals(&self) -> Vec<Interval> {
        let mut ivs = self.intervals.clone();
        ivs.sort();
        ivs.dedup();
        ivs
    }

    pub fn base_interval(&self) -> Option<Interval> {
        self.intervals.iter().min().copied()
    }

    pub fn effective_weights(&self) -> WeightSet {
        if self.weights.is_empty() {
            WeightSet::uniform(&self.sorted_intervals())
        } else {
            self.weights.clone()
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = PipelineError::InvalidConfig;
        if self.symbol.trim().is_empty() {
            return Err(invalid("symbol is empty".into()));
        }
        if self.intervals.is_empty() {
            return Err(invalid("at least one interval is required".into()));
        }
        if self.start > self.end {
            return Err(invalid(format!("start {} is after end {}", self.start, self.end)));
        }
        if !(0.0..=1.0).contains(&self.probability_threshold) {
            return Err(invalid(format!(
                "probability_threshold must be in [0, 1], got {}",
                self.probability_threshold
            )));
        }
        if self.weights.iter().any(|(_, w)| !w.is_finite()) {
            return Err(invalid("weights must be finite".into()));
        }
        self.signal.validate().map_err(invalid)?;
        self.bracket.validate().map_err(invalid)?;
        self.broker.validate().map_err(invalid)?;
        Ok(())
    }

    /// Stable 64-hex-char BLAKE3 id of the canonical JSON form.
    pub fn config_id(&self) -> String {
        // BTreeMap-backed fields keep the JSON key order deterministic.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config() -> StrategyConfig {
        StrategyConfig::new(
            "BTCUSDT",
            vec![Interval::H1, Interval::M5, Interval::M15],
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn defaults_follow_reference_run() {
        let c = config();
        assert_eq!(c.probability_threshold, 0.8);
        assert_eq!(c.base_interval(), Some(Interval::M5));
        assert_eq!(c.sorted_intervals(), vec![Interval::M5, Interval::M15, Interval::H1]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_weights_fall_back_to_uniform() {
        let w = config().effective_weights();
        assert_eq!(w.len(), 3);
        assert!((w.for_interval(Interval::H1) - 1.0 / 3.0).abs() < 1e-12);

        let custom = WeightSet::new().with("sig_5m", 1.0);
        assert_eq!(config().with_weights(custom.clone()).effective_weights(), custom);
    }

    #[test]
    fn validation_catches_bad_inputs() {
        assert!(config().with_probability_threshold(1.5).validate().is_err());
        let mut c = config();
        c.intervals.clear();
        assert!(c.validate().is_err());
        let mut c = config();
        std::mem::swap(&mut c.start, &mut c.end);
        assert!(c.validate().is_err());
        let bad = config().with_bracket(BracketParams { sl_pct: 0.0, rr: 1.5 });
        assert!(matches!(bad.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn config_id_tracks_parameters() {
        let a = config();
        let b = config().with_probability_threshold(0.7);
        assert_eq!(a.config_id(), config().config_id());
        assert_ne!(a.config_id(), b.config_id());
        assert_eq!(a.config_id().len(), 64);
    }
}
