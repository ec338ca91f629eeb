//! From merged candles to a per-bar trade signal.

use super::backtest::{run_backtest, BacktestOutcome};
use super::config::StrategyConfig;
use crate::broker::SimBroker;
use crate::calibration::{final_threshold, CalibrationModel, ProbabilityCalibrator};
use crate::data::{merge, MarketDataSource, MergedFrame};
use crate::error::PipelineError;
use crate::signals::{RsiSupertrend, SignalAggregator, SignalGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of the one-shot calibration stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub model: CalibrationModel,
    /// Youden-optimal probability cut, `+∞` when no cut beats chance.
    pub selected_threshold: f64,
    /// `max(selected, configured)`.
    pub final_threshold: f64,
    pub samples: usize,
    pub positives: usize,
}

/// Everything a full run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub frame: MergedFrame,
    pub calibration: Calibration,
    pub backtest: BacktestOutcome,
}

impl PipelineOutcome {
    pub fn final_value(&self) -> f64 {
        self.backtest.final_value
    }
}

/// Owns one run's collaborators. Cheap to build; build one per run.
pub struct TradeDecisionEngine {
    config: StrategyConfig,
    source: Arc<dyn MarketDataSource>,
    generator: RsiSupertrend,
    aggregator: SignalAggregator,
    calibrator: ProbabilityCalibrator,
}

impl TradeDecisionEngine {
    pub fn new(config: StrategyConfig, source: Arc<dyn MarketDataSource>) -> Result<Self, PipelineError> {
        config.validate()?;
        let aggregator = SignalAggregator::new(&config.effective_weights(), &config.sorted_intervals());
        Ok(Self {
            generator: RsiSupertrend::new(config.signal),
            calibrator: ProbabilityCalibrator::new(config.calibrator),
            aggregator,
            source,
            config,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &SignalAggregator {
        &self.aggregator
    }

    /// Fetch, merge and drop rows whose forward-fill has not resolved yet.
    pub fn prepare_data(&self) -> Result<MergedFrame, PipelineError> {
        let c = &self.config;
        let mut frame = merge(self.source.as_ref(), &c.symbol, &c.sorted_intervals(), c.start, c.end)?;
        let dropped = frame.drop_incomplete_prefix();
        if dropped > 0 {
            tracing::warn!(dropped, remaining = frame.len(), "dropped leading rows without higher-timeframe data");
        }
        tracing::info!(
            symbol = %c.symbol,
            base = %frame.base,
            rows = frame.len(),
            source = self.source.name(),
            "data prepared"
        );
        Ok(frame)
    }

    /// Attach one signal column per interval and the consensus score.
    pub fn compute_signals(&self, frame: &mut MergedFrame) {
        frame.signals.clear();
        for &interval in self.aggregator.order() {
            let column = frame
                .column(interval)
                .map(|candles| self.generator.generate_candles(candles))
                .unwrap_or_else(|| vec![0; frame.len()]);
            frame.signals.insert(interval, column);
        }

        let order = self.aggregator.order();
        let mut row = vec![0i8; order.len()];
        frame.score = (0..frame.len())
            .map(|i| {
                for (slot, iv) in row.iter_mut().zip(order) {
                    *slot = frame.signals[iv][i];
                }
                self.aggregator.score_row(&row)
            })
            .collect();

        let active = frame.signals.values().flatten().filter(|&&s| s != 0).count();
        tracing::debug!(rows = frame.len(), active, generator = self.generator.name(), "signals computed");
    }

    /// Fit on (score, next-bar-up) pairs and settle the entry threshold.
    pub fn calibrate(&self, frame: &MergedFrame) -> Result<Calibration, PipelineError> {
        let labels = label_next_return(frame.base_candles());
        let scores = &frame.score[..labels.len().min(frame.score.len())];
        let labels = &labels[..scores.len()];

        let model = self.calibrator.fit(scores, labels)?;
        let selected = self.calibrator.select_threshold(&model, scores, labels)?;
        let final_threshold = final_threshold(selected, self.config.probability_threshold);
        tracing::info!(
            selected_threshold = selected,
            configured_threshold = self.config.probability_threshold,
            final_threshold,
            auc = model.auc,
            "calibrated probability threshold"
        );

        Ok(Calibration {
            model,
            selected_threshold: selected,
            final_threshold,
            samples: labels.len(),
            positives: labels.iter().filter(|&&l| l).count(),
        })
    }

    /// Attach probability and trade-signal columns.
    pub fn decide(&self, frame: &mut MergedFrame, calibration: &Calibration) {
        frame.probability = calibration.model.predict_all(&frame.score);
        frame.trade_signal = frame
            .probability
            .iter()
            .map(|&p| trade_signal(p, calibration.final_threshold))
            .collect();
        let longs = frame.trade_signal.iter().filter(|&&s| s == 1).count();
        let shorts = frame.trade_signal.iter().filter(|&&s| s == -1).count();
        tracing::info!(longs, shorts, "trade signals decided");
    }

    /// All four stages, then the backtest.
    pub fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let mut frame = self.prepare_data()?;
        self.compute_signals(&mut frame);
        let calibration = self.calibrate(&frame)?;
        self.decide(&mut frame, &calibration);

        let broker = SimBroker::new(self.config.broker);
        let backtest = run_backtest(
            frame.base_candles(),
            &frame.trade_signal,
            self.config.bracket,
            broker,
        );
        tracing::info!(
            final_value = backtest.final_value,
            trades = backtest.trades.len(),
            "backtest finished"
        );

        Ok(PipelineOutcome {
            frame,
            calibration,
            backtest,
        })
    }
}

/// `label[i] = close[i+1] > close[i]`. One shorter than the input: the last
/// bar has no next return.
pub fn label_next_return(candles: &[crate::domain::Candle]) -> Vec<bool> {
    candles
        .windows(2)
        .map(|w| w[1].close / w[0].close - 1.0 > 0.0)
        .collect()
}

/// +1 at or above `threshold`, -1 at or below `1 - threshold`, else 0.
///
/// Below 0.5 both bands overlap; the short side is applied last and wins.
pub fn trade_signal(probability: f64, threshold: f64) -> i8 {
    let mut signal = 0;
    if probability >= threshold {
        signal = 1;
    }
    if probability <= 1.0 - threshold {
        signal = -1;
    }
    signal
}
