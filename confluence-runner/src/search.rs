//! Seeded random search over weights, threshold and strategy parameters.
//!
//! Each trial draws its parameters from its own RNG, derived from the master
//! seed and the trial index with BLAKE3, so a search is reproducible whatever
//! order rayon happens to run the trials in. Candles are fetched once and the
//! in-memory snapshot is shared read-only by every trial; everything else
//! (engine, broker, controller) is built fresh per trial.

use std::sync::Arc;

use confluence_core::bracket::BracketParams;
use confluence_core::data::MarketDataSource;
use confluence_core::domain::Interval;
use confluence_core::engine::StrategyConfig;
use confluence_core::signals::{SignalParams, WeightSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::pipeline::{run_strategy, snapshot, RunError};

/// Bounds of the sampled parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub intervals: Vec<Interval>,
    pub threshold: (f64, f64),
    pub tune_strategy: bool,
}

impl SearchSpace {
    pub fn new(intervals: Vec<Interval>, tune_strategy: bool) -> Self {
        Self {
            intervals,
            threshold: (0.6, 0.95),
            tune_strategy,
        }
    }

    /// Draw one trial's parameters.
    ///
    /// Weights are uniform in `[0, 1]` per interval and then divided by their
    /// sum; an all-zero draw falls back to uniform weights.
    pub fn sample(&self, rng: &mut StdRng) -> TrialParams {
        let raw: WeightSet = self
            .intervals
            .iter()
            .map(|iv| (iv.signal_name(), rng.gen_range(0.0..=1.0)))
            .collect();
        let weights = if raw.sum() > 0.0 {
            raw.normalized()
        } else {
            WeightSet::uniform(&self.intervals)
        };
        let probability_threshold = rng.gen_range(self.threshold.0..=self.threshold.1);

        let (signal, bracket) = if self.tune_strategy {
            let signal = SignalParams {
                rsi_period: rng.gen_range(2..=6),
                rsi_overbought: rng.gen_range(70..=90) as f64,
                rsi_oversold: rng.gen_range(10..=40) as f64,
                st_period: rng.gen_range(7..=21),
                st_multiplier: stepped(rng, 1.0, 5.0, 0.1),
            };
            let bracket = BracketParams {
                sl_pct: stepped(rng, 0.003, 0.01, 0.0005),
                rr: stepped(rng, 1.2, 3.0, 0.1),
            };
            (Some(signal), Some(bracket))
        } else {
            (None, None)
        };

        TrialParams {
            weights,
            probability_threshold,
            signal,
            bracket,
        }
    }
}

/// `lo + k * step` for a uniform `k`, rounded to kill float noise.
fn stepped(rng: &mut StdRng, lo: f64, hi: f64, step: f64) -> f64 {
    let steps = ((hi - lo) / step).round() as u32;
    let k = rng.gen_range(0..=steps);
    let v = lo + k as f64 * step;
    (v * 1e6).round() / 1e6
}

/// Parameters of one trial. `None` keeps the base config's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParams {
    pub weights: WeightSet,
    pub probability_threshold: f64,
    pub signal: Option<SignalParams>,
    pub bracket: Option<BracketParams>,
}

impl TrialParams {
    pub fn apply(&self, base: &StrategyConfig) -> StrategyConfig {
        let mut config = base
            .clone()
            .with_weights(self.weights.clone())
            .with_probability_threshold(self.probability_threshold);
        if let Some(signal) = self.signal {
            config = config.with_signal(signal);
        }
        if let Some(bracket) = self.bracket {
            config = config.with_bracket(bracket);
        }
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub params: TrialParams,
    /// `None` when the trial's run failed.
    pub final_value: Option<f64>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct SearchOutcome {
    /// In trial-index order.
    pub trials: Vec<Trial>,
    pub best: Trial,
    /// Base config with the best trial's parameters applied.
    pub best_config: StrategyConfig,
    /// The shared snapshot, reusable for a final run.
    pub data: Arc<dyn MarketDataSource>,
}

/// Maximizes final equity over `trials` random draws.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    config: SearchConfig,
    parallel: bool,
}

impl RandomSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Trial RNG: first 8 bytes of BLAKE3(master seed ‖ trial index).
    pub fn trial_seed(master_seed: u64, index: usize) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&master_seed.to_le_bytes());
        hasher.update(&(index as u64).to_le_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }

    pub fn run(
        &self,
        base: &StrategyConfig,
        source: &dyn MarketDataSource,
    ) -> Result<SearchOutcome, RunError> {
        let data = snapshot(source, base)?;
        let space = SearchSpace::new(base.sorted_intervals(), self.config.tune_strategy);
        tracing::info!(
            trials = self.config.trials,
            seed = self.config.seed,
            tune_strategy = self.config.tune_strategy,
            "starting random search"
        );

        let run_trial = |index: usize| self.run_trial(index, &space, base, &data);
        let trials: Vec<Trial> = if self.parallel {
            (0..self.config.trials).into_par_iter().map(run_trial).collect()
        } else {
            (0..self.config.trials).map(run_trial).collect()
        };

        // Ties go to the lowest index.
        let best = trials
            .iter()
            .filter_map(|t| t.final_value.map(|v| (v, t)))
            .fold(None::<(f64, &Trial)>, |acc, (v, t)| match acc {
                Some((bv, _)) if bv >= v => acc,
                _ => Some((v, t)),
            })
            .map(|(_, t)| t.clone());

        let Some(best) = best else {
            let last_error = trials
                .iter()
                .rev()
                .find_map(|t| t.error.clone())
                .unwrap_or_default();
            return Err(RunError::NoSuccessfulTrials {
                trials: trials.len(),
                last_error,
            });
        };

        tracing::info!(
            best_trial = best.index,
            final_value = best.final_value,
            probability_threshold = best.params.probability_threshold,
            "search finished"
        );
        Ok(SearchOutcome {
            best_config: best.params.apply(base),
            best,
            trials,
            data,
        })
    }

    fn run_trial(
        &self,
        index: usize,
        space: &SearchSpace,
        base: &StrategyConfig,
        data: &Arc<dyn MarketDataSource>,
    ) -> Trial {
        let mut rng = StdRng::seed_from_u64(Self::trial_seed(self.config.seed, index));
        let params = space.sample(&mut rng);
        let result = run_strategy(params.apply(base), Arc::clone(data));

        let (final_value, error) = match result {
            Ok(outcome) => (Some(outcome.final_value()), None),
            Err(e) => {
                tracing::warn!(trial = index, error = %e, "trial failed");
                (None, Some(e.to_string()))
            }
        };
        tracing::debug!(trial = index, ?final_value, "trial finished");
        Trial {
            index,
            params,
            final_value,
            error,
        }
    }
}
