//! Weighted consensus across timeframes.

use crate::domain::Interval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal name → weight. Weights need not sum to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightSet(BTreeMap<String, f64>);

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `1/n` per interval.
    pub fn uniform(intervals: &[Interval]) -> Self {
        let w = if intervals.is_empty() {
            0.0
        } else {
            1.0 / intervals.len() as f64
        };
        intervals
            .iter()
            .map(|iv| (iv.signal_name(), w))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, weight: f64) {
        self.0.insert(name.into(), weight);
    }

    pub fn with(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.insert(name, weight);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn for_interval(&self, interval: Interval) -> f64 {
        self.get(&interval.signal_name()).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Divide every weight by the sum. A zero-sum set is returned unchanged.
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if total == 0.0 || !total.is_finite() {
            return self.clone();
        }
        self.0.iter().map(|(k, v)| (k.clone(), v / total)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f64)> for WeightSet {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Stateless scorer over a fixed interval order.
///
/// The map-based `score` and the positional `score_row` fold in the same
/// order, so they agree bit for bit on the same inputs.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    order: Vec<Interval>,
    /// Weights in fold order: one per interval in `order`, then any weight
    /// names that match no configured interval.
    entries: Vec<(String, f64)>,
}

impl SignalAggregator {
    pub fn new(weights: &WeightSet, order: &[Interval]) -> Self {
        let mut entries: Vec<(String, f64)> = order
            .iter()
            .map(|iv| (iv.signal_name(), weights.for_interval(*iv)))
            .collect();
        for (name, w) in weights.iter() {
            if !entries.iter().any(|(n, _)| n == name) {
                entries.push((name.to_string(), w));
            }
        }
        Self {
            order: order.to_vec(),
            entries,
        }
    }

    pub fn order(&self) -> &[Interval] {
        &self.order
    }

    /// `Σ weight[name] · signals[name]`, missing signals count as 0.
    pub fn score(&self, signals: &BTreeMap<String, i8>) -> f64 {
        self.entries.iter().fold(0.0, |acc, (name, w)| {
            acc + w * f64::from(signals.get(name).copied().unwrap_or(0))
        })
    }

    /// +1 above `threshold`, -1 below `-threshold`, 0 otherwise.
    pub fn classify(&self, signals: &BTreeMap<String, i8>, threshold: f64) -> i8 {
        classify_score(self.score(signals), threshold)
    }

    /// Score one row of signals given in `order()`. Missing trailing slots count as 0.
    pub fn score_row(&self, row: &[i8]) -> f64 {
        self.entries
            .iter()
            .take(self.order.len())
            .zip(row)
            .fold(0.0, |acc, ((_, w), &s)| acc + w * f64::from(s))
    }
}

pub fn classify_score(score: f64, threshold: f64) -> i8 {
    if score > threshold {
        1
    } else if score < -threshold {
        -1
    } else {
        0
    }
}
