//! ROC curve, Youden's J and rank AUC.

use std::cmp::Ordering;

/// ROC operating points, one per threshold.
///
/// `thresholds[0]` is `+∞` (nothing predicted positive); the rest are the
/// distinct scores in decreasing order. A sample is predicted positive at
/// threshold `t` when `score >= t`.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Build from labels and scores. Returns `None` unless both classes are present.
    pub fn compute(labels: &[bool], scores: &[f64]) -> Option<Self> {
        let positives = labels.iter().filter(|&&l| l).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return None;
        }

        let mut pairs: Vec<(f64, bool)> = scores.iter().copied().zip(labels.iter().copied()).collect();
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        let mut curve = RocCurve {
            fpr: vec![0.0],
            tpr: vec![0.0],
            thresholds: vec![f64::INFINITY],
        };
        let (mut tp, mut fp) = (0usize, 0usize);
        let mut i = 0;
        while i < pairs.len() {
            let threshold = pairs[i].0;
            while i < pairs.len() && pairs[i].0 == threshold {
                if pairs[i].1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }
            curve.thresholds.push(threshold);
            curve.tpr.push(tp as f64 / positives as f64);
            curve.fpr.push(fp as f64 / negatives as f64);
        }
        Some(curve)
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// First index maximizing `tpr - fpr`.
    pub fn youden_index(&self) -> usize {
        let mut best = 0;
        let mut best_j = f64::NEG_INFINITY;
        for (i, (t, f)) in self.tpr.iter().zip(&self.fpr).enumerate() {
            let j = t - f;
            if j > best_j {
                best_j = j;
                best = i;
            }
        }
        best
    }

    pub fn youden_threshold(&self) -> f64 {
        self.thresholds[self.youden_index()]
    }

    /// Trapezoidal area under the curve.
    pub fn area(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(f, t)| (f[1] - f[0]) * (t[1] + t[0]) / 2.0)
            .sum()
    }
}

/// Probability that a random positive outranks a random negative, ties as ½.
///
/// NaN when either class is missing.
pub fn roc_auc(labels: &[bool], scores: &[f64]) -> f64 {
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }

    let mut idx: Vec<usize> = (0..scores.len()).collect();
    idx.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    // Average 1-based ranks across tie groups.
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && scores[idx[j + 1]] == scores[idx[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &idx[i..=j] {
            if labels[k] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let p = positives as f64;
    (rank_sum_pos - p * (p + 1.0) / 2.0) / (p * negatives as f64)
}
