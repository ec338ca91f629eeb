//! Score → probability calibration and threshold selection.
//!
//! A one-feature logistic model maps the consensus score to the probability
//! that the next base bar closes higher. The slope is kept non-negative so
//! that probability never decreases as the score rises.

pub mod logistic;
pub mod roc;

pub use logistic::{LogisticFit, LogisticModel};
pub use roc::{roc_auc, RocCurve};

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratorConfig {
    /// Inverse L2 strength on the slope.
    pub c: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tolerance: 1e-8,
        }
    }
}

/// Fitted monotonic mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationModel {
    pub intercept: f64,
    pub slope: f64,
    /// In-sample ROC AUC of the fitted probabilities.
    pub auc: f64,
}

impl CalibrationModel {
    pub fn predict_proba(&self, score: f64) -> f64 {
        logistic::sigmoid(self.intercept + self.slope * score)
    }

    pub fn predict_all(&self, scores: &[f64]) -> Vec<f64> {
        scores.iter().map(|&s| self.predict_proba(s)).collect()
    }

    /// ROC over the model's probabilities on `(scores, labels)`.
    pub fn roc(&self, scores: &[f64], labels: &[bool]) -> Result<RocCurve, PipelineError> {
        RocCurve::compute(labels, &self.predict_all(scores))
            .ok_or_else(|| insufficient(labels))
    }

    /// Youden-optimal probability threshold. May be `+∞` when no cut beats
    /// the trivial classifier, which then admits no trades.
    pub fn select_threshold(&self, scores: &[f64], labels: &[bool]) -> Result<f64, PipelineError> {
        Ok(self.roc(scores, labels)?.youden_threshold())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbabilityCalibrator {
    config: CalibratorConfig,
}

impl ProbabilityCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    pub fn fit(&self, scores: &[f64], labels: &[bool]) -> Result<CalibrationModel, PipelineError> {
        if scores.len() != labels.len() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} scores but {} labels",
                scores.len(),
                labels.len()
            )));
        }
        let positives = labels.iter().filter(|&&l| l).count();
        if positives == 0 || positives == labels.len() {
            return Err(insufficient(labels));
        }

        let fit = logistic::fit(
            scores,
            labels,
            self.config.c,
            self.config.max_iter,
            self.config.tolerance,
        );
        if !fit.converged {
            tracing::warn!(iterations = fit.iterations, "logistic fit hit the iteration cap");
        }

        let mut model = fit.model;
        if model.slope < 0.0 {
            // Constrained optimum sits on the boundary: flat slope, intercept at the base rate.
            let rate = positives as f64 / labels.len() as f64;
            tracing::debug!(slope = model.slope, "negative slope clamped to zero");
            model = LogisticModel {
                intercept: (rate / (1.0 - rate)).ln(),
                slope: 0.0,
            };
        }

        let probabilities: Vec<f64> = scores.iter().map(|&s| model.predict(s)).collect();
        let auc = roc_auc(labels, &probabilities);
        tracing::info!(
            samples = labels.len(),
            positives,
            intercept = model.intercept,
            slope = model.slope,
            auc,
            "calibration fitted"
        );

        Ok(CalibrationModel {
            intercept: model.intercept,
            slope: model.slope,
            auc,
        })
    }

    pub fn select_threshold(
        &self,
        model: &CalibrationModel,
        scores: &[f64],
        labels: &[bool],
    ) -> Result<f64, PipelineError> {
        model.select_threshold(scores, labels)
    }
}

/// `max(selected, configured)`: calibration may only tighten the entry bar.
pub fn final_threshold(selected: f64, configured: f64) -> f64 {
    selected.max(configured)
}

fn insufficient(labels: &[bool]) -> PipelineError {
    let positives = labels.iter().filter(|&&l| l).count();
    let classes = usize::from(positives > 0) + usize::from(positives < labels.len());
    PipelineError::InsufficientData {
        classes,
        samples: labels.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_class_is_insufficient() {
        let cal = ProbabilityCalibrator::default();
        let err = cal.fit(&[0.1, 0.2, 0.3], &[true, true, true]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { classes: 1, samples: 3 }
        ));
        let err = cal.fit(&[], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { classes: 0, .. }));
    }

    #[test]
    fn inverse_relationship_is_clamped_flat() {
        let scores = [-1.0, -0.5, 0.5, 1.0];
        let labels = [true, true, false, false];
        let model = ProbabilityCalibrator::default().fit(&scores, &labels).unwrap();
        assert_eq!(model.slope, 0.0);
        assert!((model.predict_proba(-1.0) - 0.5).abs() < 1e-12);
        assert_eq!(model.predict_proba(-1.0), model.predict_proba(1.0));
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let err = ProbabilityCalibrator::default().fit(&[0.1], &[true, false]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn final_threshold_only_tightens() {
        assert_eq!(final_threshold(0.75, 0.8), 0.8);
        assert_eq!(final_threshold(0.9, 0.8), 0.9);
        assert_eq!(final_threshold(f64::INFINITY, 0.8), f64::INFINITY);
    }

    #[test]
    fn flat_model_threshold_is_infinite() {
        let scores = [0.0, 0.0, 0.0, 0.0];
        let labels = [true, false, true, false];
        let cal = ProbabilityCalibrator::default();
        let model = cal.fit(&scores, &labels).unwrap();
        // One distinct probability: J is 0 at both points, first wins.
        assert_eq!(cal.select_threshold(&model, &scores, &labels).unwrap(), f64::INFINITY);
    }
}
