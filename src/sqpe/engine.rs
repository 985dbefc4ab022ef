// =============================================================================
// SQPE Engine — calibrated win probability, market edge, convergence
// =============================================================================
//
// fit:
//   1. Validate and sort the training set chronologically
//   2. Hold out the trailing calibration slice (date aligned)
//   3. Expanding-window CV on the remaining window, folds scored by log-loss
//      and Brier (folds run in parallel; results keep fold order)
//   4. Final ensemble on the whole training window
//   5. Isotonic map fitted on the ensemble's calibration-slice scores
//   6. Publish the artifact in one pointer swap
//
// predict:
//   probability = isotonic(ensemble(features))
//   edge        = probability - 1/odds        (0 when odds <= 1)
//   convergence = 1 - mean |probability - sub_score|   (0.5 with no sub-scores)
//   strength    = STRONG / MODERATE / WEAK by joint convergence and |edge|
//   confidence  = 0.5 * calibration quality + 0.5 * convergence
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine_config::SqpeConfig;
use crate::error::{EngineError, EngineResult};
use crate::sqpe::artifact::SqpeArtifact;
use crate::sqpe::boosting::{BoostedEnsemble, BoostingParams};
use crate::sqpe::calibration::IsotonicCalibrator;
use crate::sqpe::features::{FundamentalScores, SqpeFeatureVector, TrainingSet};
use crate::sqpe::validation::{chronological_splits, date_boundary, CvMetrics, FoldMetrics};
use crate::stats::{mean, unit};
use crate::types::implied_probability;

/// Calibration slices smaller than this fall back to the identity map.
const MIN_CALIBRATION_ROWS: usize = 10;

const ENGINE_NAME: &str = "SQPE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStrength {
    Strong,
    Moderate,
    Weak,
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strong => write!(f, "STRONG"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Weak => write!(f, "WEAK"),
        }
    }
}

/// SQPE output for one runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqpeSignal {
    /// Calibrated win probability in [0, 1].
    pub probability: f64,
    pub market_odds: f64,
    /// `1 / odds`, absent when the odds cannot be priced.
    pub implied_probability: Option<f64>,
    pub edge: f64,
    pub convergence_score: f64,
    pub signal_strength: SignalStrength,
    pub confidence: f64,
}

impl SqpeSignal {
    /// Assemble a signal from an already-calibrated probability.
    pub fn from_probability(
        probability: f64,
        market_odds: f64,
        fundamentals: &FundamentalScores,
        calibration_quality: f64,
        config: &SqpeConfig,
    ) -> Self {
        let probability = unit(probability);
        let implied = implied_probability(market_odds);
        let edge = implied.map_or(0.0, |q| probability - q);

        let subs = fundamentals.present();
        let convergence_score = if subs.is_empty() {
            0.5
        } else {
            let gaps: Vec<f64> = subs.iter().map(|s| (probability - s).abs()).collect();
            unit(1.0 - mean(&gaps))
        };

        let signal_strength = classify_strength(convergence_score, edge, config);
        let confidence = unit(0.5 * unit(calibration_quality) + 0.5 * convergence_score);

        Self {
            probability,
            market_odds,
            implied_probability: implied,
            edge,
            convergence_score,
            signal_strength,
            confidence,
        }
    }
}

/// Joint thresholds on convergence and absolute edge.
pub fn classify_strength(convergence: f64, edge: f64, config: &SqpeConfig) -> SignalStrength {
    let magnitude = edge.abs();
    if convergence >= config.strong_convergence && magnitude >= config.strong_edge {
        SignalStrength::Strong
    } else if convergence >= config.moderate_convergence && magnitude >= config.moderate_edge {
        SignalStrength::Moderate
    } else {
        SignalStrength::Weak
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Probability engine. Readers take an `Arc` snapshot of the published
/// artifact; `fit` swaps in a fully built replacement.
pub struct SqpeEngine {
    config: SqpeConfig,
    model: RwLock<Option<Arc<SqpeArtifact>>>,
}

impl SqpeEngine {
    pub fn new(config: SqpeConfig) -> Self {
        Self {
            config,
            model: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &SqpeConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.model.read().is_some()
    }

    /// Train and publish.
    pub fn fit(&self, training: &TrainingSet) -> EngineResult<Arc<SqpeArtifact>> {
        let artifact = Self::train(&self.config, training)?;
        Ok(self.publish(artifact))
    }

    /// Replace the published artifact (e.g. one loaded from disk).
    pub fn publish(&self, artifact: SqpeArtifact) -> Arc<SqpeArtifact> {
        let artifact = Arc::new(artifact);
        *self.model.write() = Some(artifact.clone());
        info!(bundle_id = %artifact.bundle_id, "SQPE artifact published");
        artifact
    }

    /// Current artifact, or `NotFitted`.
    pub fn snapshot(&self) -> EngineResult<Arc<SqpeArtifact>> {
        self.model
            .read()
            .clone()
            .ok_or(EngineError::NotFitted {
                engine: ENGINE_NAME,
            })
    }

    pub fn predict(
        &self,
        features: &SqpeFeatureVector,
        fundamentals: &FundamentalScores,
        market_odds: f64,
    ) -> EngineResult<SqpeSignal> {
        let artifact = self.snapshot()?;
        self.predict_with(&artifact, features, fundamentals, market_odds)
    }

    /// Inference against an explicit artifact snapshot.
    pub fn predict_with(
        &self,
        artifact: &SqpeArtifact,
        features: &SqpeFeatureVector,
        fundamentals: &FundamentalScores,
        market_odds: f64,
    ) -> EngineResult<SqpeSignal> {
        let probability = artifact.predict_probability(features)?;
        let signal = SqpeSignal::from_probability(
            probability,
            market_odds,
            fundamentals,
            artifact.cv_metrics.calibration_quality(),
            &self.config,
        );
        debug!(
            probability = format!("{:.4}", signal.probability),
            edge = format!("{:.4}", signal.edge),
            convergence = format!("{:.3}", signal.convergence_score),
            strength = %signal.signal_strength,
            "SQPE signal"
        );
        Ok(signal)
    }

    /// Build a complete artifact without touching any published state.
    pub fn train(config: &SqpeConfig, training: &TrainingSet) -> EngineResult<SqpeArtifact> {
        training.validate()?;
        if training.len() < config.min_training_rows {
            return Err(EngineError::InsufficientTrainingData {
                needed: config.min_training_rows,
                got: training.len(),
            });
        }

        let order = training.chronological_order();
        let rows: Vec<&[f64]> = order.iter().map(|&i| training.rows[i].as_slice()).collect();
        let labels: Vec<bool> = order.iter().map(|&i| training.labels[i]).collect();
        let dates: Vec<_> = order.iter().map(|&i| training.dates[i]).collect();
        let n = rows.len();

        let params = BoostingParams {
            n_estimators: config.n_estimators,
            learning_rate: config.learning_rate,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
        };

        // ── Calibration hold-out ────────────────────────────────────────
        let nominal = ((n as f64) * (1.0 - config.calibration_fraction)).round() as usize;
        let cal_start = date_boundary(&dates, nominal.clamp(1, n));

        // ── Time-ordered CV on the training window ──────────────────────
        let splits = chronological_splits(&dates[..cal_start], config.cv_folds)?;
        let folds: Vec<FoldMetrics> = splits
            .par_iter()
            .enumerate()
            .map(|(fold, split)| {
                let model = BoostedEnsemble::fit(
                    &rows[split.train.clone()],
                    &labels[split.train.clone()],
                    &params,
                )?;
                let probs: Vec<f64> = rows[split.validation.clone()]
                    .iter()
                    .map(|r| model.predict_proba(r))
                    .collect();
                Ok(FoldMetrics::score(
                    fold,
                    split.train.len(),
                    &probs,
                    &labels[split.validation.clone()],
                ))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        for f in &folds {
            info!(
                fold = f.fold,
                train_rows = f.train_rows,
                validation_rows = f.validation_rows,
                log_loss = format!("{:.4}", f.log_loss),
                brier = format!("{:.4}", f.brier),
                "SQPE fold scored"
            );
        }
        let cv_metrics = CvMetrics::from_folds(folds);

        // ── Final estimator ─────────────────────────────────────────────
        let ensemble = BoostedEnsemble::fit(&rows[..cal_start], &labels[..cal_start], &params)?;

        // ── Calibration ─────────────────────────────────────────────────
        let cal_labels = &labels[cal_start..];
        let cal_winners = cal_labels.iter().filter(|&&y| y).count();
        let calibrator = if cal_labels.len() < MIN_CALIBRATION_ROWS
            || cal_winners == 0
            || cal_winners == cal_labels.len()
        {
            warn!(
                calibration_rows = cal_labels.len(),
                winners = cal_winners,
                "SQPE calibration slice unusable, using identity calibration"
            );
            IsotonicCalibrator::identity()
        } else {
            let raw: Vec<f64> = rows[cal_start..]
                .iter()
                .map(|r| ensemble.predict_proba(r))
                .collect();
            IsotonicCalibrator::fit(&raw, cal_labels)
        };

        info!(
            trained_rows = cal_start,
            calibration_rows = n - cal_start,
            mean_log_loss = format!("{:.4}", cv_metrics.mean_log_loss),
            mean_brier = format!("{:.4}", cv_metrics.mean_brier),
            isotonic_knots = calibrator.knots(),
            "SQPE fit complete"
        );

        Ok(SqpeArtifact {
            bundle_id: Uuid::new_v4(),
            created_at: Utc::now(),
            feature_names: training.feature_names.clone(),
            ensemble,
            calibrator,
            cv_metrics,
            trained_rows: cal_start,
            calibration_rows: n - cal_start,
            training_window: (dates[0], dates[n - 1]),
        })
    }
}
