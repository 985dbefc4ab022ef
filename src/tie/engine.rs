// =============================================================================
// TIE Engine — operator intent score and classification
// =============================================================================
//
// Two pieces of shared state, both swapped whole:
//   model      : fitted logistic model, published once per fit
//   aggregates : operator/pilot tables for the current as-of date, rebuilt
//                when the date moves; readers keep their previous Arc
//
// intent_score >= targeting_threshold   -> Targeting
// intent_score <= experience_threshold  -> Experience (decoy / education run)
// otherwise                             -> Neutral
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine_config::TieConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::HistoricalCorpus;
use crate::tie::aggregates::AggregateSnapshot;
use crate::tie::features::TieFeatureVector;
use crate::tie::labeling::TieTrainingSet;
use crate::tie::logistic::{LogisticModel, LogisticParams};

const ENGINE_NAME: &str = "TIE";

/// Scores are kept strictly inside (0, 1).
const SCORE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentClass {
    Targeting,
    Neutral,
    Experience,
}

impl std::fmt::Display for IntentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Targeting => write!(f, "TARGETING"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Experience => write!(f, "EXPERIENCE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieSignal {
    pub intent_score: f64,
    pub classification: IntentClass,
    pub features: TieFeatureVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieModel {
    pub model_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub logistic: LogisticModel,
    pub trained_rows: usize,
    pub positive_rows: usize,
}

impl TieModel {
    pub fn intent_score(&self, features: &TieFeatureVector) -> f64 {
        self.logistic
            .predict_proba(&features.to_array())
            .clamp(SCORE_FLOOR, 1.0 - SCORE_FLOOR)
    }
}

pub struct TieEngine {
    config: TieConfig,
    model: RwLock<Option<Arc<TieModel>>>,
    aggregates: RwLock<Option<Arc<AggregateSnapshot>>>,
}

impl TieEngine {
    pub fn new(config: TieConfig) -> Self {
        Self {
            config,
            model: RwLock::new(None),
            aggregates: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &TieConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.model.read().is_some()
    }

    // ── Aggregates ──────────────────────────────────────────────────────

    /// Rebuild the aggregate tables for `as_of` and swap them in.
    pub fn refresh_aggregates(
        &self,
        corpus: &HistoricalCorpus,
        as_of: NaiveDate,
    ) -> Arc<AggregateSnapshot> {
        let snapshot = Arc::new(AggregateSnapshot::build(
            corpus,
            as_of,
            self.config.recent_window_days,
        ));
        *self.aggregates.write() = Some(snapshot.clone());
        info!(
            as_of = %as_of,
            operators = snapshot.operators.len(),
            pilots = snapshot.pilots.len(),
            "TIE aggregates rebuilt"
        );
        snapshot
    }

    /// Current tables when they were built from this corpus for `as_of`,
    /// otherwise a rebuild. Corpora are append-only, so row count stands in
    /// for the corpus version.
    pub fn aggregates_for(
        &self,
        corpus: &HistoricalCorpus,
        as_of: NaiveDate,
    ) -> Arc<AggregateSnapshot> {
        if let Some(current) = self.aggregates.read().as_ref() {
            if current.matches(corpus, as_of) {
                return current.clone();
            }
        }
        self.refresh_aggregates(corpus, as_of)
    }

    // ── Fit ─────────────────────────────────────────────────────────────

    pub fn fit(&self, training: &TieTrainingSet) -> EngineResult<Arc<TieModel>> {
        self.fit_features(&training.features, &training.labels)
    }

    /// Train on externally labeled feature vectors and publish.
    pub fn fit_features(
        &self,
        features: &[TieFeatureVector],
        labels: &[bool],
    ) -> EngineResult<Arc<TieModel>> {
        let rows: Vec<Vec<f64>> = features.iter().map(|f| f.to_array().to_vec()).collect();
        let params = LogisticParams {
            l2_penalty: self.config.l2_penalty,
            learning_rate: self.config.learning_rate,
            max_iterations: self.config.max_iterations,
        };
        let logistic = LogisticModel::fit(&rows, labels, &params)?;

        let model = Arc::new(TieModel {
            model_id: Uuid::new_v4(),
            created_at: Utc::now(),
            feature_names: TieFeatureVector::names(),
            trained_rows: rows.len(),
            positive_rows: labels.iter().filter(|&&y| y).count(),
            logistic,
        });
        *self.model.write() = Some(model.clone());

        info!(
            model_id = %model.model_id,
            rows = model.trained_rows,
            positives = model.positive_rows,
            iterations = model.logistic.iterations(),
            "TIE model published"
        );
        Ok(model)
    }

    // ── Inference ───────────────────────────────────────────────────────

    pub fn snapshot(&self) -> EngineResult<Arc<TieModel>> {
        self.model
            .read()
            .clone()
            .ok_or(EngineError::NotFitted {
                engine: ENGINE_NAME,
            })
    }

    /// Probability in (0, 1) that this run is being targeted.
    pub fn predict_intent_score(&self, features: &TieFeatureVector) -> EngineResult<f64> {
        Ok(self.snapshot()?.intent_score(features))
    }

    pub fn predict(&self, features: &TieFeatureVector) -> EngineResult<TieSignal> {
        let model = self.snapshot()?;
        Ok(self.predict_with(&model, features))
    }

    pub fn predict_with(&self, model: &TieModel, features: &TieFeatureVector) -> TieSignal {
        let intent_score = model.intent_score(features);
        let classification = self.classify(intent_score);
        debug!(
            intent = format!("{:.3}", intent_score),
            class = %classification,
            "TIE signal"
        );
        TieSignal {
            intent_score,
            classification,
            features: *features,
        }
    }

    pub fn classify(&self, intent_score: f64) -> IntentClass {
        if intent_score >= self.config.targeting_threshold {
            IntentClass::Targeting
        } else if intent_score <= self.config.experience_threshold {
            IntentClass::Experience
        } else {
            IntentClass::Neutral
        }
    }
}
