// =============================================================================
// SQPE Artifact — fitted ensemble + calibration map + feature ordering
// =============================================================================
//
// The three pieces are saved and loaded as one versioned bundle. On disk the
// bundle is a JSON envelope holding the serialised payload and its SHA-256
// digest; it is written to `<path>.tmp` and renamed so a reader never sees a
// half-written file.
// =============================================================================

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::sqpe::boosting::BoostedEnsemble;
use crate::sqpe::calibration::IsotonicCalibrator;
use crate::sqpe::features::SqpeFeatureVector;
use crate::sqpe::validation::CvMetrics;

/// Bumped whenever the payload layout changes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqpeArtifact {
    pub bundle_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Column ordering used at fit time.
    pub feature_names: Vec<String>,
    pub ensemble: BoostedEnsemble,
    pub calibrator: IsotonicCalibrator,
    pub cv_metrics: CvMetrics,
    pub trained_rows: usize,
    pub calibration_rows: usize,
    /// First and last race date in the training window.
    pub training_window: (NaiveDate, NaiveDate),
}

#[derive(Serialize, Deserialize)]
struct ArtifactEnvelope {
    format_version: u32,
    sha256: String,
    payload: String,
}

impl SqpeArtifact {
    /// Calibrated win probability for one schema-checked feature vector.
    pub fn predict_probability(&self, features: &SqpeFeatureVector) -> EngineResult<f64> {
        let row = features.aligned(&self.feature_names)?;
        if row.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::FeatureSchemaMismatch {
                expected: self.feature_names.clone(),
                actual: vec!["non-finite value".to_string()],
            });
        }
        let raw = self.ensemble.predict_proba(row);
        Ok(self.calibrator.transform(raw))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        let payload = serde_json::to_string(self)?;
        let envelope = ArtifactEnvelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            sha256: digest(&payload),
            payload,
        };
        let content = serde_json::to_string_pretty(&envelope)?;

        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, path)?;

        info!(
            path = %path.display(),
            bundle_id = %self.bundle_id,
            features = self.feature_names.len(),
            "SQPE artifact saved (atomic)"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let envelope: ArtifactEnvelope = serde_json::from_str(&content)?;

        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(EngineError::UnsupportedArtifactVersion {
                found: envelope.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        let actual = digest(&envelope.payload);
        if actual != envelope.sha256 {
            return Err(EngineError::ArtifactIntegrity(format!(
                "checksum mismatch: recorded {}, computed {actual}",
                envelope.sha256
            )));
        }

        let artifact: Self = serde_json::from_str(&envelope.payload)?;
        if artifact.ensemble.n_features() != artifact.feature_names.len() {
            return Err(EngineError::ArtifactIntegrity(format!(
                "ensemble expects {} features but {} names are recorded",
                artifact.ensemble.n_features(),
                artifact.feature_names.len()
            )));
        }

        info!(
            path = %path.display(),
            bundle_id = %artifact.bundle_id,
            mean_brier = artifact.cv_metrics.mean_brier,
            "SQPE artifact loaded"
        );
        Ok(artifact)
    }
}

fn digest(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}
