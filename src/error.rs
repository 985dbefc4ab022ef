// =============================================================================
// Engine Errors
// =============================================================================
//
// Fatal conditions only. Thin history and unseen operators are not errors:
// the affected sub-signal degrades to zero and the analysis carries on.
// =============================================================================

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Inference attempted before `fit` published a model.
    #[error("{engine} is not fitted; call fit before inference")]
    NotFitted { engine: &'static str },

    /// Inference input columns differ from the fit-time ordering.
    #[error("feature schema mismatch: expected {expected:?}, got {actual:?}")]
    FeatureSchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("insufficient training data: need at least {needed} rows, got {got}")]
    InsufficientTrainingData { needed: usize, got: usize },

    #[error("invalid training set: {0}")]
    InvalidTrainingSet(String),

    #[error("artifact integrity check failed: {0}")]
    ArtifactIntegrity(String),

    #[error("unsupported artifact version {found} (expected {expected})")]
    UnsupportedArtifactVersion { found: u32, expected: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("runner {0} is not entered in the race")]
    UnknownRunner(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
