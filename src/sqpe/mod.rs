// =============================================================================
// SQPE Module — Probability Signal Engine
// =============================================================================
//
// Calibrated win-probability model:
// - Gradient-boosted trees on log-loss
// - Isotonic calibration on a held-out trailing slice
// - Expanding-window, date-aligned cross-validation
// - Versioned, checksummed artifact bundle

pub mod artifact;
pub mod boosting;
pub mod calibration;
pub mod engine;
pub mod features;
pub mod validation;

pub use artifact::{SqpeArtifact, ARTIFACT_FORMAT_VERSION};
pub use engine::{SignalStrength, SqpeEngine, SqpeSignal};
pub use features::{FundamentalScores, SqpeFeatureVector, TrainingSet};
pub use validation::{CvMetrics, FoldMetrics};
