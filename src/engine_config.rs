// =============================================================================
// Engine Configuration — thresholds and model hyper-parameters with atomic save
// =============================================================================
//
// Every tunable parameter of the three engines and the consensus arbiter lives
// here. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_cv_folds() -> usize {
    5
}

fn default_calibration_fraction() -> f64 {
    0.2
}

fn default_min_training_rows() -> usize {
    60
}

fn default_n_estimators() -> usize {
    100
}

fn default_boost_learning_rate() -> f64 {
    0.1
}

fn default_max_depth() -> usize {
    3
}

fn default_min_samples_leaf() -> usize {
    5
}

fn default_strong_convergence() -> f64 {
    0.7
}

fn default_strong_edge() -> f64 {
    0.05
}

fn default_moderate_convergence() -> f64 {
    0.5
}

fn default_moderate_edge() -> f64 {
    0.02
}

fn default_recent_window_days() -> i64 {
    90
}

fn default_max_operator_runs() -> f64 {
    500.0
}

fn default_max_recent_runs() -> f64 {
    100.0
}

fn default_days_since_run_range() -> (f64, f64) {
    (0.0, 365.0)
}

fn default_class_delta_range() -> (f64, f64) {
    (-3.0, 3.0)
}

fn default_pilot_change_range() -> (f64, f64) {
    (-1.0, 1.0)
}

fn default_l2_penalty() -> f64 {
    1.0
}

fn default_logistic_learning_rate() -> f64 {
    0.1
}

fn default_max_iterations() -> usize {
    500
}

fn default_targeting_threshold() -> f64 {
    0.7
}

fn default_experience_threshold() -> f64 {
    0.3
}

fn default_overround_threshold() -> f64 {
    1.15
}

fn default_short_odds() -> f64 {
    5.0
}

fn default_long_odds() -> f64 {
    10.0
}

fn default_min_prior_runs() -> usize {
    3
}

fn default_recency_top_finish() -> u32 {
    3
}

fn default_recency_poor_average() -> f64 {
    6.0
}

fn default_false_form_min_wins() -> usize {
    2
}

fn default_high_signal() -> f64 {
    0.3
}

fn default_min_modules_required() -> usize {
    2
}

fn default_sqpe_probability_threshold() -> f64 {
    0.6
}

fn default_tie_intent_threshold() -> f64 {
    0.7
}

fn default_nds_disruption_threshold() -> f64 {
    0.6
}

fn default_unanimity_bonus() -> f64 {
    1.2
}

// =============================================================================
// SqpeConfig
// =============================================================================

/// Probability engine: boosting, cross-validation and strength thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqpeConfig {
    /// Number of chronological cross-validation folds.
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Trailing share of the training window held out for calibration.
    #[serde(default = "default_calibration_fraction")]
    pub calibration_fraction: f64,

    #[serde(default = "default_min_training_rows")]
    pub min_training_rows: usize,

    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Shrinkage applied to every boosting stage.
    #[serde(default = "default_boost_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    /// STRONG requires convergence >= this and |edge| >= `strong_edge`.
    #[serde(default = "default_strong_convergence")]
    pub strong_convergence: f64,

    #[serde(default = "default_strong_edge")]
    pub strong_edge: f64,

    /// MODERATE requires convergence >= this and |edge| >= `moderate_edge`.
    #[serde(default = "default_moderate_convergence")]
    pub moderate_convergence: f64,

    #[serde(default = "default_moderate_edge")]
    pub moderate_edge: f64,
}

impl Default for SqpeConfig {
    fn default() -> Self {
        Self {
            cv_folds: default_cv_folds(),
            calibration_fraction: default_calibration_fraction(),
            min_training_rows: default_min_training_rows(),
            n_estimators: default_n_estimators(),
            learning_rate: default_boost_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            strong_convergence: default_strong_convergence(),
            strong_edge: default_strong_edge(),
            moderate_convergence: default_moderate_convergence(),
            moderate_edge: default_moderate_edge(),
        }
    }
}

// =============================================================================
// TieConfig
// =============================================================================

/// Intent engine: aggregate windows, feature clipping and logistic fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieConfig {
    /// Recent window for operator aggregates, in days before the as-of date.
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,

    /// Cap on an operator's overall run count.
    #[serde(default = "default_max_operator_runs")]
    pub max_operator_runs: f64,

    /// Cap on an operator's recent-window run count.
    #[serde(default = "default_max_recent_runs")]
    pub max_recent_runs: f64,

    #[serde(default = "default_days_since_run_range")]
    pub days_since_run_range: (f64, f64),

    #[serde(default = "default_class_delta_range")]
    pub class_delta_range: (f64, f64),

    #[serde(default = "default_pilot_change_range")]
    pub pilot_change_range: (f64, f64),

    /// L2 penalty strength on the logistic weights (intercept unpenalised).
    #[serde(default = "default_l2_penalty")]
    pub l2_penalty: f64,

    #[serde(default = "default_logistic_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Intent at or above this classifies as targeting.
    #[serde(default = "default_targeting_threshold")]
    pub targeting_threshold: f64,

    /// Intent at or below this classifies as an experience / decoy run.
    #[serde(default = "default_experience_threshold")]
    pub experience_threshold: f64,
}

impl Default for TieConfig {
    fn default() -> Self {
        Self {
            recent_window_days: default_recent_window_days(),
            max_operator_runs: default_max_operator_runs(),
            max_recent_runs: default_max_recent_runs(),
            days_since_run_range: default_days_since_run_range(),
            class_delta_range: default_class_delta_range(),
            pilot_change_range: default_pilot_change_range(),
            l2_penalty: default_l2_penalty(),
            learning_rate: default_logistic_learning_rate(),
            max_iterations: default_max_iterations(),
            targeting_threshold: default_targeting_threshold(),
            experience_threshold: default_experience_threshold(),
        }
    }
}

// =============================================================================
// NdsConfig
// =============================================================================

/// Narrative scanner thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NdsConfig {
    /// Race overround above which short-priced runners count as hyped.
    #[serde(default = "default_overround_threshold")]
    pub overround_threshold: f64,

    #[serde(default = "default_short_odds")]
    pub short_odds: f64,

    /// Odds above which an unbiased runner is a back candidate.
    #[serde(default = "default_long_odds")]
    pub long_odds: f64,

    #[serde(default = "default_min_prior_runs")]
    pub min_prior_runs: usize,

    /// Latest finish at or better than this counts as a top run.
    #[serde(default = "default_recency_top_finish")]
    pub recency_top_finish: u32,

    /// Earlier average finish worse than this counts as poor form.
    #[serde(default = "default_recency_poor_average")]
    pub recency_poor_average: f64,

    #[serde(default = "default_false_form_min_wins")]
    pub false_form_min_wins: usize,

    /// Recency / false-form signal at or above this selects its narrative.
    #[serde(default = "default_high_signal")]
    pub high_signal: f64,
}

impl Default for NdsConfig {
    fn default() -> Self {
        Self {
            overround_threshold: default_overround_threshold(),
            short_odds: default_short_odds(),
            long_odds: default_long_odds(),
            min_prior_runs: default_min_prior_runs(),
            recency_top_finish: default_recency_top_finish(),
            recency_poor_average: default_recency_poor_average(),
            false_form_min_wins: default_false_form_min_wins(),
            high_signal: default_high_signal(),
        }
    }
}

// =============================================================================
// ConsensusConfig
// =============================================================================

/// Vote thresholds and the decision-table quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Modules that must agree in one direction before anything but HOLD.
    #[serde(default = "default_min_modules_required")]
    pub min_modules_required: usize,

    #[serde(default = "default_sqpe_probability_threshold")]
    pub sqpe_probability_threshold: f64,

    #[serde(default = "default_tie_intent_threshold")]
    pub tie_intent_threshold: f64,

    #[serde(default = "default_nds_disruption_threshold")]
    pub nds_disruption_threshold: f64,

    /// Conviction multiplier when all three modules vote the same way.
    #[serde(default = "default_unanimity_bonus")]
    pub unanimity_bonus: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_modules_required: default_min_modules_required(),
            sqpe_probability_threshold: default_sqpe_probability_threshold(),
            tie_intent_threshold: default_tie_intent_threshold(),
            nds_disruption_threshold: default_nds_disruption_threshold(),
            unanimity_bonus: default_unanimity_bonus(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub sqpe: SqpeConfig,

    #[serde(default)]
    pub tie: TieConfig,

    #[serde(default)]
    pub nds: NdsConfig,

    #[serde(default)]
    pub consensus: ConsensusConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path` and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("rejected engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            min_modules_required = config.consensus.min_modules_required,
            cv_folds = config.sqpe.cv_folds,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Reject settings the engines cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        let quorum = self.consensus.min_modules_required;
        if !(1..=3).contains(&quorum) {
            return Err(EngineError::InvalidConfig(format!(
                "min_modules_required must be between 1 and 3, got {quorum}"
            )));
        }
        if self.sqpe.cv_folds < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "cv_folds must be at least 2, got {}",
                self.sqpe.cv_folds
            )));
        }
        let frac = self.sqpe.calibration_fraction;
        if !(frac > 0.0 && frac < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "calibration_fraction must lie in (0, 1), got {frac}"
            )));
        }
        if self.sqpe.n_estimators == 0 || self.sqpe.max_depth == 0 {
            return Err(EngineError::InvalidConfig(
                "n_estimators and max_depth must be positive".to_string(),
            ));
        }
        for (name, (lo, hi)) in [
            ("days_since_run_range", self.tie.days_since_run_range),
            ("class_delta_range", self.tie.class_delta_range),
            ("pilot_change_range", self.tie.pilot_change_range),
        ] {
            if lo > hi {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} is inverted: ({lo}, {hi})"
                )));
            }
        }
        if self.tie.experience_threshold >= self.tie.targeting_threshold {
            return Err(EngineError::InvalidConfig(
                "experience_threshold must sit below targeting_threshold".to_string(),
            ));
        }
        if self.tie.recent_window_days <= 0 {
            return Err(EngineError::InvalidConfig(
                "recent_window_days must be positive".to_string(),
            ));
        }
        if self.nds.min_prior_runs == 0 {
            return Err(EngineError::InvalidConfig(
                "min_prior_runs must be at least 1".to_string(),
            ));
        }
        // A bonus below 1 would rank three agreeing modules under two.
        let bonus = self.consensus.unanimity_bonus;
        if !(bonus.is_finite() && bonus >= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "unanimity_bonus must be at least 1.0, got {bonus}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.consensus.min_modules_required, 2);
        assert!((cfg.consensus.sqpe_probability_threshold - 0.6).abs() < f64::EPSILON);
        assert!((cfg.consensus.tie_intent_threshold - 0.7).abs() < f64::EPSILON);
        assert!((cfg.consensus.nds_disruption_threshold - 0.6).abs() < f64::EPSILON);
        assert!((cfg.nds.overround_threshold - 1.15).abs() < f64::EPSILON);
        assert_eq!(cfg.tie.recent_window_days, 90);
        assert_eq!(cfg.sqpe.cv_folds, 5);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.consensus.min_modules_required, 2);
        assert_eq!(cfg.nds.min_prior_runs, 3);
        assert_eq!(cfg.tie.days_since_run_range, (0.0, 365.0));
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "consensus": { "min_modules_required": 3 }, "nds": { "long_odds": 12.0 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.consensus.min_modules_required, 3);
        assert!((cfg.consensus.unanimity_bonus - 1.2).abs() < f64::EPSILON);
        assert!((cfg.nds.long_odds - 12.0).abs() < f64::EPSILON);
        assert!((cfg.nds.short_odds - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_bad_quorum() {
        let mut cfg = EngineConfig::default();
        cfg.consensus.min_modules_required = 0;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig(_))));
        cfg.consensus.min_modules_required = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_prior_runs() {
        let mut cfg = EngineConfig::default();
        cfg.nds.min_prior_runs = 0;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig(_))));
        cfg.nds.min_prior_runs = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_shrinking_unanimity_bonus() {
        let mut cfg = EngineConfig::default();
        cfg.consensus.unanimity_bonus = 0.8;
        assert!(matches!(cfg.validate(), Err(EngineError::InvalidConfig(_))));
        cfg.consensus.unanimity_bonus = f64::NAN;
        assert!(cfg.validate().is_err());
        cfg.consensus.unanimity_bonus = 1.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut cfg = EngineConfig::default();
        cfg.tie.class_delta_range = (3.0, -3.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");
        let mut cfg = EngineConfig::default();
        cfg.consensus.min_modules_required = 3;
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.consensus.min_modules_required, 3);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
