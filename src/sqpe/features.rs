// =============================================================================
// SQPE Features — training matrix, inference vector, fundamental sub-scores
// =============================================================================
//
// Feature engineering happens upstream; this module only checks the shape of
// what arrives. Column names travel with every vector so inference can be
// matched against the fit-time ordering instead of trusting positions.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::stats::remap;
use crate::types::{Race, Runner};

// =============================================================================
// Training set
// =============================================================================

/// Historical feature matrix with win labels and race dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    /// Race date of each row; defines the chronological order.
    pub dates: Vec<NaiveDate>,
}

impl TrainingSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read training set from {}", path.display()))?;
        let set: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse training set from {}", path.display()))?;
        info!(
            path = %path.display(),
            rows = set.len(),
            features = set.feature_names.len(),
            "SQPE training set loaded"
        );
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Structural checks: aligned lengths, unique names, finite values and
    /// both outcome classes present.
    pub fn validate(&self) -> EngineResult<()> {
        if self.feature_names.is_empty() {
            return Err(EngineError::InvalidTrainingSet(
                "no feature columns declared".to_string(),
            ));
        }
        let mut names = self.feature_names.clone();
        names.sort();
        names.dedup();
        if names.len() != self.feature_names.len() {
            return Err(EngineError::InvalidTrainingSet(
                "duplicate feature names".to_string(),
            ));
        }
        if self.labels.len() != self.rows.len() || self.dates.len() != self.rows.len() {
            return Err(EngineError::InvalidTrainingSet(format!(
                "{} rows, {} labels, {} dates",
                self.rows.len(),
                self.labels.len(),
                self.dates.len()
            )));
        }
        let width = self.feature_names.len();
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != width {
                return Err(EngineError::InvalidTrainingSet(format!(
                    "row {i} has {} values, expected {width}",
                    row.len()
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(EngineError::InvalidTrainingSet(format!(
                    "row {i} contains a non-finite value"
                )));
            }
        }
        let winners = self.labels.iter().filter(|&&y| y).count();
        if winners == 0 || winners == self.labels.len() {
            return Err(EngineError::InvalidTrainingSet(
                "labels must contain both winners and losers".to_string(),
            ));
        }
        Ok(())
    }

    /// Row indices in chronological order (stable for equal dates).
    pub fn chronological_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by_key(|&i| self.dates[i]);
        order
    }
}

// =============================================================================
// Inference vector
// =============================================================================

/// Named engineered features for one runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqpeFeatureVector {
    columns: Vec<String>,
    values: Vec<f64>,
}

impl SqpeFeatureVector {
    pub fn new(columns: Vec<String>, values: Vec<f64>) -> EngineResult<Self> {
        if columns.len() != values.len() {
            return Err(EngineError::FeatureSchemaMismatch {
                expected: columns,
                actual: vec![format!("{} values", values.len())],
            });
        }
        Ok(Self { columns, values })
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<f64>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Values in the expected column order. The columns must match exactly:
    /// a reordered or partial vector is rejected rather than rearranged.
    /// Deserialized vectors skip `new`, so the value count is checked here too.
    pub fn aligned(&self, expected: &[String]) -> EngineResult<&[f64]> {
        if self.columns != expected {
            return Err(EngineError::FeatureSchemaMismatch {
                expected: expected.to_vec(),
                actual: self.columns.clone(),
            });
        }
        if self.values.len() != expected.len() {
            return Err(EngineError::FeatureSchemaMismatch {
                expected: expected.to_vec(),
                actual: vec![format!("{} values", self.values.len())],
            });
        }
        Ok(&self.values)
    }
}

// =============================================================================
// Fundamental sub-scores
// =============================================================================

/// Independent evidence compared against the model probability.
/// Each present score is already normalised to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalScores {
    #[serde(default)]
    pub speed_rating: Option<f64>,
    #[serde(default)]
    pub form_rating: Option<f64>,
}

impl FundamentalScores {
    /// Derive sub-scores from the race card.
    ///
    /// Speed: total sectional time ranked within the field (fastest = 1.0),
    /// only when at least two runners carry sectionals.
    /// Form: average of the last three form-line positions, 1st = 1.0 and
    /// 10th or worse = 0.0.
    pub fn from_race_card(race: &Race, runner: &Runner) -> Self {
        Self {
            speed_rating: speed_rating(race, runner),
            form_rating: form_rating(runner),
        }
    }

    pub fn present(&self) -> Vec<f64> {
        [self.speed_rating, self.form_rating]
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
            .collect()
    }
}

fn total_time(runner: &Runner) -> Option<f64> {
    if runner.sectionals.is_empty() || runner.sectionals.iter().any(|s| !s.is_finite()) {
        return None;
    }
    Some(runner.sectionals.iter().sum())
}

fn speed_rating(race: &Race, runner: &Runner) -> Option<f64> {
    let own = total_time(runner)?;
    let times: Vec<f64> = race.runners.iter().filter_map(total_time).collect();
    if times.len() < 2 {
        return None;
    }
    let fastest = times.iter().copied().fold(f64::INFINITY, f64::min);
    let slowest = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (slowest - fastest).abs() < f64::EPSILON {
        return Some(0.5);
    }
    Some(remap(own, slowest, fastest, 0.0, 1.0))
}

fn form_rating(runner: &Runner) -> Option<f64> {
    let form = runner.form_line();
    let recent: Vec<f64> = form.positions().iter().take(3).map(|&p| p as f64).collect();
    if recent.is_empty() {
        return None;
    }
    let avg = recent.iter().sum::<f64>() / recent.len() as f64;
    Some(remap(avg, 10.0, 1.0, 0.0, 1.0))
}
