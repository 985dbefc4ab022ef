// =============================================================================
// Time-Ordered Cross-Validation
// =============================================================================
//
// Expanding-window splits over chronologically sorted rows: fold i trains on
// everything before its validation block. Block boundaries are pushed forward
// past rows sharing a date with the last training row, so a validation row is
// always dated strictly after every row used to predict it.
// =============================================================================

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::stats::{brier_score, log_loss, mean};

/// One expanding-window split over sorted row positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChronoSplit {
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

/// Scores of one validation fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub log_loss: f64,
    pub brier: f64,
}

impl FoldMetrics {
    pub fn score(fold: usize, train_rows: usize, probabilities: &[f64], labels: &[bool]) -> Self {
        Self {
            fold,
            train_rows,
            validation_rows: labels.len(),
            log_loss: log_loss(probabilities, labels),
            brier: brier_score(probabilities, labels),
        }
    }
}

/// Self-reported cross-validated metrics kept with the fitted model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvMetrics {
    pub folds: Vec<FoldMetrics>,
    pub mean_log_loss: f64,
    pub mean_brier: f64,
}

impl CvMetrics {
    pub fn from_folds(folds: Vec<FoldMetrics>) -> Self {
        let losses: Vec<f64> = folds.iter().map(|f| f.log_loss).collect();
        let briers: Vec<f64> = folds.iter().map(|f| f.brier).collect();
        Self {
            mean_log_loss: mean(&losses),
            mean_brier: mean(&briers),
            folds,
        }
    }

    /// 1 - mean Brier, clamped to [0, 1].
    pub fn calibration_quality(&self) -> f64 {
        if self.folds.is_empty() {
            return 0.0;
        }
        (1.0 - self.mean_brier).clamp(0.0, 1.0)
    }
}

/// Advance `idx` past rows dated the same as `sorted_dates[idx - 1]`.
pub fn date_boundary(sorted_dates: &[NaiveDate], mut idx: usize) -> usize {
    if idx == 0 {
        return 0;
    }
    while idx < sorted_dates.len() && sorted_dates[idx] == sorted_dates[idx - 1] {
        idx += 1;
    }
    idx
}

/// `k` expanding-window splits over `sorted_dates` (already ascending).
///
/// The validation block size is `n / (k + 1)`; the first training window
/// absorbs the remainder. Splits whose validation block empties after date
/// alignment are dropped; at least one split must remain.
pub fn chronological_splits(
    sorted_dates: &[NaiveDate],
    k: usize,
) -> EngineResult<Vec<ChronoSplit>> {
    let n = sorted_dates.len();
    if k < 2 {
        return Err(EngineError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }
    let block = n / (k + 1);
    if block == 0 {
        return Err(EngineError::InsufficientTrainingData {
            needed: k + 1,
            got: n,
        });
    }

    let mut splits = Vec::with_capacity(k);
    for i in 0..k {
        let nominal_start = n - (k - i) * block;
        let nominal_end = nominal_start + block;
        let start = date_boundary(sorted_dates, nominal_start);
        let end = date_boundary(sorted_dates, nominal_end).min(n);
        if start >= end {
            continue;
        }
        splits.push(ChronoSplit {
            train: 0..start,
            validation: start..end,
        });
    }

    if splits.is_empty() {
        return Err(EngineError::InsufficientTrainingData {
            needed: k + 1,
            got: n,
        });
    }
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::date;

    fn daily(n: usize) -> Vec<NaiveDate> {
        let start = date(2024, 1, 1);
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    #[test]
    fn splits_expand_and_never_look_ahead() {
        let dates = daily(12);
        let splits = chronological_splits(&dates, 3).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].train, 0..3);
        assert_eq!(splits[0].validation, 3..6);
        assert_eq!(splits[2].train, 0..9);
        assert_eq!(splits[2].validation, 9..12);
        for s in &splits {
            assert_eq!(s.train.end, s.validation.start);
        }
    }

    #[test]
    fn remainder_goes_to_first_training_window() {
        let dates = daily(14);
        let splits = chronological_splits(&dates, 3).unwrap();
        assert_eq!(splits[0].train, 0..5);
        assert_eq!(splits[2].validation, 11..14);
    }

    #[test]
    fn boundaries_skip_shared_dates() {
        // Rows 2..=4 share a date; the nominal cut at 3 moves to 5.
        let d = date(2024, 1, 10);
        let dates = vec![
            date(2024, 1, 1),
            date(2024, 1, 2),
            d,
            d,
            d,
            date(2024, 1, 11),
            date(2024, 1, 12),
            date(2024, 1, 13),
            date(2024, 1, 14),
        ];
        let splits = chronological_splits(&dates, 2).unwrap();
        let first = &splits[0];
        assert_eq!(first.train, 0..5);
        let last_train = dates[first.train.end - 1];
        assert!(dates[first.validation.clone()].iter().all(|v| *v > last_train));
    }

    #[test]
    fn too_few_rows() {
        assert!(matches!(
            chronological_splits(&daily(3), 5),
            Err(EngineError::InsufficientTrainingData { .. })
        ));
    }

    #[test]
    fn single_fold_rejected() {
        assert!(chronological_splits(&daily(10), 1).is_err());
    }

    #[test]
    fn cv_metrics_average_folds() {
        let m = CvMetrics::from_folds(vec![
            FoldMetrics::score(0, 10, &[0.5, 0.5], &[true, false]),
            FoldMetrics::score(1, 12, &[1.0, 0.0], &[true, false]),
        ]);
        assert!((m.mean_brier - 0.125).abs() < 1e-12);
        assert!((m.calibration_quality() - 0.875).abs() < 1e-12);
        assert_eq!(m.folds[1].validation_rows, 2);
    }
}
