// =============================================================================
// TIE labeling — caller-supplied "high intent" rules and training-set assembly
// =============================================================================
//
// The engine trains on whatever labels a `LabelingPolicy` hands it; it never
// chooses one itself. Training rows are built date by date from the corpus,
// each with aggregates and history taken strictly before that date.
// =============================================================================

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine_config::TieConfig;
use crate::history::{HistoricalCorpus, RunnerHistory};
use crate::tie::aggregates::AggregateSnapshot;
use crate::tie::features::{runner_features, CompetitorContext, TieFeatureVector};

pub trait LabelingPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a run with these features counts as a targeted ("high intent") run.
    fn label(&self, features: &TieFeatureVector, aggregates: &AggregateSnapshot) -> bool;
}

/// How the criteria of a policy combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Composition {
    #[default]
    All,
    Any,
}

/// Class drop, rest inside a window, and an above-average operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDropRestPolicy {
    /// Inclusive days-since-last-run window.
    pub rest_window: (f64, f64),
    pub composition: Composition,
}

impl Default for ClassDropRestPolicy {
    fn default() -> Self {
        Self {
            rest_window: (14.0, 35.0),
            composition: Composition::All,
        }
    }
}

impl ClassDropRestPolicy {
    pub fn new(composition: Composition) -> Self {
        Self {
            composition,
            ..Self::default()
        }
    }
}

impl LabelingPolicy for ClassDropRestPolicy {
    fn name(&self) -> &str {
        match self.composition {
            Composition::All => "class-drop-rest(all)",
            Composition::Any => "class-drop-rest(any)",
        }
    }

    fn label(&self, features: &TieFeatureVector, aggregates: &AggregateSnapshot) -> bool {
        let (lo, hi) = self.rest_window;
        let criteria = [
            features.class_delta > 0.0,
            (lo..=hi).contains(&features.days_since_last_run),
            features.operator_win_rate > aggregates.operators.mean_win_rate(),
        ];
        match self.composition {
            Composition::All => criteria.iter().all(|&c| c),
            Composition::Any => criteria.iter().any(|&c| c),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TieTrainingSet {
    pub features: Vec<TieFeatureVector>,
    pub labels: Vec<bool>,
    pub dates: Vec<NaiveDate>,
}

impl TieTrainingSet {
    /// One row per historical run, labeled by `policy`.
    pub fn from_corpus(
        corpus: &HistoricalCorpus,
        policy: &dyn LabelingPolicy,
        config: &TieConfig,
    ) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
        for (i, rec) in corpus.records().iter().enumerate() {
            by_date.entry(rec.date).or_default().push(i);
        }

        let mut set = Self::default();
        for (date, indices) in by_date {
            let snapshot = AggregateSnapshot::build(corpus, date, config.recent_window_days);
            for i in indices {
                let rec = &corpus.records()[i];
                let history = RunnerHistory::from_corpus(corpus, &rec.runner_id, date);
                let ctx = CompetitorContext {
                    trainer: &rec.trainer,
                    jockey: &rec.jockey,
                    race_date: date,
                    race_class: rec.class,
                    history: &history,
                };
                let features = runner_features(&ctx, &snapshot, config);
                set.labels.push(policy.label(&features, &snapshot));
                set.features.push(features);
                set.dates.push(date);
            }
        }

        info!(
            policy = policy.name(),
            rows = set.len(),
            positives = set.positives(),
            "TIE training set labeled"
        );
        set
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, record, record_with};
    use crate::tie::aggregates::AggregateTable;

    fn snapshot_with_mean(win_rates: &[(&str, Option<u32>)]) -> AggregateSnapshot {
        let records: Vec<_> = win_rates
            .iter()
            .enumerate()
            .map(|(i, (t, p))| record(&format!("r{i}"), date(2024, 1, 1), "h", t, *p))
            .collect();
        AggregateSnapshot {
            operators: AggregateTable::build(&records, date(2024, 2, 1), 90, |r| r.trainer.as_str()),
            pilots: AggregateTable::empty(date(2024, 2, 1), 90),
            corpus_rows: records.len(),
        }
    }

    fn features(class_delta: f64, days: f64, win_rate: f64) -> TieFeatureVector {
        TieFeatureVector {
            class_delta,
            days_since_last_run: days,
            operator_win_rate: win_rate,
            ..TieFeatureVector::default()
        }
    }

    #[test]
    fn all_requires_every_criterion() {
        // Mean operator win rate 0.5.
        let snap = snapshot_with_mean(&[("a", Some(1)), ("b", Some(3))]);
        let policy = ClassDropRestPolicy::default();
        assert!(policy.label(&features(1.0, 21.0, 0.8), &snap));
        assert!(!policy.label(&features(0.0, 21.0, 0.8), &snap));
        assert!(!policy.label(&features(1.0, 60.0, 0.8), &snap));
        assert!(!policy.label(&features(1.0, 21.0, 0.3), &snap));
    }

    #[test]
    fn any_accepts_one_criterion() {
        let snap = snapshot_with_mean(&[("a", Some(1)), ("b", Some(3))]);
        let policy = ClassDropRestPolicy::new(Composition::Any);
        assert!(policy.label(&features(1.0, 200.0, 0.0), &snap));
        assert!(policy.label(&features(-1.0, 14.0, 0.0), &snap));
        assert!(!policy.label(&features(-1.0, 200.0, 0.1), &snap));
        assert_ne!(policy.name(), ClassDropRestPolicy::default().name());
    }

    #[test]
    fn training_set_from_corpus_uses_prior_data_only() {
        let corpus = HistoricalCorpus::new(vec![
            record_with("r1", date(2024, 1, 1), "h1", "good", "j1", 3, Some(1)),
            record_with("r2", date(2024, 1, 1), "h2", "poor", "j1", 3, Some(6)),
            record_with("r3", date(2024, 1, 22), "h1", "good", "j1", 5, Some(2)),
            record_with("r4", date(2024, 1, 22), "h2", "poor", "j1", 5, Some(4)),
        ]);
        let set = TieTrainingSet::from_corpus(
            &corpus,
            &ClassDropRestPolicy::default(),
            &TieConfig::default(),
        );
        assert_eq!(set.len(), 4);
        // First-day rows see no history at all.
        assert_eq!(set.features[0].operator_runs, 0.0);
        assert!(!set.labels[0]);
        // h1 on day two: dropped two classes, 21 days rest, yard above mean.
        let h1 = set
            .features
            .iter()
            .zip(&set.labels)
            .filter(|(f, _)| f.operator_win_rate == 1.0)
            .collect::<Vec<_>>();
        assert_eq!(h1.len(), 1);
        assert_eq!(h1[0].0.class_delta, 2.0);
        assert_eq!(h1[0].0.days_since_last_run, 21.0);
        assert!(*h1[0].1);
        assert_eq!(set.positives(), 1);
    }
}
