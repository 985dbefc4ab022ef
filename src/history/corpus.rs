// =============================================================================
// Historical Corpus — chronologically ordered past results
// =============================================================================
//
// Records are sorted once at construction (date, race, runner) and never
// mutated afterwards. Every query takes an as-of date and only ever sees rows
// dated strictly before it, so nothing dated on or after the race under
// analysis can reach a model or an aggregate.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::types::HistoricalRecord;

#[derive(Debug, Clone, Default)]
pub struct HistoricalCorpus {
    records: Vec<HistoricalRecord>,
    /// Row indices per runner, in chronological order.
    by_runner: HashMap<String, Vec<usize>>,
}

impl HistoricalCorpus {
    pub fn new(mut records: Vec<HistoricalRecord>) -> Self {
        records.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.race_id.cmp(&b.race_id))
                .then_with(|| a.runner_id.cmp(&b.runner_id))
        });

        let mut by_runner: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, rec) in records.iter().enumerate() {
            by_runner.entry(rec.runner_id.clone()).or_default().push(idx);
        }

        Self { records, by_runner }
    }

    /// Load a JSON array of [`HistoricalRecord`]s.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus from {}", path.display()))?;
        let records: Vec<HistoricalRecord> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse corpus from {}", path.display()))?;

        let corpus = Self::new(records);
        info!(
            path = %path.display(),
            rows = corpus.len(),
            runners = corpus.by_runner.len(),
            "historical corpus loaded"
        );
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    /// Every record dated strictly before `as_of`, oldest first.
    pub fn before(&self, as_of: NaiveDate) -> &[HistoricalRecord] {
        let end = self.records.partition_point(|r| r.date < as_of);
        &self.records[..end]
    }

    /// One runner's records dated strictly before `as_of`, most recent first.
    pub fn runner_runs(&self, runner_id: &str, as_of: NaiveDate) -> Vec<&HistoricalRecord> {
        let Some(indices) = self.by_runner.get(runner_id) else {
            return Vec::new();
        };
        indices
            .iter()
            .rev()
            .map(|&i| &self.records[i])
            .filter(|r| r.date < as_of)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, record};

    #[test]
    fn before_excludes_same_day_and_later() {
        let corpus = HistoricalCorpus::new(vec![
            record("r3", date(2024, 3, 1), "a", "t1", Some(1)),
            record("r1", date(2024, 1, 1), "a", "t1", Some(2)),
            record("r2", date(2024, 2, 1), "b", "t1", Some(1)),
        ]);

        let view = corpus.before(date(2024, 2, 1));
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].race_id, "r1");

        assert_eq!(corpus.before(date(2025, 1, 1)).len(), 3);
        assert!(corpus.before(date(2023, 1, 1)).is_empty());
    }

    #[test]
    fn records_are_sorted_chronologically() {
        let corpus = HistoricalCorpus::new(vec![
            record("r2", date(2024, 2, 1), "a", "t1", Some(1)),
            record("r1", date(2024, 1, 1), "a", "t1", Some(2)),
        ]);
        let all = corpus.before(date(2030, 1, 1));
        assert!(all.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn runner_runs_most_recent_first_and_leakage_safe() {
        let corpus = HistoricalCorpus::new(vec![
            record("r1", date(2024, 1, 1), "a", "t1", Some(5)),
            record("r2", date(2024, 2, 1), "a", "t1", Some(3)),
            record("r3", date(2024, 3, 1), "a", "t1", Some(1)),
            record("r2", date(2024, 2, 1), "b", "t1", Some(1)),
        ]);

        let runs = corpus.runner_runs("a", date(2024, 3, 1));
        let ids: Vec<&str> = runs.iter().map(|r| r.race_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert!(corpus.runner_runs("nobody", date(2024, 3, 1)).is_empty());
    }

    #[test]
    fn load_reads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        let rows = vec![record("r1", date(2024, 1, 1), "a", "t1", Some(1))];
        std::fs::write(&path, serde_json::to_string(&rows).unwrap()).unwrap();
        let corpus = HistoricalCorpus::load(&path).unwrap();
        assert_eq!(corpus.len(), 1);
    }
}
