// =============================================================================
// Operator Aggregates — per-trainer (and per-pilot) run and win statistics
// =============================================================================
//
// A table is always built for one as-of date from rows strictly before it:
//   overall : every prior run            -> (runs, win_rate)
//   recent  : runs within `window_days`  -> (recent_runs, recent_win_rate)
//
// Tables are never updated in place. Advancing the as-of date builds a new
// table, so readers holding the previous one keep a consistent view.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::HistoricalCorpus;
use crate::stats::mean;
use crate::types::HistoricalRecord;

/// Statistics for one operator. All zeros for an operator with no history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub runs: u32,
    pub win_rate: f64,
    pub recent_runs: u32,
    pub recent_win_rate: f64,
}

#[derive(Debug, Default)]
struct Tally {
    runs: u32,
    wins: u32,
    recent_runs: u32,
    recent_wins: u32,
}

impl Tally {
    fn finish(&self) -> AggregateStats {
        let rate = |wins: u32, runs: u32| {
            if runs == 0 {
                0.0
            } else {
                wins as f64 / runs as f64
            }
        };
        AggregateStats {
            runs: self.runs,
            win_rate: rate(self.wins, self.runs),
            recent_runs: self.recent_runs,
            recent_win_rate: rate(self.recent_wins, self.recent_runs),
        }
    }
}

/// Aggregates keyed by operator (or pilot) identity for one as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTable {
    as_of: NaiveDate,
    window_days: i64,
    stats: BTreeMap<String, AggregateStats>,
}

impl AggregateTable {
    /// Group `records` by `key`, counting only rows dated before `as_of`.
    pub fn build<F>(records: &[HistoricalRecord], as_of: NaiveDate, window_days: i64, key: F) -> Self
    where
        F: Fn(&HistoricalRecord) -> &str,
    {
        let window_start = as_of - Duration::days(window_days);
        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();

        for rec in records.iter().filter(|r| r.date < as_of) {
            let tally = tallies.entry(key(rec).to_string()).or_default();
            let won = rec.won();
            tally.runs += 1;
            tally.wins += u32::from(won);
            if rec.date >= window_start {
                tally.recent_runs += 1;
                tally.recent_wins += u32::from(won);
            }
        }

        let stats = tallies.into_iter().map(|(k, t)| (k, t.finish())).collect();
        Self {
            as_of,
            window_days,
            stats,
        }
    }

    pub fn empty(as_of: NaiveDate, window_days: i64) -> Self {
        Self {
            as_of,
            window_days,
            stats: BTreeMap::new(),
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stats.contains_key(key)
    }

    /// Stats for `key`; an unseen key gets neutral zeros.
    pub fn get(&self, key: &str) -> AggregateStats {
        match self.stats.get(key) {
            Some(s) => *s,
            None => {
                debug!(key, as_of = %self.as_of, "no aggregate history, using zeros");
                AggregateStats::default()
            }
        }
    }

    /// Unweighted mean of overall win rates across keys.
    pub fn mean_win_rate(&self) -> f64 {
        let rates: Vec<f64> = self.stats.values().map(|s| s.win_rate).collect();
        mean(&rates)
    }
}

/// Trainer aggregates as of `as_of`.
pub fn build_operator_aggregates(
    corpus: &HistoricalCorpus,
    as_of: NaiveDate,
    window_days: i64,
) -> AggregateTable {
    AggregateTable::build(corpus.before(as_of), as_of, window_days, |r| r.trainer.as_str())
}

/// Jockey aggregates as of `as_of`.
pub fn build_pilot_aggregates(
    corpus: &HistoricalCorpus,
    as_of: NaiveDate,
    window_days: i64,
) -> AggregateTable {
    AggregateTable::build(corpus.before(as_of), as_of, window_days, |r| r.jockey.as_str())
}

/// Operator and pilot tables built for the same as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub operators: AggregateTable,
    pub pilots: AggregateTable,
    /// Corpus size at build time; a grown corpus invalidates the snapshot.
    #[serde(default)]
    pub corpus_rows: usize,
}

impl AggregateSnapshot {
    pub fn build(corpus: &HistoricalCorpus, as_of: NaiveDate, window_days: i64) -> Self {
        Self {
            operators: build_operator_aggregates(corpus, as_of, window_days),
            pilots: build_pilot_aggregates(corpus, as_of, window_days),
            corpus_rows: corpus.len(),
        }
    }

    pub fn empty(as_of: NaiveDate, window_days: i64) -> Self {
        Self {
            operators: AggregateTable::empty(as_of, window_days),
            pilots: AggregateTable::empty(as_of, window_days),
            corpus_rows: 0,
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.operators.as_of()
    }

    /// Whether this snapshot was built from `corpus` for `as_of`.
    pub fn matches(&self, corpus: &HistoricalCorpus, as_of: NaiveDate) -> bool {
        self.as_of() == as_of && self.corpus_rows == corpus.len()
    }
}
