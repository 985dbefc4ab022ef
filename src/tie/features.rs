// =============================================================================
// TIE Runner Features — operator aggregates joined with situational fields
// =============================================================================
//
// Every field is clipped before it reaches the model:
//   operator_runs / recent_runs  capped at max_operator_runs / max_recent_runs
//   days_since_last_run          days_since_run_range (unknown -> upper bound)
//   class_delta                  class_delta_range    (unknown -> 0)
//   pilot_change_rank            pilot_change_range   (no change -> 0)
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine_config::TieConfig;
use crate::history::RunnerHistory;
use crate::tie::aggregates::AggregateSnapshot;
use crate::types::{Race, Runner};

pub const TIE_FEATURE_NAMES: [&str; 7] = [
    "operator_runs",
    "operator_win_rate",
    "operator_recent_runs",
    "operator_recent_win_rate",
    "days_since_last_run",
    "class_delta",
    "pilot_change_rank",
];

/// Fixed, named TIE input. Field order matches `TIE_FEATURE_NAMES`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TieFeatureVector {
    pub operator_runs: f64,
    pub operator_win_rate: f64,
    pub operator_recent_runs: f64,
    pub operator_recent_win_rate: f64,
    pub days_since_last_run: f64,
    pub class_delta: f64,
    pub pilot_change_rank: f64,
}

impl TieFeatureVector {
    pub fn to_array(&self) -> [f64; 7] {
        [
            self.operator_runs,
            self.operator_win_rate,
            self.operator_recent_runs,
            self.operator_recent_win_rate,
            self.days_since_last_run,
            self.class_delta,
            self.pilot_change_rank,
        ]
    }

    pub fn names() -> Vec<String> {
        TIE_FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }
}

/// What the feature builder needs to know about one competitor.
#[derive(Debug, Clone, Copy)]
pub struct CompetitorContext<'a> {
    pub trainer: &'a str,
    pub jockey: &'a str,
    pub race_date: NaiveDate,
    pub race_class: u8,
    pub history: &'a RunnerHistory,
}

impl<'a> CompetitorContext<'a> {
    pub fn for_runner(race: &'a Race, runner: &'a Runner, history: &'a RunnerHistory) -> Self {
        Self {
            trainer: &runner.trainer,
            jockey: &runner.jockey,
            race_date: race.date,
            race_class: race.class,
            history,
        }
    }
}

fn clip(value: f64, (lo, hi): (f64, f64)) -> f64 {
    value.clamp(lo, hi)
}

/// Sign of the win-rate move when the pilot changed since the last run.
fn pilot_change_rank(ctx: &CompetitorContext<'_>, aggregates: &AggregateSnapshot) -> f64 {
    let previous = match ctx.history.last_run().and_then(|r| r.jockey.as_deref()) {
        Some(p) if p != ctx.jockey => p,
        _ => return 0.0,
    };
    let delta =
        aggregates.pilots.get(ctx.jockey).win_rate - aggregates.pilots.get(previous).win_rate;
    if delta > 0.0 {
        1.0
    } else if delta < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub fn runner_features(
    ctx: &CompetitorContext<'_>,
    aggregates: &AggregateSnapshot,
    config: &TieConfig,
) -> TieFeatureVector {
    let operator = aggregates.operators.get(ctx.trainer);

    let days = ctx
        .history
        .days_since_last_run(ctx.race_date)
        .map_or(config.days_since_run_range.1, |d| d as f64);
    let class_delta = ctx
        .history
        .class_delta(ctx.race_class)
        .map_or(0.0, f64::from);

    TieFeatureVector {
        operator_runs: (operator.runs as f64).min(config.max_operator_runs),
        operator_win_rate: operator.win_rate,
        operator_recent_runs: (operator.recent_runs as f64).min(config.max_recent_runs),
        operator_recent_win_rate: operator.recent_win_rate,
        days_since_last_run: clip(days, config.days_since_run_range),
        class_delta: clip(class_delta, config.class_delta_range),
        pilot_change_rank: clip(pilot_change_rank(ctx, aggregates), config.pilot_change_range),
    }
}

/// Feature vectors for a field of competitors, in input order.
pub fn build_runner_features(
    competitors: &[CompetitorContext<'_>],
    aggregates: &AggregateSnapshot,
    config: &TieConfig,
) -> Vec<TieFeatureVector> {
    competitors
        .iter()
        .map(|c| runner_features(c, aggregates, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoricalCorpus;
    use crate::testutil::{date, record, record_with};

    fn corpus() -> HistoricalCorpus {
        let mut records = Vec::new();
        // 600 runs for a big yard, one in five a winner.
        for i in 0..600u32 {
            let d = date(2023, 1, 1) + chrono::Duration::days((i % 400) as i64);
            let pos = if i % 5 == 0 { Some(1) } else { Some(5) };
            records.push(record(&format!("b{i}"), d, &format!("h{i}"), "big", pos));
        }
        records.push(record_with("x1", date(2024, 1, 1), "star", "small", "j_old", 2, Some(3)));
        records.push(record_with("x2", date(2024, 1, 2), "other", "small", "j_ace", 4, Some(1)));
        HistoricalCorpus::new(records)
    }

    fn ctx<'a>(trainer: &'a str, jockey: &'a str, class: u8, h: &'a RunnerHistory) -> CompetitorContext<'a> {
        CompetitorContext {
            trainer,
            jockey,
            race_date: date(2024, 3, 1),
            race_class: class,
            history: h,
        }
    }

    #[test]
    fn run_counts_are_capped() {
        let c = corpus();
        let snap = AggregateSnapshot::build(&c, date(2024, 3, 1), 90);
        let h = RunnerHistory::default();
        let f = runner_features(&ctx("big", "j1", 4, &h), &snap, &TieConfig::default());
        assert_eq!(f.operator_runs, 500.0);
        assert!((f.operator_win_rate - 0.2).abs() < 1e-12);
    }

    #[test]
    fn unknown_operator_and_first_starter() {
        let c = corpus();
        let snap = AggregateSnapshot::build(&c, date(2024, 3, 1), 90);
        let h = RunnerHistory::default();
        let f = runner_features(&ctx("ghost", "j1", 4, &h), &snap, &TieConfig::default());
        assert_eq!(f.operator_runs, 0.0);
        assert_eq!(f.operator_win_rate, 0.0);
        assert_eq!(f.operator_recent_runs, 0.0);
        assert_eq!(f.operator_recent_win_rate, 0.0);
        assert_eq!(f.days_since_last_run, 365.0);
        assert_eq!(f.class_delta, 0.0);
        assert_eq!(f.pilot_change_rank, 0.0);
    }

    #[test]
    fn situational_fields_from_history() {
        let c = corpus();
        let snap = AggregateSnapshot::build(&c, date(2024, 3, 1), 90);
        let h = RunnerHistory::from_corpus(&c, "star", date(2024, 3, 1));
        // Last run class 2, now class 9: delta 7 clipped to 3.
        let f = runner_features(&ctx("small", "j_ace", 9, &h), &snap, &TieConfig::default());
        assert_eq!(f.days_since_last_run, 60.0);
        assert_eq!(f.class_delta, 3.0);
        // j_ace won their only ride, j_old has none: an upgrade.
        assert_eq!(f.pilot_change_rank, 1.0);
    }

    #[test]
    fn pilot_downgrade_and_same_pilot() {
        let c = corpus();
        let snap = AggregateSnapshot::build(&c, date(2024, 3, 1), 90);
        let h = RunnerHistory::from_corpus(&c, "other", date(2024, 3, 1));
        let cfg = TieConfig::default();
        assert_eq!(runner_features(&ctx("small", "j_old", 4, &h), &snap, &cfg).pilot_change_rank, -1.0);
        assert_eq!(runner_features(&ctx("small", "j_ace", 4, &h), &snap, &cfg).pilot_change_rank, 0.0);
    }

    #[test]
    fn build_keeps_input_order() {
        let c = corpus();
        let snap = AggregateSnapshot::build(&c, date(2024, 3, 1), 90);
        let h = RunnerHistory::default();
        let field = [ctx("big", "j1", 4, &h), ctx("ghost", "j1", 4, &h)];
        let out = build_runner_features(&field, &snap, &TieConfig::default());
        assert_eq!(out.len(), 2);
        assert!(out[0].operator_runs > 0.0);
        assert_eq!(out[1].operator_runs, 0.0);
        assert_eq!(TieFeatureVector::names().len(), out[0].to_array().len());
    }
}
