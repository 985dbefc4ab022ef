// =============================================================================
// NDS detectors — four independent market-narrative signals, each in [0, 1]
// =============================================================================
//
//   hype        overround > threshold AND odds < short_odds
//               -> implied probability x overround
//   recency     >= min_prior_runs; latest finish <= top_finish AND the
//               average of the next four > poor_average
//               -> (average - latest) mapped from [0, 10] onto [0, 1]
//   false form  >= min_prior_runs; of the last five wins, at least
//               false_form_min_wins came in a weaker class (higher number)
//               -> weaker wins / wins considered
//   drift       needs an odds time series; none is carried, always 0
//
// Thin history is not an error: the affected detector returns 0.
// =============================================================================

use crate::engine_config::NdsConfig;
use crate::history::RunnerHistory;
use crate::stats::{mean, remap, unit};
use crate::types::implied_probability;

/// Positions compared against the latest run.
const RECENCY_LOOKBACK: usize = 4;

/// Wins examined for class context.
const FALSE_FORM_LOOKBACK: usize = 5;

pub fn hype_signal(odds: f64, overround: f64, config: &NdsConfig) -> f64 {
    if overround <= config.overround_threshold || !(odds < config.short_odds) {
        return 0.0;
    }
    implied_probability(odds).map_or(0.0, |q| unit(q * overround))
}

pub fn recency_bias_signal(history: &RunnerHistory, config: &NdsConfig) -> f64 {
    if history.len() < config.min_prior_runs {
        return 0.0;
    }
    let positions = history.positions();
    let Some(&latest) = positions.first() else {
        return 0.0;
    };
    let earlier: Vec<f64> = positions
        .iter()
        .skip(1)
        .take(RECENCY_LOOKBACK)
        .map(|&p| p as f64)
        .collect();
    let average = mean(&earlier);

    if latest > config.recency_top_finish || average <= config.recency_poor_average {
        return 0.0;
    }
    remap(average - latest as f64, 0.0, 10.0, 0.0, 1.0)
}

pub fn false_form_signal(history: &RunnerHistory, current_class: u8, config: &NdsConfig) -> f64 {
    if history.len() < config.min_prior_runs {
        return 0.0;
    }
    let wins: Vec<Option<u8>> = history
        .runs()
        .iter()
        .filter(|r| r.won())
        .take(FALSE_FORM_LOOKBACK)
        .map(|r| r.class)
        .collect();
    if wins.is_empty() {
        return 0.0;
    }
    let weaker = wins
        .iter()
        .filter(|c| matches!(c, Some(class) if *class > current_class))
        .count();
    if weaker < config.false_form_min_wins {
        return 0.0;
    }
    weaker as f64 / wins.len() as f64
}

/// Odds-movement signal. No odds time series is carried, so this stays 0.
pub fn drift_signal() -> f64 {
    0.0
}
