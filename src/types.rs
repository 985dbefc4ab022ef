// =============================================================================
// Shared types used across the race consensus engine
// =============================================================================
//
// Races, runners and historical records are value objects: they are built once
// per analysis pass and never mutated while the engines read them.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Surface / going condition reported for a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Going {
    Firm,
    Good,
    Soft,
    Heavy,
    Synthetic,
}

impl Default for Going {
    fn default() -> Self {
        Self::Good
    }
}

impl std::fmt::Display for Going {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Firm => write!(f, "Firm"),
            Self::Good => write!(f, "Good"),
            Self::Soft => write!(f, "Soft"),
            Self::Heavy => write!(f, "Heavy"),
            Self::Synthetic => write!(f, "Synthetic"),
        }
    }
}

// =============================================================================
// Form line
// =============================================================================

/// Finishing position recorded for "0" in a form string (tenth or worse).
pub const UNPLACED_POSITION: u32 = 10;

/// Parsed form string.
///
/// Form strings are written oldest-first (`"9-81x2"` ends with the latest run).
/// Digits are finishing positions, `0` is tenth or worse; letters and the
/// separators `-`, `/`, `x` carry no finishing position and are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormLine {
    /// Finishing positions, most recent first.
    positions: Vec<u32>,
}

impl FormLine {
    pub fn parse(raw: &str) -> Self {
        let mut positions: Vec<u32> = raw
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| if d == 0 { UNPLACED_POSITION } else { d })
            .collect();
        positions.reverse();
        Self { positions }
    }

    pub fn from_positions(most_recent_first: Vec<u32>) -> Self {
        Self {
            positions: most_recent_first,
        }
    }

    /// Finishing positions, most recent first.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// =============================================================================
// Runner / Race
// =============================================================================

/// One entrant in a race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Runner {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    /// Assigned weight in kilograms.
    #[serde(default)]
    pub weight_kg: f64,
    /// Starting stall / barrier.
    #[serde(default)]
    pub barrier: u32,
    /// Raw form string as published on the race card.
    #[serde(default)]
    pub form: String,
    /// Current decimal market odds.
    pub odds: f64,
    /// Operator (trainer) identity.
    pub trainer: String,
    /// Pilot (jockey) identity.
    pub jockey: String,
    /// Sectional times in seconds, earliest split first.
    #[serde(default)]
    pub sectionals: Vec<f64>,
}

impl Runner {
    pub fn form_line(&self) -> FormLine {
        FormLine::parse(&self.form)
    }

    /// Market-implied probability, or `None` when the odds cannot be priced.
    pub fn implied_probability(&self) -> Option<f64> {
        implied_probability(self.odds)
    }
}

/// One scheduled contest with a fixed field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Race {
    pub id: String,
    pub venue: String,
    pub date: NaiveDate,
    pub distance_m: u32,
    #[serde(default)]
    pub going: Going,
    /// Competitive class; a higher number is a weaker class.
    pub class: u8,
    pub runners: Vec<Runner>,
}

impl Race {
    /// Sum of the field's implied probabilities (the bookmaker overround).
    ///
    /// Runners with odds at or below 1.0 carry no implied probability and are
    /// skipped.
    pub fn market_overround(&self) -> f64 {
        self.runners
            .iter()
            .filter_map(Runner::implied_probability)
            .sum()
    }

    pub fn runner(&self, id: &str) -> Option<&Runner> {
        self.runners.iter().find(|r| r.id == id)
    }
}

/// `1 / odds` for odds strictly above 1.0.
pub fn implied_probability(odds: f64) -> Option<f64> {
    if odds.is_finite() && odds > 1.0 {
        Some(1.0 / odds)
    } else {
        None
    }
}

// =============================================================================
// Historical record
// =============================================================================

/// One past (race, runner, outcome) row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub race_id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub distance_m: u32,
    pub class: u8,
    pub runner_id: String,
    pub trainer: String,
    pub jockey: String,
    /// Finishing position; `None` for non-finishers.
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub odds: Option<f64>,
}

impl HistoricalRecord {
    pub fn won(&self) -> bool {
        self.position == Some(1)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_line_reads_latest_run_first() {
        let form = FormLine::parse("9-81x2");
        assert_eq!(form.positions(), &[2, 1, 8, 9]);
    }

    #[test]
    fn form_line_maps_zero_to_unplaced() {
        let form = FormLine::parse("0P1");
        assert_eq!(form.positions(), &[1, UNPLACED_POSITION]);
    }

    #[test]
    fn form_line_empty_string() {
        assert!(FormLine::parse("").is_empty());
        assert!(FormLine::parse("--/PU").is_empty());
    }

    #[test]
    fn implied_probability_rejects_unpriceable_odds() {
        assert!(implied_probability(1.0).is_none());
        assert!(implied_probability(0.0).is_none());
        assert!(implied_probability(f64::NAN).is_none());
        assert!((implied_probability(4.0).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn going_display() {
        assert_eq!(format!("{}", Going::Heavy), "Heavy");
        assert_eq!(Going::default(), Going::Good);
    }

    #[test]
    fn won_only_for_first_place() {
        let mut rec = HistoricalRecord {
            race_id: "r".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            venue: String::new(),
            distance_m: 1200,
            class: 3,
            runner_id: "a".into(),
            trainer: "t".into(),
            jockey: "j".into(),
            position: Some(1),
            odds: None,
        };
        assert!(rec.won());
        rec.position = Some(2);
        assert!(!rec.won());
        rec.position = None;
        assert!(!rec.won());
    }
}
