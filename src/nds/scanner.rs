// =============================================================================
// Narrative Disruption Scanner
// =============================================================================
//
// Narrative (first match wins):
//   1. HYPE_FAVORITE — hype signal fired (short odds into a heavy overround)
//   2. RECENCY_BIAS  — recency signal >= high_signal
//   3. FALSE_FORM    — false-form signal >= high_signal
//   4. NONE
//
// narrative_strength = the signal behind the selected narrative (0 for NONE)
// disruption_score   = narrative_strength x mean(all four signals), in [0, 1]
// disruption ladder  = >= 0.6 STRONG, >= 0.4 MODERATE, >= 0.2 WEAK, else NONE
// confidence         = 1 - stddev(all four signals)
//
// Fade opportunity: STRONG/MODERATE disruption behind a named narrative.
// Back opportunity: no narrative, no disruption, odds above long_odds.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine_config::NdsConfig;
use crate::history::{HistoricalCorpus, RunnerHistory};
use crate::nds::detectors::{drift_signal, false_form_signal, hype_signal, recency_bias_signal};
use crate::stats::{mean, std_dev, unit};
use crate::types::{Race, Runner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NarrativeType {
    HypeFavorite,
    RecencyBias,
    FalseForm,
    None,
}

impl std::fmt::Display for NarrativeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HypeFavorite => write!(f, "HYPE_FAVORITE"),
            Self::RecencyBias => write!(f, "RECENCY_BIAS"),
            Self::FalseForm => write!(f, "FALSE_FORM"),
            Self::None => write!(f, "NONE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DisruptionStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

impl DisruptionStrength {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.6 {
            Self::Strong
        } else if score >= 0.4 {
            Self::Moderate
        } else if score >= 0.2 {
            Self::Weak
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for DisruptionStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strong => write!(f, "STRONG"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Weak => write!(f, "WEAK"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// The four raw detector outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSignals {
    pub hype: f64,
    pub recency_bias: f64,
    pub false_form: f64,
    pub drift: f64,
}

impl NarrativeSignals {
    pub fn values(&self) -> [f64; 4] {
        [self.hype, self.recency_bias, self.false_form, self.drift]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdsSignal {
    pub signals: NarrativeSignals,
    pub narrative: NarrativeType,
    pub narrative_strength: f64,
    pub disruption_score: f64,
    pub disruption_strength: DisruptionStrength,
    pub is_fade_opportunity: bool,
    pub is_back_opportunity: bool,
    pub confidence: f64,
    pub market_odds: f64,
    pub overround: f64,
    pub prior_runs: usize,
}

/// Stateless; holds only its thresholds.
#[derive(Debug, Clone, Default)]
pub struct NdsScanner {
    config: NdsConfig,
}

impl NdsScanner {
    pub fn new(config: NdsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NdsConfig {
        &self.config
    }

    /// Runner history as NDS sees it: corpus first, form line when thin.
    pub fn history_for(&self, corpus: &HistoricalCorpus, race: &Race, runner: &Runner) -> RunnerHistory {
        RunnerHistory::resolve(
            corpus,
            &runner.id,
            &runner.form_line(),
            race.date,
            self.config.min_prior_runs,
        )
    }

    pub fn analyze(
        &self,
        race: &Race,
        runner: &Runner,
        corpus: &HistoricalCorpus,
        overround: f64,
    ) -> NdsSignal {
        let history = self.history_for(corpus, race, runner);
        self.analyze_history(runner.odds, race.class, &history, overround)
    }

    pub fn analyze_history(
        &self,
        odds: f64,
        race_class: u8,
        history: &RunnerHistory,
        overround: f64,
    ) -> NdsSignal {
        let cfg = &self.config;
        let signals = NarrativeSignals {
            hype: hype_signal(odds, overround, cfg),
            recency_bias: recency_bias_signal(history, cfg),
            false_form: false_form_signal(history, race_class, cfg),
            drift: drift_signal(),
        };

        let (narrative, narrative_strength) = self.classify_narrative(&signals);
        let values = signals.values();
        let disruption_score = unit(narrative_strength * mean(&values));
        let disruption_strength = DisruptionStrength::from_score(disruption_score);

        let is_fade_opportunity = narrative != NarrativeType::None
            && disruption_strength >= DisruptionStrength::Moderate;
        let is_back_opportunity = narrative == NarrativeType::None
            && odds > cfg.long_odds
            && disruption_strength == DisruptionStrength::None;

        let confidence = unit(1.0 - std_dev(&values));

        debug!(
            narrative = %narrative,
            disruption = format!("{:.3}", disruption_score),
            strength = %disruption_strength,
            fade = is_fade_opportunity,
            back = is_back_opportunity,
            "NDS signal"
        );

        NdsSignal {
            signals,
            narrative,
            narrative_strength,
            disruption_score,
            disruption_strength,
            is_fade_opportunity,
            is_back_opportunity,
            confidence,
            market_odds: odds,
            overround,
            prior_runs: history.len(),
        }
    }

    fn classify_narrative(&self, s: &NarrativeSignals) -> (NarrativeType, f64) {
        if s.hype > 0.0 {
            (NarrativeType::HypeFavorite, s.hype)
        } else if s.recency_bias >= self.config.high_signal {
            (NarrativeType::RecencyBias, s.recency_bias)
        } else if s.false_form >= self.config.high_signal {
            (NarrativeType::FalseForm, s.false_form)
        } else {
            (NarrativeType::None, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, race, runner};
    use crate::types::FormLine;

    fn history(positions: &[u32]) -> RunnerHistory {
        RunnerHistory::from_form_line(&FormLine::from_positions(positions.to_vec()))
    }

    #[test]
    fn hype_favorite_with_recency() {
        let scanner = NdsScanner::default();
        let s = scanner.analyze_history(2.8, 4, &history(&[1, 2, 9, 8, 7]), 1.20);
        assert!(s.signals.recency_bias > 0.0);
        assert!(s.signals.hype > 0.0);
        assert_eq!(s.narrative, NarrativeType::HypeFavorite);
        assert!((s.narrative_strength - s.signals.hype).abs() < 1e-12);
        let expected = s.signals.hype * mean(&s.signals.values());
        assert!((s.disruption_score - expected).abs() < 1e-12);
        assert_eq!(
            s.is_fade_opportunity,
            s.disruption_strength >= DisruptionStrength::Moderate
        );
    }

    #[test]
    fn strong_disruption_flags_fade() {
        // hype 1.0, recency 0.9: strength 1.0 x mean 0.475 -> MODERATE.
        let scanner = NdsScanner::new(NdsConfig {
            overround_threshold: 1.0,
            ..NdsConfig::default()
        });
        let s = scanner.analyze_history(1.01, 4, &history(&[1, 10, 10, 10, 10]), 1.6);
        assert_eq!(s.narrative, NarrativeType::HypeFavorite);
        assert!((s.disruption_score - 0.475).abs() < 1e-12);
        assert_eq!(s.disruption_strength, DisruptionStrength::Moderate);
        assert!(s.is_fade_opportunity);
        assert!(!s.is_back_opportunity);
    }

    #[test]
    fn recency_narrative_without_hype() {
        let scanner = NdsScanner::default();
        let s = scanner.analyze_history(6.0, 4, &history(&[1, 2, 9, 8, 7]), 1.10);
        assert_eq!(s.signals.hype, 0.0);
        assert_eq!(s.narrative, NarrativeType::RecencyBias);
    }

    #[test]
    fn unbiased_long_shot_is_back_opportunity() {
        let scanner = NdsScanner::default();
        let s = scanner.analyze_history(15.0, 4, &history(&[5, 4, 6]), 1.25);
        assert_eq!(s.narrative, NarrativeType::None);
        assert_eq!(s.disruption_score, 0.0);
        assert!(s.is_back_opportunity);
        assert!(!s.is_fade_opportunity);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn thin_history_degrades_to_zero() {
        let scanner = NdsScanner::default();
        let s = scanner.analyze_history(8.0, 4, &RunnerHistory::default(), 1.05);
        assert_eq!(s.signals, NarrativeSignals::default());
        assert_eq!(s.disruption_strength, DisruptionStrength::None);
        assert!(!s.is_back_opportunity);
    }

    #[test]
    fn analyze_falls_back_to_form_line() {
        let scanner = NdsScanner::default();
        let r = runner("a", 2.8, "t", "j", "7-8-9-2-1");
        let card = race("R1", date(2024, 5, 1), 4, vec![r.clone()]);
        let s = scanner.analyze(&card, &r, &HistoricalCorpus::default(), 1.20);
        assert_eq!(s.prior_runs, 5);
        assert!(s.signals.recency_bias > 0.0);
    }

    #[test]
    fn disruption_ladder() {
        assert_eq!(DisruptionStrength::from_score(0.6), DisruptionStrength::Strong);
        assert_eq!(DisruptionStrength::from_score(0.45), DisruptionStrength::Moderate);
        assert_eq!(DisruptionStrength::from_score(0.2), DisruptionStrength::Weak);
        assert_eq!(DisruptionStrength::from_score(0.19), DisruptionStrength::None);
    }
}
