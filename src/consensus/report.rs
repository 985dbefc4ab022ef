// =============================================================================
// Race Analysis — per-race output of the orchestrator
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::consensus::decision::ConsensusDecision;
use crate::nds::NdsSignal;
use crate::sqpe::SqpeSignal;
use crate::tie::TieSignal;

/// Signals and verdict for one competitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorAnalysis {
    pub runner_id: String,
    pub runner_name: String,
    pub market_odds: f64,
    pub sqpe: SqpeSignal,
    pub tie: TieSignal,
    pub nds: NdsSignal,
    pub decision: ConsensusDecision,
}

impl CompetitorAnalysis {
    pub fn conviction(&self) -> f64 {
        self.decision.conviction
    }
}

/// A competitor whose analysis failed; the rest of the race still completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorFailure {
    pub runner_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceAnalysis {
    pub race_id: String,
    pub overround: f64,
    /// Sorted by conviction (highest first), then runner id.
    pub competitors: Vec<CompetitorAnalysis>,
    pub failures: Vec<CompetitorFailure>,
}

impl RaceAnalysis {
    pub fn new(
        race_id: impl Into<String>,
        overround: f64,
        mut competitors: Vec<CompetitorAnalysis>,
        mut failures: Vec<CompetitorFailure>,
    ) -> Self {
        competitors.sort_by(|a, b| {
            b.conviction()
                .total_cmp(&a.conviction())
                .then_with(|| a.runner_id.cmp(&b.runner_id))
        });
        failures.sort_by(|a, b| a.runner_id.cmp(&b.runner_id));
        Self {
            race_id: race_id.into(),
            overround,
            competitors,
            failures,
        }
    }

    /// Everything except HOLD.
    pub fn actionable(&self) -> impl Iterator<Item = &CompetitorAnalysis> {
        self.competitors.iter().filter(|c| c.decision.is_actionable())
    }

    pub fn backs(&self) -> impl Iterator<Item = &CompetitorAnalysis> {
        self.competitors
            .iter()
            .filter(|c| c.decision.recommendation.is_back())
    }

    pub fn fades(&self) -> impl Iterator<Item = &CompetitorAnalysis> {
        self.competitors
            .iter()
            .filter(|c| c.decision.recommendation.is_fade())
    }

    /// Highest-conviction actionable competitor.
    pub fn top(&self) -> Option<&CompetitorAnalysis> {
        self.actionable().next()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
