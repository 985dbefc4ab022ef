// =============================================================================
// Votes — each engine's signal reduced to back / fade / abstain
// =============================================================================
//
//   SQPE  back     STRONG signal, positive edge, probability >= threshold
//   TIE   back     TARGETING and intent >= threshold   (confidence = intent)
//         fade     EXPERIENCE                          (confidence = 1 - intent)
//   NDS   fade     fade opportunity, disruption >= threshold
//         back     back opportunity
// Anything else abstains.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::engine_config::ConsensusConfig;
use crate::nds::NdsSignal;
use crate::sqpe::{SignalStrength, SqpeSignal};
use crate::stats::unit;
use crate::tie::{IntentClass, TieSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Module {
    Sqpe,
    Tie,
    Nds,
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqpe => write!(f, "SQPE"),
            Self::Tie => write!(f, "TIE"),
            Self::Nds => write!(f, "NDS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteDirection {
    Back,
    Fade,
    Abstain,
}

impl std::fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Back => write!(f, "BACK"),
            Self::Fade => write!(f, "FADE"),
            Self::Abstain => write!(f, "ABSTAIN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub module: Module,
    pub direction: VoteDirection,
    /// [0, 1]; 0 for abstentions.
    pub confidence: f64,
    pub rationale: String,
}

impl Vote {
    pub fn back(module: Module, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            module,
            direction: VoteDirection::Back,
            confidence: unit(confidence),
            rationale: rationale.into(),
        }
    }

    pub fn fade(module: Module, confidence: f64, rationale: impl Into<String>) -> Self {
        Self {
            module,
            direction: VoteDirection::Fade,
            confidence: unit(confidence),
            rationale: rationale.into(),
        }
    }

    pub fn abstain(module: Module, rationale: impl Into<String>) -> Self {
        Self {
            module,
            direction: VoteDirection::Abstain,
            confidence: 0.0,
            rationale: rationale.into(),
        }
    }

    pub fn is_abstain(&self) -> bool {
        self.direction == VoteDirection::Abstain
    }
}

pub fn sqpe_vote(signal: &SqpeSignal, config: &ConsensusConfig) -> Vote {
    let summary = format!(
        "SQPE {} p={:.3} edge={:+.3}",
        signal.signal_strength, signal.probability, signal.edge
    );
    if signal.signal_strength == SignalStrength::Strong
        && signal.edge > 0.0
        && signal.probability >= config.sqpe_probability_threshold
    {
        Vote::back(Module::Sqpe, signal.confidence, summary)
    } else {
        Vote::abstain(Module::Sqpe, summary)
    }
}

pub fn tie_vote(signal: &TieSignal, config: &ConsensusConfig) -> Vote {
    let summary = format!(
        "TIE {} intent={:.3}",
        signal.classification, signal.intent_score
    );
    match signal.classification {
        IntentClass::Targeting if signal.intent_score >= config.tie_intent_threshold => {
            Vote::back(Module::Tie, signal.intent_score, summary)
        }
        IntentClass::Experience => Vote::fade(Module::Tie, 1.0 - signal.intent_score, summary),
        _ => Vote::abstain(Module::Tie, summary),
    }
}

pub fn nds_vote(signal: &NdsSignal, config: &ConsensusConfig) -> Vote {
    let summary = format!(
        "NDS {} disruption={:.3} ({})",
        signal.narrative, signal.disruption_score, signal.disruption_strength
    );
    if signal.is_fade_opportunity && signal.disruption_score >= config.nds_disruption_threshold {
        Vote::fade(Module::Nds, signal.confidence, summary)
    } else if signal.is_back_opportunity {
        Vote::back(Module::Nds, signal.confidence, summary)
    } else {
        Vote::abstain(Module::Nds, summary)
    }
}
