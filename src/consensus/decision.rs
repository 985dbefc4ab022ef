// =============================================================================
// Consensus Decision — tally, agreement, recommendation, conviction
// =============================================================================
//
// Decision table (evaluated top-to-bottom; first match wins):
//
//   1. STRONG_BACK    — back_count >= 3
//   2. MODERATE_BACK  — back_count >= min_modules_required
//   3. STRONG_FADE    — fade_count >= 3
//   4. MODERATE_FADE  — fade_count >= min_modules_required
//   5. HOLD
//
// HOLD is the only outcome while neither direction reaches the quorum.
//
// agreement = confidence weight of the majority direction / weight of all
//             non-abstaining votes (0 when everyone abstains)
// conviction = agreement, x unanimity_bonus (capped at 1) when all three
//              modules vote the same way
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::consensus::vote::{Vote, VoteDirection};
use crate::engine_config::ConsensusConfig;

/// Modules taking part in every decision.
pub const MODULE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    StrongBack,
    ModerateBack,
    Hold,
    ModerateFade,
    StrongFade,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongBack => write!(f, "STRONG_BACK"),
            Self::ModerateBack => write!(f, "MODERATE_BACK"),
            Self::Hold => write!(f, "HOLD"),
            Self::ModerateFade => write!(f, "MODERATE_FADE"),
            Self::StrongFade => write!(f, "STRONG_FADE"),
        }
    }
}

impl Recommendation {
    pub fn is_back(self) -> bool {
        matches!(self, Self::StrongBack | Self::ModerateBack)
    }

    pub fn is_fade(self) -> bool {
        matches!(self, Self::StrongFade | Self::ModerateFade)
    }

    pub fn is_actionable(self) -> bool {
        self != Self::Hold
    }
}

/// Apply the decision table to raw counts.
pub fn recommend(back_count: usize, fade_count: usize, min_required: usize) -> Recommendation {
    if back_count >= MODULE_COUNT {
        Recommendation::StrongBack
    } else if back_count >= min_required {
        Recommendation::ModerateBack
    } else if fade_count >= MODULE_COUNT {
        Recommendation::StrongFade
    } else if fade_count >= min_required {
        Recommendation::ModerateFade
    } else {
        Recommendation::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub back_count: usize,
    pub fade_count: usize,
    pub back_weight: f64,
    pub fade_weight: f64,
}

impl VoteTally {
    pub fn from_votes(votes: &[Vote]) -> Self {
        let mut t = Self {
            back_count: 0,
            fade_count: 0,
            back_weight: 0.0,
            fade_weight: 0.0,
        };
        for v in votes {
            match v.direction {
                VoteDirection::Back => {
                    t.back_count += 1;
                    t.back_weight += v.confidence;
                }
                VoteDirection::Fade => {
                    t.fade_count += 1;
                    t.fade_weight += v.confidence;
                }
                VoteDirection::Abstain => {}
            }
        }
        t
    }

    /// Majority by count; a tied count goes to the heavier side, then to back.
    pub fn majority(&self) -> VoteDirection {
        if self.back_count == 0 && self.fade_count == 0 {
            VoteDirection::Abstain
        } else if self.back_count != self.fade_count {
            if self.back_count > self.fade_count {
                VoteDirection::Back
            } else {
                VoteDirection::Fade
            }
        } else if self.fade_weight > self.back_weight {
            VoteDirection::Fade
        } else {
            VoteDirection::Back
        }
    }

    pub fn agreement_score(&self) -> f64 {
        let total = self.back_weight + self.fade_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let matching = match self.majority() {
            VoteDirection::Back => self.back_weight,
            VoteDirection::Fade => self.fade_weight,
            VoteDirection::Abstain => 0.0,
        };
        (matching / total).clamp(0.0, 1.0)
    }

    pub fn is_unanimous(&self) -> bool {
        self.back_count == MODULE_COUNT || self.fade_count == MODULE_COUNT
    }
}

/// Final per-competitor verdict. Contains no ids or timestamps, so identical
/// inputs serialise to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub runner_id: String,
    pub recommendation: Recommendation,
    pub conviction: f64,
    pub agreement_score: f64,
    pub back_count: usize,
    pub fade_count: usize,
    pub votes: Vec<Vote>,
    /// Rationales of the non-abstaining votes, in module order.
    pub rationale: Vec<String>,
}

impl ConsensusDecision {
    pub fn from_votes(runner_id: impl Into<String>, votes: Vec<Vote>, config: &ConsensusConfig) -> Self {
        let tally = VoteTally::from_votes(&votes);
        let recommendation = recommend(tally.back_count, tally.fade_count, config.min_modules_required);

        let agreement_score = tally.agreement_score();
        let conviction = if tally.is_unanimous() {
            (agreement_score * config.unanimity_bonus).min(1.0)
        } else {
            agreement_score
        };

        let rationale = votes
            .iter()
            .filter(|v| !v.is_abstain())
            .map(|v| v.rationale.clone())
            .collect();

        Self {
            runner_id: runner_id.into(),
            recommendation,
            conviction,
            agreement_score,
            back_count: tally.back_count,
            fade_count: tally.fade_count,
            votes,
            rationale,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.recommendation.is_actionable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::vote::Module;
    use proptest::prelude::*;

    const MODULES: [Module; 3] = [Module::Sqpe, Module::Tie, Module::Nds];

    fn vote(module: Module, direction: VoteDirection, confidence: f64) -> Vote {
        match direction {
            VoteDirection::Back => Vote::back(module, confidence, format!("{module} back")),
            VoteDirection::Fade => Vote::fade(module, confidence, format!("{module} fade")),
            VoteDirection::Abstain => Vote::abstain(module, format!("{module} abstain")),
        }
    }

    fn votes(directions: [VoteDirection; 3], confidences: [f64; 3]) -> Vec<Vote> {
        MODULES
            .iter()
            .zip(directions)
            .zip(confidences)
            .map(|((m, d), c)| vote(*m, d, c))
            .collect()
    }

    use VoteDirection::{Abstain as A, Back as B, Fade as F};

    #[test]
    fn two_backs_one_abstain_is_moderate_back() {
        // SQPE back, TIE back at 0.85, NDS abstains.
        let d = ConsensusDecision::from_votes(
            "r1",
            votes([B, B, A], [0.8, 0.85, 0.0]),
            &ConsensusConfig::default(),
        );
        assert_eq!(d.back_count, 2);
        assert_eq!(d.recommendation, Recommendation::ModerateBack);
        assert!((d.agreement_score - 1.0).abs() < 1e-12);
        assert!((d.conviction - 1.0).abs() < 1e-12);
        assert_eq!(d.rationale.len(), 2);
    }

    #[test]
    fn unanimous_back_is_strong() {
        let d = ConsensusDecision::from_votes(
            "r1",
            votes([B, B, B], [0.6, 0.7, 0.8]),
            &ConsensusConfig::default(),
        );
        assert_eq!(d.recommendation, Recommendation::StrongBack);
        assert_eq!(d.conviction, 1.0);
    }

    #[test]
    fn split_vote_holds() {
        let d = ConsensusDecision::from_votes(
            "r1",
            votes([B, F, A], [0.9, 0.3, 0.0]),
            &ConsensusConfig::default(),
        );
        assert_eq!(d.recommendation, Recommendation::Hold);
        assert!((d.agreement_score - 0.75).abs() < 1e-12);
        assert!(!d.is_actionable());
    }

    #[test]
    fn all_abstain_scores_zero() {
        let d = ConsensusDecision::from_votes(
            "r1",
            votes([A, A, A], [0.0; 3]),
            &ConsensusConfig::default(),
        );
        assert_eq!(d.recommendation, Recommendation::Hold);
        assert_eq!(d.agreement_score, 0.0);
        assert_eq!(d.conviction, 0.0);
        assert!(d.rationale.is_empty());
    }

    #[test]
    fn two_fades_is_moderate_fade() {
        let d = ConsensusDecision::from_votes(
            "r1",
            votes([A, F, F], [0.0, 0.8, 0.6]),
            &ConsensusConfig::default(),
        );
        assert_eq!(d.recommendation, Recommendation::ModerateFade);
        assert!(d.recommendation.is_fade());
    }

    #[test]
    fn tied_count_goes_to_heavier_side() {
        let t = VoteTally::from_votes(&votes([B, F, A], [0.2, 0.9, 0.0]));
        assert_eq!(t.majority(), VoteDirection::Fade);
        let t = VoteTally::from_votes(&votes([B, F, A], [0.5, 0.5, 0.0]));
        assert_eq!(t.majority(), VoteDirection::Back);
    }

    #[test]
    fn decision_table() {
        assert_eq!(recommend(3, 0, 2), Recommendation::StrongBack);
        assert_eq!(recommend(2, 1, 2), Recommendation::ModerateBack);
        assert_eq!(recommend(0, 3, 2), Recommendation::StrongFade);
        assert_eq!(recommend(1, 2, 2), Recommendation::ModerateFade);
        assert_eq!(recommend(1, 1, 2), Recommendation::Hold);
        assert_eq!(recommend(2, 0, 3), Recommendation::Hold);
        assert_eq!(recommend(1, 0, 1), Recommendation::ModerateBack);
    }

    fn direction() -> impl Strategy<Value = VoteDirection> {
        prop_oneof![Just(B), Just(F), Just(A)]
    }

    proptest! {
        #[test]
        fn hold_exactly_below_quorum(back in 0usize..=3, fade in 0usize..=3, min in 1usize..=3) {
            prop_assume!(back + fade <= 3);
            let r = recommend(back, fade, min);
            if r.is_back() {
                prop_assert!(back >= min);
            }
            if r.is_fade() {
                prop_assert!(fade >= min);
            }
            prop_assert_eq!(r == Recommendation::Hold, back < min && fade < min);
        }

        #[test]
        fn scores_are_bounded(
            dirs in prop::array::uniform3(direction()),
            confs in prop::array::uniform3(0.0f64..=1.0),
        ) {
            let d = ConsensusDecision::from_votes("r", votes(dirs, confs), &ConsensusConfig::default());
            prop_assert!((0.0..=1.0).contains(&d.agreement_score));
            prop_assert!((0.0..=1.0).contains(&d.conviction));
            prop_assert!(d.back_count + d.fade_count <= 3);
        }

        #[test]
        fn more_agreeing_modules_never_lower_conviction(
            confs in prop::array::uniform3(0.0f64..=1.0),
            fade in any::<bool>(),
        ) {
            let dir = if fade { F } else { B };
            let cfg = ConsensusConfig::default();
            let one = ConsensusDecision::from_votes("r", votes([dir, A, A], confs), &cfg);
            let two = ConsensusDecision::from_votes("r", votes([dir, dir, A], confs), &cfg);
            let three = ConsensusDecision::from_votes("r", votes([dir, dir, dir], confs), &cfg);
            prop_assert!(two.conviction >= one.conviction);
            prop_assert!(three.conviction >= two.conviction);
        }

        #[test]
        fn decisions_are_deterministic(
            dirs in prop::array::uniform3(direction()),
            confs in prop::array::uniform3(0.0f64..=1.0),
        ) {
            let cfg = ConsensusConfig::default();
            let a = ConsensusDecision::from_votes("r", votes(dirs, confs), &cfg);
            let b = ConsensusDecision::from_votes("r", votes(dirs, confs), &cfg);
            prop_assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }
    }
}
