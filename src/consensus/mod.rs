// =============================================================================
// Consensus Module
// =============================================================================
//
// Combines the three engines into one decision per runner:
// - vote:         signal -> back / fade / abstain
// - decision:     tally, agreement, decision table, conviction
// - orchestrator: per-race pipeline with the overround barrier
// - report:       race-level output and filters

pub mod decision;
pub mod orchestrator;
pub mod report;
pub mod vote;

pub use decision::{recommend, ConsensusDecision, Recommendation, VoteTally};
pub use orchestrator::{ConsensusOrchestrator, RaceCard};
pub use report::{CompetitorAnalysis, CompetitorFailure, RaceAnalysis};
pub use vote::{Module, Vote, VoteDirection};
