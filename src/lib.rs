// =============================================================================
// Race Consensus — multi-signal wagering decision engine
// =============================================================================
//
// Three independent evidence sources feed one consensus arbiter:
//   SQPE  calibrated win probability from a boosted ensemble
//   TIE   operator intent score from a regularised linear model
//   NDS   rule-based market-narrative disruption scanner
// The orchestrator only recommends a back or a fade when enough of them agree.
// =============================================================================

pub mod consensus;
pub mod engine_config;
pub mod error;
pub mod history;
pub mod nds;
pub mod sqpe;
pub mod stats;
pub mod tie;
pub mod types;

#[cfg(test)]
pub mod testutil;

pub use consensus::{ConsensusOrchestrator, RaceAnalysis, RaceCard, Recommendation};
pub use engine_config::EngineConfig;
pub use error::{EngineError, EngineResult};
