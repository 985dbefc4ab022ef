// =============================================================================
// NDS Module — Narrative Disruption Scanner
// =============================================================================
//
// Rule-based, no fitting step:
// - detectors: hype / recency bias / false form / drift signals
// - scanner:   narrative selection, disruption score, fade/back opportunities

pub mod detectors;
pub mod scanner;

pub use scanner::{DisruptionStrength, NarrativeSignals, NarrativeType, NdsScanner, NdsSignal};
