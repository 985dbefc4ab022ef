// =============================================================================
// History Module
// =============================================================================
//
// Leakage-safe access to past results:
// - HistoricalCorpus: chronologically ordered records with as-of views
// - RunnerHistory: one runner's prior runs, most recent first

pub mod corpus;
pub mod runner_history;

pub use corpus::HistoricalCorpus;
pub use runner_history::{PriorRun, RunnerHistory};
