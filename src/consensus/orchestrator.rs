// =============================================================================
// Consensus Orchestrator — per-race analysis pipeline
// =============================================================================
//
// Race pass:
//   1. Snapshot fitted state once (SQPE artifact, TIE model, aggregates for
//      the race date). Unfitted engines stop the race before any decision.
//   2. Overround across the whole field (barrier: every price known first)
//   3. Per competitor, in parallel over the same snapshot:
//        SQPE signal   engineered features + race-card fundamentals + odds
//        TIE signal    aggregates + runner history
//        NDS signal    history + overround
//        votes -> tally -> recommendation -> conviction
//   4. Failures are recorded per competitor; the rest of the field completes
//   5. Sort by conviction descending, then runner id
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consensus::decision::ConsensusDecision;
use crate::consensus::report::{CompetitorAnalysis, CompetitorFailure, RaceAnalysis};
use crate::consensus::vote::{nds_vote, sqpe_vote, tie_vote};
use crate::engine_config::{ConsensusConfig, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::history::{HistoricalCorpus, RunnerHistory};
use crate::nds::NdsScanner;
use crate::sqpe::{FundamentalScores, SqpeArtifact, SqpeEngine, SqpeFeatureVector};
use crate::tie::aggregates::AggregateSnapshot;
use crate::tie::features::{runner_features, CompetitorContext};
use crate::tie::{TieEngine, TieModel};
use crate::types::{Race, Runner};

/// A race plus the engineered SQPE features for each runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceCard {
    pub race: Race,
    #[serde(default)]
    pub features: BTreeMap<String, SqpeFeatureVector>,
}

impl RaceCard {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read race card from {}", path.display()))?;
        let card: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse race card from {}", path.display()))?;
        info!(
            path = %path.display(),
            race = %card.race.id,
            runners = card.race.runners.len(),
            "race card loaded"
        );
        Ok(card)
    }
}

/// Fitted state pinned for one race pass.
struct ModelSnapshot {
    sqpe: Arc<SqpeArtifact>,
    tie: Arc<TieModel>,
    aggregates: Arc<AggregateSnapshot>,
}

pub struct ConsensusOrchestrator {
    config: ConsensusConfig,
    sqpe: Arc<SqpeEngine>,
    tie: Arc<TieEngine>,
    nds: NdsScanner,
}

impl ConsensusOrchestrator {
    pub fn new(config: &EngineConfig, sqpe: Arc<SqpeEngine>, tie: Arc<TieEngine>) -> Self {
        Self {
            config: config.consensus.clone(),
            sqpe,
            tie,
            nds: NdsScanner::new(config.nds.clone()),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    fn snapshot(&self, corpus: &HistoricalCorpus, as_of: NaiveDate) -> EngineResult<ModelSnapshot> {
        Ok(ModelSnapshot {
            sqpe: self.sqpe.snapshot()?,
            tie: self.tie.snapshot()?,
            aggregates: self.tie.aggregates_for(corpus, as_of),
        })
    }

    /// Analyse a single runner of `race`.
    pub fn analyze_runner(
        &self,
        race: &Race,
        runner_id: &str,
        features: &SqpeFeatureVector,
        corpus: &HistoricalCorpus,
    ) -> EngineResult<CompetitorAnalysis> {
        let runner = race
            .runner(runner_id)
            .ok_or_else(|| EngineError::UnknownRunner(runner_id.to_string()))?;
        let models = self.snapshot(corpus, race.date)?;
        let overround = race.market_overround();
        self.analyze_with(&models, race, runner, Some(features), corpus, overround)
    }

    pub fn analyze_card(&self, card: &RaceCard, corpus: &HistoricalCorpus) -> EngineResult<RaceAnalysis> {
        self.analyze_race(&card.race, &card.features, corpus)
    }

    /// Analyse every runner. Only an unfitted engine fails the whole race;
    /// anything else is recorded against the competitor.
    pub fn analyze_race(
        &self,
        race: &Race,
        features: &BTreeMap<String, SqpeFeatureVector>,
        corpus: &HistoricalCorpus,
    ) -> EngineResult<RaceAnalysis> {
        let models = self.snapshot(corpus, race.date)?;

        // ── Barrier: overround needs every price ────────────────────────
        let overround = race.market_overround();

        let results: Vec<(String, EngineResult<CompetitorAnalysis>)> = race
            .runners
            .par_iter()
            .map(|runner| {
                let result = self.analyze_with(
                    &models,
                    race,
                    runner,
                    features.get(&runner.id),
                    corpus,
                    overround,
                );
                (runner.id.clone(), result)
            })
            .collect();

        let mut competitors = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (runner_id, result) in results {
            match result {
                Ok(analysis) => competitors.push(analysis),
                Err(e) => {
                    warn!(race = %race.id, runner = %runner_id, error = %e, "competitor analysis failed");
                    failures.push(CompetitorFailure {
                        runner_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let analysis = RaceAnalysis::new(race.id.clone(), overround, competitors, failures);
        info!(
            race = %analysis.race_id,
            overround = format!("{:.3}", overround),
            analysed = analysis.competitors.len(),
            failed = analysis.failures.len(),
            actionable = analysis.actionable().count(),
            "race analysis complete"
        );
        Ok(analysis)
    }

    fn analyze_with(
        &self,
        models: &ModelSnapshot,
        race: &Race,
        runner: &Runner,
        features: Option<&SqpeFeatureVector>,
        corpus: &HistoricalCorpus,
        overround: f64,
    ) -> EngineResult<CompetitorAnalysis> {
        let features = features.ok_or_else(|| EngineError::FeatureSchemaMismatch {
            expected: models.sqpe.feature_names.clone(),
            actual: Vec::new(),
        })?;

        // ── SQPE ────────────────────────────────────────────────────────
        let fundamentals = FundamentalScores::from_race_card(race, runner);
        let sqpe = self
            .sqpe
            .predict_with(&models.sqpe, features, &fundamentals, runner.odds)?;

        // ── TIE ─────────────────────────────────────────────────────────
        // Dated corpus runs only, matching how training rows are built.
        let corpus_history = RunnerHistory::from_corpus(corpus, &runner.id, race.date);
        let ctx = CompetitorContext::for_runner(race, runner, &corpus_history);
        let tie_features = runner_features(&ctx, &models.aggregates, self.tie.config());
        let tie = self.tie.predict_with(&models.tie, &tie_features);

        // ── NDS ─────────────────────────────────────────────────────────
        let nds_history = self.nds.history_for(corpus, race, runner);
        let nds = self
            .nds
            .analyze_history(runner.odds, race.class, &nds_history, overround);

        // ── Vote ────────────────────────────────────────────────────────
        let votes = vec![
            sqpe_vote(&sqpe, &self.config),
            tie_vote(&tie, &self.config),
            nds_vote(&nds, &self.config),
        ];
        let decision = ConsensusDecision::from_votes(runner.id.clone(), votes, &self.config);

        debug!(
            runner = %runner.id,
            recommendation = %decision.recommendation,
            conviction = format!("{:.3}", decision.conviction),
            back = decision.back_count,
            fade = decision.fade_count,
            "consensus decision"
        );

        Ok(CompetitorAnalysis {
            runner_id: runner.id.clone(),
            runner_name: runner.name.clone(),
            market_odds: runner.odds,
            sqpe,
            tie,
            nds,
            decision,
        })
    }
}
