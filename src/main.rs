// =============================================================================
// Race Consensus — batch entry point
// =============================================================================
//
// Loads config, corpus and race card, makes sure both models are fitted, and
// prints the race analysis as JSON. Fitting runs on blocking tasks; the SQPE
// artifact is reused from disk when present.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use race_consensus::consensus::{ConsensusOrchestrator, RaceCard};
use race_consensus::engine_config::EngineConfig;
use race_consensus::history::HistoricalCorpus;
use race_consensus::sqpe::{SqpeArtifact, SqpeEngine, TrainingSet};
use race_consensus::tie::{ClassDropRestPolicy, TieEngine, TieTrainingSet};

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("race consensus starting");

    let config = EngineConfig::load(env_path("RACE_CONFIG", "engine_config.json"))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            EngineConfig::default()
        });

    // ── 2. Inputs ────────────────────────────────────────────────────────
    let corpus = Arc::new(HistoricalCorpus::load(env_path("RACE_CORPUS", "corpus.json"))?);
    let card = RaceCard::load(env_path("RACE_CARD", "race_card.json"))?;
    let artifact_path = env_path("RACE_ARTIFACT", "sqpe_artifact.json");

    // ── 3. SQPE: load or fit ─────────────────────────────────────────────
    let sqpe = Arc::new(SqpeEngine::new(config.sqpe.clone()));
    if artifact_path.exists() {
        let artifact = SqpeArtifact::load(&artifact_path)
            .with_context(|| format!("failed to load SQPE artifact {}", artifact_path.display()))?;
        sqpe.publish(artifact);
    } else {
        let training = TrainingSet::load(env_path("RACE_TRAINING", "training.json"))?;
        let engine = sqpe.clone();
        let artifact = tokio::task::spawn_blocking(move || engine.fit(&training))
            .await
            .context("SQPE fit task panicked")??;
        artifact.save(&artifact_path)?;
    }

    // ── 4. TIE: label and fit ────────────────────────────────────────────
    let tie = Arc::new(TieEngine::new(config.tie.clone()));
    {
        let engine = tie.clone();
        let corpus = corpus.clone();
        tokio::task::spawn_blocking(move || {
            let policy = ClassDropRestPolicy::default();
            let training = TieTrainingSet::from_corpus(&corpus, &policy, engine.config());
            engine.fit(&training)
        })
        .await
        .context("TIE fit task panicked")??;
    }

    // ── 5. Analyse ───────────────────────────────────────────────────────
    let orchestrator = ConsensusOrchestrator::new(&config, sqpe, tie);
    let analysis = orchestrator.analyze_card(&card, &corpus)?;

    for c in analysis.actionable() {
        info!(
            runner = %c.runner_id,
            recommendation = %c.decision.recommendation,
            conviction = format!("{:.3}", c.decision.conviction),
            "actionable"
        );
    }
    for f in &analysis.failures {
        warn!(runner = %f.runner_id, error = %f.error, "runner not analysed");
    }

    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
