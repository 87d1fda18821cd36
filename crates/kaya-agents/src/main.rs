//! Entry point: wires `RuntimeContext`, the specialist `WorkerSet`, and
//! dispatches to [`kaya_agents::cli`]. Mirrors the grounding repo's
//! `main.rs`/`config.rs` split — endpoints and model names come from the
//! environment with sane local-dev defaults, everything else from
//! [`KayaConfig::load`] or [`KayaConfig::builtin`].

use anyhow::{Context, Result};
use kaya_agents::cli::{Cli, Commands};
use kaya_agents::pipeline::WorkerSet;
use kaya_agents::runtime::RuntimeContext;
use kaya_agents::workers::{CriticWorker, GeminiWorker, MedicWorker, RunnerWorker, ScribeWorker};
use kaya_core::config::KayaConfig;
use kaya_core::events::EventBus;
use clap::Parser;
use rig::providers::openai;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_SCRIBE_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_MEDIC_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_GEMINI_ANALYSIS_MODEL: &str = "gpt-4.1-mini";

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn build_client() -> Result<openai::CompletionsClient> {
    openai::CompletionsClient::builder()
        .api_key(&env_or("KAYA_OPENAI_API_KEY", "local"))
        .base_url(&env_or("KAYA_OPENAI_BASE_URL", DEFAULT_BASE_URL))
        .build()
        .context("failed to build OpenAI-compatible client")
}

fn build_worker_set(ctx: &RuntimeContext) -> Result<WorkerSet> {
    let tests_dir = PathBuf::from(env_or("KAYA_TESTS_DIR", "./tests"));

    let scribe = Arc::new(ScribeWorker::new(
        build_client()?,
        env_or("KAYA_SCRIBE_MODEL", DEFAULT_SCRIBE_MODEL),
        tests_dir.clone(),
        Some(ctx.cold_store.clone()),
    ));

    let critic_path_override = env::var("KAYA_CRITIC_CRITICAL_PATH_OVERRIDE").is_ok();
    let critic = Arc::new(CriticWorker::new(tests_dir.clone(), critic_path_override));

    let backend_port = env::var("KAYA_BACKEND_PORT").ok().and_then(|v| v.parse().ok());
    let frontend_port = env::var("KAYA_FRONTEND_PORT").ok().and_then(|v| v.parse().ok());
    let runner = Arc::new(RunnerWorker::new(
        ctx.process_pool.clone(),
        tests_dir.clone(),
        backend_port,
        frontend_port,
        env_or("KAYA_BROWSER_TOOL", "playwright"),
    ));

    let regression_targets: Vec<String> = env::var("KAYA_MEDIC_REGRESSION_TARGETS")
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let medic = Arc::new(MedicWorker::new(
        build_client()?,
        env_or("KAYA_MEDIC_MODEL", DEFAULT_MEDIC_MODEL),
        tests_dir.clone(),
        ctx.hot_store.clone(),
        runner.clone(),
        regression_targets,
    ));

    let analysis_client = if env::var("KAYA_DISABLE_GEMINI_ANALYSIS").is_ok() {
        None
    } else {
        Some((build_client()?, env_or("KAYA_GEMINI_ANALYSIS_MODEL", DEFAULT_GEMINI_ANALYSIS_MODEL)))
    };
    let gemini = Arc::new(GeminiWorker::new(ctx.process_pool.clone(), tests_dir, analysis_client));

    Ok(WorkerSet { scribe, critic, runner, medic, gemini })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => KayaConfig::load(path).context("failed to load config file")?,
        None => KayaConfig::builtin(),
    };

    let events = EventBus::new().shared();
    let ctx = RuntimeContext::new(config, events);
    let workers = build_worker_set(&ctx)?;

    let exit_code = kaya_agents::cli::dispatch(&ctx, &workers, cli.command).await?;
    std::process::exit(exit_code);
}
