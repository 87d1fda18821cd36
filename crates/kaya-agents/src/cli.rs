//! CLI surface (spec.md §6): `status`, `route`, `run`, `review`, `kaya
//! "<command>"`, `hitl`, and `metrics`. Each subcommand exits 0 on success,
//! non-zero on failure, per spec.md's "human-readable status on stdout,
//! structured errors on stderr" contract. Grounded on the grounding repo's
//! `coordination/src/main.rs` `clap::Parser`-derived `Args` shape.

use crate::intent;
use crate::pipeline::{self, PipelineOutcome, PipelineStatus, WorkerSet};
use crate::runtime::RuntimeContext;
use crate::workers::call_with_policy;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kaya_core::clock::{SessionId, TaskId};
use kaya_core::hitl::Annotation;
use kaya_core::resilience::RetryPolicy;
use kaya_core::worker::{CriticRequest, RunnerRequest, WorkerKind, WorkerRequest};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "kaya", author, version, about = "Voice/text-driven test orchestrator", long_about = None)]
pub struct Cli {
    /// Path to a KayaConfig policy document (TOML). Defaults to the
    /// built-in config when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Session budget, circuit breaker states, process pool capacity.
    Status {
        #[arg(long)]
        session: Option<SessionId>,
    },
    /// Print the RouteDecision for a task type/description; does not execute.
    Route {
        task_type: String,
        description: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Runs the Runner once against a test path.
    Run {
        path: String,
        #[arg(long, default_value_t = 180)]
        timeout_secs: u64,
        #[arg(long)]
        fast_fail: bool,
    },
    /// Runs the Critic once against a generated test file.
    Review { path: String },
    /// Parses a free-text intent and runs the appropriate pipeline.
    Kaya {
        command: String,
        #[arg(long)]
        session: Option<SessionId>,
        #[arg(long)]
        critical: bool,
    },
    /// HITL queue operations.
    Hitl {
        #[command(subcommand)]
        action: HitlAction,
    },
    /// Read-only metrics queries.
    Metrics {
        #[command(subcommand)]
        query: MetricsQuery,
    },
}

#[derive(Debug, Subcommand)]
pub enum HitlAction {
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Get {
        id: TaskId,
    },
    Resolve {
        id: TaskId,
        #[arg(long)]
        annotation: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum MetricsQuery {
    Summary {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    AgentUtilization {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    CostPerFeature {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    RejectionRate {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    ValidationRate {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    RetryCount {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    ModelUsage {
        #[arg(long, default_value_t = 1)]
        window: u32,
    },
    Trend {
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

/// Runs `command` against `ctx`/`workers` and returns the process exit code.
pub async fn dispatch(ctx: &RuntimeContext, workers: &WorkerSet, command: Commands) -> Result<i32> {
    match command {
        Commands::Status { session } => status(ctx, session),
        Commands::Route { task_type, description, path } => route(ctx, &task_type, &description, path.as_deref()),
        Commands::Run { path, timeout_secs, fast_fail } => run(ctx, workers, path, timeout_secs, fast_fail).await,
        Commands::Review { path } => review(ctx, workers, path).await,
        Commands::Kaya { command, session, critical } => kaya(ctx, workers, command, session, critical).await,
        Commands::Hitl { action } => hitl(ctx, action),
        Commands::Metrics { query } => metrics(ctx, query),
    }
}

const WORKER_NAMES: &[&str] = &["scribe", "critic", "runner", "medic", "gemini"];

fn status(ctx: &RuntimeContext, session: Option<SessionId>) -> Result<i32> {
    println!(
        "process pool: {}/{} permits free",
        ctx.process_pool.available_permits(),
        ctx.config.concurrency.process_pool_size
    );

    println!("circuit breakers:");
    {
        let breaker = ctx.circuit_breaker.lock().unwrap();
        for name in WORKER_NAMES {
            println!("  {name}: {:?}", breaker.state(name));
        }
    }

    if let Some(session_id) = session {
        let record = pipeline::load_or_create_session(ctx, session_id);
        println!(
            "session {session_id}: {:.4}/{:.4} USD used ({:.4} remaining)",
            record.cost_used, record.cost_cap_total, record.remaining()
        );
    }

    let hitl_stats = ctx.hitl_queue.stats();
    println!("hitl queue depth: {}", hitl_stats.queue_depth);

    Ok(0)
}

fn route(ctx: &RuntimeContext, task_type: &str, description: &str, path: Option<&str>) -> Result<i32> {
    let decision = ctx.router.decide(task_type, description, path, None);
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(0)
}

async fn run(ctx: &RuntimeContext, workers: &WorkerSet, path: String, timeout_secs: u64, fast_fail: bool) -> Result<i32> {
    let task_id = TaskId::new();
    let session_id = SessionId::new();
    let request = WorkerRequest::new(
        task_id,
        session_id,
        WorkerKind::Runner,
        RunnerRequest { test_path: path, timeout_secs, fast_fail },
        0.0,
        kaya_core::clock::now() + chrono::Duration::seconds(timeout_secs as i64 + 20),
    )
    .context("could not build runner request")?;

    let result = call_with_policy(
        workers.runner.as_ref(),
        request,
        "runner",
        &RetryPolicy::for_worker("runner"),
        &ctx.circuit_breaker,
        Some(&ctx.events),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.ok { 0 } else { 1 })
}

async fn review(ctx: &RuntimeContext, workers: &WorkerSet, path: String) -> Result<i32> {
    let task_id = TaskId::new();
    let session_id = SessionId::new();
    let request = WorkerRequest::new(
        task_id,
        session_id,
        WorkerKind::Critic,
        CriticRequest { test_path: path },
        0.0,
        kaya_core::clock::now() + chrono::Duration::seconds(60),
    )
    .context("could not build critic request")?;

    let result = call_with_policy(
        workers.critic.as_ref(),
        request,
        "critic",
        &RetryPolicy::for_worker("critic"),
        &ctx.circuit_breaker,
        Some(&ctx.events),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.ok { 0 } else { 1 })
}

async fn kaya(ctx: &RuntimeContext, workers: &WorkerSet, raw: String, session: Option<SessionId>, critical: bool) -> Result<i32> {
    let parsed = intent::parse(&raw);
    if !intent::is_confident(&parsed) {
        println!("brainstorm (confidence {:.2}): could not confidently classify \"{raw}\"", parsed.confidence);
        return Ok(1);
    }

    let session_id = session.unwrap_or_default();
    let feature = parsed.slots.feature.clone().unwrap_or_else(|| raw.clone());

    let outcome = match parsed.kind {
        intent::IntentKind::CreateTest => {
            let path = parsed.slots.path.clone().unwrap_or_else(|| format!("{feature}.spec.ts"));
            pipeline::run_full_pipeline(ctx, workers, session_id, feature, raw, path, critical).await
        }
        intent::IntentKind::IterativeFix => {
            let path = parsed.slots.path.clone().unwrap_or_default();
            pipeline::run_iterative_fix_pipeline(ctx, workers, session_id, feature, path, critical).await
        }
        intent::IntentKind::RunTest => {
            let path = parsed.slots.path.clone().unwrap_or_default();
            return run(ctx, workers, path, 180, false).await;
        }
        intent::IntentKind::Validate { critical: path_critical } => {
            let path = parsed.slots.path.clone().unwrap_or_default();
            pipeline::run_iterative_fix_pipeline(ctx, workers, session_id, feature, path, critical || path_critical).await
        }
        intent::IntentKind::Status => return status(ctx, session),
        intent::IntentKind::Brainstorm => {
            println!("no pipeline mapped to this intent; treating as brainstorm");
            return Ok(1);
        }
    };

    print_outcome(&outcome)
}

fn print_outcome(outcome: &PipelineOutcome) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    let code = match outcome.status {
        PipelineStatus::Succeeded => 0,
        _ => 1,
    };
    Ok(code)
}

fn hitl(ctx: &RuntimeContext, action: HitlAction) -> Result<i32> {
    match action {
        HitlAction::List { limit } => {
            let tasks = ctx.hitl_queue.list(limit, None);
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            Ok(0)
        }
        HitlAction::Get { id } => match ctx.hitl_queue.get(id) {
            Some(task) => {
                println!("{}", serde_json::to_string_pretty(&task)?);
                Ok(0)
            }
            None => {
                eprintln!("no such hitl task: {id}");
                Ok(1)
            }
        },
        HitlAction::Resolve { id, annotation } => {
            let annotation: Annotation = serde_json::from_str(&annotation).context("invalid --annotation JSON")?;
            match ctx.hitl_queue.resolve(id, annotation) {
                Ok(()) => {
                    println!("resolved {id}");
                    Ok(0)
                }
                Err(err) => {
                    eprintln!("could not resolve {id}: {err}");
                    Ok(1)
                }
            }
        }
    }
}

fn metrics(ctx: &RuntimeContext, query: MetricsQuery) -> Result<i32> {
    match query {
        MetricsQuery::Summary { window } => print_json(ctx.metrics.summary(window)),
        MetricsQuery::AgentUtilization { window } => print_json(ctx.metrics.summary(window).agent_utilization),
        MetricsQuery::CostPerFeature { window } => print_json(ctx.metrics.summary(window).cost_per_feature),
        MetricsQuery::RejectionRate { window } => print_json(ctx.metrics.summary(window).critic_rejection_rate),
        MetricsQuery::ValidationRate { window } => print_json(ctx.metrics.summary(window).validation_pass_rate),
        MetricsQuery::RetryCount { window } => print_json(ctx.metrics.summary(window).average_retry_count),
        MetricsQuery::ModelUsage { window } => print_json(ctx.metrics.summary(window).model_usage),
        MetricsQuery::Trend { days } => print_json(ctx.metrics.trend(days)),
    }
}

fn print_json(value: impl serde::Serialize) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(0)
}
