//! Kometa-AI CLI entry point.
//!
//! A `clap`-derive `Cli`, one dispatch branch per flag,
//! `anyhow::Result` at the binary boundary; flags are flat rather than
//! subcommands since every invocation does at most one thing.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use kometa_ai::catalog::{CatalogClient, RadarrCatalogClient};
use kometa_ai::config::Config;
use kometa_ai::health;
use kometa_ai::model::Movie;
use kometa_ai::oracle::{ClaudeOracleClient, OracleClient, OracleRequest};
use kometa_ai::orchestrator::{self, RunOptions};
use kometa_ai::reporter;
use kometa_ai::rubric;
use kometa_ai::scheduler::Schedule;
use kometa_ai::smtp;
use kometa_ai::store::DecisionStore;

/// Batch sizes tried by `--optimize-batch-size` ( sweep).
const CANDIDATE_BATCH_SIZES: &[usize] = &[10, 25, 50, 100, 150, 250];

#[derive(Parser)]
#[command(name = "kometa-ai")]
#[command(about = "Reconciles AI-derived category labels onto a Radarr movie catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// One-shot immediate invocation, bypassing the scheduler.
    #[arg(long)]
    run_now: bool,

    /// Compute actions without mutating the catalog.
    #[arg(long)]
    dry_run: bool,

    /// Restrict the run to a single rubric by name.
    #[arg(long)]
    collection: Option<String>,

    /// Override the planner's batch size for this run.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Reask every movie regardless of cached fingerprint or threshold.
    #[arg(long)]
    force_refresh: bool,

    /// Run the health probe and exit (0 ok, 2 failure).
    #[arg(long)]
    health_check: bool,

    /// Print the resolved, secret-redacted configuration and exit.
    #[arg(long)]
    dump_config: bool,

    /// Print the full decision store document and exit.
    #[arg(long)]
    dump_state: bool,

    /// Clear all decisions and logs (interactive confirmation unless
    /// combined with --run-now).
    #[arg(long)]
    reset_state: bool,

    /// Sweep candidate batch sizes and report oracle cost-per-item.
    #[arg(long)]
    optimize_batch_size: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match try_main().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("fatal: {e:?}");
            ExitCode::from(3)
        }
    }
}

async fn try_main() -> anyhow::Result<u8> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return Ok(1);
        }
    };
    init_tracing(config.debug_logging);

    if cli.dump_config {
        println!("{}", config.dump());
        return Ok(0);
    }

    let state_dir = PathBuf::from(&config.state_dir);
    let mut store = DecisionStore::open(&state_dir).context("opening decision store")?;

    if cli.dump_state {
        println!("{}", store.dump());
        return Ok(0);
    }

    if cli.reset_state {
        if !cli.run_now && !confirm_reset(&state_dir)? {
            println!("aborted");
            return Ok(0);
        }
        store.reset().context("resetting state")?;
        println!("state reset");
        return Ok(0);
    }

    let catalog = RadarrCatalogClient::new(
        config.radarr_url.clone(),
        config.radarr_api_key.clone(),
        config.oracle_timeout_secs,
    )
    .context("building catalog client")?;
    let oracle = ClaudeOracleClient::new(
        config.claude_api_key.clone(),
        config.claude_model.clone(),
        config.oracle_temperature,
        config.oracle_max_tokens,
        config.oracle_timeout_secs,
        config.input_cost_per_million,
        config.output_cost_per_million,
    )
    .context("building oracle client")?;

    if cli.health_check {
        let rubric_dir = Path::new(&config.rubric_dir);
        let report = health::run_checks(&catalog, &oracle, rubric_dir, &state_dir).await;
        for check in &report.checks {
            println!("[{}] {}: {}", if check.ok { "ok" } else { "FAIL" }, check.name, check.detail);
        }
        return Ok(if report.all_ok() { 0 } else { 2 });
    }

    if cli.optimize_batch_size {
        run_batch_size_sweep(&config, &catalog, &oracle).await?;
        return Ok(0);
    }

    if cli.run_now {
        let opts = RunOptions {
            category_filter: cli.collection.clone(),
            force_refresh: cli.force_refresh,
            dry_run: cli.dry_run,
            batch_size: cli.batch_size,
        };
        let summary = orchestrator::run(&config, &mut store, &catalog, &oracle, opts)
            .await
            .context("run failed")?;
        let report = reporter::render(&summary, None);
        println!("{report}");
        notify_if_warranted(&config, &summary, &report);
        return Ok(0);
    }

    let Some(schedule_config) = &config.schedule else {
        eprintln!("no SCHEDULE_INTERVAL configured; pass --run-now for a one-shot invocation");
        return Ok(1);
    };
    let schedule = Schedule::from_config(schedule_config).context("parsing schedule configuration")?;
    run_scheduler_loop(&config, &mut store, &catalog, &oracle, &schedule).await;
    Ok(0)
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn confirm_reset(state_dir: &Path) -> anyhow::Result<bool> {
    print!("Reset all decisions and logs in {}? [y/N] ", state_dir.display());
    std::io::stdout().flush().ok();
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn notify_if_warranted(config: &Config, summary: &kometa_ai::model::RunSummary, report: &str) {
    let Some(smtp_config) = &config.smtp else { return };
    if !reporter::should_notify(summary, smtp_config.notify_on_no_changes, smtp_config.notify_on_errors_only) {
        return;
    }
    if let Err(e) = smtp::send(smtp_config, "Kometa-AI run report", report) {
        tracing::warn!(error = %e, "failed to send notification email");
    }
}

/// Drive `Schedule::next_activation`/`sleep_until` forever, running the
/// orchestrator on each activation, until SIGINT/SIGTERM. The
/// process exit code stays 0 regardless of individual run failures; those
/// surface through the report and logs.
async fn run_scheduler_loop(
    config: &Config,
    store: &mut DecisionStore,
    catalog: &dyn CatalogClient,
    oracle: &dyn OracleClient,
    schedule: &Schedule,
) {
    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancelled.store(true, Ordering::SeqCst);
        });
    }

    while !cancelled.load(Ordering::SeqCst) {
        let next = schedule.next_activation(Utc::now());
        tracing::info!(next = %next.to_rfc3339(), "waiting for next scheduled activation");
        kometa_ai::scheduler::sleep_until(next, || cancelled.load(Ordering::SeqCst)).await;
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        match orchestrator::run(config, store, catalog, oracle, RunOptions::default()).await {
            Ok(summary) => {
                let next_activation = Some(schedule.next_activation(Utc::now()));
                let report = reporter::render(&summary, next_activation);
                tracing::info!("{report}");
                notify_if_warranted(config, &summary, &report);
            }
            Err(e) => tracing::error!(error = %e, "scheduled run failed"),
        }
    }
    tracing::info!("shutdown signal received; exiting scheduler loop");
}

async fn run_batch_size_sweep(
    config: &Config,
    catalog: &dyn CatalogClient,
    oracle: &dyn OracleClient,
) -> anyhow::Result<()> {
    let extraction = rubric::extract_dir(Path::new(&config.rubric_dir), false)?;
    let Some(rubric) = extraction.rubrics.into_iter().find(|r| r.enabled) else {
        println!("no enabled rubrics found; nothing to sweep");
        return Ok(());
    };
    let movies = catalog.list_movies().await?;
    if movies.is_empty() {
        println!("catalog has no movies; nothing to sweep");
        return Ok(());
    }

    println!("{:>10}  {:>12}  {:>14}", "batch_size", "sample_size", "cost_per_item");
    for &size in CANDIDATE_BATCH_SIZES {
        let sample: Vec<Movie> = movies.iter().take(size).cloned().collect();
        if sample.is_empty() {
            continue;
        }
        let reply = oracle
            .classify(OracleRequest { rubric: &rubric, movies: &sample, detailed: false })
            .await?;
        let per_item = reply.usage.estimated_cost / sample.len() as f64;
        println!("{:>10}  {:>12}  ${:>13.6}", size, sample.len(), per_item);
    }
    println!("\nRecommendation: pick the smallest batch size whose cost_per_item has stabilized.");
    println!("This is not persisted automatically; update BATCH_SIZE yourself if you act on it.");
    Ok(())
}
