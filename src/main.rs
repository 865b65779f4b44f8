//! # Siteminer CLI
//!
//! The `siteminer` binary drives the training-data collection service. It
//! provides commands for database initialization, running the HTTP server,
//! one-shot training runs, and session status inspection.
//!
//! ## Usage
//!
//! ```bash
//! siteminer --config ./config/siteminer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `siteminer init` | Create the SQLite database and run schema migrations |
//! | `siteminer serve` | Start the HTTP server |
//! | `siteminer train global` | Run a global discovery session to completion |
//! | `siteminer train custom` | Run a session over explicit sites |
//! | `siteminer status [id]` | Print a session snapshot |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use siteminer::classifier::HttpClassifier;
use siteminer::collector::Collector;
use siteminer::config::{self, Config};
use siteminer::models::{CandidateSite, SessionStatus, StorageBackend};
use siteminer::orchestrator::TrainingRunner;
use siteminer::planner::Planner;
use siteminer::server::{self, AppState};
use siteminer::store::{self, TrainingStore};
use siteminer::{migrate, models};

/// Siteminer CLI — a training-data collection service for website design
/// patterns.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/siteminer.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "siteminer",
    about = "Siteminer — collect and analyze website design patterns for model training",
    version,
    long_about = "Siteminer resolves a business profile into competitor websites, collects \
    their markup (headless render, plain HTTP, or a deterministic synthetic substitute), \
    analyzes each page's design signals, and persists the results for model training."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/siteminer.toml`. Storage, classifier,
    /// collector, and training settings are read from this file.
    #[arg(long, global = true, default_value = "./config/siteminer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (design_patterns, training_sessions, training_samples, site_queue).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// training endpoints. The storage backend is probed once at startup.
    Serve,

    /// Run a training session to completion in the foreground.
    Train {
        #[command(subcommand)]
        run: TrainRun,
    },

    /// Print a session snapshot.
    ///
    /// With no id, prints the most recently started session.
    Status {
        /// Session id. Omit for the latest session.
        id: Option<String>,
    },
}

/// One-shot training subcommands.
#[derive(Subcommand)]
enum TrainRun {
    /// Global discovery run using the configured business profile.
    Global {
        /// Number of competitor sites to collect.
        #[arg(long)]
        samples: Option<u64>,
    },

    /// Run over an explicit site list.
    Custom {
        /// Site URL to collect. Repeat for multiple sites.
        #[arg(long = "site", required = true)]
        sites: Vec<String>,

        /// Business type attributed to all supplied sites.
        #[arg(long)]
        business_type: String,

        /// Optional style label attached to the sites.
        #[arg(long)]
        style: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!(
                "database initialized at {}",
                config.storage.db_path.display()
            );
            Ok(())
        }
        Commands::Serve => {
            let (backend, runner) = build_runner(&config).await?;
            let state = AppState { runner, backend };
            server::serve(state, &config.server.bind).await
        }
        Commands::Train { run } => {
            let (backend, runner) = build_runner(&config).await?;
            if backend == StorageBackend::Filesystem {
                println!("note: relational store unavailable, using file-backed storage");
            }
            let session_id = match run {
                TrainRun::Global { samples } => {
                    if config.training.business_name.is_empty() {
                        bail!("global runs require [training].business_name in the config");
                    }
                    runner.start_global(samples).await?.session_id
                }
                TrainRun::Custom {
                    sites,
                    business_type,
                    style,
                } => {
                    let candidates = sites
                        .into_iter()
                        .map(|url| CandidateSite {
                            url,
                            business_type: business_type.clone(),
                            style: style.clone(),
                            last_processed_at: None,
                        })
                        .collect();
                    let receipt = runner.start_custom(candidates).await?;
                    println!(
                        "queued {} site(s), skipped {} fresh",
                        receipt.sites_queued, receipt.sites_skipped
                    );
                    receipt.session_id
                }
            };
            watch(&runner, &session_id).await
        }
        Commands::Status { id } => {
            let (_, runner) = build_runner(&config).await?;
            match runner.status(id.as_deref()).await? {
                Some(session) => {
                    println!("{}", serde_json::to_string_pretty(&session)?);
                    Ok(())
                }
                None => bail!("no matching session"),
            }
        }
    }
}

/// Assemble the full pipeline: storage backend, classifier, planner,
/// collector, and the single-flight runner.
async fn build_runner(config: &Config) -> Result<(StorageBackend, Arc<TrainingRunner>)> {
    let (backend, store): (StorageBackend, Arc<dyn TrainingStore>) =
        store::select_backend(config).await?;
    let classifier = Arc::new(HttpClassifier::from_config(&config.classifier)?);
    let window = chrono::Duration::days(config.training.freshness_days);
    let planner = Arc::new(Planner::new(classifier, Arc::clone(&store), window));
    let collector = Arc::new(
        Collector::from_config(&config.collector)
            .map_err(|e| anyhow::anyhow!("failed to build collector: {e}"))?,
    );
    let runner = Arc::new(TrainingRunner::new(
        store,
        planner,
        collector,
        config.training.clone(),
    ));
    Ok((backend, runner))
}

/// Poll a session until it reaches a terminal state, printing progress.
async fn watch(runner: &Arc<TrainingRunner>, session_id: &str) -> Result<()> {
    let mut last_step = String::new();
    loop {
        let Some(session) = runner.status(Some(session_id)).await? else {
            bail!("session {session_id} disappeared from storage");
        };
        if session.current_step != last_step {
            println!("[{:>3}%] {}", session.progress_percent, session.current_step);
            last_step = session.current_step.clone();
        }
        if session.status.is_terminal() {
            return report(&session);
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

fn report(session: &models::TrainingSession) -> Result<()> {
    match session.status {
        SessionStatus::Completed => {
            println!(
                "session {} completed: {}/{} samples, accuracy {}",
                session.id,
                session.samples_collected,
                session.total_samples,
                session
                    .accuracy
                    .map(|a| format!("{a:.2}"))
                    .unwrap_or_else(|| "n/a".to_string()),
            );
            Ok(())
        }
        _ => bail!(
            "session {} failed: {}",
            session.id,
            session
                .error_message
                .as_deref()
                .unwrap_or("no error recorded")
        ),
    }
}
