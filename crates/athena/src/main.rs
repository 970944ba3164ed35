//! Athena command line
//!
//! Usage:
//!     athena serve
//!     athena run full
//!     athena search "holiday photos" --max 10

use anyhow::{bail, Context, Result};
use athena::{AthenaConfig, Phase, PhaseQueue, Pipeline, Scheduler, SearchService};
use athena_db::{AthenaDb, Repository};
use athena_logging::{init_logging, LogConfig};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "athena", about = "Discover SMB shares on a network and search their files")]
struct Cli {
    /// Config file (defaults to $ATHENA_HOME/config.toml when present)
    #[arg(short, long, global = true, env = "ATHENA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler until interrupted
    Serve,

    /// Run one phase (or the full discovery sequence) and exit
    Run {
        #[arg(value_enum)]
        phase: PhaseArg,
    },

    /// Search indexed files and print ranked hits as JSON
    Search {
        query: String,

        /// Index of the first hit to return
        #[arg(long, default_value = "0")]
        start: usize,

        /// Number of hits to return (defaults to search.page_size)
        #[arg(long)]
        max: Option<usize>,
    },

    /// Print index statistics as JSON
    Stats,

    /// Print a host's size and file-count history as JSON
    History { host_id: i64 },

    /// Print the most common filename keywords as JSON
    Keywords {
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Check that the database answers
    Health,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PhaseArg {
    Discover,
    Ping,
    Index,
    Postprocess,
    /// discover, index, postprocess
    Full,
}

impl PhaseArg {
    fn phases(self) -> Vec<Phase> {
        match self {
            PhaseArg::Discover => vec![Phase::DiscoverNewHosts],
            PhaseArg::Ping => vec![Phase::PingKnownHosts],
            PhaseArg::Index => vec![Phase::IndexKnownHosts],
            PhaseArg::Postprocess => vec![Phase::PostProcessing],
            PhaseArg::Full => Phase::FULL_DISCOVERY.to_vec(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(LogConfig {
        app_name: "athena",
        verbose: cli.verbose,
        log_dir: None,
    })?;

    let config = AthenaConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    config.validate().context("Invalid config")?;

    let db = AthenaDb::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    let repo: Arc<dyn Repository> = Arc::new(db.clone());

    let result = match cli.command {
        Commands::Serve => serve(&config, repo).await,
        Commands::Run { phase } => run_phases(&config, repo, &phase.phases()).await,
        Commands::Search { query, start, max } => {
            let service = SearchService::new(repo, config.search.candidate_limit);
            let hits = service
                .search(&query, start, max.unwrap_or(config.search.page_size))
                .await?;
            print_json(&hits)
        }
        Commands::Stats => {
            let service = SearchService::new(repo, config.search.candidate_limit);
            print_json(&service.get_statistics().await?)
        }
        Commands::History { host_id } => {
            let service = SearchService::new(repo, config.search.candidate_limit);
            print_json(&service.host_history(host_id).await?)
        }
        Commands::Keywords { limit } => {
            let service = SearchService::new(repo, config.search.candidate_limit);
            print_json(&service.top_keywords(limit).await?)
        }
        Commands::Health => {
            let service = SearchService::new(repo, config.search.candidate_limit);
            service.health().await.context("Database did not answer")?;
            println!("ok");
            Ok(())
        }
    };

    db.close().await;
    result
}

async fn serve(config: &AthenaConfig, repo: Arc<dyn Repository>) -> Result<()> {
    let pipeline = Pipeline::from_config(config, repo.clone());
    let scheduler = Scheduler::start(&config.scheduling, Arc::new(pipeline), repo)?;

    info!(
        range = %config.discovery.range,
        discover = %config.scheduling.discover_cron,
        ping = %config.scheduling.ping_cron,
        "Athena running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down, waiting for the running phase");
    scheduler.shutdown().await;
    Ok(())
}

async fn run_phases(config: &AthenaConfig, repo: Arc<dyn Repository>, phases: &[Phase]) -> Result<()> {
    let pipeline = Pipeline::from_config(config, repo.clone());
    let queue = PhaseQueue::start(Arc::new(pipeline), repo);

    let receivers = queue.enqueue_all(phases)?;
    let mut failed = Vec::new();
    for rx in receivers {
        let outcome = rx.await.context("Phase runner stopped unexpectedly")?;
        if let Some(err) = &outcome.error {
            error!(phase = %outcome.phase, error = %err, "Phase failed");
            failed.push(outcome.phase);
        }
    }
    queue.shutdown().await;

    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(Phase::as_str).collect();
        bail!("{} phase(s) failed: {}", failed.len(), names.join(", "));
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
