//! Command-line administration for the Storyline clustering engine.
//!
//! This CLI operates on a JSON snapshot of the article store:
//! - ingest: Insert articles from a JSONL file and assign them
//! - assign: Assign one stored article
//! - rebuild: Re-cluster a recent window of articles
//! - merge: Merge one cluster into another
//! - split: Move articles out of a cluster into a new one
//! - top: Rank clusters for the newsletter
//! - show: Display a cluster and its timeline
//!
//! Configuration via environment:
//! - STORYLINE_DATA: Snapshot file (default: storyline.json)
//! - STORYLINE_LOG_LEVEL: Log filter when RUST_LOG is unset (default: info)
//! - STORYLINE_*: Clustering and ranking thresholds

mod commands;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use storyline_cluster::{ClusterService, ClusteringConfig, RankingConfig};
use storyline_store::MemoryStore;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use commands::{
    Context, assign::AssignArgs, ingest::IngestArgs, merge::MergeArgs, rebuild::RebuildArgs,
    show::ShowArgs, split::SplitArgs, top::TopArgs,
};

/// Storyline clustering CLI
///
/// Groups news articles into stories and ranks them for the newsletter.
/// Prints JSON by default; pass --human for formatted output.
#[derive(Parser)]
#[command(name = "storyline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output human-readable formatted text instead of JSON
    #[arg(long, global = true)]
    human: bool,

    /// Snapshot file holding articles, clusters and events
    #[arg(
        long,
        env = "STORYLINE_DATA",
        default_value = "storyline.json",
        global = true
    )]
    data: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(
        long,
        env = "STORYLINE_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert articles from a JSONL file and assign each to a cluster
    Ingest(IngestArgs),

    /// Assign a stored article to a cluster
    Assign(AssignArgs),

    /// Re-cluster every article fetched within a window
    Rebuild(RebuildArgs),

    /// Merge a source cluster into a target cluster
    Merge(MergeArgs),

    /// Split articles out of a cluster into a new cluster
    Split(SplitArgs),

    /// Rank clusters for the newsletter
    Top(TopArgs),

    /// Show a cluster with its statistics and timeline
    Show(ShowArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store = MemoryStore::load(&cli.data)
        .with_context(|| format!("failed to load {}", cli.data.display()))?;
    let service = ClusterService::new(
        store,
        ClusteringConfig::from_env()?,
        RankingConfig::from_env()?,
    )?;
    let ctx = Context {
        service,
        data: cli.data,
        human: cli.human,
    };

    match cli.command {
        Commands::Ingest(args) => commands::ingest::execute(&ctx, args).await,
        Commands::Assign(args) => commands::assign::execute(&ctx, args).await,
        Commands::Rebuild(args) => commands::rebuild::execute(&ctx, args).await,
        Commands::Merge(args) => commands::merge::execute(&ctx, args).await,
        Commands::Split(args) => commands::split::execute(&ctx, args).await,
        Commands::Top(args) => commands::top::execute(&ctx, args).await,
        Commands::Show(args) => commands::show::execute(&ctx, args).await,
    }
}

/// Initialize the tracing subscriber, logging to stderr.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
