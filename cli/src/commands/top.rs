//! TOP command - Rank clusters for the newsletter.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use storyline_cluster::{ClusterStats, cluster_stats, format_summary, format_title};
use storyline_core::ClusterId;

use super::{Context, HumanReadable, output};

/// Arguments for the top command.
#[derive(Args)]
pub struct TopArgs {
    /// Maximum number of clusters to return
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,

    /// Only clusters updated at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub clusters: Vec<TopCluster>,
}

/// One newsletter slot.
#[derive(Debug, Serialize)]
pub struct TopCluster {
    pub rank: usize,
    pub score: f64,
    pub cluster_id: ClusterId,
    pub title: String,
    pub summary: String,
    pub stats: ClusterStats,
}

impl HumanReadable for TopResponse {
    fn print_human(&self) {
        println!("{}", "Top Stories".green().bold());
        println!("{}", "=".repeat(80));
        println!();

        if self.clusters.is_empty() {
            println!("  {}", "(No clusters qualify)".dimmed());
            return;
        }

        for entry in &self.clusters {
            println!(
                "  {} {} {}",
                format!("{}.", entry.rank).yellow(),
                entry.title.bold(),
                format!("[{:.3}]", entry.score).dimmed()
            );
            println!("     {}", entry.summary);
            println!(
                "     {} {} articles from {} sources ({}), {}",
                "Stats:".cyan(),
                entry.stats.total_articles,
                entry.stats.distinct_sources,
                entry.stats.top_sources.join(", "),
                entry.stats.time_span
            );
            println!("     {} {}", "ID:".cyan(), entry.cluster_id);
            println!();
        }
    }
}

/// Execute the top command.
pub async fn execute(ctx: &Context, args: TopArgs) -> Result<()> {
    let ranked = ctx.service.ranked_clusters(args.limit, args.since).await?;

    let clusters = ranked
        .into_iter()
        .enumerate()
        .map(|(i, ranked)| TopCluster {
            rank: i + 1,
            score: ranked.score,
            cluster_id: ranked.cluster.id,
            title: format_title(&ranked.cluster),
            summary: format_summary(&ranked.cluster),
            stats: cluster_stats(&ranked.cluster),
        })
        .collect();

    output(&TopResponse { clusters }, ctx.human)
}
