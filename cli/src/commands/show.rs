//! SHOW command - Display a cluster with its statistics and timeline.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use storyline_cluster::{ClusterStats, cluster_stats};
use storyline_core::{Cluster, ClusterEvent, ClusterId};

use super::{Context, HumanReadable, format_timestamp, output, print_cluster_summary};

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    /// Cluster ID to display
    pub cluster_id: ClusterId,
}

#[derive(Debug, Serialize)]
pub struct ShowResponse {
    pub cluster: Cluster,
    pub stats: ClusterStats,
    /// Newest first.
    pub timeline: Vec<ClusterEvent>,
}

impl HumanReadable for ShowResponse {
    fn print_human(&self) {
        println!("{}", "Cluster Details".green().bold());
        println!("{}", "=".repeat(60));
        println!();
        print_cluster_summary(&self.cluster);
        println!("  {} {}", "Span:".cyan(), self.stats.time_span);
        println!();

        println!("{}", "Summary:".yellow());
        println!("{}", "-".repeat(60));
        println!("{}", self.cluster.summary);
        println!("{}", "-".repeat(60));
        println!();

        println!("{}", "Timeline:".yellow());
        for event in &self.timeline {
            println!(
                "  {} {:<13} {}",
                format_timestamp(&event.timestamp).dimmed(),
                event.kind.to_string(),
                event.article_id
            );
            if let Some(note) = &event.note {
                println!("      {}", note.dimmed());
            }
        }
    }
}

/// Execute the show command.
pub async fn execute(ctx: &Context, args: ShowArgs) -> Result<()> {
    let cluster = ctx.service.get_cluster(args.cluster_id).await?;
    let timeline = ctx.service.cluster_timeline(args.cluster_id).await?;
    let stats = cluster_stats(&cluster);

    output(
        &ShowResponse {
            cluster,
            stats,
            timeline,
        },
        ctx.human,
    )
}
