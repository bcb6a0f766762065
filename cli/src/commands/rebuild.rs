//! REBUILD command - Re-cluster a recent window of articles.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use storyline_cluster::RebuildSummary;

use super::{Context, HumanReadable, output};

/// Arguments for the rebuild command.
#[derive(Args)]
pub struct RebuildArgs {
    /// Days of articles to re-cluster (default: the clustering window)
    #[arg(short = 'w', long)]
    pub window_days: Option<u32>,
}

impl HumanReadable for RebuildSummary {
    fn print_human(&self) {
        println!("{}", "Rebuild Complete".green().bold());
        println!("{}", "=".repeat(60));
        println!();
        println!("  {} last {} days", "Window:".cyan(), self.window_days);
        println!("  {} {}", "Articles:".cyan(), self.articles);
        println!("  {} {}", "Reassigned:".cyan(), self.assigned);
        if self.failed > 0 {
            println!("  {} {}", "Failed:".red(), self.failed);
        }
        println!("  {} {}", "Clusters Deleted:".cyan(), self.clusters_deleted);
        println!("  {} {}", "Clusters Created:".cyan(), self.clusters_created);
    }
}

/// Execute the rebuild command.
pub async fn execute(ctx: &Context, args: RebuildArgs) -> Result<()> {
    let window_days = args
        .window_days
        .unwrap_or(ctx.service.config().window_days);
    let summary = ctx.service.rebuild_clusters(window_days).await?;
    ctx.save()?;
    output(&summary, ctx.human)
}
