//! MERGE command - Merge one cluster into another.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use storyline_core::{Cluster, ClusterId};

use super::{Context, HumanReadable, output, print_cluster_summary};

/// Arguments for the merge command.
#[derive(Args)]
pub struct MergeArgs {
    /// Cluster to absorb and delete
    pub source: ClusterId,

    /// Cluster receiving the articles
    pub target: ClusterId,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub merged_from: ClusterId,
    pub cluster: Cluster,
}

impl HumanReadable for MergeResponse {
    fn print_human(&self) {
        println!("{}", "Clusters Merged".green().bold());
        println!("{}", "=".repeat(60));
        println!();
        println!("  {} {}", "Absorbed:".cyan(), self.merged_from);
        print_cluster_summary(&self.cluster);
    }
}

/// Execute the merge command.
pub async fn execute(ctx: &Context, args: MergeArgs) -> Result<()> {
    let cluster = ctx.service.merge_clusters(args.source, args.target).await?;
    ctx.save()?;
    output(
        &MergeResponse {
            merged_from: args.source,
            cluster,
        },
        ctx.human,
    )
}
