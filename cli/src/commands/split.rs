//! SPLIT command - Move articles out of a cluster into a new one.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use storyline_core::{ArticleId, Cluster, ClusterId};

use super::{Context, HumanReadable, output, print_cluster_summary};

/// Arguments for the split command.
#[derive(Args)]
pub struct SplitArgs {
    /// Cluster to split
    pub cluster_id: ClusterId,

    /// Articles to move into the new cluster
    #[arg(required = true)]
    pub article_ids: Vec<ArticleId>,
}

#[derive(Debug, Serialize)]
pub struct SplitResponse {
    pub original: Cluster,
    pub split: Cluster,
}

impl HumanReadable for SplitResponse {
    fn print_human(&self) {
        println!("{}", "Cluster Split".green().bold());
        println!("{}", "=".repeat(60));
        println!();
        println!("{}", "Original:".yellow());
        print_cluster_summary(&self.original);
        println!();
        println!("{}", "New Cluster:".yellow());
        print_cluster_summary(&self.split);
    }
}

/// Execute the split command.
pub async fn execute(ctx: &Context, args: SplitArgs) -> Result<()> {
    let split_id = ctx
        .service
        .split_cluster(args.cluster_id, &args.article_ids)
        .await?;
    ctx.save()?;

    let response = SplitResponse {
        original: ctx.service.get_cluster(args.cluster_id).await?,
        split: ctx.service.get_cluster(split_id).await?,
    };
    output(&response, ctx.human)
}
