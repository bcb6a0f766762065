//! ASSIGN command - Assign one stored article to a cluster.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use storyline_cluster::{Assignment, AssignmentKind};
use storyline_core::ArticleId;

use super::{Context, HumanReadable, output};

/// Arguments for the assign command.
#[derive(Args)]
pub struct AssignArgs {
    /// Article ID to assign
    pub article_id: ArticleId,
}

impl HumanReadable for Assignment {
    fn print_human(&self) {
        let outcome = match self.kind {
            AssignmentKind::Created => "Created new cluster".yellow().bold(),
            AssignmentKind::Joined => "Joined existing cluster".green().bold(),
            AssignmentKind::Existing => "Already clustered".dimmed().bold(),
        };
        println!("{}", outcome);
        println!("  {} {}", "Article:".cyan(), self.article_id);
        println!("  {} {}", "Cluster:".cyan(), self.cluster_id);
        if let Some(similarity) = self.similarity {
            println!("  {} {:.3}", "Similarity:".cyan(), similarity);
        }
    }
}

/// Execute the assign command.
pub async fn execute(ctx: &Context, args: AssignArgs) -> Result<()> {
    let assignment = ctx.service.try_assign_to_cluster(args.article_id).await?;
    ctx.save()?;
    output(&assignment, ctx.human)
}
