//! INGEST command - Insert articles from a JSONL file and assign them.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use storyline_cluster::AssignmentKind;
use storyline_core::{Article, ArticleId, ClusterId};
use storyline_store::StoreError;

use super::{Context, HumanReadable, output};

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// JSONL file with one article object per line
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub articles: Vec<IngestedArticle>,
}

/// Outcome for one input line.
#[derive(Debug, Serialize)]
pub struct IngestedArticle {
    pub article_id: ArticleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<ClusterId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssignmentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HumanReadable for IngestResponse {
    fn print_human(&self) {
        println!("{}", "Ingested Articles".green().bold());
        println!("{}", "=".repeat(60));
        println!();

        for article in &self.articles {
            match (&article.cluster_id, &article.error) {
                (Some(cluster_id), _) => {
                    let kind = match article.kind {
                        Some(AssignmentKind::Created) => "new".yellow(),
                        Some(AssignmentKind::Joined) => "joined".green(),
                        _ => "existing".dimmed(),
                    };
                    println!("  {} -> {} [{}]", article.article_id, cluster_id, kind);
                }
                (None, Some(error)) => {
                    println!("  {} {} {}", article.article_id, "failed:".red(), error);
                }
                (None, None) => println!("  {}", article.article_id),
            }
        }

        let failed = self.articles.iter().filter(|a| a.error.is_some()).count();
        println!();
        println!(
            "  {} {} articles, {} failed",
            "Total:".cyan(),
            self.articles.len(),
            failed
        );
    }
}

/// Execute the ingest command.
pub async fn execute(ctx: &Context, args: IngestArgs) -> Result<()> {
    let input = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let mut articles = Vec::new();
    for (number, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let article: Article = serde_json::from_str(line)
            .with_context(|| format!("invalid article on line {}", number + 1))?;
        articles.push(article);
    }

    let store = ctx.service.store();
    let mut response = IngestResponse {
        articles: Vec::with_capacity(articles.len()),
    };
    for article in articles {
        let article_id = article.id;
        match store.insert_article(article) {
            Ok(()) => {}
            Err(StoreError::DuplicateArticle(_)) => {
                tracing::warn!("Article {} already stored, assigning existing copy", article_id);
            }
            Err(e) => return Err(e.into()),
        }

        let entry = match ctx.service.try_assign_to_cluster(article_id).await {
            Ok(assignment) => IngestedArticle {
                article_id,
                cluster_id: Some(assignment.cluster_id),
                kind: Some(assignment.kind),
                error: None,
            },
            Err(e) => {
                tracing::error!("Failed to assign article {}: {}", article_id, e);
                IngestedArticle {
                    article_id,
                    cluster_id: None,
                    kind: None,
                    error: Some(e.to_string()),
                }
            }
        };
        response.articles.push(entry);
    }

    ctx.save()?;
    output(&response, ctx.human)
}
