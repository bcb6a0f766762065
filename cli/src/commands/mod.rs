//! Command implementations for the storyline CLI.
//!
//! Each command module provides:
//! - Args struct for clap argument parsing
//! - execute() function that performs the command
//! - Human-readable and JSON output formatting

pub mod assign;
pub mod ingest;
pub mod merge;
pub mod rebuild;
pub mod show;
pub mod split;
pub mod top;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use colored::Colorize;
use serde::Serialize;
use storyline_cluster::ClusterService;
use storyline_core::Cluster;
use storyline_store::MemoryStore;

/// Shared state handed to every command.
pub struct Context {
    pub service: ClusterService<MemoryStore>,
    pub data: PathBuf,
    pub human: bool,
}

impl Context {
    /// Writes the store back to the snapshot file.
    pub fn save(&self) -> Result<()> {
        self.service
            .store()
            .save(&self.data)
            .with_context(|| format!("failed to save {}", self.data.display()))
    }
}

/// Print output in JSON or human-readable format.
pub fn output<T: Serialize + HumanReadable>(value: &T, human: bool) -> Result<()> {
    if human {
        value.print_human();
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

/// Trait for types that can be printed in human-readable format.
pub trait HumanReadable {
    fn print_human(&self);
}

/// Format a timestamp for human display.
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Print the fields of a cluster shared by several commands.
pub fn print_cluster_summary(cluster: &Cluster) {
    println!("  {} {}", "ID:".cyan(), cluster.id);
    println!("  {} {}", "Title:".cyan(), cluster.canonical_title.bold());
    println!(
        "  {} {} articles, coherence {:.2}",
        "Size:".cyan(),
        cluster.quality.size,
        cluster.quality.coherence
    );
    let sources: Vec<String> = cluster
        .source_counts
        .iter()
        .map(|(source, count)| format!("{source} ({count})"))
        .collect();
    println!("  {} {}", "Sources:".cyan(), sources.join(", "));
    println!(
        "  {} {}",
        "First Seen:".cyan(),
        format_timestamp(&cluster.first_seen)
    );
    println!(
        "  {} {}",
        "Last Updated:".cyan(),
        format_timestamp(&cluster.last_updated)
    );
}
