//! Command-line interface definition

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Knowledge-extraction pipeline service runner
#[derive(Debug, Parser)]
#[command(name = "gleaner", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the LLM queue worker
    Worker {
        /// Consumer name within the worker group
        #[arg(long, env = "KE_WORKER_ID")]
        worker_id: Option<String>,
    },

    /// Run the internal scrape service (browser pool + HTTP surface)
    Scraper,

    /// Run an extraction job over a project
    Extract {
        /// Project to extract
        #[arg(long)]
        project: Uuid,
        /// Restrict to specific sources (repeatable)
        #[arg(long = "source-id")]
        source_ids: Vec<Uuid>,
        /// Resume an existing job instead of creating one
        #[arg(long)]
        job: Option<Uuid>,
    },

    /// Inspect and replay dead-letter queues
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
}

/// DLQ maintenance actions
#[derive(Debug, Subcommand)]
pub enum DlqAction {
    /// Print counts for all three queues
    Stats,
    /// List recent entries of one kind
    List {
        /// Queue kind: scrape, extraction, or llm
        #[arg(long, default_value = "llm")]
        kind: String,
        /// Maximum entries to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Replay an LLM entry with its retry counter reset
    Retry {
        /// Entry id from `dlq list`
        #[arg(long)]
        id: Uuid,
    },
}
