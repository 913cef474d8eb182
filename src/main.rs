mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gre_mentor::app::Mentor;
use gre_mentor::config::MentorConfig;

#[derive(Parser)]
#[command(
    name = "gre-mentor",
    version,
    about = "Spaced-repetition vocabulary trainer with semantic search"
)]
struct Cli {
    /// Config file (default: ~/.gre-mentor/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a study item and embed it
    Add {
        term: String,
        #[arg(short, long)]
        definition: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Keep the item out of semantic search
        #[arg(long)]
        no_embed: bool,
    },
    /// Show an item and its review history
    Show { id: String },
    /// List items, newest first
    List {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Grade a review of an item
    Review {
        id: String,
        /// Recall quality, 0 (blackout) to 5 (perfect)
        #[arg(short, long)]
        quality: Option<i64>,
        /// Shorthand for quality 4
        #[arg(long)]
        correct: bool,
        /// Shorthand for quality 2
        #[arg(long)]
        wrong: bool,
    },
    /// List items due now, new items first
    Due {
        #[arg(long)]
        limit: Option<usize>,
        /// Only scheduled items, no never-reviewed ones
        #[arg(long)]
        no_new: bool,
    },
    /// List never-reviewed items
    New {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show review and index statistics
    Stats,
    /// Semantic search over items
    Search {
        query: String,
        #[arg(short)]
        k: Option<usize>,
    },
    /// Delete an item and soft-delete its vectors
    Delete { id: String },
    /// Embed items whose embedding is pending
    Backfill {
        #[arg(long, default_value_t = 1000)]
        limit: usize,
        /// Re-embed every item with the configured model
        #[arg(long)]
        all: bool,
    },
    /// Compact the vector index, dropping deleted vectors
    Rebuild,
    /// Run database and index diagnostics
    Doctor {
        /// Repair item/vector drift
        #[arg(long)]
        fix: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MentorConfig::load_from(path)?,
        None => MentorConfig::load()?,
    };

    // Log to stderr so stdout carries only command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // SQLite and the blocking HTTP client must stay off the async workers.
    tokio::task::spawn_blocking(move || run(cli.command, config))
        .await
        .context("command task failed")?
}

fn run(command: Command, config: MentorConfig) -> Result<()> {
    let mut mentor = Mentor::open(config)?;

    match command {
        Command::Add {
            term,
            definition,
            tags,
            no_embed,
        } => cli::items::add(&mut mentor, &term, definition.as_deref(), &tags, !no_embed)?,
        Command::Show { id } => cli::items::show(&mentor, &id)?,
        Command::List { tag, limit } => cli::items::list(&mentor, tag.as_deref(), limit)?,
        Command::Review {
            id,
            quality,
            correct,
            wrong,
        } => {
            let quality = cli::review::resolve_quality(quality, correct, wrong)?;
            cli::review::review(&mut mentor, &id, quality)?;
        }
        Command::Due { limit, no_new } => cli::review::due(&mentor, limit, !no_new)?,
        Command::New { limit } => cli::review::new_items(&mentor, limit)?,
        Command::Stats => cli::stats::stats(&mentor)?,
        Command::Search { query, k } => cli::search::search(&mentor, &query, k)?,
        Command::Delete { id } => cli::items::delete(&mut mentor, &id)?,
        Command::Backfill { limit, all } => cli::backfill::backfill(&mut mentor, limit, all)?,
        Command::Rebuild => cli::backfill::rebuild(&mut mentor)?,
        Command::Doctor { fix } => cli::doctor::doctor(&mut mentor, fix)?,
    }

    mentor.flush().context("failed to persist vector index")?;
    Ok(())
}
