#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use purrsona::cache::ResponseCache;
use purrsona::engagement::EngagementScorer;
use purrsona::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "purrsona", version, about = "Persona chat bot with message gating")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot daemon
    Run,
    /// Inspect or maintain the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Score a message the way the decision engine would
    Score {
        /// Message text to score
        text: String,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry and hit counters
    Stats,
    /// Delete every cached response
    Clear,
    /// Delete expired entries now
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_init()?;
    config.validate()?;

    match cli.command {
        Command::Run => purrsona::daemon::run(config).await,
        Command::Cache { action } => {
            let cache = ResponseCache::open(&config.workspace_dir, &config.cache)?;
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats()?;
                    println!("exact entries:    {}", stats.exact_entries);
                    println!("semantic entries: {}", stats.semantic_entries);
                    println!("total hits:       {}", stats.total_hits);
                }
                CacheAction::Clear => {
                    let removed = cache.clear()?;
                    println!("removed {removed} entries");
                }
                CacheAction::Sweep => {
                    let (exact, semantic) = cache.sweep(Utc::now().timestamp_millis())?;
                    println!("removed {exact} exact, {semantic} semantic expired entries");
                }
            }
            Ok(())
        }
        Command::Score { text } => {
            let scorer =
                EngagementScorer::new(config.engagement.clone(), &config.persona.trigger_keywords);
            let score = scorer.score(&text);
            println!("engagement:   {}/10", score.engagement);
            println!("category:     {}", score.category);
            println!("mood:         {}", score.mood);
            println!("style:        {}", score.style);
            println!("reply chance: {:.0}%", score.reply_chance * 100.0);
            println!("trigger hits: {}", score.trigger_hits);
            Ok(())
        }
    }
}
