mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use chat_compression_core::SummaryStore;
use chat_compression_storage::{StoreBackend, try_create_store};

#[derive(Parser)]
#[command(name = "chat-compression")]
#[command(about = "Inspect and maintain stored conversation summaries")]
#[command(version)]
struct Cli {
    /// Summary store connection string (sqlite:... or postgres://...)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Store(StoreCommand),
    /// Load and validate a YAML compression config
    CheckConfig { file: PathBuf },
}

#[derive(Subcommand)]
enum StoreCommand {
    /// List stored summaries, most recently updated first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print one conversation's summary record
    Show { chat_id: String },
    /// Delete one conversation's summary
    Delete { chat_id: String },
    /// Delete summaries not updated for the given number of days
    Expire {
        #[arg(long)]
        older_than_days: u32,
    },
    /// Print aggregate statistics about the store
    Stats,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn SummaryStore>> {
    let url = database_url.context("no store configured: pass --database-url or set DATABASE_URL")?;
    let backend = StoreBackend::parse(url)?;
    debug!(backend = backend.name(), "Opening summary store");
    let store = try_create_store(&backend)
        .await
        .with_context(|| format!("failed to open {} store", backend.name()))?;
    Ok(store)
}

async fn run_store_command(store: &dyn SummaryStore, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::List { limit } => {
            let summaries = store.list().await?;
            println!("{}", commands::render_list(&summaries, limit));
        }
        StoreCommand::Show { chat_id } => match store.load(&chat_id).await? {
            Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
            None => anyhow::bail!("no summary stored for conversation '{}'", chat_id),
        },
        StoreCommand::Delete { chat_id } => {
            store.delete(&chat_id).await?;
            println!("Deleted summary for '{}'", chat_id);
        }
        StoreCommand::Expire { older_than_days } => {
            let cutoff = commands::expiry_cutoff(chrono::Utc::now(), older_than_days);
            let removed = store.expire_before(cutoff).await?;
            println!(
                "Removed {} summaries last updated before {}",
                removed,
                cutoff.to_rfc3339()
            );
        }
        StoreCommand::Stats => {
            let stats = store.stats().await?;
            println!("backend: {}", store.backend_name());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::CheckConfig { file } => {
            println!("{}", commands::check_config(&file)?);
        }
        Commands::Store(command) => {
            let store = open_store(cli.database_url.as_deref()).await?;
            run_store_command(store.as_ref(), command).await?;
        }
    }

    Ok(())
}
