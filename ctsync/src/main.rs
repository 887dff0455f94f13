//! ctsync - contact reconciliation pass runner
//!
//! Runs one pass between a JSON store snapshot (internal side) and a JSON
//! address-book snapshot (external side), prints the aggregate result as
//! JSON, and writes both snapshots back unless running dry.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ctsync::adapters::{MemoryBridge, MemoryStore};
use ctsync::oracle::checker_from_config;
use ctsync::translator::PortableTranslator;
use ctsync::{SyncOptions, SyncOrchestrator};
use ctsync_common::config::{load_config, ConflictStrategy};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ctsync
#[derive(Parser, Debug)]
#[command(name = "ctsync")]
#[command(about = "Reconcile a contact store with an external address book")]
#[command(version)]
struct Args {
    /// Owner whose contacts are reconciled (overrides sync.owner_id)
    #[arg(short, long, env = "CTSYNC_OWNER")]
    owner: Option<String>,

    /// Internal store snapshot (JSON)
    #[arg(long)]
    internal: PathBuf,

    /// External address-book snapshot (JSON)
    #[arg(long)]
    external: PathBuf,

    /// Config file (overrides CTSYNC_CONFIG and the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compute everything, write nothing
    #[arg(long)]
    dry_run: bool,

    /// Conflict strategy: newest, oldest, merge or prompt
    #[arg(long)]
    strategy: Option<ConflictStrategy>,

    /// Force field-by-field merge regardless of strategy
    #[arg(long)]
    auto_merge: bool,

    /// Judge duplicates with the rule-based judge only
    #[arg(long)]
    no_oracle: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    let level = &config.logging.level;
                    format!("ctsync={},ctsync_common={}", level, level).into()
                }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.dry_run {
        config.sync.dry_run = true;
    }
    if let Some(strategy) = args.strategy {
        config.sync.strategy = strategy;
    }
    if args.auto_merge {
        config.sync.auto_merge = true;
    }
    if args.no_oracle {
        config.oracle.enabled = false;
    }

    let options = SyncOptions::from_config(&config, args.owner.as_deref())?;
    let checker = checker_from_config(&config)?;

    info!(
        owner_id = %options.owner_id,
        internal = %args.internal.display(),
        external = %args.external.display(),
        dry_run = options.dry_run,
        oracle = checker.is_enabled(),
        "Starting ctsync"
    );

    let store = Arc::new(
        MemoryStore::open(&args.internal)
            .await
            .context("Failed to open internal store")?,
    );
    let bridge = Arc::new(
        MemoryBridge::open(&args.external)
            .await
            .context("Failed to open external address book")?,
    );

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        bridge.clone(),
        Arc::new(PortableTranslator::new()),
        checker,
        options,
    );
    let result = orchestrator.run().await?;

    if !result.dry_run {
        store.persist().await.context("Failed to write internal store")?;
        bridge
            .persist()
            .await
            .context("Failed to write external address book")?;
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
