//! dune-sync: incremental export of orderbook datasets.
//!
//! Each invocation syncs one stream: it derives the next block range from the
//! artifacts already published to the durable store, fetches the rows for
//! that range, resolves referenced app-data documents where needed, and
//! publishes one artifact per range. The watermark only moves when the
//! artifact lands, so a failed run is retried by simply running again.

#![warn(clippy::all)]

mod block_range;
mod cli;
mod config;
mod content;
mod handler;
mod ledger;
mod models;
mod ndjson;
pub mod retry;
mod source;
mod state;
mod store;
mod sync;
mod types;
mod upload;
mod warehouse;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{StoreLocation, SyncConfig};
use handler::StagingDir;
use state::{RunJournal, SqliteRunJournal};
use store::{watermark, ArtifactKey, ArtifactStore};
use types::SyncStream;

/// Ask for confirmation on stdin. Returns true only for an explicit "y".
fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Run the sync command.
async fn run_sync(volume_path: &str, args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = SyncConfig::from_args(volume_path, args)?;
    tracing::debug!(?config, "Loaded configuration");

    let store = config.store.open()?;
    let source = source::OrderbookSource::connect(
        &config.prod_db_url,
        config.barn_db_url.as_deref(),
        config.reorg_threshold,
    )
    .await?;

    let client = reqwest::Client::builder().build()?;
    let resolver = content::ContentResolver::new(client.clone(), config.resolver_config());
    let dune = match &config.dune_api_key {
        Some(key) => Some(warehouse::DuneWarehouse::new(
            client,
            &config.dune_api_url,
            key.clone(),
        )),
        None => {
            if config.stream.warehouse_table().is_some() {
                tracing::warn!("DUNE_API_KEY not set, warehouse mirroring disabled");
            }
            None
        }
    };

    let journal = match SqliteRunJournal::open(&config.journal_path()).await {
        Ok(journal) => {
            tracing::debug!(path = %journal.path().display(), "Opened run journal");
            Some(journal)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Run journal unavailable, continuing without it");
            None
        }
    };

    tracing::info!(
        stream = %config.stream,
        store = store.description(),
        dry_run = config.dry_run,
        "Starting dune-sync"
    );

    let ctx = sync::SyncContext {
        store: &store,
        source: &source,
        resolver: &resolver,
        warehouse: dune.as_ref().map(|w| w as &dyn warehouse::Warehouse),
        journal: journal.as_ref().map(|j| j as &dyn RunJournal),
        policy: config.policy,
        volume: config.volume.clone(),
        dry_run: config.dry_run,
        no_progress_bar: config.no_progress_bar,
    };

    let report = sync::sync_stream(&ctx, config.stream).await?;
    tracing::info!(
        stream = %report.stream,
        range = %report.range,
        outcome = ?report.outcome,
        still_missing = report.still_missing,
        tombstones = report.tombstones,
        "Sync finished"
    );
    Ok(())
}

/// Run the status command.
async fn run_status(volume: &Path, args: cli::StatusArgs) -> anyhow::Result<()> {
    let streams: Vec<SyncStream> = match args.sync_table {
        Some(stream) => vec![stream],
        None => SyncStream::ALL.to_vec(),
    };

    let journal_path = config::journal_path(volume);
    let journal = if journal_path.exists() {
        Some(SqliteRunJournal::open(&journal_path).await?)
    } else {
        None
    };

    println!("Volume: {}", volume.display());
    for stream in streams {
        let staging = StagingDir::new(volume, stream);
        println!();
        println!("{stream}:");

        match staging.read_marker().await? {
            Some(block) => println!("  Last synced block:  {block}"),
            None => println!("  Last synced block:  (none recorded)"),
        }
        if let Some((block, _)) = staging.latest_content().await? {
            println!("  Staged content:     {}", ArtifactKey::new(stream, block));
        }
        if stream.is_content_bearing() {
            let missing = ledger::file::load(staging.path()).await?;
            let worst = missing.iter().map(|m| m.attempts).max().unwrap_or(0);
            println!("  Missing app data:   {} (max attempts {worst})", missing.len());
        }

        let Some(journal) = &journal else {
            continue;
        };
        let runs = journal.recent_runs(Some(stream), args.runs).await?;
        if runs.is_empty() {
            continue;
        }
        println!("  Recent runs:");
        for run in runs {
            let when = run.started_at.format("%Y-%m-%d %H:%M:%S");
            let dry = if run.dry_run { " (dry run)" } else { "" };
            println!(
                "    {when}  ({}, {}]  {}{dry}  records={} missing={} tombstones={}",
                run.range.block_from(),
                run.range.block_to(),
                run.outcome,
                run.records,
                run.still_missing,
                run.tombstones
            );
            if let Some(error) = &run.last_error {
                println!("      error: {error}");
            }
        }
    }

    if journal.is_none() {
        println!();
        println!("No run journal found at {}", journal_path.display());
    }
    Ok(())
}

/// Run the last-block command.
async fn run_last_block(args: cli::LastBlockArgs) -> anyhow::Result<()> {
    let store = StoreLocation::from_args(&args.store)?.open()?;
    let stream = args.sync_table;
    let block =
        watermark::last_synced_block(&store, stream.as_str(), stream.genesis_block()).await?;
    println!("{block}");
    Ok(())
}

/// Run the download command.
async fn run_download(args: cli::DownloadArgs) -> anyhow::Result<()> {
    let key = ArtifactKey::parse(&args.key)
        .ok_or_else(|| anyhow::anyhow!("Not an artifact key: {}", args.key))?;
    let store = StoreLocation::from_args(&args.store)?.open()?;

    let bytes = store.get(&key.to_string()).await?;
    let target = PathBuf::from(store::artifact::content_filename(key.block_to));
    tokio::fs::write(&target, &bytes).await?;
    println!("Downloaded {key} to {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}

/// Run the empty command.
async fn run_empty(volume: &Path, args: cli::EmptyArgs) -> anyhow::Result<()> {
    let stream = args.sync_table;
    let store = StoreLocation::from_args(&args.store)?.open()?;
    let staging = StagingDir::new(volume, stream);
    let _lock = staging.lock().await?;

    let keys = match store.list(stream.as_str()).await {
        Ok(keys) => keys,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    if !args.yes {
        println!("This will delete {} artifact(s) from:", keys.len());
        println!("  {}/{}", store.description(), stream.as_str());
        println!("and the local staging directory:");
        println!("  {}", staging.path().display());
        println!();
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    for key in &keys {
        store.delete(key).await?;
        tracing::debug!(key = %key, "Deleted artifact");
    }
    let removed = staging.remove().await?;
    println!(
        "Deleted {} artifact(s){}.",
        keys.len(),
        if removed { " and local staging state" } else { "" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let volume = config::expand_tilde(&cli.volume_path);
    let result = match cli.command {
        Command::Sync(args) => run_sync(&cli.volume_path, args).await,
        Command::Status(args) => run_status(&volume, args).await,
        Command::LastBlock(args) => run_last_block(args).await,
        Command::Download(args) => run_download(args).await,
        Command::Empty(args) => run_empty(&volume, args).await,
    };

    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}
