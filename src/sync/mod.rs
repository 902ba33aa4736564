//! Per-stream sync drivers.
//!
//! A run takes the stream's staging lock, derives the next block range from
//! the durable store and the source head, builds the stream's record handler
//! and hands it to the upload orchestrator. Everything here is sequential;
//! only content resolution fans out.

pub mod app_data;
pub mod orderbook;

use std::io::IsTerminal;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};

use crate::block_range::BlockRange;
use crate::content::Resolve;
use crate::handler::StagingDir;
use crate::ledger::LedgerPolicy;
use crate::source::RowSource;
use crate::state::{RunJournal, RunOutcome, RunStats};
use crate::store::{watermark, ArtifactStore};
use crate::types::SyncStream;
use crate::upload::PublishOutcome;
use crate::warehouse::Warehouse;

/// Collaborators and settings shared by every driver.
pub struct SyncContext<'a> {
    pub store: &'a dyn ArtifactStore,
    pub source: &'a dyn RowSource,
    pub resolver: &'a dyn Resolve,
    pub warehouse: Option<&'a dyn Warehouse>,
    pub journal: Option<&'a dyn RunJournal>,
    pub policy: LedgerPolicy,
    pub volume: PathBuf,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Result of one sync invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub stream: SyncStream,
    pub range: BlockRange,
    pub outcome: PublishOutcome,
    pub still_missing: usize,
    pub tombstones: usize,
}

impl SyncReport {
    fn up_to_date(stream: SyncStream, range: BlockRange) -> Self {
        Self {
            stream,
            range,
            outcome: PublishOutcome::NothingToPublish,
            still_missing: 0,
            tombstones: 0,
        }
    }

    fn run_stats(&self) -> RunStats {
        let (outcome, records) = match &self.outcome {
            PublishOutcome::NothingToPublish => (RunOutcome::NothingToSync, 0),
            PublishOutcome::DryRun { records } => (RunOutcome::DryRun, *records),
            PublishOutcome::Published { records, .. } => (RunOutcome::Published, *records),
        };
        RunStats {
            outcome,
            records: records as u64,
            still_missing: self.still_missing as u64,
            tombstones: self.tombstones as u64,
            last_error: None,
        }
    }
}

/// Range from the stream's watermark up to the source's safe head.
pub async fn next_block_range(
    store: &dyn ArtifactStore,
    source: &dyn RowSource,
    stream: SyncStream,
) -> anyhow::Result<BlockRange> {
    let watermark =
        watermark::last_synced_block(store, stream.as_str(), stream.genesis_block()).await?;
    let head = source.latest_block().await?;
    if head < watermark {
        tracing::warn!(
            stream = %stream,
            watermark,
            head,
            "Source head is behind the watermark"
        );
    }
    Ok(BlockRange::since(watermark, head))
}

/// Run one incremental sync of `stream`.
pub async fn sync_stream(ctx: &SyncContext<'_>, stream: SyncStream) -> anyhow::Result<SyncReport> {
    let staging = StagingDir::new(&ctx.volume, stream);
    let lock = staging.lock().await?;
    tracing::debug!(lock = %lock.path().display(), "Acquired sync lock");

    let range = next_block_range(ctx.store, ctx.source, stream).await?;
    tracing::info!(stream = %stream, range = %range, dry_run = ctx.dry_run, "Starting sync");

    // An empty range would republish under the watermark's own key.
    if range.is_empty() {
        tracing::info!(stream = %stream, block = range.block_to(), "Already up to date");
        return Ok(SyncReport::up_to_date(stream, range));
    }

    let run_id = match ctx.journal {
        Some(journal) => match journal.start_run(stream, range, ctx.dry_run).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record run start in journal");
                None
            }
        },
        None => None,
    };

    let result = if stream.is_content_bearing() {
        app_data::sync(ctx, range, &staging).await
    } else {
        orderbook::sync(ctx, stream, range, &staging).await
    };

    if let (Some(journal), Some(run_id)) = (ctx.journal, run_id) {
        let stats = match &result {
            Ok(report) => report.run_stats(),
            Err(e) => RunStats::failed(format!("{e:#}")),
        };
        if let Err(e) = journal.finish_run(run_id, &stats).await {
            tracing::warn!(error = %e, "Failed to record run result in journal");
        }
    }

    result
}

/// Progress bar for content resolution.
///
/// Hidden when the user passed `--no-progress-bar` or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> "),
    );
    pb
}
