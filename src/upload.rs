//! Write, publish, then commit.
//!
//! The watermark is derived from the artifacts in the durable store, so it
//! only moves when a new artifact lands. Stream-local bookkeeping (ledger,
//! marker) is committed through [`UploadHandler::advance_iff_published`],
//! which is the single place that decides whether a run counts as done.

use std::path::Path;

use thiserror::Error;

use crate::handler::RecordHandler;
use crate::ndjson::StagingError;
use crate::store::{ArtifactStore, StoreError};
use crate::warehouse::{Warehouse, WarehouseError};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("Failed to read staged content {path}: {source}")]
    ReadStaged {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to publish artifact: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to mirror rows to the warehouse: {0}")]
    Warehouse(#[from] WarehouseError),
}

/// What a call to [`UploadHandler::write_and_publish`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The range produced no records.
    NothingToPublish,
    /// Records were staged but not published.
    DryRun { records: usize },
    /// The artifact was written to the durable store.
    Published { key: String, records: usize },
}

pub struct UploadHandler<'a> {
    store: &'a dyn ArtifactStore,
    warehouse: Option<&'a dyn Warehouse>,
}

impl<'a> UploadHandler<'a> {
    pub fn new(store: &'a dyn ArtifactStore, warehouse: Option<&'a dyn Warehouse>) -> Self {
        Self { store, warehouse }
    }

    /// Stage the handler's content, publish it unless there is nothing to
    /// publish or this is a dry run, then commit the run's bookkeeping.
    ///
    /// A publish failure is returned before anything is committed, so the
    /// next run recomputes the same range.
    pub async fn write_and_publish(
        &self,
        handler: &dyn RecordHandler,
        dry_run: bool,
    ) -> Result<PublishOutcome, UploadError> {
        let stream = handler.stream();
        let path = handler.write_local_content().await?;
        let records = handler.record_count();

        let outcome = if records == 0 {
            tracing::info!(stream = %stream, range = %handler.block_range(), "Nothing to sync");
            PublishOutcome::NothingToPublish
        } else if dry_run {
            tracing::info!(
                stream = %stream,
                records,
                file = %handler.content_filename(),
                "Dry run: would publish records"
            );
            PublishOutcome::DryRun { records }
        } else {
            handler.write_pending_state().await?;
            self.publish(handler, &path).await?
        };

        self.advance_iff_published(handler, &outcome, dry_run).await?;
        Ok(outcome)
    }

    async fn publish(
        &self,
        handler: &dyn RecordHandler,
        path: &Path,
    ) -> Result<PublishOutcome, UploadError> {
        let stream = handler.stream();
        if let Some((table, rows)) = handler.warehouse_rows() {
            match self.warehouse {
                Some(warehouse) => {
                    let description = format!("{stream} rows for {}", handler.block_range());
                    warehouse.publish(table, rows, &description).await?;
                }
                None => tracing::warn!(
                    stream = %stream,
                    table,
                    "No warehouse configured, skipping table upload"
                ),
            }
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::ReadStaged {
                path: path.display().to_string(),
                source,
            })?;
        let key = format!("{}/{}", stream.as_str(), handler.content_filename());
        self.store.put(&key, bytes).await?;
        let records = handler.record_count();
        tracing::info!(stream = %stream, key = %key, records, "Published artifact");
        Ok(PublishOutcome::Published { key, records })
    }

    /// Commit bookkeeping for runs that completed for real. Dry runs never
    /// reach persisted sync state.
    ///
    /// The marker mirrors the store: it moves to the range's upper bound only
    /// when an artifact landed and otherwise stays at the lower bound.
    pub async fn advance_iff_published(
        &self,
        handler: &dyn RecordHandler,
        outcome: &PublishOutcome,
        dry_run: bool,
    ) -> Result<(), UploadError> {
        let range = handler.block_range();
        match outcome {
            PublishOutcome::Published { .. } => {
                handler.write_watermark_metadata(range.block_to()).await?
            }
            PublishOutcome::NothingToPublish if !dry_run => {
                handler.write_watermark_metadata(range.block_from()).await?
            }
            _ => tracing::debug!(stream = %handler.stream(), "Dry run, sync state unchanged"),
        }
        Ok(())
    }
}
