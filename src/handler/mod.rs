//! Record handlers bind one block range of one stream to its output records.

pub mod app_data;
pub mod rows;
pub mod staging;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::block_range::BlockRange;
use crate::ndjson::StagingError;
use crate::store::artifact;
use crate::types::SyncStream;

pub use app_data::AppDataHandler;
pub use rows::RowsHandler;
pub use staging::StagingDir;

/// Output of one sync run for one stream.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    fn stream(&self) -> SyncStream;

    fn block_range(&self) -> BlockRange;

    /// Records this run will publish.
    fn record_count(&self) -> usize;

    /// Filename of the artifact, keyed by the range's upper bound.
    fn content_filename(&self) -> String {
        artifact::content_filename(self.block_range().block_to())
    }

    /// Stage the records to publish. Runs even when there are none.
    async fn write_local_content(&self) -> Result<PathBuf, StagingError>;

    /// Persist state that has to survive a crash after the artifact lands
    /// but before [`write_watermark_metadata`](Self::write_watermark_metadata)
    /// runs. Called right before publishing.
    async fn write_pending_state(&self) -> Result<(), StagingError> {
        Ok(())
    }

    /// Persist stream-local bookkeeping once the run has settled.
    /// `synced_through` is the block the durable store's watermark now
    /// stands at.
    async fn write_watermark_metadata(&self, synced_through: u64) -> Result<(), StagingError>;

    /// Warehouse table and rows to mirror on publish, if the stream has one.
    fn warehouse_rows(&self) -> Option<(&'static str, &[Value])> {
        None
    }
}
