use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::{RecordHandler, StagingDir};
use crate::block_range::BlockRange;
use crate::ndjson::StagingError;
use crate::types::SyncStream;

/// Handler for streams whose records are shaped rows with no external content.
pub struct RowsHandler {
    stream: SyncStream,
    range: BlockRange,
    records: Vec<Value>,
    staging: StagingDir,
}

impl RowsHandler {
    pub fn new(stream: SyncStream, range: BlockRange, records: Vec<Value>, staging: StagingDir) -> Self {
        Self {
            stream,
            range,
            records,
            staging,
        }
    }
}

#[async_trait]
impl RecordHandler for RowsHandler {
    fn stream(&self) -> SyncStream {
        self.stream
    }

    fn block_range(&self) -> BlockRange {
        self.range
    }

    fn record_count(&self) -> usize {
        self.records.len()
    }

    async fn write_local_content(&self) -> Result<PathBuf, StagingError> {
        self.staging
            .write_content(self.range.block_to(), &self.records)
            .await
    }

    async fn write_watermark_metadata(&self, synced_through: u64) -> Result<(), StagingError> {
        self.staging.write_marker(synced_through).await
    }

    fn warehouse_rows(&self) -> Option<(&'static str, &[Value])> {
        self.stream
            .warehouse_table()
            .map(|table| (table, self.records.as_slice()))
    }
}
