use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{RecordHandler, StagingDir};
use crate::block_range::BlockRange;
use crate::content::cid::normalize_hash;
use crate::ledger::{self, FoundContent, MissingContent, Reconciled};
use crate::ndjson::StagingError;
use crate::types::SyncStream;

/// Handler for app data: publishes resolved documents, keeps the rest in the
/// missing-content ledger.
pub struct AppDataHandler {
    range: BlockRange,
    found: Vec<FoundContent>,
    still_missing: Vec<MissingContent>,
    in_flight: Vec<MissingContent>,
    staging: StagingDir,
}

impl AppDataHandler {
    /// `carried` is the ledger the run started from.
    pub fn new(
        range: BlockRange,
        reconciled: Reconciled,
        carried: &[MissingContent],
        staging: StagingDir,
    ) -> Self {
        let in_flight = in_flight_ledger(&reconciled.still_missing, carried);
        Self {
            range,
            found: reconciled.found,
            still_missing: reconciled.still_missing,
            in_flight,
            staging,
        }
    }
}

/// Ledger to hold while the artifact is being published: the still-missing
/// set plus every carried entry resolved or given up this run. Carried hashes
/// predate the range, so they may only leave the ledger once the artifact
/// that contains them exists.
fn in_flight_ledger(still_missing: &[MissingContent], carried: &[MissingContent]) -> Vec<MissingContent> {
    let mut seen: HashSet<String> = still_missing
        .iter()
        .map(|m| normalize_hash(&m.app_hash))
        .collect();
    let mut ledger = still_missing.to_vec();
    for entry in carried {
        if seen.insert(normalize_hash(&entry.app_hash)) {
            ledger.push(entry.clone());
        }
    }
    ledger.sort_by(|a, b| (a.first_seen_block, &a.app_hash).cmp(&(b.first_seen_block, &b.app_hash)));
    ledger
}

#[async_trait]
impl RecordHandler for AppDataHandler {
    fn stream(&self) -> SyncStream {
        SyncStream::AppData
    }

    fn block_range(&self) -> BlockRange {
        self.range
    }

    /// Only found documents are published; still-missing entries stay local.
    fn record_count(&self) -> usize {
        self.found.len()
    }

    async fn write_local_content(&self) -> Result<PathBuf, StagingError> {
        self.staging
            .write_content(self.range.block_to(), &self.found)
            .await
    }

    async fn write_pending_state(&self) -> Result<(), StagingError> {
        ledger::file::save(self.staging.path(), &self.in_flight).await
    }

    async fn write_watermark_metadata(&self, synced_through: u64) -> Result<(), StagingError> {
        ledger::file::save(self.staging.path(), &self.still_missing).await?;
        self.staging.write_marker(synced_through).await
    }
}
