use std::path::Path;

use super::types::MissingContent;
use crate::ndjson::{self, StagingError};

/// Fixed name of the ledger file inside the app-data staging directory.
pub const MISSING_FILE_NAME: &str = "missing_app_hashes.json";

/// Load the ledger left by the previous run. A missing file is an empty ledger.
pub async fn load(dir: &Path) -> Result<Vec<MissingContent>, StagingError> {
    let path = dir.join(MISSING_FILE_NAME);
    match ndjson::read_ndjson(&path).await? {
        Some(entries) => {
            tracing::info!(
                path = %path.display(),
                entries = entries.len(),
                "Loaded missing app hashes"
            );
            Ok(entries)
        }
        None => {
            tracing::info!(path = %path.display(), "No missing app hashes file, starting empty");
            Ok(Vec::new())
        }
    }
}

/// Replace the ledger. An empty ledger is written too, clearing the old one.
pub async fn save(dir: &Path, entries: &[MissingContent]) -> Result<(), StagingError> {
    let path = dir.join(MISSING_FILE_NAME);
    ndjson::write_ndjson(&path, entries).await?;
    tracing::debug!(path = %path.display(), entries = entries.len(), "Wrote missing app hashes");
    Ok(())
}
