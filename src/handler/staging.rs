//! Per-stream local staging directory `{volume}/{namespace}/`.

use std::fs::File;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};

use crate::ndjson::{self, StagingError};
use crate::store::artifact;
use crate::types::SyncStream;

const MARKER_FILE_NAME: &str = "last_synced_block.json";
const LOCK_FILE_NAME: &str = "sync.lock";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Marker {
    last_synced_block: u64,
}

/// Exclusive advisory lock on a staging directory. Released on drop.
#[derive(Debug)]
pub struct SyncLock {
    _file: File,
    path: PathBuf,
}

impl SyncLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct StagingDir {
    root: PathBuf,
}

impl StagingDir {
    pub fn new(volume: &Path, stream: SyncStream) -> Self {
        Self {
            root: volume.join(stream.as_str()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn content_path(&self, block_to: u64) -> PathBuf {
        self.root.join(artifact::content_filename(block_to))
    }

    /// Write the content file for `block_to` and drop older content files, so
    /// the directory only ever holds the current range.
    pub async fn write_content<T: Serialize>(
        &self,
        block_to: u64,
        records: &[T],
    ) -> Result<PathBuf, StagingError> {
        let path = self.content_path(block_to);
        ndjson::write_ndjson(&path, records).await?;
        self.remove_stale_content(block_to).await?;
        tracing::debug!(path = %path.display(), records = records.len(), "Wrote content file");
        Ok(path)
    }

    async fn remove_stale_content(&self, keep: u64) -> Result<(), StagingError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StagingError::io(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StagingError::io(&self.root, e))?
        {
            let name = entry.file_name();
            let Some(block) = name.to_str().and_then(artifact::parse_filename) else {
                continue;
            };
            if block != keep {
                let path = entry.path();
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| StagingError::io(&path, e))?;
            }
        }
        Ok(())
    }

    /// Most recent content file and the block it covers.
    pub async fn latest_content(&self) -> Result<Option<(u64, PathBuf)>, StagingError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StagingError::io(&self.root, e)),
        };
        let mut latest: Option<(u64, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StagingError::io(&self.root, e))?
        {
            let name = entry.file_name();
            if let Some(block) = name.to_str().and_then(artifact::parse_filename) {
                if latest.as_ref().map_or(true, |(b, _)| block > *b) {
                    latest = Some((block, entry.path()));
                }
            }
        }
        Ok(latest)
    }

    /// Mirror of the stream's watermark, for diagnostics only.
    pub async fn write_marker(&self, block: u64) -> Result<(), StagingError> {
        ndjson::write_ndjson(
            &self.root.join(MARKER_FILE_NAME),
            &[Marker {
                last_synced_block: block,
            }],
        )
        .await
    }

    pub async fn read_marker(&self) -> Result<Option<u64>, StagingError> {
        let markers: Option<Vec<Marker>> = ndjson::read_ndjson(&self.root.join(MARKER_FILE_NAME)).await?;
        Ok(markers.and_then(|m| m.last().map(|m| m.last_synced_block)))
    }

    /// Take the directory's sync lock, failing fast if another process holds it.
    pub async fn lock(&self) -> Result<SyncLock, StagingError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root).map_err(|e| StagingError::io(&root, e))?;
            let path = root.join(LOCK_FILE_NAME);
            let file = File::create(&path).map_err(|e| StagingError::io(&path, e))?;
            FileExt::try_lock_exclusive(&file).map_err(|_| StagingError::Locked(root.clone()))?;
            Ok(SyncLock { _file: file, path })
        })
        .await
        .map_err(|e| StagingError::io(&self.root, std::io::Error::other(e)))?
    }

    /// Remove the whole staging directory.
    pub async fn remove(&self) -> Result<bool, StagingError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StagingError::io(&self.root, e)),
        }
    }
}
