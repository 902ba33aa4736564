//! Line-delimited JSON files used for staged content and the missing ledger.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode record for {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Staging directory {0} is locked by another sync")]
    Locked(PathBuf),
}

impl StagingError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serialize `records` one per line and atomically replace `path`.
///
/// The file is written next to the destination with a `.part` suffix and
/// renamed into place, so readers never observe a half-written file.
pub async fn write_ndjson<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StagingError> {
    let mut buf = Vec::with_capacity(records.len() * 128);
    for record in records {
        serde_json::to_writer(&mut buf, record).map_err(|e| StagingError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        buf.push(b'\n');
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StagingError::io(parent, e))?;
    }
    let part_path = part_path(path);
    tokio::fs::write(&part_path, &buf)
        .await
        .map_err(|e| StagingError::io(&part_path, e))?;
    tokio::fs::rename(&part_path, path)
        .await
        .map_err(|e| StagingError::io(path, e))?;
    Ok(())
}

/// Read records from an ndjson file.
///
/// Returns `None` when the file does not exist. Blank lines are ignored and
/// lines that fail to parse, including ones that are not valid UTF-8, are
/// skipped with a warning.
pub async fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, StagingError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StagingError::io(path, e)),
    };
    Ok(Some(parse_lines(path, &bytes)))
}

fn parse_lines<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Vec<T> {
    let mut records = Vec::new();
    for (idx, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = idx + 1,
                error = %e,
                "Skipping malformed line"
            ),
        }
    }
    records
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
