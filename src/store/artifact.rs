//! Artifact naming: `{namespace}/cow_{block_to}.json`.

use crate::types::SyncStream;

const FILENAME_PREFIX: &str = "cow_";
const FILENAME_SUFFIX: &str = ".json";

/// Filename of the artifact covering blocks up to and including `block_to`.
pub fn content_filename(block_to: u64) -> String {
    format!("{FILENAME_PREFIX}{block_to}{FILENAME_SUFFIX}")
}

/// Block number encoded in an artifact filename.
///
/// Only `cow_<decimal digits>.json` is accepted; anything else is not an
/// indexed artifact.
pub fn parse_filename(filename: &str) -> Option<u64> {
    let digits = filename
        .strip_prefix(FILENAME_PREFIX)?
        .strip_suffix(FILENAME_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Location of one published artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub stream: SyncStream,
    pub block_to: u64,
}

impl ArtifactKey {
    pub fn new(stream: SyncStream, block_to: u64) -> Self {
        Self { stream, block_to }
    }

    /// Parse a full key such as `app_data/cow_123.json`.
    pub fn parse(key: &str) -> Option<Self> {
        let (namespace, filename) = key.split_once('/')?;
        let stream = SyncStream::from_str(namespace)?;
        Some(Self {
            stream,
            block_to: parse_filename(filename)?,
        })
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.stream.as_str(), content_filename(self.block_to))
    }
}
