//! Types stored in the run journal.

use chrono::{DateTime, Utc};

use crate::block_range::BlockRange;
use crate::types::SyncStream;

/// How a sync invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Started and not finished; a crash leaves rows in this state.
    Running,
    Published,
    NothingToSync,
    DryRun,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Published => "published",
            Self::NothingToSync => "nothing_to_sync",
            Self::DryRun => "dry_run",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "published" => Some(Self::Published),
            "nothing_to_sync" => Some(Self::NothingToSync),
            "dry_run" => Some(Self::DryRun),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Figures recorded when a run finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub outcome: RunOutcome,
    pub records: u64,
    pub still_missing: u64,
    pub tombstones: u64,
    pub last_error: Option<String>,
}

impl RunStats {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            outcome: RunOutcome::Failed,
            records: 0,
            still_missing: 0,
            tombstones: 0,
            last_error: Some(error.into()),
        }
    }
}

/// One journal row.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub stream: SyncStream,
    pub range: BlockRange,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RunOutcome,
    pub records: u64,
    pub still_missing: u64,
    pub tombstones: u64,
    pub last_error: Option<String>,
}
