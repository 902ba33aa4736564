//! Run journal trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use super::error::StateError;
use super::schema;
use super::types::{RunOutcome, RunRecord, RunStats};
use crate::block_range::BlockRange;
use crate::types::SyncStream;

/// Object-safe so drivers can hold an `Option<&dyn RunJournal>`.
#[async_trait]
pub trait RunJournal: Send + Sync {
    /// Record the start of a sync and return its run id.
    async fn start_run(
        &self,
        stream: SyncStream,
        range: BlockRange,
        dry_run: bool,
    ) -> Result<i64, StateError>;

    async fn finish_run(&self, run_id: i64, stats: &RunStats) -> Result<(), StateError>;

    /// Most recent runs first, optionally for one stream.
    async fn recent_runs(
        &self,
        stream: Option<SyncStream>,
        limit: u32,
    ) -> Result<Vec<RunRecord>, StateError>;
}

pub struct SqliteRunJournal {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteRunJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRunJournal")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRunJournal {
    /// Open or create the journal at `path`.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RunJournal for SqliteRunJournal {
    async fn start_run(
        &self,
        stream: SyncStream,
        range: BlockRange,
        dry_run: bool,
    ) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();

        let conn = self
            .conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))?;

        conn.execute(
            "INSERT INTO sync_runs (stream, block_from, block_to, dry_run, started_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                stream.as_str(),
                range.block_from() as i64,
                range.block_to() as i64,
                dry_run,
                started_at
            ],
        )
        .map_err(StateError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn finish_run(&self, run_id: i64, stats: &RunStats) -> Result<(), StateError> {
        let finished_at = Utc::now().timestamp();

        let conn = self
            .conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))?;

        conn.execute(
            "UPDATE sync_runs SET finished_at = ?1, outcome = ?2, records = ?3, still_missing = ?4, tombstones = ?5, last_error = ?6 WHERE id = ?7",
            rusqlite::params![
                finished_at,
                stats.outcome.as_str(),
                stats.records as i64,
                stats.still_missing as i64,
                stats.tombstones as i64,
                stats.last_error,
                run_id
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn recent_runs(
        &self,
        stream: Option<SyncStream>,
        limit: u32,
    ) -> Result<Vec<RunRecord>, StateError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, stream, block_from, block_to, dry_run, started_at, finished_at, \
                 outcome, records, still_missing, tombstones, last_error \
                 FROM sync_runs WHERE (?1 IS NULL OR stream = ?1) \
                 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(StateError::query)?;

        let records = stmt
            .query_map(
                rusqlite::params![stream.map(|s| s.as_str()), limit],
                |row| Ok(row_to_run_record(row)),
            )
            .map_err(StateError::query)?
            .filter_map(|r| r.ok().flatten())
            .collect();

        Ok(records)
    }
}

fn timestamp(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

/// Rows naming an unknown stream or holding an inverted range are skipped.
fn row_to_run_record(row: &rusqlite::Row<'_>) -> Option<RunRecord> {
    let stream: String = row.get(1).ok()?;
    let block_from: i64 = row.get(2).ok()?;
    let block_to: i64 = row.get(3).ok()?;
    let started_at: i64 = row.get(5).unwrap_or(0);
    let finished_at: Option<i64> = row.get(6).ok().flatten();
    let outcome: String = row.get(7).unwrap_or_default();

    Some(RunRecord {
        id: row.get(0).unwrap_or(0),
        stream: SyncStream::from_str(&stream)?,
        range: BlockRange::new(block_from as u64, block_to as u64).ok()?,
        dry_run: row.get(4).unwrap_or(false),
        started_at: timestamp(started_at).unwrap_or(DateTime::UNIX_EPOCH),
        finished_at: finished_at.and_then(timestamp),
        outcome: RunOutcome::from_str(&outcome).unwrap_or(RunOutcome::Running),
        records: row.get::<_, i64>(8).unwrap_or(0) as u64,
        still_missing: row.get::<_, i64>(9).unwrap_or(0) as u64,
        tombstones: row.get::<_, i64>(10).unwrap_or(0) as u64,
        last_error: row.get(11).ok().flatten(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("dune-sync-tests")
            .join("journal")
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn range(from: u64, to: u64) -> BlockRange {
        BlockRange::new(from, to).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_db_and_parent() {
        let path = test_dir("open").join("volume").join("sync_state.db");
        let journal = SqliteRunJournal::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(journal.path(), path);
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let journal = SqliteRunJournal::open_in_memory().unwrap();
        let id = journal
            .start_run(SyncStream::AppData, range(100, 200), false)
            .await
            .unwrap();
        assert!(id > 0);

        let runs = journal.recent_runs(None, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome, RunOutcome::Running);
        assert!(runs[0].finished_at.is_none());

        journal
            .finish_run(
                id,
                &RunStats {
                    outcome: RunOutcome::Published,
                    records: 40,
                    still_missing: 3,
                    tombstones: 1,
                    last_error: None,
                },
            )
            .await
            .unwrap();

        let run = &journal.recent_runs(None, 10).await.unwrap()[0];
        assert_eq!(run.stream, SyncStream::AppData);
        assert_eq!(run.range, range(100, 200));
        assert!(!run.dry_run);
        assert_eq!(run.outcome, RunOutcome::Published);
        assert_eq!(run.records, 40);
        assert_eq!(run.still_missing, 3);
        assert_eq!(run.tombstones, 1);
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_error() {
        let journal = SqliteRunJournal::open_in_memory().unwrap();
        let id = journal
            .start_run(SyncStream::PriceFeed, range(1, 2), true)
            .await
            .unwrap();
        journal
            .finish_run(id, &RunStats::failed("warehouse rejected upload"))
            .await
            .unwrap();
        let run = &journal.recent_runs(None, 1).await.unwrap()[0];
        assert!(run.dry_run);
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.last_error.as_deref(), Some("warehouse rejected upload"));
    }

    #[tokio::test]
    async fn test_recent_runs_filters_and_orders() {
        let journal = SqliteRunJournal::open_in_memory().unwrap();
        for to in [10, 20, 30] {
            journal
                .start_run(SyncStream::OrderRewards, range(to - 10, to), false)
                .await
                .unwrap();
        }
        journal
            .start_run(SyncStream::BatchRewards, range(0, 5), false)
            .await
            .unwrap();

        let runs = journal
            .recent_runs(Some(SyncStream::OrderRewards), 2)
            .await
            .unwrap();
        assert_eq!(
            runs.iter().map(|r| r.range.block_to()).collect::<Vec<_>>(),
            vec![30, 20]
        );
        assert_eq!(journal.recent_runs(None, 10).await.unwrap().len(), 4);
    }
}
