//! Local SQLite journal of sync invocations, for diagnostics.
//!
//! The journal is advisory. Watermarks come from the durable store and
//! nothing here is read back by a sync.

pub mod error;
pub mod journal;
pub mod schema;
pub mod types;

pub use journal::{RunJournal, SqliteRunJournal};
pub use types::{RunOutcome, RunRecord, RunStats};

/// Journal file name inside the volume.
pub const JOURNAL_FILE_NAME: &str = "sync_state.db";
