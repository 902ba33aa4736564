//! Raw data source: the orderbook databases.

pub mod orderbook;

use async_trait::async_trait;
use thiserror::Error;

use crate::block_range::BlockRange;
use crate::models::Row;
use crate::types::SyncStream;

pub use orderbook::OrderbookSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to connect to {env} orderbook: {source}")]
    Connect {
        env: &'static str,
        source: sqlx::Error,
    },

    #[error("Query {query} failed on {env} orderbook: {source}")]
    Query {
        env: &'static str,
        query: &'static str,
        source: sqlx::Error,
    },

    #[error("{env} orderbook returned a row that is not a JSON object: {reason}")]
    Decode { env: &'static str, reason: String },

    #[error("Solver {solver} appears in both prod and barn rows")]
    SolverOverlap { solver: String },
}

/// Produces raw rows per stream and block range.
///
/// Must be deterministic for a fixed range: fetching the same range twice
/// yields the same rows or a superset.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Newest block that is safe to sync up to.
    async fn latest_block(&self) -> Result<u64, SourceError>;

    async fn fetch_rows(&self, stream: SyncStream, range: BlockRange) -> Result<Vec<Row>, SourceError>;
}
