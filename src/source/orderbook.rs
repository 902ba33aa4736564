use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{RowSource, SourceError};
use crate::block_range::BlockRange;
use crate::models::Row;
use crate::types::SyncStream;

/// Blocks kept behind the indexed head to stay clear of reorgs.
pub const DEFAULT_REORG_THRESHOLD: u64 = 65;

const LATEST_BLOCK_SQL: &str = include_str!("../../queries/latest_block.sql");
const APP_HASHES_SQL: &str = include_str!("../../queries/app_hashes.sql");
const ORDER_REWARDS_SQL: &str = include_str!("../../queries/order_rewards.sql");
const BATCH_REWARDS_SQL: &str = include_str!("../../queries/batch_rewards.sql");
const TOKEN_IMBALANCES_SQL: &str = include_str!("../../queries/token_imbalances.sql");
const PRICE_FEED_SQL: &str = include_str!("../../queries/price_feed.sql");

fn query_for(stream: SyncStream) -> (&'static str, &'static str) {
    match stream {
        SyncStream::AppData => ("app_hashes", APP_HASHES_SQL),
        SyncStream::OrderRewards => ("order_rewards", ORDER_REWARDS_SQL),
        SyncStream::BatchRewards => ("batch_rewards", BATCH_REWARDS_SQL),
        SyncStream::TokenImbalance => ("token_imbalances", TOKEN_IMBALANCES_SQL),
        SyncStream::PriceFeed => ("price_feed", PRICE_FEED_SQL),
    }
}

/// Wrap a stream query so each row comes back as one JSON object.
fn as_json_rows(sql: &str) -> String {
    format!("SELECT row_to_json(q)::text FROM (\n{}\n) q", sql.trim_end().trim_end_matches(';'))
}

/// Solvers run in exactly one environment, so reward rows from prod and barn
/// must never share a solver.
fn check_solvers_disjoint(prod: &[Row], barn: &[Row]) -> Result<(), SourceError> {
    let prod_solvers: HashSet<&str> = prod
        .iter()
        .filter_map(|r| r.get("solver").and_then(Value::as_str))
        .collect();
    for row in barn {
        if let Some(solver) = row.get("solver").and_then(Value::as_str) {
            if prod_solvers.contains(solver) {
                return Err(SourceError::SolverOverlap {
                    solver: solver.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Production orderbook plus an optional staging ("barn") orderbook.
pub struct OrderbookSource {
    prod: PgPool,
    barn: Option<PgPool>,
    reorg_threshold: u64,
}

impl std::fmt::Debug for OrderbookSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderbookSource")
            .field("barn", &self.barn.is_some())
            .field("reorg_threshold", &self.reorg_threshold)
            .finish_non_exhaustive()
    }
}

async fn connect(env: &'static str, url: &str) -> Result<PgPool, SourceError> {
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
        .map_err(|source| SourceError::Connect { env, source })
}

impl OrderbookSource {
    pub async fn connect(
        prod_url: &str,
        barn_url: Option<&str>,
        reorg_threshold: u64,
    ) -> Result<Self, SourceError> {
        let prod = connect("prod", prod_url).await?;
        let barn = match barn_url {
            Some(url) => Some(connect("barn", url).await?),
            None => None,
        };
        Ok(Self {
            prod,
            barn,
            reorg_threshold,
        })
    }

    fn pools(&self) -> impl Iterator<Item = (&'static str, &PgPool)> + '_ {
        std::iter::once(("prod", &self.prod)).chain(self.barn.iter().map(|p| ("barn", p)))
    }
}

async fn query_rows(
    env: &'static str,
    pool: &PgPool,
    query: &'static str,
    sql: &str,
    range: BlockRange,
) -> Result<Vec<Row>, SourceError> {
    let texts: Vec<String> = sqlx::query_scalar(sql)
        .bind(range.block_from() as i64)
        .bind(range.block_to() as i64)
        .fetch_all(pool)
        .await
        .map_err(|source| SourceError::Query { env, query, source })?;
    texts
        .iter()
        .map(|text| match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(row)) => Ok(row),
            Ok(other) => Err(SourceError::Decode {
                env,
                reason: format!("unexpected {other}"),
            }),
            Err(e) => Err(SourceError::Decode {
                env,
                reason: e.to_string(),
            }),
        })
        .collect()
}

#[async_trait]
impl RowSource for OrderbookSource {
    async fn latest_block(&self) -> Result<u64, SourceError> {
        let mut latest: Option<u64> = None;
        for (env, pool) in self.pools() {
            let block: i64 = sqlx::query_scalar(LATEST_BLOCK_SQL)
                .fetch_one(pool)
                .await
                .map_err(|source| SourceError::Query {
                    env,
                    query: "latest_block",
                    source,
                })?;
            let block = block.max(0) as u64;
            tracing::debug!(env, block, "Latest indexed block");
            latest = Some(latest.map_or(block, |l| l.min(block)));
        }
        Ok(latest.unwrap_or(0).saturating_sub(self.reorg_threshold))
    }

    async fn fetch_rows(&self, stream: SyncStream, range: BlockRange) -> Result<Vec<Row>, SourceError> {
        let (query, template) = query_for(stream);
        let sql = as_json_rows(template);
        let prod = query_rows("prod", &self.prod, query, &sql, range).await?;
        let barn = match &self.barn {
            Some(pool) => query_rows("barn", pool, query, &sql, range).await?,
            None => Vec::new(),
        };
        if matches!(stream, SyncStream::OrderRewards | SyncStream::BatchRewards) {
            check_solvers_disjoint(&prod, &barn)?;
        }
        tracing::info!(
            stream = %stream,
            %range,
            prod = prod.len(),
            barn = barn.len(),
            "Fetched rows"
        );
        let mut rows = prod;
        rows.extend(barn);
        Ok(rows)
    }
}
