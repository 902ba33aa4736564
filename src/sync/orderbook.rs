//! Driver for the row streams: order rewards, batch rewards, token
//! imbalances and price feeds.

use super::{SyncContext, SyncReport};
use crate::block_range::BlockRange;
use crate::handler::{RowsHandler, StagingDir};
use crate::models;
use crate::types::SyncStream;
use crate::upload::UploadHandler;

pub(super) async fn sync(
    ctx: &SyncContext<'_>,
    stream: SyncStream,
    range: BlockRange,
    staging: &StagingDir,
) -> anyhow::Result<SyncReport> {
    let rows = ctx.source.fetch_rows(stream, range).await?;
    tracing::info!(stream = %stream, rows = rows.len(), "Fetched rows");
    let records = models::shape_rows(stream, rows)?;

    let handler = RowsHandler::new(stream, range, records, staging.clone());
    let outcome = UploadHandler::new(ctx.store, ctx.warehouse)
        .write_and_publish(&handler, ctx.dry_run)
        .await?;

    Ok(SyncReport {
        stream,
        range,
        outcome,
        still_missing: 0,
        tombstones: 0,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::super::sync_stream;
    use super::super::test_support::*;
    use crate::store::{watermark, ArtifactStore, ObjectArtifactStore};
    use crate::types::SyncStream;
    use crate::upload::PublishOutcome;
    use crate::warehouse::{Warehouse, WarehouseError};

    const GENESIS: u64 = 15_173_540;
    const PRICE_GENESIS: u64 = 16_862_919;

    #[derive(Default)]
    struct RecordingWarehouse {
        tables: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Warehouse for RecordingWarehouse {
        async fn publish(&self, table_name: &str, _rows: &[Value], _description: &str) -> Result<(), WarehouseError> {
            self.tables.lock().unwrap().push(table_name.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_zero_rows_stage_empty_file_without_publishing() {
        let store = ObjectArtifactStore::in_memory();
        let resolver = FakeResolver::default();
        let volume = test_volume("orderbook_zero_rows");
        let source = FakeSource {
            head: GENESIS + 10,
            rows: vec![],
        };
        let ctx = context(&store, &source, &resolver, volume.clone());

        let report = sync_stream(&ctx, SyncStream::TokenImbalance).await.unwrap();
        assert_eq!(report.outcome, PublishOutcome::NothingToPublish);

        let staging = crate::handler::StagingDir::new(&volume, SyncStream::TokenImbalance);
        let (block, path) = staging.latest_content().await.unwrap().unwrap();
        assert_eq!(block, GENESIS + 10);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
        assert!(store.list("internal_imbalance").await.unwrap().is_empty());
        assert_eq!(
            watermark::last_synced_block(&store, "internal_imbalance", GENESIS)
                .await
                .unwrap(),
            GENESIS
        );
    }

    #[tokio::test]
    async fn test_rows_are_shaped_before_publishing() {
        let store = ObjectArtifactStore::in_memory();
        let resolver = FakeResolver::default();
        let volume = test_volume("orderbook_shaped");
        let source = FakeSource {
            head: GENESIS + 10,
            rows: vec![(
                SyncStream::TokenImbalance,
                GENESIS + 1,
                row(json!({
                    "block_number": "15173541",
                    "tx_hash": "0xab",
                    "token": "0xc02a",
                    "amount": "-1000000000000000000000"
                })),
            )],
        };
        let ctx = context(&store, &source, &resolver, volume);

        sync_stream(&ctx, SyncStream::TokenImbalance).await.unwrap();

        let bytes = store
            .get(&format!("internal_imbalance/cow_{}.json", GENESIS + 10))
            .await
            .unwrap();
        let published: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(published["block_number"], json!(GENESIS + 1));
        assert_eq!(published["amount"], json!("-1000000000000000000000"));
    }

    #[tokio::test]
    async fn test_malformed_row_is_fatal() {
        let store = ObjectArtifactStore::in_memory();
        let resolver = FakeResolver::default();
        let volume = test_volume("orderbook_malformed");
        let source = FakeSource {
            head: GENESIS + 10,
            rows: vec![(
                SyncStream::TokenImbalance,
                GENESIS + 1,
                row(json!({"block_number": GENESIS + 1})),
            )],
        };
        let ctx = context(&store, &source, &resolver, volume);

        assert!(sync_stream(&ctx, SyncStream::TokenImbalance).await.is_err());
        assert!(store.list("internal_imbalance").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_feed_mirrors_to_warehouse() {
        let store = ObjectArtifactStore::in_memory();
        let resolver = FakeResolver::default();
        let warehouse = RecordingWarehouse::default();
        let volume = test_volume("orderbook_price_feed");
        let source = FakeSource {
            head: PRICE_GENESIS + 5,
            rows: vec![(
                SyncStream::PriceFeed,
                PRICE_GENESIS + 2,
                row(json!({
                    "block_number": PRICE_GENESIS + 2,
                    "token": "0xa0b8",
                    "source": "coingecko",
                    "price": "0.00042"
                })),
            )],
        };
        let mut ctx = context(&store, &source, &resolver, volume);
        ctx.warehouse = Some(&warehouse);

        let report = sync_stream(&ctx, SyncStream::PriceFeed).await.unwrap();
        assert!(matches!(report.outcome, PublishOutcome::Published { records: 1, .. }));
        assert_eq!(*warehouse.tables.lock().unwrap(), vec!["price_feed".to_string()]);
    }

    #[tokio::test]
    async fn test_dry_run_keeps_watermark() {
        let store = ObjectArtifactStore::in_memory();
        let resolver = FakeResolver::default();
        let volume = test_volume("orderbook_dry_run");
        let source = FakeSource {
            head: GENESIS + 10,
            rows: vec![imbalance_row(GENESIS + 4)],
        };
        let mut ctx = context(&store, &source, &resolver, volume.clone());
        ctx.dry_run = true;

        let report = sync_stream(&ctx, SyncStream::TokenImbalance).await.unwrap();
        assert_eq!(report.outcome, PublishOutcome::DryRun { records: 1 });
        assert_eq!(
            watermark::last_synced_block(&store, "internal_imbalance", GENESIS)
                .await
                .unwrap(),
            GENESIS
        );
        let staging = crate::handler::StagingDir::new(&volume, SyncStream::TokenImbalance);
        assert_eq!(staging.read_marker().await.unwrap(), None);
    }
}
