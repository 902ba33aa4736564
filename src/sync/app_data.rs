//! App-data driver: resolve the documents behind new and carried app hashes.

use std::collections::HashSet;

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde_json::Value;

use super::{create_progress_bar, SyncContext, SyncReport};
use crate::block_range::BlockRange;
use crate::content::cid::normalize_hash;
use crate::content::Resolve;
use crate::handler::{AppDataHandler, StagingDir};
use crate::ledger::{self, ContentRef, MissingContent};
use crate::models;
use crate::types::SyncStream;
use crate::upload::UploadHandler;

/// Ticks a progress bar once per resolved hash.
struct ProgressResolver<'a> {
    inner: &'a dyn Resolve,
    pb: ProgressBar,
}

#[async_trait]
impl Resolve for ProgressResolver<'_> {
    async fn resolve(&self, app_hash: &str, max_retries: u32) -> Option<Value> {
        let doc = self.inner.resolve(app_hash, max_retries).await;
        if doc.is_none() {
            self.pb
                .suspend(|| tracing::debug!(app_hash, "App data not found this run"));
        }
        self.pb.inc(1);
        doc
    }
}

fn distinct_hashes(new_refs: &[ContentRef], carried: &[MissingContent]) -> u64 {
    new_refs
        .iter()
        .map(|r| normalize_hash(&r.app_hash))
        .chain(carried.iter().map(|m| normalize_hash(&m.app_hash)))
        .collect::<HashSet<_>>()
        .len() as u64
}

pub(super) async fn sync(
    ctx: &SyncContext<'_>,
    range: BlockRange,
    staging: &StagingDir,
) -> anyhow::Result<SyncReport> {
    let rows = ctx.source.fetch_rows(SyncStream::AppData, range).await?;
    let new_refs = models::content_refs(rows)?;
    let carried = ledger::file::load(staging.path()).await?;
    tracing::info!(
        new = new_refs.len(),
        carried = carried.len(),
        "Resolving app data"
    );

    let pb = create_progress_bar(ctx.no_progress_bar, distinct_hashes(&new_refs, &carried));
    let resolver = ProgressResolver {
        inner: ctx.resolver,
        pb: pb.clone(),
    };
    let reconciled = ledger::reconcile(&resolver, new_refs, carried.clone(), ctx.policy).await;
    pb.finish_and_clear();

    let still_missing = reconciled.still_missing.len();
    let tombstones = reconciled.tombstones();
    tracing::info!(
        found = reconciled.found.len() - tombstones,
        tombstones,
        still_missing,
        "Reconciled app data"
    );

    let handler = AppDataHandler::new(range, reconciled, &carried, staging.clone());
    let outcome = UploadHandler::new(ctx.store, ctx.warehouse)
        .write_and_publish(&handler, ctx.dry_run)
        .await?;

    Ok(SyncReport {
        stream: SyncStream::AppData,
        range,
        outcome,
        still_missing,
        tombstones,
    })
}
