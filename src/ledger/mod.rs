//! Missing-content ledger.
//!
//! The ledger is a plain value: the caller loads it, passes it to
//! [`reconcile`] together with the hashes fetched for the current range, and
//! persists the returned `still_missing` set as the next run's ledger.

pub mod file;
pub mod types;

use std::collections::HashMap;

use futures_util::stream::{self, StreamExt};

use crate::content::cid::normalize_hash;
use crate::content::resolver::Resolve;
pub use types::{ContentRef, FoundContent, MissingContent};

/// Retry budget and give-up rule for unresolved content.
#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    /// Attempts granted to each hash per run.
    pub max_retries: u32,
    /// Cumulative attempts above which a carried hash is tombstoned.
    pub give_up_threshold: u32,
    /// Hashes resolved concurrently.
    pub concurrency: usize,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            give_up_threshold: 100,
            concurrency: 16,
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconciled {
    /// Resolved documents plus tombstones, to be published.
    pub found: Vec<FoundContent>,
    /// The next ledger.
    pub still_missing: Vec<MissingContent>,
}

impl Reconciled {
    pub fn tombstones(&self) -> usize {
        self.found.iter().filter(|f| f.is_tombstone()).count()
    }
}

struct Pending {
    app_hash: String,
    first_seen_block: u64,
    /// Attempts spent in earlier runs; `None` for a hash first seen now.
    carried_attempts: Option<u32>,
}

/// Resolve new and carried hashes and split them into found and still missing.
///
/// Every distinct hash ends up in exactly one of the two sets. A hash present
/// in both inputs is treated as carried and keeps the earliest block.
pub async fn reconcile<R: Resolve + ?Sized>(
    resolver: &R,
    new_rows: Vec<ContentRef>,
    carried: Vec<MissingContent>,
    policy: LedgerPolicy,
) -> Reconciled {
    let pending = merge(new_rows, carried);
    tracing::debug!(hashes = pending.len(), "Reconciling app hashes");

    let results: Vec<(Pending, Option<serde_json::Value>)> = stream::iter(pending)
        .map(|item| async move {
            let doc = resolver.resolve(&item.app_hash, policy.max_retries).await;
            (item, doc)
        })
        .buffered(policy.concurrency.max(1))
        .collect()
        .await;

    let mut out = Reconciled::default();
    for (item, doc) in results {
        if let Some(content) = doc {
            out.found.push(FoundContent {
                app_hash: item.app_hash,
                first_seen_block: item.first_seen_block,
                content: Some(content),
            });
            continue;
        }
        let attempts = item
            .carried_attempts
            .unwrap_or(0)
            .saturating_add(policy.max_retries);
        if item.carried_attempts.is_some() && attempts > policy.give_up_threshold {
            tracing::warn!(
                app_hash = %item.app_hash,
                attempts,
                "Giving up on app hash, publishing without content"
            );
            out.found.push(FoundContent {
                app_hash: item.app_hash,
                first_seen_block: item.first_seen_block,
                content: None,
            });
        } else {
            out.still_missing.push(MissingContent {
                app_hash: item.app_hash,
                first_seen_block: item.first_seen_block,
                attempts,
            });
        }
    }

    out.found
        .sort_by(|a, b| (a.first_seen_block, &a.app_hash).cmp(&(b.first_seen_block, &b.app_hash)));
    out.still_missing
        .sort_by(|a, b| (a.first_seen_block, &a.app_hash).cmp(&(b.first_seen_block, &b.app_hash)));
    out
}

fn merge(new_rows: Vec<ContentRef>, carried: Vec<MissingContent>) -> Vec<Pending> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut pending: Vec<Pending> = Vec::with_capacity(new_rows.len() + carried.len());

    for row in carried {
        let app_hash = normalize_hash(&row.app_hash);
        match index.get(&app_hash) {
            Some(&i) => {
                let existing = &mut pending[i];
                existing.first_seen_block = existing.first_seen_block.min(row.first_seen_block);
                existing.carried_attempts = existing.carried_attempts.max(Some(row.attempts));
            }
            None => {
                index.insert(app_hash.clone(), pending.len());
                pending.push(Pending {
                    app_hash,
                    first_seen_block: row.first_seen_block,
                    carried_attempts: Some(row.attempts),
                });
            }
        }
    }

    for row in new_rows {
        let app_hash = normalize_hash(&row.app_hash);
        match index.get(&app_hash) {
            Some(&i) => {
                let existing = &mut pending[i];
                existing.first_seen_block = existing.first_seen_block.min(row.first_seen_block);
            }
            None => {
                index.insert(app_hash.clone(), pending.len());
                pending.push(Pending {
                    app_hash,
                    first_seen_block: row.first_seen_block,
                    carried_attempts: None,
                });
            }
        }
    }
    pending
}
