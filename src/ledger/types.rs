use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An app hash referenced by an order, with the block it first appeared in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub app_hash: String,
    pub first_seen_block: u64,
}

/// An app hash whose document could not be retrieved yet.
///
/// `attempts` accumulates across runs; the entry lives in the ledger file
/// until it is resolved or given up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingContent {
    pub app_hash: String,
    pub first_seen_block: u64,
    pub attempts: u32,
}

/// An app hash with its document. `content` is `None` for a tombstone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundContent {
    pub app_hash: String,
    pub first_seen_block: u64,
    pub content: Option<Value>,
}

impl FoundContent {
    pub fn is_tombstone(&self) -> bool {
        self.content.is_none()
    }
}
