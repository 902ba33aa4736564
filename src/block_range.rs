use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-open block interval `(block_from, block_to]` covered by one sync run.
///
/// `block_from` is the last block already synced, `block_to` the newest block
/// included. Equal bounds are a legal empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRange {
    block_from: u64,
    block_to: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid block range: block_from {block_from} is greater than block_to {block_to}")]
pub struct InvertedRange {
    pub block_from: u64,
    pub block_to: u64,
}

impl BlockRange {
    pub fn new(block_from: u64, block_to: u64) -> Result<Self, InvertedRange> {
        if block_from > block_to {
            return Err(InvertedRange {
                block_from,
                block_to,
            });
        }
        Ok(Self {
            block_from,
            block_to,
        })
    }

    /// Range starting at the watermark and ending at the source head.
    ///
    /// A head behind the watermark (reorg threshold larger than the blocks
    /// produced since the last run) yields an empty range at the watermark.
    pub fn since(watermark: u64, head: u64) -> Self {
        Self {
            block_from: watermark,
            block_to: head.max(watermark),
        }
    }

    pub fn block_from(&self) -> u64 {
        self.block_from
    }

    pub fn block_to(&self) -> u64 {
        self.block_to
    }

    pub fn is_empty(&self) -> bool {
        self.block_from == self.block_to
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockRange(from={}, to={})", self.block_from, self.block_to)
    }
}
