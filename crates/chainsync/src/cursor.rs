//! Sync cursor: the next position the driver will process.
//!
//! Every block below `block_height` has been fully dispatched. A
//! `transaction_index` of `None` means "start of block".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cursor: next block (and optionally transaction) to process.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor {
    pub block_height: u64,
    pub transaction_index: Option<u64>,
}

impl Cursor {
    /// Cursor at the start of `block_height`.
    pub fn new(block_height: u64) -> Self {
        Self {
            block_height,
            transaction_index: None,
        }
    }

    /// Cursor positioned inside a block, at `transaction_index`.
    pub fn at_transaction(block_height: u64, transaction_index: u64) -> Self {
        Self {
            block_height,
            transaction_index: Some(transaction_index),
        }
    }

    /// Cursor after the block at `height` has been fully processed.
    pub fn after(height: u64) -> Self {
        Self::new(height.saturating_add(1))
    }

    /// Height of the last fully processed block, if any.
    pub fn last_processed(&self) -> Option<u64> {
        self.block_height.checked_sub(1)
    }

    /// First transaction index to dispatch in the current block.
    pub fn first_transaction(&self) -> u64 {
        self.transaction_index.unwrap_or(0)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transaction_index {
            Some(tx) => write!(f, "{}:{}", self.block_height, tx),
            None => write!(f, "{}", self.block_height),
        }
    }
}
