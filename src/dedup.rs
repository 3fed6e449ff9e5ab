//! Dedup cache for already-relayed transaction identifiers.
//!
//! Owned exclusively by one observer worker, so no locking. Entries carry
//! the block height at which the transaction was first seen and are pruned
//! once the observer has advanced past the retention window, keeping memory
//! bounded over long uptimes. Within the window a transaction identifier
//! marked once never triggers a second relay.

use std::collections::HashMap;

pub const DEFAULT_RETENTION_BLOCKS: u64 = 10_000;

/// Transaction-id keyed dedup set with a block-height retention window.
pub struct DedupCache {
    seen: HashMap<[u8; 32], u64>,
    retention_blocks: u64,
}

impl DedupCache {
    pub fn new(retention_blocks: u64) -> Self {
        Self {
            seen: HashMap::new(),
            retention_blocks,
        }
    }

    /// Whether this transaction id has already been processed.
    pub fn contains(&self, tx_id: &[u8; 32]) -> bool {
        self.seen.contains_key(tx_id)
    }

    /// Mark a transaction id as processed at the given height.
    pub fn mark(&mut self, tx_id: [u8; 32], height: u64) {
        self.seen.insert(tx_id, height);
    }

    /// Drop entries older than the retention window relative to the current
    /// height. Called as the observer advances.
    pub fn prune(&mut self, current_height: u64) {
        let cutoff = current_height.saturating_sub(self.retention_blocks);
        self.seen.retain(|_, &mut h| h >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_BLOCKS)
    }
}
