//! Per-chain block-polling observer.
//!
//! One worker per source chain walks block heights in order: a height with
//! no block yet, or a block below the confirmation threshold, is retried
//! after a fixed backoff without advancing; an analyzed block advances the
//! cursor by one. Deposits are matched against the bridge's well-known
//! deposit script, their memos decoded, and the resulting payloads handed
//! off synchronously. The tracker keeps no checkpoint of its own; the caller
//! supplies the resume height, giving at-least-once semantics across
//! restarts.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chains::{DepositHandler, ObserverHandle};
use crate::dedup::DedupCache;
use crate::error::{ChainError, MemoError};
use crate::memo::{decode_utxo_memo, extract_op_return};
use crate::metrics;
use crate::types::ChainId;

/// Block metadata plus its transaction ids, as fetched from the chain.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub hash: String,
    pub confirmations: u64,
    pub tx_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TxOutput {
    /// Value in the smallest chain-native unit
    pub value: u64,
    /// Raw scriptPubKey bytes
    pub script: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TxData {
    pub tx_id: String,
    pub outputs: Vec<TxOutput>,
}

/// What the tracker needs from a UTXO chain client.
#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    /// Hash of the block at `height`, or `None` when the chain has not
    /// formed that block yet.
    async fn block_hash(&self, height: u64) -> Result<Option<String>, ChainError>;

    async fn block(&self, hash: &str) -> Result<BlockData, ChainError>;

    async fn transaction(&self, tx_id: &str) -> Result<TxData, ChainError>;
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub chain_id: ChainId,
    pub chain_name: String,
    /// scriptPubKey of the bridge deposit address
    pub deposit_script: Vec<u8>,
    pub min_confirmations: u64,
    pub poll_interval: Duration,
    pub dedup_retention_blocks: u64,
}

pub struct BlockTracker;

impl BlockTracker {
    /// Spawn the observer worker, polling from `initial_height`. The
    /// returned handle is the only way to stop it, so a tracker cannot be
    /// started twice.
    pub fn spawn<S: BlockSource>(
        source: Arc<S>,
        config: TrackerConfig,
        initial_height: u64,
        handler: Arc<dyn DepositHandler>,
    ) -> ObserverHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let join = tokio::spawn(run_loop(source, config, initial_height, handler, stop_rx));
        ObserverHandle::new(stop_tx, join)
    }
}

async fn run_loop<S: BlockSource>(
    source: Arc<S>,
    config: TrackerConfig,
    initial_height: u64,
    handler: Arc<dyn DepositHandler>,
    mut stop: mpsc::Receiver<()>,
) -> Result<(), ChainError> {
    let mut dedup = DedupCache::new(config.dedup_retention_blocks);
    let mut height = initial_height;

    info!(
        chain = %config.chain_name,
        height,
        min_confirmations = config.min_confirmations,
        "Block tracker started"
    );

    loop {
        if stop.try_recv().is_ok() {
            info!(chain = %config.chain_name, height, "Block tracker stopped");
            return Ok(());
        }

        let advanced = match source.block_hash(height).await {
            Ok(Some(hash)) => {
                match analyze_block(&*source, &config, &hash, height, &mut dedup, &*handler).await
                {
                    Ok(true) => {
                        metrics::record_block_analyzed(&config.chain_name, height);
                        dedup.prune(height);
                        height += 1;
                        true
                    }
                    Ok(false) => false,
                    Err(e) => {
                        warn!(
                            chain = %config.chain_name,
                            height,
                            block_hash = %hash,
                            error = %e,
                            "Block analysis failed, will retry"
                        );
                        metrics::record_error(&config.chain_name, "analyze");
                        false
                    }
                }
            }
            Ok(None) => {
                debug!(chain = %config.chain_name, height, "Block not yet available");
                false
            }
            Err(e) => {
                warn!(
                    chain = %config.chain_name,
                    height,
                    error = %e,
                    "Block hash lookup failed, will retry"
                );
                metrics::record_error(&config.chain_name, "block_hash");
                false
            }
        };

        if !advanced {
            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                _ = stop.recv() => {
                    info!(chain = %config.chain_name, height, "Block tracker stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Analyze one block. Returns `Ok(false)` when the block is below the
/// confirmation threshold (retry same height), `Ok(true)` once every
/// transaction has been processed.
async fn analyze_block<S: BlockSource>(
    source: &S,
    config: &TrackerConfig,
    hash: &str,
    height: u64,
    dedup: &mut DedupCache,
    handler: &dyn DepositHandler,
) -> Result<bool, ChainError> {
    let block = source.block(hash).await?;

    if block.confirmations < config.min_confirmations {
        info!(
            chain = %config.chain_name,
            height,
            confirmations = block.confirmations,
            required = config.min_confirmations,
            "Block below confirmation threshold"
        );
        return Ok(false);
    }

    for tx_id in &block.tx_ids {
        let key = tx_key(tx_id);
        if dedup.contains(&key) {
            continue;
        }

        // A transaction fetch failure retries the whole block; already
        // handled deposits are protected by the dedup cache.
        let tx = source.transaction(tx_id).await?;

        let Some(deposit_value) = deposit_output_value(&tx, &config.deposit_script) else {
            continue;
        };

        let Some(memo_data) = tx.outputs.iter().find_map(|o| extract_op_return(&o.script))
        else {
            debug!(chain = %config.chain_name, tx_id = %tx_id, "Deposit without memo, skipping");
            metrics::record_deposit_skipped(&config.chain_name, "no_memo");
            continue;
        };

        let mut payload = match decode_utxo_memo(memo_data) {
            Ok(payload) => payload,
            Err(MemoError::Donation) => {
                debug!(chain = %config.chain_name, tx_id = %tx_id, "Donation, skipping");
                metrics::record_deposit_skipped(&config.chain_name, "donation");
                continue;
            }
            Err(e) => {
                debug!(
                    chain = %config.chain_name,
                    tx_id = %tx_id,
                    error = %e,
                    "Undecodable memo, skipping"
                );
                metrics::record_deposit_skipped(&config.chain_name, "decode");
                continue;
            }
        };

        // The observed output value is authoritative; the declared memo
        // amount is advisory only.
        if payload.amount != deposit_value as u128 {
            warn!(
                chain = %config.chain_name,
                tx_id = %tx_id,
                declared = payload.amount,
                observed = deposit_value,
                "Memo amount differs from deposit output value"
            );
        }
        payload.amount = deposit_value as u128;
        payload.src_chain = config.chain_id;

        dedup.mark(key, height);
        metrics::record_deposit_observed(&config.chain_name);
        info!(
            chain = %config.chain_name,
            height,
            tx_id = %tx_id,
            dest_chain = %payload.dest_chain,
            amount = deposit_value,
            "Deposit observed"
        );

        handler.on_deposit(payload).await;
    }

    Ok(true)
}

/// Value of the first output paying the bridge deposit script, if any.
fn deposit_output_value(tx: &TxData, deposit_script: &[u8]) -> Option<u64> {
    tx.outputs
        .iter()
        .find(|o| o.script == deposit_script)
        .map(|o| o.value)
}

/// Dedup key for a chain-format transaction id.
pub fn tx_key(tx_id: &str) -> [u8; 32] {
    crate::hash::keccak256(tx_id.as_bytes())
}
