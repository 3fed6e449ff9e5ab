//! Account (EVM-like) chain family: subscription listener and relay target.
//!
//! The listener receives bridge-endpoint logs over a websocket subscription
//! rather than polling; the feed terminating is unrecoverable for this
//! chain's worker. Outbound relays are composed manually as legacy
//! transactions because the signature comes from the external threshold
//! signer, not a local wallet: pending nonce and gas price are read at send
//! time, the transaction digest goes to the signer, and the signed envelope
//! is broadcast raw.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::rpc::types::Filter;
use async_trait::async_trait;
use eyre::WrapErr;
use futures::StreamExt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::chains::{Chain, DepositHandler, ObserverHandle};
use crate::config::{EvmConfig, ObserverConfig};
use crate::dedup::DedupCache;
use crate::error::{ChainError, MemoError, RelayError};
use crate::hash::bytes32_to_hex;
use crate::memo::{decode_event_record, encode_event_record};
use crate::metrics;
use crate::signer::ThresholdSigner;
use crate::types::{ChainId, ChainKind, CrossChainPayload};

/// Topic 0 of the bridge endpoint's send event.
pub fn message_send_topic() -> B256 {
    keccak256(b"MessageSend(uint256,uint256,uint256,uint256,bytes,bytes)")
}

/// 4-byte selector of the endpoint's relay-receive entry point.
pub fn relay_receive_selector() -> [u8; 4] {
    let hash = keccak256(b"relayReceive(bytes32,bytes)");
    [hash[0], hash[1], hash[2], hash[3]]
}

/// An account chain registered in the chain registry: deposit source (log
/// subscription) and relay destination.
pub struct EvmChain {
    provider: RootProvider<PubSubFrontend>,
    chain_id: ChainId,
    name: String,
    network_id: u64,
    bridge_address: Address,
    default_gas_limit: u64,
    dedup_retention_blocks: u64,
}

impl EvmChain {
    /// Connect to the chain's websocket endpoint.
    pub async fn connect(config: &EvmConfig, observer: &ObserverConfig) -> eyre::Result<Self> {
        let bridge_address =
            Address::from_str(&config.bridge_address).wrap_err("Invalid bridge address")?;
        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(config.ws_url.clone()))
            .await
            .wrap_err("Failed to connect websocket provider")?;

        info!(
            chain = %config.chain_name,
            ws_url = %config.ws_url,
            bridge_address = %bridge_address,
            "Connected to account chain"
        );

        Ok(Self {
            provider,
            chain_id: ChainId(config.chain_id),
            name: config.chain_name.clone(),
            network_id: config.network_id,
            bridge_address,
            default_gas_limit: config.default_gas_limit,
            dedup_retention_blocks: observer.dedup_retention_blocks,
        })
    }
}

#[async_trait]
impl Chain for EvmChain {
    fn id(&self) -> ChainId {
        self.chain_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChainKind {
        ChainKind::Account
    }

    async fn start_observing(
        &self,
        handler: Arc<dyn DepositHandler>,
    ) -> Result<ObserverHandle, ChainError> {
        let filter = Filter::new().address(self.bridge_address);
        let subscription = self
            .provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| ChainError::SubscriptionFatal(format!("subscribe_logs: {e}")))?;

        info!(chain = %self.name, "Log subscription established");

        let chain_id = self.chain_id;
        let chain_name = self.name.clone();
        let retention = self.dedup_retention_blocks;
        let (stop_tx, mut stop_rx) = mpsc::channel(1);

        let join = tokio::spawn(async move {
            let mut stream = subscription.into_stream();
            let mut dedup = DedupCache::new(retention);
            let topic = message_send_topic();

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        info!(chain = %chain_name, "Listener stopped");
                        return Ok(());
                    }
                    maybe_log = stream.next() => {
                        let Some(log) = maybe_log else {
                            // The node closed the feed; fatal for this worker
                            return Err(ChainError::SubscriptionFatal(
                                "log stream terminated".to_string(),
                            ));
                        };

                        let topics = log.topics();
                        if topics.first() != Some(&topic) {
                            continue;
                        }
                        let Some(tx_hash) = log.transaction_hash else {
                            continue;
                        };
                        let height = log.block_number.unwrap_or(0);

                        process_send_log(
                            chain_id,
                            &chain_name,
                            tx_hash.0,
                            height,
                            log.data().data.as_ref(),
                            &mut dedup,
                            &*handler,
                        )
                        .await;
                        dedup.prune(height);
                    }
                }
            }
        });

        Ok(ObserverHandle::new(stop_tx, join))
    }

    async fn relay_receive(
        &self,
        payload: &CrossChainPayload,
        signer: &dyn ThresholdSigner,
    ) -> Result<String, RelayError> {
        let calldata = relay_receive_calldata(payload)?;
        let send_id = payload.send_id();

        // Point-in-time reads; nothing is cached across sends. The caller
        // serializes relays per destination, so nonce reads cannot race.
        let nonce = self
            .provider
            .get_transaction_count(signer.address())
            .pending()
            .await
            .map_err(|e| ChainError::Request(format!("pending nonce: {e}")))?;
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| ChainError::Request(format!("gas price: {e}")))?;

        let tx = TxLegacy {
            chain_id: Some(self.network_id),
            nonce,
            gas_price,
            gas_limit: payload.gas_limit.unwrap_or(self.default_gas_limit),
            to: TxKind::Call(self.bridge_address),
            value: U256::ZERO,
            input: Bytes::from(calldata),
        };

        let signature = signer.sign_digest(tx.signature_hash()).await?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let mut raw = Vec::with_capacity(envelope.encode_2718_len());
        envelope.encode_2718(&mut raw);

        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| RelayError::Broadcast(e.to_string()))?;
        let tx_hash = format!("{:?}", pending.tx_hash());

        info!(
            chain = %self.name,
            tx_hash = %tx_hash,
            send_id = %bytes32_to_hex(&send_id),
            nonce,
            gas_price,
            "Relay transaction broadcast"
        );

        Ok(tx_hash)
    }
}

/// Handle one matched send log: dedup before decode (subscription feeds can
/// replay), then decode and hand off. Never returns an error; a bad record
/// is not a bridge send.
async fn process_send_log(
    chain_id: ChainId,
    chain_name: &str,
    tx_hash: [u8; 32],
    height: u64,
    data: &[u8],
    dedup: &mut DedupCache,
    handler: &dyn DepositHandler,
) {
    if dedup.contains(&tx_hash) {
        debug!(
            chain = %chain_name,
            tx_hash = %bytes32_to_hex(&tx_hash),
            "Duplicate send log, skipping"
        );
        return;
    }
    dedup.mark(tx_hash, height);

    let mut payload = match decode_event_record(data) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(
                chain = %chain_name,
                tx_hash = %bytes32_to_hex(&tx_hash),
                error = %e,
                "Undecodable send record, skipping"
            );
            metrics::record_deposit_skipped(chain_name, "decode");
            return;
        }
    };
    payload.src_chain = chain_id;

    metrics::record_deposit_observed(chain_name);
    info!(
        chain = %chain_name,
        tx_hash = %bytes32_to_hex(&tx_hash),
        height,
        dest_chain = %payload.dest_chain,
        amount = payload.amount,
        "Send event observed"
    );

    handler.on_deposit(payload).await;
}

/// Build the relay-receive calldata: selector, send identifier, then the
/// positional payload record.
pub fn relay_receive_calldata(payload: &CrossChainPayload) -> Result<Vec<u8>, MemoError> {
    let record = encode_event_record(payload)?;
    let mut data = Vec::with_capacity(4 + 32 + record.len());
    data.extend_from_slice(&relay_receive_selector());
    data.extend_from_slice(&payload.send_id());
    data.extend_from_slice(&record);
    Ok(data)
}
