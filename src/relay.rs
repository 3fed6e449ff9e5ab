//! Relay: turns one decoded payload into a submitted transaction on its
//! destination chain.
//!
//! Resolution failures, signing failures, and broadcast rejections all drop
//! the payload with a logged cause; nothing here retries. Recovery is manual
//! replay of the source observer from an earlier height. Relays to the same
//! destination are serialized with a per-chain lock so the pending-nonce
//! read cannot race a concurrent send.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::chains::DepositHandler;
use crate::error::RelayError;
use crate::hash::bytes32_to_hex;
use crate::metrics;
use crate::registry::ChainRegistry;
use crate::signer::ThresholdSigner;
use crate::types::{ChainId, CrossChainPayload};

pub struct Relay {
    registry: Arc<ChainRegistry>,
    signer: Arc<dyn ThresholdSigner>,
    /// One lock per registered chain, held across the
    /// nonce-read → compose → sign → broadcast sequence.
    destination_locks: HashMap<ChainId, Mutex<()>>,
}

impl Relay {
    pub fn new(registry: Arc<ChainRegistry>, signer: Arc<dyn ThresholdSigner>) -> Self {
        let destination_locks = registry
            .chains()
            .iter()
            .map(|c| (c.id(), Mutex::new(())))
            .collect();
        Self {
            registry,
            signer,
            destination_locks,
        }
    }

    /// Relay one payload. Returns the destination transaction hash.
    pub async fn dispatch(&self, payload: &CrossChainPayload) -> Result<String, RelayError> {
        let chain = self.registry.find_by_id(payload.dest_chain)?;

        // Registered after construction is impossible (the registry is
        // immutable by then), so the lock always exists.
        let _guard = match self.destination_locks.get(&payload.dest_chain) {
            Some(lock) => lock.lock().await,
            None => return Err(RelayError::Resolution(
                crate::error::RegistryError::NotFound(payload.dest_chain),
            )),
        };

        chain.relay_receive(payload, self.signer.as_ref()).await
    }
}

/// The relay is the production deposit handler: every failure is logged and
/// dropped, never propagated into the observer loop.
#[async_trait]
impl DepositHandler for Relay {
    async fn on_deposit(&self, payload: CrossChainPayload) {
        let send_id = payload.send_id();
        match self.dispatch(&payload).await {
            Ok(tx_hash) => {
                metrics::record_relay_submitted(&payload.dest_chain.to_string());
                info!(
                    src_chain = %payload.src_chain,
                    dest_chain = %payload.dest_chain,
                    send_id = %bytes32_to_hex(&send_id),
                    tx_hash = %tx_hash,
                    "Payload relayed"
                );
            }
            Err(e) => {
                metrics::record_relay_failed(&payload.dest_chain.to_string(), failure_kind(&e));
                error!(
                    src_chain = %payload.src_chain,
                    dest_chain = %payload.dest_chain,
                    send_id = %bytes32_to_hex(&send_id),
                    amount = payload.amount,
                    error = %e,
                    "Payload dropped"
                );
            }
        }
    }
}

fn failure_kind(err: &RelayError) -> &'static str {
    match err {
        RelayError::Resolution(_) => "resolution",
        RelayError::UnsupportedDestination(_) => "unsupported",
        RelayError::Chain(_) => "chain",
        RelayError::Signing(_) => "signing",
        RelayError::Broadcast(_) => "broadcast",
        RelayError::Payload(_) => "payload",
    }
}
