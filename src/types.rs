//! Common types shared across the observer, relay, and indexer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Small integer chain identifier, globally unique within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ChainId {
    fn from(v: u32) -> Self {
        ChainId(v)
    }
}

/// Chain family, determines which observer and relay path a chain uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Utxo,
    Account,
}

/// The chain-agnostic unit of relay, decoded from a source-chain deposit and
/// consumed exactly once by the relay. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChainPayload {
    pub src_chain: ChainId,
    pub dest_chain: ChainId,
    /// Raw destination address bytes; interpretation is destination-chain
    /// specific.
    pub dest_address: Vec<u8>,
    /// Amount in the smallest chain-native unit.
    pub amount: u128,
    pub message: Option<Vec<u8>>,
    pub gas_limit: Option<u64>,
}

impl CrossChainPayload {
    /// Deterministic identifier correlating the inbound and outbound legs of
    /// one send. See [`crate::hash::send_id`].
    pub fn send_id(&self) -> [u8; 32] {
        crate::hash::send_id(self)
    }
}
