//! Keccak helpers and the deterministic send identifier.
//!
//! The send identifier correlates the inbound leg of a cross-chain send with
//! its eventual outbound settlement. It must be stable across processes, so
//! it is computed over a fixed word layout rather than a serialized struct.

use tiny_keccak::{Hasher, Keccak};

use crate::types::CrossChainPayload;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Deterministic identifier of one cross-chain send intent.
///
/// Layout (7 x 32-byte words, all integers big-endian right-aligned):
/// word 0 = source chain id, word 1 = destination chain id, word 2 = amount,
/// word 3 = keccak256(destination address), word 4 = keccak256(message bytes,
/// empty when absent), word 5 = presence flags (bit 0 gas limit, bit 1
/// message), word 6 = gas limit value.
pub fn send_id(payload: &CrossChainPayload) -> [u8; 32] {
    let mut data = [0u8; 224];

    data[28..32].copy_from_slice(&payload.src_chain.0.to_be_bytes());
    data[60..64].copy_from_slice(&payload.dest_chain.0.to_be_bytes());
    data[80..96].copy_from_slice(&payload.amount.to_be_bytes());
    data[96..128].copy_from_slice(&keccak256(&payload.dest_address));

    let message_hash = keccak256(payload.message.as_deref().unwrap_or(&[]));
    data[128..160].copy_from_slice(&message_hash);

    let mut flags = 0u8;
    if payload.gas_limit.is_some() {
        flags |= 0x01;
    }
    if payload.message.is_some() {
        flags |= 0x02;
    }
    data[191] = flags;

    if let Some(gas) = payload.gas_limit {
        data[216..224].copy_from_slice(&gas.to_be_bytes());
    }

    keccak256(&data)
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}
