//! Cross-chain bridge relayer: per-chain observers that decode bridge
//! deposits into chain-agnostic payloads, a relay that signs and broadcasts
//! the mirrored transaction on the destination chain, and a paginated
//! event-log indexer reconstructing send settlement mappings.

pub mod api;
pub mod chains;
pub mod config;
pub mod dedup;
pub mod error;
pub mod hash;
pub mod indexer;
pub mod memo;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod signer;
pub mod tracker;
pub mod types;
