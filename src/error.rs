//! Typed errors for every boundary of the observer → relay pipeline and the
//! replay indexer.
//!
//! The split matters operationally: `ChainError::NotYetAvailable` and
//! transport failures are retried with a fixed backoff, memo/registry/relay
//! failures drop the current payload only, and a dead subscription feed is
//! fatal to that chain's worker (the process is expected to be restarted
//! externally).

use crate::types::ChainId;
use thiserror::Error;

/// Errors from a chain's RPC boundary.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The requested block has not been formed yet. Retried, never fatal.
    #[error("block at height {0} not yet available")]
    NotYetAvailable(u64),

    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    BadResponse(String),

    #[error("rpc request failed: {0}")]
    Request(String),

    /// The push-based log feed died. Unrecoverable for that chain's worker.
    #[error("subscription feed terminated: {0}")]
    SubscriptionFatal(String),
}

/// Memo / event-record codec errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoError {
    #[error("memo truncated: needed {needed} bytes, had {have}")]
    Truncated { needed: usize, have: usize },

    #[error("unsupported memo version {0:#04x}")]
    Version(u8),

    #[error("field {field} has invalid width {width}")]
    FieldWidth { field: &'static str, width: usize },

    #[error("encoded memo is {len} bytes, exceeds data-carrier limit of {max}")]
    Oversize { len: usize, max: usize },

    #[error("trailing {0} bytes after memo")]
    TrailingBytes(usize),

    #[error("event record offset out of bounds: {0}")]
    BadOffset(usize),

    #[error("value for field {0} exceeds its declared width")]
    Overflow(&'static str),

    #[error("payload is a donation, not a bridge transfer")]
    Donation,
}

/// Chain registry lookup/registration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no chain registered with id {0}")]
    NotFound(ChainId),

    #[error("no chain registered with name {0:?}")]
    NameNotFound(String),

    #[error("chain id {0} is already registered")]
    DuplicateId(ChainId),
}

/// Threshold signer errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signing failed: {0}")]
    Sign(String),
}

/// Relay (compose/sign/broadcast) errors. Every variant aborts only the
/// payload being relayed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Resolution(#[from] RegistryError),

    #[error("destination chain {0} cannot receive relays")]
    UnsupportedDestination(ChainId),

    #[error("sequence/fee query failed: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Signing(#[from] SignerError),

    #[error("broadcast rejected: {0}")]
    Broadcast(String),

    #[error("payload invalid for destination: {0}")]
    Payload(#[from] MemoError),
}

/// Transaction-event query (indexer source) errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("event query transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("event query returned status {0}")]
    Status(u16),

    #[error("malformed event query response: {0}")]
    BadResponse(String),
}

/// Indexer sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("event {tx_hash} missing attribute {attribute:?}")]
    MissingAttribute { tx_hash: String, attribute: String },
}

/// A failed `visit_all` run. Carries how many events were processed before
/// the abort so the caller can decide whether and where to resume.
#[derive(Debug, Error)]
pub enum VisitError {
    #[error("page fetch failed after {processed} events: {source}")]
    Pagination {
        processed: u64,
        #[source]
        source: QueryError,
    },

    #[error("event processing failed after {processed} events: {source}")]
    Process {
        processed: u64,
        #[source]
        source: SinkError,
    },
}

impl VisitError {
    /// Events successfully processed before the abort.
    pub fn processed(&self) -> u64 {
        match self {
            VisitError::Pagination { processed, .. } => *processed,
            VisitError::Process { processed, .. } => *processed,
        }
    }
}
