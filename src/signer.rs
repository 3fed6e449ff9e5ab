//! Threshold-signer boundary.
//!
//! The signing authority is opaque: it takes a 32-byte digest and returns a
//! signature, with key management and the signing protocol entirely outside
//! this process. [`LocalKeySigner`] is the single-key development stand-in.

use alloy::primitives::{Address, PrimitiveSignature as Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;

use crate::error::SignerError;

#[async_trait]
pub trait ThresholdSigner: Send + Sync {
    /// Sign a 32-byte digest.
    async fn sign_digest(&self, digest: B256) -> Result<Signature, SignerError>;

    /// The on-chain identity the signatures verify against.
    fn address(&self) -> Address;
}

/// Development signer backed by a single local private key.
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    pub fn new(private_key: &str) -> Result<Self, SignerError> {
        let inner: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| SignerError::Sign(format!("invalid private key: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl ThresholdSigner for LocalKeySigner {
    async fn sign_digest(&self, digest: B256) -> Result<Signature, SignerError> {
        self.inner
            .sign_hash(&digest)
            .await
            .map_err(|e| SignerError::Sign(e.to_string()))
    }

    fn address(&self) -> Address {
        self.inner.address()
    }
}
