//! Chain registry: id/name lookup for registered chains.
//!
//! Built once during single-threaded startup, read-only thereafter, and
//! passed by `Arc` to every component that resolves chains. Duplicate chain
//! IDs are rejected at registration.

use std::sync::Arc;

use crate::chains::Chain;
use crate::error::RegistryError;
use crate::types::ChainId;

pub struct ChainRegistry {
    chains: Vec<Arc<dyn Chain>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self { chains: Vec::new() }
    }

    /// Register a chain. Fails if a chain with the same ID already exists.
    pub fn register(&mut self, chain: Arc<dyn Chain>) -> Result<(), RegistryError> {
        if self.chains.iter().any(|c| c.id() == chain.id()) {
            return Err(RegistryError::DuplicateId(chain.id()));
        }
        self.chains.push(chain);
        Ok(())
    }

    pub fn find_by_id(&self, id: ChainId) -> Result<Arc<dyn Chain>, RegistryError> {
        self.chains
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Arc<dyn Chain>, RegistryError> {
        self.chains
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))
    }

    pub fn chains(&self) -> &[Arc<dyn Chain>] {
        &self.chains
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
