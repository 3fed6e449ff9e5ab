//! Chain abstraction: one implementation per chain family (UTXO, account).
//!
//! A `Chain` is constructed once at startup, registered into the
//! [`crate::registry::ChainRegistry`], and observed for the process
//! lifetime. Observation hands decoded payloads to a [`DepositHandler`]
//! (in production, the relay); relaying back onto a chain goes through
//! `relay_receive`.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{ChainError, RelayError};
use crate::signer::ThresholdSigner;
use crate::types::{ChainId, ChainKind, CrossChainPayload};

pub mod evm;
pub mod utxo;

pub use evm::EvmChain;
pub use utxo::UtxoChain;

/// Receives decoded payloads from chain observers. Implementations must not
/// block the observer loop for long periods; slow consumers delay that
/// chain's block analysis (and only that chain's).
#[async_trait]
pub trait DepositHandler: Send + Sync {
    async fn on_deposit(&self, payload: CrossChainPayload);
}

/// A registered source/destination chain.
#[async_trait]
pub trait Chain: Send + Sync {
    fn id(&self) -> ChainId;
    fn name(&self) -> &str;
    fn kind(&self) -> ChainKind;

    /// Spawn this chain's long-lived observer worker. Called at most once,
    /// during startup.
    async fn start_observing(
        &self,
        handler: std::sync::Arc<dyn DepositHandler>,
    ) -> Result<ObserverHandle, ChainError>;

    /// Compose, sign (via the threshold signer), and broadcast the
    /// relay-receive transaction for `payload` on this chain. Returns the
    /// destination transaction hash.
    async fn relay_receive(
        &self,
        payload: &CrossChainPayload,
        signer: &dyn ThresholdSigner,
    ) -> Result<String, RelayError>;
}

/// Handle to one running observer worker.
///
/// Dropping the handle detaches the worker; `stop` requests graceful
/// termination and waits for the worker to observe it at the top of its next
/// loop iteration (an in-flight network call completes first).
pub struct ObserverHandle {
    stop_tx: mpsc::Sender<()>,
    join: JoinHandle<Result<(), ChainError>>,
}

impl ObserverHandle {
    pub fn new(stop_tx: mpsc::Sender<()>, join: JoinHandle<Result<(), ChainError>>) -> Self {
        Self { stop_tx, join }
    }

    /// Request termination and block until the worker has exited.
    pub async fn stop(self) -> Result<(), ChainError> {
        let _ = self.stop_tx.send(()).await;
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ChainError::SubscriptionFatal(format!(
                "observer worker panicked: {e}"
            ))),
        }
    }
}

/// All running observers, driven together until shutdown or the first
/// worker death.
pub struct ObserverSet {
    names: Vec<String>,
    handles: Vec<ObserverHandle>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, handle: ObserverHandle) {
        self.names.push(name.into());
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run until a shutdown signal arrives (graceful stop of every worker)
    /// or any worker exits on its own (fatal; mirrors the unrecoverable
    /// subscription-feed case).
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        let ObserverSet { names, handles } = self;
        let mut stops = Vec::with_capacity(handles.len());
        let mut joins = Vec::with_capacity(handles.len());
        for h in handles {
            stops.push(h.stop_tx);
            joins.push(h.join);
        }

        let died = tokio::select! {
            _ = shutdown.recv() => None,
            died = wait_any(&mut joins) => Some(died),
        };

        match died {
            None => {
                info!("Shutdown signal received, stopping observers");
                for stop in &stops {
                    let _ = stop.send(()).await;
                }
                for (join, name) in joins.into_iter().zip(&names) {
                    match join.await {
                        Ok(Ok(())) => info!(chain = %name, "Observer stopped"),
                        Ok(Err(e)) => error!(chain = %name, error = %e, "Observer stopped with error"),
                        Err(e) => error!(chain = %name, error = %e, "Observer task failed"),
                    }
                }
                Ok(())
            }
            Some((idx, result)) => {
                let name = &names[idx];
                match result {
                    Ok(Ok(())) => {
                        error!(chain = %name, "Observer exited unexpectedly without error");
                        Err(eyre::eyre!("observer for chain {name} exited unexpectedly"))
                    }
                    Ok(Err(e)) => {
                        error!(chain = %name, error = %e, "Observer died");
                        Err(eyre::Report::new(e))
                    }
                    Err(e) => {
                        error!(chain = %name, error = %e, "Observer task panicked");
                        Err(eyre::eyre!("observer task for chain {name} panicked: {e}"))
                    }
                }
            }
        }
    }
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_any(
    joins: &mut [JoinHandle<Result<(), ChainError>>],
) -> (usize, Result<Result<(), ChainError>, tokio::task::JoinError>) {
    if joins.is_empty() {
        return std::future::pending().await;
    }
    let (result, idx, _) = futures::future::select_all(joins.iter_mut()).await;
    (idx, result)
}
