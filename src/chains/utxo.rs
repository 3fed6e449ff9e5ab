//! UTXO chain family: JSON-RPC client and chain wiring.
//!
//! Talks bitcoind-style JSON-RPC over HTTP. In this system UTXO chains are
//! deposit sources only; relays always settle on an account chain.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chains::{Chain, DepositHandler, ObserverHandle};
use crate::config::{ObserverConfig, UtxoConfig};
use crate::error::{ChainError, RelayError};
use crate::signer::ThresholdSigner;
use crate::tracker::{BlockData, BlockSource, BlockTracker, TrackerConfig, TxData, TxOutput};
use crate::types::{ChainId, ChainKind, CrossChainPayload};

/// Block-height-out-of-range error from getblockhash, meaning the block has
/// not been formed yet.
const RPC_INVALID_PARAMETER: i64 = -8;

pub struct UtxoRpcClient {
    http: reqwest::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct VerboseBlock {
    confirmations: i64,
    tx: Vec<String>,
}

#[derive(Deserialize)]
struct VerboseTx {
    txid: String,
    vout: Vec<Vout>,
}

#[derive(Deserialize)]
struct Vout {
    /// Value in whole coins
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKey,
}

#[derive(Deserialize)]
struct ScriptPubKey {
    hex: String,
}

impl UtxoRpcClient {
    pub fn new(config: &UtxoConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.rpc_url.clone(),
            user: config.rpc_user.clone(),
            password: config.rpc_password.clone(),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ChainError> {
        let mut request = self.http.post(&self.url).json(&json!({
            "jsonrpc": "1.0",
            "id": "bridge-relayer",
            "method": method,
            "params": params,
        }));
        if let Some(ref user) = self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response: RpcResponse<T> = request.send().await?.json().await?;
        if let Some(err) = response.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| ChainError::BadResponse(format!("{method}: empty result")))
    }

    pub async fn block_height(&self) -> Result<u64, ChainError> {
        self.call("getblockcount", json!([])).await
    }
}

#[async_trait]
impl BlockSource for UtxoRpcClient {
    async fn block_hash(&self, height: u64) -> Result<Option<String>, ChainError> {
        match self.call::<String>("getblockhash", json!([height])).await {
            Ok(hash) => Ok(Some(hash)),
            Err(ChainError::Rpc { code, .. }) if code == RPC_INVALID_PARAMETER => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn block(&self, hash: &str) -> Result<BlockData, ChainError> {
        let block: VerboseBlock = self.call("getblock", json!([hash, 1])).await?;
        Ok(BlockData {
            hash: hash.to_string(),
            // Negative for blocks no longer on the main chain
            confirmations: block.confirmations.max(0) as u64,
            tx_ids: block.tx,
        })
    }

    async fn transaction(&self, tx_id: &str) -> Result<TxData, ChainError> {
        let tx: VerboseTx = self
            .call("getrawtransaction", json!([tx_id, true]))
            .await?;
        let outputs = tx
            .vout
            .iter()
            .map(|v| {
                Ok(TxOutput {
                    value: coins_to_base_units(v.value),
                    script: hex::decode(&v.script_pub_key.hex).map_err(|e| {
                        ChainError::BadResponse(format!("bad scriptPubKey hex: {e}"))
                    })?,
                })
            })
            .collect::<Result<Vec<_>, ChainError>>()?;
        Ok(TxData {
            tx_id: tx.txid,
            outputs,
        })
    }
}

/// Convert a whole-coin RPC value to the smallest chain-native unit.
fn coins_to_base_units(coins: f64) -> u64 {
    (coins * 1e8).round() as u64
}

/// A UTXO source chain registered in the chain registry.
pub struct UtxoChain {
    client: Arc<UtxoRpcClient>,
    chain_id: ChainId,
    name: String,
    deposit_script: Vec<u8>,
    min_confirmations: u64,
    start_height: u64,
    poll_interval: Duration,
    dedup_retention_blocks: u64,
}

impl UtxoChain {
    pub fn new(config: &UtxoConfig, observer: &ObserverConfig) -> eyre::Result<Self> {
        let deposit_script = hex::decode(&config.deposit_script)
            .map_err(|e| eyre::eyre!("invalid deposit script hex: {e}"))?;
        Ok(Self {
            client: Arc::new(UtxoRpcClient::new(config)),
            chain_id: ChainId(config.chain_id),
            name: config.chain_name.clone(),
            deposit_script,
            min_confirmations: config.min_confirmations,
            start_height: config.start_height,
            poll_interval: Duration::from_secs(observer.poll_interval_secs),
            dedup_retention_blocks: observer.dedup_retention_blocks,
        })
    }
}

#[async_trait]
impl Chain for UtxoChain {
    fn id(&self) -> ChainId {
        self.chain_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ChainKind {
        ChainKind::Utxo
    }

    async fn start_observing(
        &self,
        handler: Arc<dyn DepositHandler>,
    ) -> Result<ObserverHandle, ChainError> {
        let tip = self.client.block_height().await?;
        info!(
            chain = %self.name,
            tip,
            start_height = self.start_height,
            "Starting UTXO observer"
        );
        Ok(BlockTracker::spawn(
            self.client.clone(),
            TrackerConfig {
                chain_id: self.chain_id,
                chain_name: self.name.clone(),
                deposit_script: self.deposit_script.clone(),
                min_confirmations: self.min_confirmations,
                poll_interval: self.poll_interval,
                dedup_retention_blocks: self.dedup_retention_blocks,
            },
            self.start_height,
            handler,
        ))
    }

    async fn relay_receive(
        &self,
        _payload: &CrossChainPayload,
        _signer: &dyn ThresholdSigner,
    ) -> Result<String, RelayError> {
        Err(RelayError::UnsupportedDestination(self.chain_id))
    }
}
