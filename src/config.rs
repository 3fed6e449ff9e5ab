//! Environment-variable configuration for the relayer and indexer binaries.
//!
//! Loads an optional `.env` file first, then reads the environment. Secrets
//! never appear in `Debug` output.

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;

/// Main configuration for the relayer daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// UTXO source chain, present when `UTXO_RPC_URL` is set.
    pub utxo: Option<UtxoConfig>,
    /// Account (EVM-like) chain, present when `EVM_WS_URL` is set.
    pub evm: Option<EvmConfig>,
    pub signer: SignerConfig,
    pub observer: ObserverConfig,
    pub api: ApiConfig,
}

/// UTXO chain configuration
#[derive(Clone, Deserialize)]
pub struct UtxoConfig {
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    /// Registry chain ID for this chain
    pub chain_id: u32,
    pub chain_name: String,
    /// Hex-encoded scriptPubKey of the bridge deposit address
    pub deposit_script: String,
    pub min_confirmations: u64,
    /// Resume height; the tracker keeps no checkpoint of its own
    pub start_height: u64,
}

/// Custom Debug that redacts RPC credentials.
impl fmt::Debug for UtxoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtxoConfig")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_user", &self.rpc_user)
            .field("rpc_password", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .field("chain_name", &self.chain_name)
            .field("deposit_script", &self.deposit_script)
            .field("min_confirmations", &self.min_confirmations)
            .field("start_height", &self.start_height)
            .finish()
    }
}

/// Account-chain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    /// Websocket endpoint for the log subscription and transaction RPC
    pub ws_url: String,
    /// Registry chain ID for this chain
    pub chain_id: u32,
    pub chain_name: String,
    /// EIP-155 network ID used when signing outbound transactions
    pub network_id: u64,
    /// Bridge endpoint contract emitting send events and accepting relays
    pub bridge_address: String,
    /// Gas limit used when a payload carries no explicit bound
    pub default_gas_limit: u64,
}

/// Threshold-signer configuration
#[derive(Clone, Deserialize)]
pub struct SignerConfig {
    /// Development-mode local key; a production deployment points this
    /// process at an external signing service instead.
    pub private_key: String,
}

/// Custom Debug that redacts the private key to prevent accidental log leakage.
impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Observer tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_dedup_retention_blocks")]
    pub dedup_retention_blocks: u64,
}

/// Health/metrics API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Indexer CLI configuration, independent of the relayer's.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Remote node base URL for the transaction-event query service
    pub node_url: String,
    /// Local SQLite sink path
    pub sink_path: String,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_dedup_retention_blocks() -> u64 {
    crate::dedup::DEFAULT_RETENTION_BLOCKS
}

fn default_api_port() -> u16 {
    9090
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads .env file if present, then reads from environment.
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let utxo = match env::var("UTXO_RPC_URL") {
            Ok(rpc_url) => Some(UtxoConfig {
                rpc_url,
                rpc_user: env::var("UTXO_RPC_USER").ok(),
                rpc_password: env::var("UTXO_RPC_PASSWORD").ok(),
                chain_id: require_parsed("UTXO_CHAIN_ID")?,
                chain_name: env::var("UTXO_CHAIN_NAME").unwrap_or_else(|_| "utxo".to_string()),
                deposit_script: env::var("UTXO_DEPOSIT_SCRIPT")
                    .map_err(|_| eyre!("UTXO_DEPOSIT_SCRIPT is required when UTXO_RPC_URL is set"))?,
                min_confirmations: require_parsed("UTXO_MIN_CONFIRMATIONS")?,
                start_height: require_parsed("UTXO_START_HEIGHT")?,
            }),
            Err(_) => None,
        };

        let evm = match env::var("EVM_WS_URL") {
            Ok(ws_url) => Some(EvmConfig {
                ws_url,
                chain_id: require_parsed("EVM_CHAIN_ID")?,
                chain_name: env::var("EVM_CHAIN_NAME").unwrap_or_else(|_| "evm".to_string()),
                network_id: require_parsed("EVM_NETWORK_ID")?,
                bridge_address: env::var("EVM_BRIDGE_ADDRESS")
                    .map_err(|_| eyre!("EVM_BRIDGE_ADDRESS is required when EVM_WS_URL is set"))?,
                default_gas_limit: env::var("EVM_DEFAULT_GAS_LIMIT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(250_000),
            }),
            Err(_) => None,
        };

        let signer = SignerConfig {
            private_key: env::var("SIGNER_PRIVATE_KEY")
                .map_err(|_| eyre!("SIGNER_PRIVATE_KEY environment variable is required"))?,
        };

        let observer = ObserverConfig {
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_interval_secs),
            dedup_retention_blocks: env::var("DEDUP_RETENTION_BLOCKS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_dedup_retention_blocks),
        };

        let api = ApiConfig {
            port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_api_port),
        };

        let config = Config {
            utxo,
            evm,
            signer,
            observer,
            api,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.utxo.is_none() && self.evm.is_none() {
            return Err(eyre!(
                "at least one source chain must be configured (UTXO_RPC_URL or EVM_WS_URL)"
            ));
        }

        if let Some(ref utxo) = self.utxo {
            if utxo.deposit_script.is_empty() || hex::decode(&utxo.deposit_script).is_err() {
                return Err(eyre!("utxo.deposit_script must be non-empty hex"));
            }
            if utxo.min_confirmations == 0 {
                return Err(eyre!("utxo.min_confirmations must be at least 1"));
            }
        }

        if let Some(ref evm) = self.evm {
            if evm.bridge_address.len() != 42 || !evm.bridge_address.starts_with("0x") {
                return Err(eyre!(
                    "evm.bridge_address must be a valid hex address (42 chars with 0x prefix)"
                ));
            }
        }

        // Registry registration would also reject this, but failing at load
        // time names the offending variables.
        if let (Some(utxo), Some(evm)) = (&self.utxo, &self.evm) {
            if utxo.chain_id == evm.chain_id {
                return Err(eyre!(
                    "UTXO_CHAIN_ID and EVM_CHAIN_ID are both {}; chain IDs must be unique",
                    utxo.chain_id
                ));
            }
        }

        if self.signer.private_key.len() != 66 || !self.signer.private_key.starts_with("0x") {
            return Err(eyre!(
                "signer.private_key must be 66 chars (0x + 64 hex chars)"
            ));
        }

        Ok(())
    }
}

impl IndexerConfig {
    pub fn load() -> Result<Self> {
        if Path::new(".env").exists() {
            dotenvy::from_filename(".env").wrap_err("Failed to load .env file")?;
        }
        Ok(Self {
            node_url: env::var("INDEXER_NODE_URL")
                .map_err(|_| eyre!("INDEXER_NODE_URL environment variable is required"))?,
            sink_path: env::var("INDEXER_SINK_PATH")
                .unwrap_or_else(|_| "indexer.db".to_string()),
        })
    }
}

fn require_parsed<T: std::str::FromStr>(name: &str) -> Result<T> {
    env::var(name)
        .map_err(|_| eyre!("{name} environment variable is required"))?
        .parse()
        .map_err(|_| eyre!("{name} must be a valid number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            utxo: Some(UtxoConfig {
                rpc_url: "http://localhost:18443".to_string(),
                rpc_user: Some("user".to_string()),
                rpc_password: Some("pass".to_string()),
                chain_id: 1,
                chain_name: "utxonet".to_string(),
                deposit_script: "76a914000000000000000000000000000000000000000088ac".to_string(),
                min_confirmations: 6,
                start_height: 100,
            }),
            evm: Some(EvmConfig {
                ws_url: "ws://localhost:8546".to_string(),
                chain_id: 5,
                chain_name: "evmnet".to_string(),
                network_id: 31337,
                bridge_address: "0x0000000000000000000000000000000000000001".to_string(),
                default_gas_limit: 250_000,
            }),
            signer: SignerConfig {
                private_key:
                    "0x0000000000000000000000000000000000000000000000000000000000000001"
                        .to_string(),
            },
            observer: ObserverConfig {
                poll_interval_secs: 30,
                dedup_retention_blocks: 10_000,
            },
            api: ApiConfig { port: 9090 },
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_poll_interval_secs(), 30);
        assert_eq!(default_api_port(), 9090);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_requires_at_least_one_chain() {
        let mut config = valid_config();
        config.utxo = None;
        config.evm = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_chain_ids() {
        let mut config = valid_config();
        config.evm.as_mut().unwrap().chain_id = 1;
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains("unique"),
            "error should explain the duplicate: {}",
            err
        );
    }

    #[test]
    fn test_rejects_bad_deposit_script() {
        let mut config = valid_config();
        config.utxo.as_mut().unwrap().deposit_script = "not-hex".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_confirmations() {
        let mut config = valid_config();
        config.utxo.as_mut().unwrap().min_confirmations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_private_key() {
        let mut config = valid_config();
        config.signer.private_key = "0x123".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_bridge_address() {
        let mut config = valid_config();
        config.evm.as_mut().unwrap().bridge_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = valid_config();
        let debug = format!("{:?}", config);
        assert!(
            !debug.contains(&config.signer.private_key),
            "key must be redacted"
        );
        assert!(debug.contains("<redacted>"));
    }
}
