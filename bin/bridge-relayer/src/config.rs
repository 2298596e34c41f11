use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use envconfig::Envconfig;
use ethers::{signers::LocalWallet, types::Address};
use serde::Deserialize;
use url::Url;

use crate::error::Error;

/// Bridge relayer configuration.
///
/// Keys in `upward_signer_private_keys` have to be in the order the L1
/// bridge contract expects the multisig signatures in.
#[derive(Deserialize, Debug, Envconfig)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL")]
    pub database_url: Url,

    #[envconfig(from = "L1_RPC_URL")]
    pub l1_rpc_url: Url,

    #[envconfig(from = "L2_RPC_URL")]
    pub l2_rpc_url: Url,

    #[envconfig(from = "L1_BRIDGE_ADDRESS")]
    pub l1_bridge_address: Address,

    #[envconfig(from = "L2_BRIDGE_ADDRESS")]
    pub l2_bridge_address: Address,

    #[envconfig(from = "L1_START_HEIGHT", default = "0")]
    #[serde(default)]
    pub l1_start_height: u64,

    #[envconfig(from = "L2_START_HEIGHT", default = "0")]
    #[serde(default)]
    pub l2_start_height: u64,

    #[envconfig(from = "L1_CONFIRMATIONS", default = "6")]
    #[serde(default = "default_l1_confirmations")]
    pub l1_confirmations: u64,

    #[envconfig(from = "L2_CONFIRMATIONS", default = "1")]
    #[serde(default = "default_l2_confirmations")]
    pub l2_confirmations: u64,

    #[envconfig(from = "REORG_SAFE_DEPTH", default = "64")]
    #[serde(default = "default_reorg_safe_depth")]
    pub reorg_safe_depth: u64,

    #[envconfig(from = "WATCHER_BATCH_SIZE", default = "100")]
    #[serde(default = "default_batch_size")]
    pub watcher_batch_size: u64,

    #[envconfig(from = "WATCHER_POLL_INTERVAL_MS", default = "3000")]
    #[serde(default = "default_watcher_poll_interval_ms")]
    pub watcher_poll_interval_ms: u64,

    #[envconfig(from = "CHECKER_BATCH_SIZE", default = "100")]
    #[serde(default = "default_batch_size")]
    pub checker_batch_size: u64,

    #[envconfig(from = "CHECKER_POLL_INTERVAL_MS", default = "10000")]
    #[serde(default = "default_checker_poll_interval_ms")]
    pub checker_poll_interval_ms: u64,

    #[envconfig(from = "RELAYER_BATCH_SIZE", default = "20")]
    #[serde(default = "default_relayer_batch_size")]
    pub relayer_batch_size: u64,

    #[envconfig(from = "RELAYER_POLL_INTERVAL_MS", default = "5000")]
    #[serde(default = "default_relayer_poll_interval_ms")]
    pub relayer_poll_interval_ms: u64,

    #[envconfig(from = "RELAYER_MAX_PROCESS_ATTEMPTS", default = "5")]
    #[serde(default = "default_max_process_attempts")]
    pub relayer_max_process_attempts: u32,

    #[envconfig(from = "DOWNWARD_RELAYER_PRIVATE_KEY")]
    pub downward_relayer_private_key: String,

    #[envconfig(from = "UPWARD_RELAYER_PRIVATE_KEY")]
    pub upward_relayer_private_key: String,

    /// Comma-separated.
    #[envconfig(from = "UPWARD_SIGNER_PRIVATE_KEYS")]
    pub upward_signer_private_keys: String,

    #[envconfig(from = "BRIDGE_ABI_PATH")]
    pub bridge_abi_path: Option<PathBuf>,

    #[envconfig(from = "TX_MINING_TIMEOUT_MS", default = "60000")]
    #[serde(default = "default_tx_mining_timeout_ms")]
    pub tx_mining_timeout_ms: u64,

    #[envconfig(from = "TX_RETRIES", default = "3")]
    #[serde(default = "default_tx_retries")]
    pub tx_retries: usize,

    #[envconfig(from = "METRICS_PORT", default = "3312")]
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[envconfig(from = "L1_NETWORK", default = "l1")]
    #[serde(default = "default_l1_network")]
    pub l1_network: String,

    #[envconfig(from = "L2_NETWORK", default = "l2")]
    #[serde(default = "default_l2_network")]
    pub l2_network: String,
}

fn default_l1_confirmations() -> u64 {
    6
}

fn default_l2_confirmations() -> u64 {
    1
}

fn default_reorg_safe_depth() -> u64 {
    64
}

fn default_batch_size() -> u64 {
    100
}

fn default_watcher_poll_interval_ms() -> u64 {
    3000
}

fn default_checker_poll_interval_ms() -> u64 {
    10000
}

fn default_relayer_batch_size() -> u64 {
    20
}

fn default_relayer_poll_interval_ms() -> u64 {
    5000
}

fn default_max_process_attempts() -> u32 {
    5
}

fn default_tx_mining_timeout_ms() -> u64 {
    60000
}

fn default_tx_retries() -> usize {
    3
}

fn default_metrics_port() -> u16 {
    3312
}

fn default_l1_network() -> String {
    "l1".to_string()
}

fn default_l2_network() -> String {
    "l2".to_string()
}

fn parse_key(key: &str, name: &'static str) -> Result<LocalWallet, Error> {
    key.trim()
        .trim_start_matches("0x")
        .parse()
        .map_err(|_| Error::PrivateKey(name))
}

impl Config {
    /// Reads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(config_path)?;

        let config: Config = toml::from_str(&contents)?;

        Ok(config)
    }

    pub fn downward_relayer_wallet(&self) -> Result<LocalWallet, Error> {
        parse_key(
            &self.downward_relayer_private_key,
            "DOWNWARD_RELAYER_PRIVATE_KEY",
        )
    }

    pub fn upward_relayer_wallet(&self) -> Result<LocalWallet, Error> {
        parse_key(&self.upward_relayer_private_key, "UPWARD_RELAYER_PRIVATE_KEY")
    }

    /// The multisig signers, in configuration order.
    pub fn upward_signers(&self) -> Result<Vec<LocalWallet>, Error> {
        let signers = self
            .upward_signer_private_keys
            .split(',')
            .filter(|k| !k.trim().is_empty())
            .map(|k| parse_key(k, "UPWARD_SIGNER_PRIVATE_KEYS"))
            .collect::<Result<Vec<_>, _>>()?;

        if signers.is_empty() {
            return Err(Error::NoSignerKeys);
        }

        Ok(signers)
    }

    pub fn tx_mining_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_mining_timeout_ms)
    }

    pub fn watcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher_poll_interval_ms)
    }

    pub fn checker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.checker_poll_interval_ms)
    }

    pub fn relayer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relayer_poll_interval_ms)
    }
}
