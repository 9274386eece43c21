//! Configuration for the compressed token CLI
//!
//! Loaded from an optional TOML file and `CTOKEN__`-prefixed environment
//! variables (`CTOKEN__RPC__RATE_LIMIT_RPS=5`), after a `.env` file has been
//! read. Every field has a default, so an empty configuration is valid.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::addresses::{DEFAULT_NULLIFIER_QUEUE, DEFAULT_STATE_TREE};
use crate::state_client::{PhotonClientConfig, RetryPolicy, DEFAULT_MAX_RECORD_PAGES};
use crate::tx_builder::BuilderSettings;
use crate::types::{pubkey_string, StateTreeInfo};

pub const ENV_PREFIX: &str = "CTOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub builder: BuilderConfig,

    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProfile {
    Local,
    #[default]
    Devnet,
    Mainnet,
}

impl NetworkProfile {
    /// Combined RPC and indexer endpoint for the profile
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Self::Local => "http://localhost:8989/",
            Self::Devnet => "https://devnet-rpc-proxy.whereiskeegan.workers.dev/",
            Self::Mainnet => "https://mainnet-rpc-proxy.whereiskeegan.workers.dev/",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub profile: NetworkProfile,

    /// Overrides the profile endpoint
    #[serde(default)]
    pub rpc_url: Option<String>,
}

impl NetworkConfig {
    pub fn endpoint(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.profile.rpc_url())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Client-side request budget per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: u32,

    /// Backoff for HTTP 429 responses
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_commitment")]
    pub commitment: String,

    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    #[serde(default = "default_confirm_poll_interval")]
    pub confirm_poll_interval_ms: u64,

    /// Pages of compressed records fetched before a listing is refused
    #[serde(default = "default_max_record_pages")]
    pub max_record_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,

    #[serde(with = "pubkey_string", default = "default_state_tree")]
    pub output_state_tree: Pubkey,

    /// Queue paired with `output_state_tree`
    #[serde(with = "pubkey_string", default = "default_nullifier_queue")]
    pub nullifier_queue: Pubkey,

    #[serde(default = "default_decimals")]
    pub default_decimals: u8,

    /// SPL Token or Token-2022; applies to every operation
    #[serde(with = "pubkey_string", default = "default_token_program")]
    pub token_program: Pubkey,

    #[serde(default)]
    pub guard_reclaim_close: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
}

fn default_rpc_timeout() -> u64 { 30 }
fn default_rate_limit() -> u32 { 10 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_confirm_timeout() -> u64 { 60 }
fn default_confirm_poll_interval() -> u64 { 500 }
fn default_max_record_pages() -> usize { DEFAULT_MAX_RECORD_PAGES }
fn default_compute_unit_limit() -> u32 { 1_000_000 }
fn default_state_tree() -> Pubkey { DEFAULT_STATE_TREE }
fn default_nullifier_queue() -> Pubkey { DEFAULT_NULLIFIER_QUEUE }
fn default_decimals() -> u8 { 9 }
fn default_token_program() -> Pubkey { spl_token::id() }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_rpc_timeout(),
            rate_limit_rps: default_rate_limit(),
            retry: RetryPolicy::default(),
            commitment: default_commitment(),
            confirm_timeout_secs: default_confirm_timeout(),
            confirm_poll_interval_ms: default_confirm_poll_interval(),
            max_record_pages: default_max_record_pages(),
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            compute_unit_limit: default_compute_unit_limit(),
            output_state_tree: default_state_tree(),
            nullifier_queue: default_nullifier_queue(),
            default_decimals: default_decimals(),
            token_program: default_token_program(),
            guard_reclaim_close: false,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl WalletConfig {
    /// Keypair path with a leading `~/` expanded from `$HOME`.
    pub fn resolved_keypair_path(&self) -> PathBuf {
        match (self.keypair_path.strip_prefix("~/"), std::env::var_os("HOME")) {
            (Some(rest), Some(home)) => Path::new(&home).join(rest),
            _ => PathBuf::from(&self.keypair_path),
        }
    }
}

impl AppConfig {
    /// Load `.env`, then the optional file, then `CTOKEN__*` overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file only
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.endpoint().trim().is_empty() {
            anyhow::bail!("network.rpc_url must not be empty");
        }
        if self.rpc.rate_limit_rps == 0 {
            anyhow::bail!("rpc.rate_limit_rps must be greater than zero");
        }
        if self.rpc.timeout_secs == 0 {
            anyhow::bail!("rpc.timeout_secs must be greater than zero");
        }
        if self.rpc.retry.base_delay_ms > self.rpc.retry.max_delay_ms {
            anyhow::bail!("rpc.retry.base_delay_ms must not exceed max_delay_ms");
        }
        if self.rpc.confirm_poll_interval_ms == 0 {
            anyhow::bail!("rpc.confirm_poll_interval_ms must be greater than zero");
        }
        if self.rpc.max_record_pages == 0 {
            anyhow::bail!("rpc.max_record_pages must be greater than zero");
        }
        self.commitment()?;
        if self.builder.compute_unit_limit == 0 {
            anyhow::bail!("builder.compute_unit_limit must be greater than zero");
        }
        if self.builder.output_state_tree == self.builder.nullifier_queue {
            anyhow::bail!("builder.output_state_tree and nullifier_queue must differ");
        }
        if self.builder.token_program != spl_token::id()
            && self.builder.token_program != spl_token_2022::id()
        {
            anyhow::bail!(
                "builder.token_program {} is neither SPL Token nor Token-2022",
                self.builder.token_program
            );
        }
        Ok(())
    }

    pub fn commitment(&self) -> anyhow::Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.rpc.commitment)
            .map_err(|_| anyhow::anyhow!("Unknown rpc.commitment '{}'", self.rpc.commitment))
    }

    pub fn builder_settings(&self) -> BuilderSettings {
        BuilderSettings {
            output_state_tree: self.builder.output_state_tree,
            compute_unit_limit: self.builder.compute_unit_limit,
            default_decimals: self.builder.default_decimals,
            token_program: self.builder.token_program,
            guard_reclaim_close: self.builder.guard_reclaim_close,
            ..BuilderSettings::default()
        }
    }

    pub fn to_photon_config(&self) -> anyhow::Result<PhotonClientConfig> {
        let mut state_trees = vec![StateTreeInfo {
            tree: self.builder.output_state_tree,
            queue: self.builder.nullifier_queue,
        }];
        if self.builder.output_state_tree != DEFAULT_STATE_TREE {
            state_trees.push(StateTreeInfo::default());
        }
        Ok(PhotonClientConfig {
            endpoint: self.network.endpoint().to_string(),
            request_timeout: Duration::from_secs(self.rpc.timeout_secs),
            rate_limit_rps: self.rpc.rate_limit_rps,
            retry: self.rpc.retry.clone(),
            commitment: self.commitment()?,
            confirm_timeout: Duration::from_secs(self.rpc.confirm_timeout_secs),
            confirm_poll_interval: Duration::from_millis(self.rpc.confirm_poll_interval_ms),
            max_record_pages: self.rpc.max_record_pages,
            state_trees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.network.profile, NetworkProfile::Devnet);
        assert_eq!(
            config.network.endpoint(),
            "https://devnet-rpc-proxy.whereiskeegan.workers.dev/"
        );
        assert_eq!(config.rpc.rate_limit_rps, 10);
        assert_eq!(config.rpc.retry.max_attempts, 5);
        assert_eq!(config.builder.compute_unit_limit, 1_000_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rpc_url_overrides_profile() {
        let mut config = AppConfig::default();
        config.network.profile = NetworkProfile::Mainnet;
        config.network.rpc_url = Some("http://127.0.0.1:8899".into());
        assert_eq!(config.network.endpoint(), "http://127.0.0.1:8899");
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = AppConfig::default();
        config.rpc.rate_limit_rps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_commitment_rejected() {
        let mut config = AppConfig::default();
        config.rpc.commitment = "eventually".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_photon_config_carries_settings() {
        let mut config = AppConfig::default();
        config.rpc.confirm_timeout_secs = 5;
        let photon = config.to_photon_config().unwrap();
        assert_eq!(photon.confirm_timeout, Duration::from_secs(5));
        assert_eq!(photon.state_trees, vec![StateTreeInfo::default()]);
        assert_eq!(photon.commitment, CommitmentConfig::confirmed());
    }

    #[test]
    fn test_token_program_reaches_builder_settings() {
        let mut config = AppConfig::default();
        assert_eq!(config.builder_settings().token_program, spl_token::id());

        config.builder.token_program = spl_token_2022::id();
        assert!(config.validate().is_ok());
        assert_eq!(config.builder_settings().token_program, spl_token_2022::id());

        config.builder.token_program = Pubkey::new_unique();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keypair_path_expands_home() {
        let wallet = WalletConfig {
            keypair_path: "/tmp/id.json".into(),
        };
        assert_eq!(wallet.resolved_keypair_path(), PathBuf::from("/tmp/id.json"));
    }
}
