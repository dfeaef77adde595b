//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Compounding parameters
#[derive(Debug, Clone, Deserialize)]
pub struct VaultConfig {
    /// Nominal APY in percent applied to fresh vaults
    #[serde(default = "default_base_apy")]
    pub base_apy: f64,
    /// Scheduler period
    #[serde(default = "default_compound_interval_ms")]
    pub compound_interval_ms: u64,
    /// Per-tick compounding discount factor
    #[serde(default = "default_compound_rate")]
    pub compound_rate: f64,
}

impl VaultConfig {
    pub fn compound_interval(&self) -> Duration {
        Duration::from_millis(self.compound_interval_ms)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            base_apy: default_base_apy(),
            compound_interval_ms: default_compound_interval_ms(),
            compound_rate: default_compound_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per key
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Fixed key the vault snapshot lives under
    #[serde(default = "default_state_key")]
    pub state_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_key: default_state_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// 0 leaves the timeout to the transport
    #[serde(default)]
    pub timeout_ms: u64,
    /// Decimal places of the smallest on-chain unit
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

impl RpcConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: 0,
            decimals: default_decimals(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_base_apy() -> f64 {
    12.5
}

fn default_compound_interval_ms() -> u64 {
    10_000
}

fn default_compound_rate() -> f64 {
    0.001
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".vault")
}

fn default_state_key() -> String {
    "yieldVaultState".to_string()
}

fn default_rpc_endpoint() -> String {
    "http://127.0.0.1:9650/ext/rpc".to_string()
}

fn default_decimals() -> u32 {
    9
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("vault.base_apy", default_base_apy())?
            .set_default(
                "vault.compound_interval_ms",
                default_compound_interval_ms() as i64,
            )?
            .set_default("vault.compound_rate", default_compound_rate())?
            .set_default("storage.state_key", default_state_key())?
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix VAULT__)
            .add_source(
                config::Environment::with_prefix("VAULT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.vault.base_apy.is_finite() || self.vault.base_apy < 0.0 {
            anyhow::bail!("base_apy must be a finite, non-negative percentage");
        }

        if self.vault.compound_interval_ms == 0 {
            anyhow::bail!("compound_interval_ms must be positive");
        }

        if !self.vault.compound_rate.is_finite() || self.vault.compound_rate < 0.0 {
            anyhow::bail!("compound_rate must be a finite, non-negative factor");
        }

        if self.storage.state_key.trim().is_empty() {
            anyhow::bail!("state_key must not be empty");
        }

        url::Url::parse(&self.rpc.endpoint)
            .with_context(|| format!("Invalid rpc endpoint: {}", self.rpc.endpoint))?;

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Vault:
    base_apy: {}%
    compound_interval: {}ms
    compound_rate: {}
  Storage:
    data_dir: {}
    state_key: {}
  RPC:
    endpoint: {}
    timeout: {}
    decimals: {}
  Logging:
    json: {}
"#,
            self.vault.base_apy,
            self.vault.compound_interval_ms,
            self.vault.compound_rate,
            self.storage.data_dir.display(),
            self.storage.state_key,
            mask_url(&self.rpc.endpoint),
            match self.rpc.timeout_ms {
                0 => "(transport default)".to_string(),
                ms => format!("{}ms", ms),
            },
            self.rpc.decimals,
            self.logging.json,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            storage: StorageConfig::default(),
            rpc: RpcConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
