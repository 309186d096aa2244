//! Configuration management for the step executor
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::{ChainFamily, Commitment};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "STEP_EXECUTOR_CONFIG";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub executor: ExecutorConfig,
    pub api: ApiConfig,
    pub rpc: RpcConfig,
    pub signer: SignerConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_true")]
    pub allow_interaction: bool,
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub skip_preflight: bool,
    pub commitment: Commitment,
    pub confirm_poll_interval_ms: u64,
    pub confirm_timeout_secs: u64,
    pub status_poll_interval_ms: u64,
    /// Upper bound on the receiving-leg wait; unset waits indefinitely
    #[serde(default)]
    pub status_timeout_secs: Option<u64>,
}

impl ExecutorConfig {
    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn status_timeout(&self) -> Option<Duration> {
        self.status_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allow_interaction: true,
            max_retries: 5,
            skip_preflight: true,
            commitment: Commitment::Confirmed,
            confirm_poll_interval_ms: 500,
            confirm_timeout_secs: 90,
            status_poll_interval_ms: 5000,
            status_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    pub url: String,
    pub owner_address: String,
    #[serde(default = "default_family")]
    pub family: ChainFamily,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub family: ChainFamily,
    pub explorer_url: String,
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_family() -> ChainFamily {
    ChainFamily::Svm
}

impl Settings {
    /// Load settings from the file named by `STEP_EXECUTOR_CONFIG`, falling
    /// back to `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in self.enabled_chains() {
            if chain.explorer_url.is_empty() {
                tracing::warn!("Chain {} has no explorer URL - transaction links will be relative", name);
            }
        }

        if self.api.base_url.is_empty() {
            anyhow::bail!("api.base_url must be set");
        }
        if self.rpc.url.is_empty() {
            anyhow::bail!("rpc.url must be set");
        }
        if self.signer.url.is_empty() || self.signer.owner_address.is_empty() {
            anyhow::bail!("signer.url and signer.owner_address must be set");
        }
        if self.executor.max_retries == 0 {
            anyhow::bail!("executor.max_retries must be greater than zero");
        }
        if self.executor.confirm_poll_interval_ms == 0 || self.executor.status_poll_interval_ms == 0
        {
            anyhow::bail!("Poll intervals must be greater than zero");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[executor]
max_retries = 5
commitment = "confirmed"
confirm_poll_interval_ms = 500
confirm_timeout_secs = 90
status_poll_interval_ms = 5000

[api]
base_url = "https://li.quest/v1"
api_key = "${STEP_EXECUTOR_TEST_KEY}"
timeout_secs = 30

[rpc]
url = "https://api.mainnet-beta.solana.com"
chain_id = 1151111081099710

[signer]
url = "http://127.0.0.1:8899"
owner_address = "owner"

[chains.solana]
chain_id = 1151111081099710
name = "Solana"
family = "svm"
explorer_url = "https://solscan.io"
enabled = true

[chains.ethereum]
chain_id = 1
name = "Ethereum"
family = "evm"
explorer_url = "https://etherscan.io"
enabled = false
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("STEP_EXECUTOR_TEST_KEY", "secret");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.api.api_key.as_deref(), Some("secret"));
        assert!(settings.executor.allow_interaction);
        assert!(settings.executor.skip_preflight);
        assert_eq!(settings.executor.commitment, Commitment::Confirmed);
        assert_eq!(settings.executor.status_timeout(), None);
        assert_eq!(settings.enabled_chains().len(), 1);
        assert_eq!(
            settings.get_chain_by_id(1).map(|c| c.family),
            Some(ChainFamily::Evm)
        );
    }

    #[test]
    fn test_rejects_zero_retries() {
        let config = SAMPLE.replace("max_retries = 5", "max_retries = 0");
        assert!(Settings::parse(&config).is_err());
    }

    #[test]
    fn test_requires_enabled_chain() {
        let config = SAMPLE.replace(
            "explorer_url = \"https://solscan.io\"\nenabled = true",
            "explorer_url = \"https://solscan.io\"\nenabled = false",
        );
        assert!(Settings::parse(&config).is_err());
    }
}
