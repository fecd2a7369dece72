//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, wallet address) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub catalog: CatalogConfig,
    pub contests: ContestsConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Env var holding the submitter's wallet address.
    pub owner_identity_env: String,
    /// Identity used when the env var is unset.
    pub default_owner: String,
    /// Only allow submitting a roster that holds exactly the maximum size.
    #[serde(default = "default_true")]
    pub require_full_roster: bool,
    pub submit_timeout_secs: u64,
    pub state_file: String,
}

impl SessionConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Resolve the submitter identity, falling back to `default_owner`.
    pub fn owner_identity(&self) -> String {
        std::env::var(&self.owner_identity_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.default_owner.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    pub refresh_interval_secs: u64,
    pub coingecko: CoinGeckoConfig,
    pub stocks: StocksConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoinGeckoConfig {
    pub enabled: bool,
    /// Number of coins by market cap to offer.
    pub limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StocksConfig {
    pub enabled: bool,
    pub api_key_env: String,
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContestsConfig {
    /// JSON file holding the contest list.
    pub file: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Supabase,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub supabase_url_env: Option<String>,
    pub supabase_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an environment variable holding a secret.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
