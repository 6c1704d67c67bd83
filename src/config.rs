//! Configuration loading from TOML with environment overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The card → wrapped contract table lives in the config file so a
//! different source of truth can be dropped in without touching the
//! pipeline; it is resolved once at startup into [`BalanceTargets`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{ItemId, SupplyError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    pub balances: BalancesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
    pub service_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("public"),
            service_name: "Curio Cards Supply Backend".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_days: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_days: 7 }
    }
}

/// Longest accepted refresh period.
pub const MAX_INTERVAL_DAYS: u64 = 365;

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_days * 24 * 60 * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub user_agent: String,
    /// Suffixed identifiers the feed is allowed to carry (e.g. `17b`).
    pub variants: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://ccsupply.xyz/data/Card_Supply.csv".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            variants: vec!["17b".to_string()],
        }
    }
}

impl FeedConfig {
    pub fn variant_ids(&self) -> Result<Vec<ItemId>, SupplyError> {
        self.variants
            .iter()
            .map(|v| match v.parse::<ItemId>()? {
                id @ ItemId::Variant { .. } => Ok(id),
                ItemId::Base(_) => Err(SupplyError::Config(format!(
                    "feed variant {v:?} has no suffix"
                ))),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BalancesConfig {
    /// URL with `{contract}` and `{holder}` placeholders.
    #[serde(default = "default_page_template")]
    pub page_url_template: String,
    pub default_holder: String,
    #[serde(default)]
    pub holder_overrides: HashMap<String, String>,
    #[serde(default)]
    pub contracts: HashMap<String, String>,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

fn default_page_template() -> String {
    "https://etherscan.io/token/{contract}?a={holder}".to_string()
}

fn default_min_delay_ms() -> u64 {
    1500
}

fn default_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply `PORT`.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;

        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port}"))?;
        }
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        anyhow::ensure!(
            (1..=MAX_INTERVAL_DAYS).contains(&config.refresh.interval_days),
            "refresh.interval_days must be between 1 and {MAX_INTERVAL_DAYS}, got {}",
            config.refresh.interval_days
        );
        // Surface bad map keys at startup rather than at first refresh.
        config.balances.targets()?;
        config.feed.variant_ids()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Resolved balance targets
// ---------------------------------------------------------------------------

/// Immutable card → (contract, holder) table used by the balance lookup.
#[derive(Debug, Clone)]
pub struct BalanceTargets {
    page_url_template: String,
    default_holder: String,
    holder_overrides: HashMap<ItemId, String>,
    contracts: HashMap<ItemId, String>,
}

impl BalanceTargets {
    pub fn new(
        page_url_template: impl Into<String>,
        default_holder: impl Into<String>,
        contracts: HashMap<ItemId, String>,
        holder_overrides: HashMap<ItemId, String>,
    ) -> Self {
        Self {
            page_url_template: page_url_template.into(),
            default_holder: default_holder.into(),
            holder_overrides,
            contracts,
        }
    }

    pub fn contract(&self, id: &ItemId) -> Option<&str> {
        self.contracts.get(id).map(String::as_str)
    }

    /// The custodial address to check for `id`.
    pub fn holder(&self, id: &ItemId) -> &str {
        self.holder_overrides
            .get(id)
            .map(String::as_str)
            .unwrap_or(&self.default_holder)
    }

    /// Balance page URL for `id`, or `None` if the card has no wrapped contract.
    pub fn page_url(&self, id: &ItemId) -> Option<String> {
        let contract = self.contract(id)?;
        Some(
            self.page_url_template
                .replace("{contract}", contract)
                .replace("{holder}", self.holder(id)),
        )
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl BalancesConfig {
    pub fn targets(&self) -> Result<BalanceTargets, SupplyError> {
        Ok(BalanceTargets::new(
            self.page_url_template.clone(),
            self.default_holder.clone(),
            parse_keys(&self.contracts)?,
            parse_keys(&self.holder_overrides)?,
        ))
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

fn parse_keys(map: &HashMap<String, String>) -> Result<HashMap<ItemId, String>, SupplyError> {
    map.iter()
        .map(|(k, v)| {
            let id = k
                .parse::<ItemId>()
                .map_err(|_| SupplyError::Config(format!("invalid card key {k:?}")))?;
            Ok((id, v.clone()))
        })
        .collect()
}
