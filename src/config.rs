use crate::scanner::DEFAULT_BATCH_SIZE;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_DATABASE_URL: &str = "sqlite:./watcher.db";
const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
const DEFAULT_MAX_RESUME_GAP: u64 = 1000;

/// Networks the watcher knows how to monitor: (name, provider env var, explorer).
pub const KNOWN_NETWORKS: &[(&str, &str, &str)] = &[
    ("ethereum", "ETH_PROVIDER", "https://etherscan.io"),
    ("optimism", "OP_PROVIDER", "https://optimistic.etherscan.io"),
    ("base", "BASE_PROVIDER", "https://basescan.org"),
    ("arbitrum", "ARB_PROVIDER", "https://arbiscan.io"),
    ("zksync", "ZK_PROVIDER", "https://zkscan.io"),
    ("shape", "SHAPE_PROVIDER", "https://shapescan.xyz"),
    ("scroll", "SCROLL_PROVIDER", "https://scrollscan.com"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub explorer_url: String,
    pub rpc_urls: Vec<String>,
}

impl NetworkConfig {
    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_url, address)
    }

    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub networks: Vec<NetworkConfig>,
    pub bot_token: String,
    pub telegram_api_url: String,
    pub database_url: String,
    pub scan_interval: Duration,
    pub batch_size: u64,
    pub max_resume_gap: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let bot_token = std::env::var("BOT_TOKEN").context("BOT_TOKEN must be set in .env")?;

        let telegram_api_url = std::env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_URL.to_string());

        let networks = Self::networks_from(|key| std::env::var(key).ok());
        if networks.is_empty() {
            let vars: Vec<&str> = KNOWN_NETWORKS.iter().map(|(_, var, _)| *var).collect();
            anyhow::bail!(
                "No network configured, set at least one of: {}",
                vars.join(", ")
            );
        }

        let scan_interval_secs =
            Self::positive_u64("SCAN_INTERVAL_SECS", DEFAULT_SCAN_INTERVAL_SECS)?;
        let batch_size = Self::positive_u64("BATCH_SIZE", DEFAULT_BATCH_SIZE)?;

        let max_resume_gap = match std::env::var("MAX_RESUME_GAP") {
            Ok(raw) => u64::from_str(raw.trim()).context("Invalid MAX_RESUME_GAP")?,
            Err(_) => DEFAULT_MAX_RESUME_GAP,
        };

        Ok(Config {
            networks,
            bot_token,
            telegram_api_url,
            database_url: Self::database_url_from_env(),
            scan_interval: Duration::from_secs(scan_interval_secs),
            batch_size,
            max_resume_gap,
        })
    }

    /// Database location alone, for tools that never talk to a chain.
    pub fn database_url_from_env() -> String {
        dotenv::dotenv().ok();
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
    }

    fn networks_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<NetworkConfig> {
        let mut networks = Vec::new();

        for (name, var, explorer) in KNOWN_NETWORKS {
            let Some(raw) = lookup(var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };

            let rpc_urls: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();

            if rpc_urls.is_empty() {
                warn!("{} is set but empty, skipping network {}", var, name);
                continue;
            }

            networks.push(NetworkConfig {
                name: name.to_string(),
                explorer_url: explorer.to_string(),
                rpc_urls,
            });
        }

        networks
    }

    fn positive_u64(var: &str, default: u64) -> Result<u64> {
        let value = match std::env::var(var) {
            Ok(raw) => u64::from_str(raw.trim()).with_context(|| format!("Invalid {var}"))?,
            Err(_) => default,
        };

        if value == 0 {
            anyhow::bail!("{} must be greater than zero", var);
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn networks_are_built_from_provider_variables() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ETH_PROVIDER", "https://eth-a.example, https://eth-b.example"),
            ("BASE_PROVIDER", "https://base.example"),
            ("SCROLL_PROVIDER", " , "),
        ]);

        let networks = Config::networks_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].name, "ethereum");
        assert_eq!(
            networks[0].rpc_urls,
            vec!["https://eth-a.example", "https://eth-b.example"]
        );
        assert_eq!(networks[1].name, "base");
        assert_eq!(networks[1].explorer_url, "https://basescan.org");
    }

    #[test]
    fn explorer_links_follow_network() {
        let network = NetworkConfig {
            name: "optimism".to_string(),
            explorer_url: "https://optimistic.etherscan.io".to_string(),
            rpc_urls: vec![],
        };

        assert_eq!(
            network.address_url("0xabc"),
            "https://optimistic.etherscan.io/address/0xabc"
        );
        assert_eq!(
            network.tx_url("0xdef"),
            "https://optimistic.etherscan.io/tx/0xdef"
        );
    }
}
