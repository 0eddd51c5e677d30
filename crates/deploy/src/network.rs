//! Network profiles and their resolution.
//!
//! A network identifier (the name passed with `--network`) resolves to a
//! [`NetworkProfile`] exactly once, at the top of a command. Everything
//! downstream consumes the resolved profile as data and never looks at the
//! network name or chain id again to decide between the mock and the live
//! price feed.

use std::{collections::BTreeMap, time::Duration};

use alloy_core::primitives::{Address, address};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Chain id used by the local development nodes (hardhat, anvil).
pub const DEVELOPMENT_CHAIN_ID: u64 = 31337;

/// Sepolia ETH/USD Chainlink aggregator.
pub const SEPOLIA_ETH_USD_FEED: Address = address!("0x694AA1769357215DE4FAC081bf1f309aDC325306");
/// Mainnet ETH/USD Chainlink aggregator.
pub const MAINNET_ETH_USD_FEED: Address = address!("0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419");

/// RPC endpoint of a local development node.
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545/";

/// Confirmations awaited when a network does not configure any.
pub const DEFAULT_CONFIRMATIONS: u64 = 1;

/// Where the price feed of a network comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NetworkKind {
    /// Local chain. The price feed is a mock deployed in the same session.
    Development,
    /// Public chain with a known price feed.
    Live { price_feed: Address },
}

/// Fully resolved configuration for a target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// The identifier this profile was resolved from.
    pub name: String,
    /// The chain id of the network.
    pub chain_id: u64,
    /// Development or live, with the live price feed.
    #[serde(flatten)]
    pub kind: NetworkKind,
    /// Number of confirmations to await after a deployment. Always at least 1.
    pub confirmations: u64,
    /// Expected block time in seconds. Zero for automining development chains.
    pub block_time: u64,
    /// JSON-RPC endpoint of the network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
}

impl NetworkProfile {
    pub fn is_development(&self) -> bool {
        matches!(self.kind, NetworkKind::Development)
    }

    /// The static price feed address, `None` on development networks.
    pub fn price_feed_address(&self) -> Option<Address> {
        match self.kind {
            NetworkKind::Development => None,
            NetworkKind::Live { price_feed } => Some(price_feed),
        }
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_secs(self.block_time)
    }
}

/// Per-network settings as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_feed: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,
}

/// The set of known networks and the development allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworksConfig {
    /// Names of the networks treated as development chains.
    pub development_chains: Vec<String>,
    /// Settings keyed by network name.
    pub networks: BTreeMap<String, NetworkSettings>,
}

impl Default for NetworksConfig {
    fn default() -> Self {
        let local = || NetworkSettings {
            chain_id: DEVELOPMENT_CHAIN_ID,
            rpc_url: Url::parse(DEFAULT_LOCAL_RPC_URL).ok(),
            ..Default::default()
        };
        let live = |chain_id, price_feed| NetworkSettings {
            chain_id,
            rpc_url: None,
            price_feed: Some(price_feed),
            confirmations: Some(6),
            block_time: Some(12),
        };

        let networks = BTreeMap::from([
            ("hardhat".to_string(), local()),
            ("localhost".to_string(), local()),
            ("anvil".to_string(), local()),
            ("sepolia".to_string(), live(11155111, SEPOLIA_ETH_USD_FEED)),
            ("mainnet".to_string(), live(1, MAINNET_ETH_USD_FEED)),
        ]);

        Self {
            development_chains: vec![
                "hardhat".to_string(),
                "localhost".to_string(),
                "anvil".to_string(),
            ],
            networks,
        }
    }
}

impl NetworksConfig {
    pub fn is_development(&self, name: &str) -> bool {
        self.development_chains.iter().any(|n| n == name)
    }

    /// Resolve a network identifier into a [`NetworkProfile`].
    ///
    /// Fails with [`Error::UnknownNetwork`] if the name is not configured and
    /// with [`Error::MissingDependencyAddress`] if a live network has no price
    /// feed.
    pub fn resolve(&self, name: &str) -> Result<NetworkProfile> {
        let settings = self
            .networks
            .get(name)
            .ok_or_else(|| Error::UnknownNetwork(name.to_string()))?;

        let kind = if self.is_development(name) {
            if let Some(price_feed) = settings.price_feed {
                tracing::warn!(
                    network = name,
                    %price_feed,
                    "Ignoring static price feed configured for a development network"
                );
            }
            NetworkKind::Development
        } else {
            let price_feed = settings
                .price_feed
                .ok_or_else(|| Error::MissingDependencyAddress(name.to_string()))?;
            NetworkKind::Live { price_feed }
        };

        Ok(NetworkProfile {
            name: name.to_string(),
            chain_id: settings.chain_id,
            kind,
            confirmations: settings
                .confirmations
                .unwrap_or(DEFAULT_CONFIRMATIONS)
                .max(1),
            block_time: settings.block_time.unwrap_or_default(),
            rpc_url: settings.rpc_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_development() {
        let config = NetworksConfig::default();
        let profile = config.resolve("hardhat").unwrap();

        assert!(profile.is_development());
        assert_eq!(profile.price_feed_address(), None);
        assert_eq!(profile.chain_id, DEVELOPMENT_CHAIN_ID);
        assert_eq!(profile.confirmations, 1);
    }

    #[test]
    fn test_resolve_live() {
        let config = NetworksConfig::default();
        let profile = config.resolve("sepolia").unwrap();

        assert!(!profile.is_development());
        assert_eq!(profile.price_feed_address(), Some(SEPOLIA_ETH_USD_FEED));
        assert_eq!(profile.confirmations, 6);
        assert_eq!(profile.block_time(), Duration::from_secs(12));
    }

    #[test]
    fn test_resolve_unknown() {
        let config = NetworksConfig::default();
        let err = config.resolve("goerli").unwrap_err();
        assert!(matches!(err, Error::UnknownNetwork(name) if name == "goerli"));
    }

    #[test]
    fn test_resolve_live_without_feed() {
        let mut config = NetworksConfig::default();
        config.networks.insert(
            "polygon".to_string(),
            NetworkSettings {
                chain_id: 137,
                ..Default::default()
            },
        );

        let err = config.resolve("polygon").unwrap_err();
        assert!(matches!(err, Error::MissingDependencyAddress(name) if name == "polygon"));
    }

    #[test]
    fn test_zero_confirmations_raised_to_one() {
        let mut config = NetworksConfig::default();
        config.networks.get_mut("sepolia").unwrap().confirmations = Some(0);

        assert_eq!(config.resolve("sepolia").unwrap().confirmations, 1);
    }

    #[test]
    fn test_development_ignores_static_feed() {
        let mut config = NetworksConfig::default();
        config.networks.get_mut("localhost").unwrap().price_feed = Some(SEPOLIA_ETH_USD_FEED);

        let profile = config.resolve("localhost").unwrap();
        assert_eq!(profile.kind, NetworkKind::Development);
    }

    #[test]
    fn test_profile_serde_shape() {
        let profile = NetworksConfig::default().resolve("sepolia").unwrap();
        let content = serde_json::to_string(&profile).unwrap();
        assert!(content.contains("\"kind\":\"live\""));
        let parsed: NetworkProfile = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, profile);
    }
}
