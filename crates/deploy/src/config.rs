//! Layered tool configuration.
//!
//! Built-in defaults are overridden by `fundme.toml`, then by the environment:
//! `FUNDME_`-prefixed variables (nested keys separated with `__`, e.g.
//! `FUNDME_VERIFY__COMPILER_VERSION`), and the conventional
//! `ETHERSCAN_API_KEY` and `PRIVATE_KEY`.

use std::path::{Path, PathBuf};

use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{ArtifactDir, FsRegistry, NetworkProfile, NetworksConfig, RpcChain, VerifyConfig};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "fundme.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Known networks and the development allow-list.
    #[serde(flatten)]
    pub networks: NetworksConfig,
    /// Directory holding the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Directory holding the deployment records.
    pub deployments_dir: PathBuf,
    /// Source verification settings.
    pub verify: VerifyConfig,
    /// Hex private key used to sign transactions locally.
    ///
    /// When unset, transactions are sent from the node's first unlocked account.
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            networks: NetworksConfig::default(),
            artifacts_dir: PathBuf::from("out"),
            deployments_dir: PathBuf::from("deployments"),
            verify: VerifyConfig::default(),
            private_key: None,
        }
    }
}

impl Config {
    /// The layered figment, without extracting it.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FUNDME_").split("__"))
            .merge(
                Env::raw()
                    .only(&["ETHERSCAN_API_KEY"])
                    .map(|_| "verify.api_key".into()),
            )
            .merge(Env::raw().only(&["PRIVATE_KEY"]).map(|_| "private_key".into()))
    }

    /// Load the configuration, reading `path` if it exists.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file. The private key is never written.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn registry(&self) -> FsRegistry {
        FsRegistry::new(&self.deployments_dir)
    }

    pub fn artifacts(&self) -> ArtifactDir {
        ArtifactDir(self.artifacts_dir.clone())
    }

    pub fn signer(&self) -> Result<Option<PrivateKeySigner>> {
        self.private_key
            .as_deref()
            .map(|key| {
                key.trim()
                    .parse::<PrivateKeySigner>()
                    .context("Invalid private key")
            })
            .transpose()
    }

    /// A JSON-RPC client for `profile`, signing locally if a private key is set.
    pub fn chain(&self, profile: &NetworkProfile) -> Result<RpcChain> {
        let url = profile
            .rpc_url
            .clone()
            .with_context(|| format!("Network '{}' has no rpc_url configured", profile.name))?;

        let chain = RpcChain::new(url)?;
        Ok(match self.signer()? {
            Some(signer) => chain.with_signer(signer),
            None => chain,
        })
    }
}
