//! Deployment records and the registry they are persisted in.
//!
//! Records are stored as `<root>/<network>/<ContractName>.json` so that later
//! script invocations against the same network can find the contracts a
//! deployment produced.

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArgValue, NetworkProfile};

/// Outcome of one deployment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub contract_name: String,
    pub address: Address,
    pub constructor_args: Vec<ArgValue>,
    pub network: NetworkProfile,
    pub tx_hash: B256,
    pub block_number: u64,
    pub deployed_at: DateTime<Utc>,
}

/// Name-keyed lookup of the contracts deployed on a network.
pub trait DeploymentRegistry: Send + Sync {
    /// The record of `contract_name` on `network`, if one exists.
    fn get(&self, network: &str, contract_name: &str) -> Result<Option<DeploymentRecord>>;

    /// Store a record, replacing any previous deployment of the same contract.
    fn save(&self, record: &DeploymentRecord) -> Result<()>;
}

/// Registry backed by JSON files on disk.
#[derive(Debug, Clone)]
pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, network: &str, contract_name: &str) -> PathBuf {
        self.root
            .join(network)
            .join(format!("{}.json", contract_name))
    }
}

impl DeploymentRegistry for FsRegistry {
    fn get(&self, network: &str, contract_name: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(network, contract_name);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read deployment from {}", path.display()))?;
        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment at {}", path.display()))?;
        Ok(Some(record))
    }

    fn save(&self, record: &DeploymentRecord) -> Result<()> {
        let path = self.record_path(&record.network.name, &record.contract_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize deployment record")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write deployment to {}", path.display()))?;

        tracing::info!(
            contract = %record.contract_name,
            address = %record.address,
            path = %path.display(),
            "Deployment saved"
        );
        Ok(())
    }
}

/// Registry that only lives for the current process.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<HashMap<(String, String), DeploymentRecord>>,
}

impl DeploymentRegistry for MemoryRegistry {
    fn get(&self, network: &str, contract_name: &str) -> Result<Option<DeploymentRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("Deployment registry lock poisoned"))?;
        Ok(records
            .get(&(network.to_string(), contract_name.to_string()))
            .cloned())
    }

    fn save(&self, record: &DeploymentRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("Deployment registry lock poisoned"))?;
        records.insert(
            (record.network.name.clone(), record.contract_name.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NetworksConfig;
    use tempdir::TempDir;

    fn record(network: &str, contract_name: &str, address: Address) -> DeploymentRecord {
        DeploymentRecord {
            contract_name: contract_name.to_string(),
            address,
            constructor_args: vec![ArgValue::Address(Address::repeat_byte(7))],
            network: NetworksConfig::default().resolve(network).unwrap(),
            tx_hash: B256::repeat_byte(1),
            block_number: 3,
            deployed_at: Utc::now(),
        }
    }

    #[test]
    fn test_fs_registry_roundtrip() {
        let dir = TempDir::new("fundme-deployments").unwrap();
        let registry = FsRegistry::new(dir.path());

        assert!(registry.get("hardhat", "FundMe").unwrap().is_none());

        let saved = record("hardhat", "FundMe", Address::repeat_byte(2));
        registry.save(&saved).unwrap();

        assert!(dir.path().join("hardhat/FundMe.json").is_file());
        assert_eq!(registry.get("hardhat", "FundMe").unwrap(), Some(saved));
        assert!(registry.get("sepolia", "FundMe").unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous_deployment() {
        let dir = TempDir::new("fundme-deployments").unwrap();
        let registry = FsRegistry::new(dir.path());

        registry
            .save(&record("sepolia", "FundMe", Address::repeat_byte(2)))
            .unwrap();
        registry
            .save(&record("sepolia", "FundMe", Address::repeat_byte(3)))
            .unwrap();

        let current = registry.get("sepolia", "FundMe").unwrap().unwrap();
        assert_eq!(current.address, Address::repeat_byte(3));
    }

    #[test]
    fn test_memory_registry_is_keyed_by_network() {
        let registry = MemoryRegistry::default();
        registry
            .save(&record("hardhat", "MockV3Aggregator", Address::repeat_byte(4)))
            .unwrap();

        assert!(registry.get("hardhat", "MockV3Aggregator").unwrap().is_some());
        assert!(registry.get("localhost", "MockV3Aggregator").unwrap().is_none());
    }
}
