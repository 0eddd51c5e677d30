//! Compiled contract artifacts and constructor arguments.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, I256, U256},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A constructor argument, kept in declaration order in a [`crate::DeploymentRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ArgValue {
    Address(Address),
    Uint8(u8),
    Int256(I256),
}

impl ArgValue {
    fn to_sol(&self) -> DynSolValue {
        match self {
            Self::Address(address) => DynSolValue::Address(*address),
            Self::Uint8(value) => DynSolValue::Uint(U256::from(*value), 8),
            Self::Int256(value) => DynSolValue::Int(*value, 256),
        }
    }
}

/// ABI-encode constructor arguments as they are appended to the creation code.
pub fn encode_args(args: &[ArgValue]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(ArgValue::to_sol).collect()).abi_encode_params()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// Hardhat: `"bytecode": "0x..."`.
    Flat(Bytes),
    /// Foundry: `"bytecode": { "object": "0x..." }`.
    Object { object: Bytes },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    abi: serde_json::Value,
    bytecode: RawBytecode,
}

/// Creation code and ABI of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: serde_json::Value,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Parse a Hardhat or Foundry artifact.
    pub fn from_json(contract_name: &str, content: &str) -> Result<Self> {
        let raw: RawArtifact = serde_json::from_str(content)
            .with_context(|| format!("Failed to parse artifact for {}", contract_name))?;

        let bytecode = match raw.bytecode {
            RawBytecode::Flat(code) | RawBytecode::Object { object: code } => code,
        };
        if bytecode.is_empty() {
            anyhow::bail!(
                "Artifact for {} has no bytecode, is the contract abstract?",
                contract_name
            );
        }

        Ok(Self {
            contract_name: raw.contract_name.unwrap_or_else(|| contract_name.to_string()),
            abi: raw.abi,
            bytecode,
        })
    }

    /// Load the artifact of `contract_name` from an artifacts directory.
    ///
    /// Looks for `<dir>/<Name>.json`, then the Foundry layout
    /// `<dir>/<Name>.sol/<Name>.json`, then the Hardhat layout
    /// `<dir>/contracts/<Name>.sol/<Name>.json`.
    pub fn load(dir: &Path, contract_name: &str) -> Result<Self> {
        let path = Self::candidates(dir, contract_name)
            .into_iter()
            .find(|path| path.is_file())
            .with_context(|| {
                format!(
                    "No artifact for {} found under {}",
                    contract_name,
                    dir.display()
                )
            })?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        tracing::debug!(path = %path.display(), contract = contract_name, "Loaded artifact");
        Self::from_json(contract_name, &content)
    }

    fn candidates(dir: &Path, contract_name: &str) -> Vec<PathBuf> {
        let file = format!("{}.json", contract_name);
        let source_dir = format!("{}.sol", contract_name);
        vec![
            dir.join(&file),
            dir.join(&source_dir).join(&file),
            dir.join("contracts").join(&source_dir).join(&file),
        ]
    }

    /// Creation code followed by the encoded constructor arguments.
    pub fn creation_code(&self, args: &[ArgValue]) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend(encode_args(args));
        code.into()
    }
}

/// Where the pipeline gets compiled contracts from.
pub trait ArtifactSource: Send + Sync {
    fn artifact(&self, contract_name: &str) -> Result<Artifact>;
}

/// Artifacts read from a build output directory.
#[derive(Debug, Clone)]
pub struct ArtifactDir(pub PathBuf);

impl ArtifactSource for ArtifactDir {
    fn artifact(&self, contract_name: &str) -> Result<Artifact> {
        Artifact::load(&self.0, contract_name)
    }
}

impl ArtifactSource for BTreeMap<String, Artifact> {
    fn artifact(&self, contract_name: &str) -> Result<Artifact> {
        self.get(contract_name)
            .cloned()
            .with_context(|| format!("No artifact registered for {}", contract_name))
    }
}
