//! fundme-deploy - Deployment and interaction library for the FundMe contract.
//!
//! This crate resolves a target network into a profile, provisions the
//! ETH/USD price feed (a mock on development chains, the Chainlink
//! aggregator on live ones), deploys and verifies `FundMe`, and drives its
//! `fund` and `withdraw` calls while checking the balance invariants.

mod error;
pub use error::{ChainError, Error, Result};

pub mod network;
pub use network::{NetworkKind, NetworkProfile, NetworkSettings, NetworksConfig};

pub mod chain;
pub use chain::{Chain, Receipt, TxRequest};

pub mod rpc;
pub use rpc::RpcChain;

pub mod contracts;

pub mod artifact;
pub use artifact::{ArgValue, Artifact, ArtifactDir, ArtifactSource};

pub mod registry;
pub use registry::{DeploymentRecord, DeploymentRegistry, FsRegistry, MemoryRegistry};

pub mod provision;
pub use provision::resolve_dependency;

pub mod tx;
pub use tx::{ConfirmationPolicy, TransactionDriver, TransactionOutcome, TxStatus};

mod deployer;
pub use deployer::ContractDeployer;

pub mod verify;
pub use verify::{SkipReason, VerificationOutcome, Verifier, VerifyConfig};

pub mod invariant;
pub use invariant::{CheckError, InvariantChecker};

pub mod scripts;
pub use scripts::{ContractStatus, FUND_AMOUNT, WithdrawKind};

pub mod pipeline;
pub use pipeline::{DeploySummary, DeployTag, DeployTags, Pipeline};

pub mod config;
pub use config::{CONFIG_FILENAME, Config};

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
