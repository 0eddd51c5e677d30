//! Contract creation with confirmation-aware waiting.

use alloy_core::primitives::Address;
use anyhow::Context;
use chrono::Utc;

use crate::{
    Artifact, ArgValue, ChainError, DeploymentRecord, Error, NetworkProfile, Result,
    chain::{Chain, TxRequest},
    tx::{ConfirmationPolicy, WaitError, gas_limit, wait_for_receipt},
};

/// Deploys contracts on one network.
///
/// Every call creates a new contract instance. Callers that want to reuse an
/// existing deployment must check the registry first.
#[derive(Debug)]
pub struct ContractDeployer<'a, C> {
    chain: &'a C,
    profile: &'a NetworkProfile,
    policy: ConfirmationPolicy,
}

impl<'a, C: Chain> ContractDeployer<'a, C> {
    /// A deployer awaiting the profile's configured confirmations.
    pub fn new(chain: &'a C, profile: &'a NetworkProfile) -> Self {
        Self {
            chain,
            profile,
            policy: ConfirmationPolicy::for_profile(profile),
        }
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deploy `artifact` with `args` from `from` and wait for confirmations.
    ///
    /// Fails with [`Error::DeploymentReverted`] if the creation reverts and
    /// with [`Error::ConfirmationTimeout`] if the confirmations do not arrive
    /// within the policy's window.
    pub async fn deploy(
        &self,
        artifact: &Artifact,
        args: Vec<ArgValue>,
        from: Address,
    ) -> Result<DeploymentRecord> {
        let contract = artifact.contract_name.clone();
        let request = TxRequest::create(from, artifact.creation_code(&args));

        let reverted = |tx_hash, reason| Error::DeploymentReverted {
            contract: contract.clone(),
            tx_hash,
            reason,
        };

        let estimate = match self.chain.estimate_gas(&request).await {
            Ok(gas) => gas,
            Err(ChainError::Revert(reason)) => return Err(reverted(None, reason)),
            Err(ChainError::Other(e) | ChainError::Decode(e)) => {
                return Err(e.context(format!("Failed to estimate deployment of {}", contract)).into());
            }
        };

        let tx_hash = match self.chain.send_transaction(&request, gas_limit(estimate)).await {
            Ok(hash) => hash,
            Err(ChainError::Revert(reason)) => return Err(reverted(None, reason)),
            Err(ChainError::Other(e) | ChainError::Decode(e)) => {
                return Err(e.context(format!("Failed to send deployment of {}", contract)).into());
            }
        };

        tracing::info!(
            contract = %contract,
            network = %self.profile.name,
            %tx_hash,
            confirmations = self.policy.confirmations,
            "Deploying contract, waiting for confirmations..."
        );

        let receipt = match wait_for_receipt(self.chain, tx_hash, &self.policy).await {
            Ok(receipt) => receipt,
            Err(WaitError::Timeout) => {
                return Err(Error::ConfirmationTimeout {
                    tx_hash,
                    confirmations: self.policy.confirmations,
                });
            }
            Err(WaitError::Chain(ChainError::Revert(reason))) => {
                return Err(reverted(Some(tx_hash), reason));
            }
            Err(WaitError::Chain(ChainError::Other(e) | ChainError::Decode(e))) => {
                return Err(e.into());
            }
        };

        if !receipt.status {
            return Err(reverted(Some(tx_hash), None));
        }

        let address = receipt
            .contract_address
            .with_context(|| format!("Receipt of {} has no contract address", tx_hash))?;

        tracing::info!(
            contract = %contract,
            %address,
            gas_used = receipt.gas_used,
            block = receipt.block_number,
            "Contract deployed"
        );

        Ok(DeploymentRecord {
            contract_name: contract,
            address,
            constructor_args: args,
            network: self.profile.clone(),
            tx_hash,
            block_number: receipt.block_number,
            deployed_at: Utc::now(),
        })
    }
}
