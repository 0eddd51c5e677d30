//! Transaction lifecycle: submit, wait for confirmations, report the outcome.

use std::time::Duration;

use alloy_core::{
    primitives::{Address, B256, U256},
    sol_types::SolCall,
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    ChainError, Error, NetworkProfile, Result,
    chain::{Chain, Receipt, TxRequest},
};

/// Slack applied on top of the estimated gas.
const GAS_LIMIT_MARGIN_PERCENT: u64 = 20;

/// Lower bound of the polling interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many confirmations to wait for, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub confirmations: u64,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ConfirmationPolicy {
    /// The network's configured confirmations inside its block-time envelope.
    pub fn for_profile(profile: &NetworkProfile) -> Self {
        let block_time = profile.block_time().max(Duration::from_secs(1));
        let confirmations = profile.confirmations.max(1);
        let blocks = u32::try_from(confirmations)
            .unwrap_or(u32::MAX)
            .saturating_add(1)
            .saturating_mul(3);
        Self {
            confirmations,
            timeout: block_time.saturating_mul(blocks),
            poll_interval: (profile.block_time() / 4).max(MIN_POLL_INTERVAL),
        }
    }

    /// A single confirmation on the given network, as the scripts use.
    pub fn single(profile: &NetworkProfile) -> Self {
        let mut profile = profile.clone();
        profile.confirmations = 1;
        Self::for_profile(&profile)
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[derive(Debug)]
pub(crate) enum WaitError {
    Timeout,
    Chain(ChainError),
}

/// Wait until `tx_hash` is included and buried under enough blocks.
///
/// A reverted receipt is returned as soon as it is seen: a revert is final
/// and waiting for more blocks would not change it. So is a response that
/// does not decode. Transport failures are logged and polled again until the
/// window closes. Nothing is ever resubmitted.
pub(crate) async fn wait_for_receipt<C: Chain>(
    chain: &C,
    tx_hash: B256,
    policy: &ConfirmationPolicy,
) -> Result<Receipt, WaitError> {
    let start = tokio::time::Instant::now();

    loop {
        match poll_receipt(chain, tx_hash, policy.confirmations).await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {}
            Err(e @ (ChainError::Revert(_) | ChainError::Decode(_))) => {
                return Err(WaitError::Chain(e));
            }
            Err(e) => {
                tracing::warn!(error = %e, %tx_hash, "Receipt poll failed, retrying...");
            }
        }

        if start.elapsed() >= policy.timeout {
            return Err(WaitError::Timeout);
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

async fn poll_receipt<C: Chain>(
    chain: &C,
    tx_hash: B256,
    confirmations: u64,
) -> Result<Option<Receipt>, ChainError> {
    let Some(receipt) = chain.receipt(tx_hash).await? else {
        return Ok(None);
    };
    if !receipt.status {
        return Ok(Some(receipt));
    }

    let head = chain.block_number().await?;
    let confirmed = (head + 1).saturating_sub(receipt.block_number);
    tracing::trace!(%tx_hash, confirmed, required = confirmations, "Waiting for confirmations");

    Ok((confirmed >= confirmations).then_some(receipt))
}

pub(crate) fn gas_limit(estimate: u64) -> u64 {
    estimate + estimate * GAS_LIMIT_MARGIN_PERCENT / 100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted,
}

/// Result of a confirmed state-changing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub status: TxStatus,
}

impl TransactionOutcome {
    /// Fee paid by the sender: `gas_used * effective_gas_price`.
    pub fn gas_cost(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

impl From<Receipt> for TransactionOutcome {
    fn from(receipt: Receipt) -> Self {
        Self {
            tx_hash: receipt.tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            status: if receipt.status {
                TxStatus::Success
            } else {
                TxStatus::Reverted
            },
        }
    }
}

/// Sends state-changing calls and waits for them to be confirmed.
///
/// Shared by the `fund` and `withdraw` scripts and the tests. A revert is
/// reported as [`Error::Reverted`] and never retried.
#[derive(Debug)]
pub struct TransactionDriver<'a, C> {
    chain: &'a C,
    policy: ConfirmationPolicy,
}

impl<'a, C: Chain> TransactionDriver<'a, C> {
    pub fn new(chain: &'a C, policy: ConfirmationPolicy) -> Self {
        Self { chain, policy }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Call `call` on `contract` from `from`, attaching `value` wei.
    pub async fn send<T: SolCall>(
        &self,
        contract: Address,
        call: &T,
        value: U256,
        from: Address,
    ) -> Result<TransactionOutcome> {
        let method = T::SIGNATURE;
        let request = TxRequest::call(from, contract, call.abi_encode()).with_value(value);

        let reverted = |tx_hash, reason| Error::Reverted {
            contract,
            method,
            tx_hash,
            reason,
        };

        let estimate = match self.chain.estimate_gas(&request).await {
            Ok(gas) => gas,
            Err(ChainError::Revert(reason)) => return Err(reverted(None, reason)),
            Err(ChainError::Other(e) | ChainError::Decode(e)) => {
                return Err(e.context("Failed to estimate gas").into());
            }
        };

        let tx_hash = match self.chain.send_transaction(&request, gas_limit(estimate)).await {
            Ok(hash) => hash,
            Err(ChainError::Revert(reason)) => return Err(reverted(None, reason)),
            Err(ChainError::Other(e) | ChainError::Decode(e)) => {
                return Err(e.context(format!("Failed to send {}", method)).into());
            }
        };

        tracing::info!(
            %tx_hash,
            %contract,
            method,
            %value,
            %from,
            "Transaction sent, waiting for confirmation..."
        );

        let receipt = match wait_for_receipt(self.chain, tx_hash, &self.policy).await {
            Ok(receipt) => receipt,
            Err(WaitError::Timeout) => return Err(Error::Timeout { tx_hash }),
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

        let outcome = TransactionOutcome::from(receipt);
        tracing::info!(
            %tx_hash,
            method,
            gas_used = outcome.gas_used,
            effective_gas_price = outcome.effective_gas_price,
            block = outcome.block_number,
            "Transaction confirmed"
        );
        Ok(outcome)
    }
}

/// Execute a view call and decode its return value.
pub async fn read<C: Chain, T: SolCall>(chain: &C, contract: Address, call: &T) -> Result<T::Return> {
    let request = TxRequest::call(Address::ZERO, contract, call.abi_encode());
    let data = chain.call(&request).await.map_err(|e| match e {
        ChainError::Revert(reason) => Error::Reverted {
            contract,
            method: T::SIGNATURE,
            tx_hash: None,
            reason,
        },
        ChainError::Other(e) | ChainError::Decode(e) => {
            Error::Other(e.context(format!("Failed to call {}", T::SIGNATURE)))
        }
    })?;

    T::abi_decode_returns(&data)
        .map_err(|e| anyhow::anyhow!("Failed to decode {} result: {}", T::SIGNATURE, e).into())
}
