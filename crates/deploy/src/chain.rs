//! The chain capability consumed by the deployer, the driver and the scripts.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::ChainError;

/// A transaction to estimate, simulate or submit.
///
/// `to == None` is a contract creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

impl TxRequest {
    pub fn create(from: Address, code: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: None,
            value: U256::ZERO,
            input: code.into(),
        }
    }

    pub fn call(from: Address, to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: Some(to),
            value: U256::ZERO,
            input: input.into(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// The fields of a transaction receipt this crate cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    /// `true` if the transaction executed successfully.
    pub status: bool,
    /// Address of the created contract, for creation transactions.
    pub contract_address: Option<Address>,
}

/// Access to an EVM chain.
///
/// Implemented over JSON-RPC by [`crate::RpcChain`] and in memory by
/// `testing::DevChain` (behind the `test-utils` feature).
pub trait Chain: Send + Sync {
    /// The chain id reported by the node.
    fn chain_id(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Accounts the caller can send from, in order. Index 0 is the deployer.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ChainError>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, ChainError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Estimate the gas of a transaction. A revert surfaces as [`ChainError::Revert`].
    fn estimate_gas(
        &self,
        tx: &TxRequest,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Execute a read-only call against the latest block.
    fn call(&self, tx: &TxRequest) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    /// Submit a transaction and return its hash without waiting for inclusion.
    fn send_transaction(
        &self,
        tx: &TxRequest,
        gas_limit: u64,
    ) -> impl Future<Output = Result<B256, ChainError>> + Send;

    /// The receipt of a transaction, `None` while it is pending.
    fn receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<Receipt>, ChainError>> + Send;
}
