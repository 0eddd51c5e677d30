//! Ethereum JSON-RPC access.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U64, U128, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::{
    ChainError,
    chain::{Chain, Receipt, TxRequest},
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-RPC error code used by geth, anvil and hardhat for execution reverts.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Error responses that describe an execution revert are returned as
/// [`ChainError::Revert`]. A response that does not decode into `T` is a
/// [`ChainError::Decode`], every other failure a [`ChainError::Other`].
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, ChainError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let response: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    let result = rpc_result(method, response)?;
    serde_json::from_value(result)
        .with_context(|| format!("Failed to deserialize {} result", method))
        .map_err(ChainError::Decode)
}

/// Extract the `result` of a JSON-RPC response envelope.
///
/// An error whose code is [`EXECUTION_REVERTED_CODE`] or whose message
/// mentions a revert is a [`ChainError::Revert`]. A missing `result` is a
/// [`ChainError::Decode`]; a `null` one is returned as is.
fn rpc_result(method: &str, mut response: Value) -> Result<Value, ChainError> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        let code = error.get("code").and_then(|c| c.as_i64());

        if code == Some(EXECUTION_REVERTED_CODE) || message.contains("revert") {
            return Err(ChainError::Revert(Some(message.to_string())));
        }
        return Err(anyhow::anyhow!("RPC error on {}: {}", method, message).into());
    }

    response
        .get_mut("result")
        .map(Value::take)
        .with_context(|| format!("No result in {} response", method))
        .map_err(ChainError::Decode)
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: U64,
    gas_used: U64,
    effective_gas_price: U128,
    status: U64,
    contract_address: Option<Address>,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.to::<u64>(),
            gas_used: receipt.gas_used.to::<u64>(),
            effective_gas_price: receipt.effective_gas_price.to::<u128>(),
            status: receipt.status == U64::from(1),
            contract_address: receipt.contract_address,
        }
    }
}

fn tx_json(tx: &TxRequest) -> Value {
    let mut object = serde_json::json!({
        "from": tx.from,
        "value": tx.value,
        "data": tx.input,
    });
    if let Some(to) = tx.to {
        object["to"] = serde_json::json!(to);
    }
    object
}

/// A [`Chain`] backed by a JSON-RPC endpoint.
///
/// Transactions from the configured local signer are signed here and sent
/// with `eth_sendRawTransaction`. Every other sender must be an account the
/// node manages (anvil and hardhat unlock their dev accounts), and goes
/// through `eth_sendTransaction`.
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
    signer: Option<PrivateKeySigner>,
}

impl RpcChain {
    pub fn new(url: Url) -> Result<Self, anyhow::Error> {
        Ok(Self {
            client: create_client()?,
            url,
            signer: None,
        })
    }

    /// Sign transactions from the signer's address locally.
    pub fn with_signer(mut self, signer: PrivateKeySigner) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, ChainError> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }

    async fn send_signed(
        &self,
        signer: &PrivateKeySigner,
        tx: &TxRequest,
        gas_limit: u64,
    ) -> Result<B256, ChainError> {
        let chain_id = self.chain_id().await?;
        let nonce: U64 = self
            .request(
                "eth_getTransactionCount",
                vec![serde_json::json!(tx.from), serde_json::json!("pending")],
            )
            .await?;
        let gas_price: U128 = self.request("eth_gasPrice", vec![]).await?;
        let priority_fee = match self.request::<U128>("eth_maxPriorityFeePerGas", vec![]).await {
            Ok(fee) => fee.to::<u128>(),
            Err(e) => {
                tracing::debug!(error = %e, "eth_maxPriorityFeePerGas unavailable, using gas price");
                gas_price.to::<u128>()
            }
        };

        let unsigned = TxEip1559 {
            chain_id,
            nonce: nonce.to::<u64>(),
            gas_limit,
            max_fee_per_gas: gas_price
                .to::<u128>()
                .saturating_mul(2)
                .saturating_add(priority_fee),
            max_priority_fee_per_gas: priority_fee,
            to: tx.to.map_or(TxKind::Create, TxKind::Call),
            value: tx.value,
            access_list: Default::default(),
            input: tx.input.clone(),
        };

        let signature = signer
            .sign_hash_sync(&unsigned.signature_hash())
            .context("Failed to sign transaction")?;
        let envelope = TxEnvelope::from(unsigned.into_signed(signature));
        let raw = Bytes::from(envelope.encoded_2718());

        self.request("eth_sendRawTransaction", vec![serde_json::json!(raw)])
            .await
    }
}

impl Chain for RpcChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id: U64 = self.request("eth_chainId", vec![]).await?;
        Ok(id.to::<u64>())
    }

    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        if let Some(signer) = &self.signer {
            return Ok(vec![signer.address()]);
        }
        self.request("eth_accounts", vec![]).await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.request(
            "eth_getBalance",
            vec![serde_json::json!(address), serde_json::json!("latest")],
        )
        .await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let number: U64 = self.request("eth_blockNumber", vec![]).await?;
        Ok(number.to::<u64>())
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, ChainError> {
        let gas: U64 = self.request("eth_estimateGas", vec![tx_json(tx)]).await?;
        Ok(gas.to::<u64>())
    }

    async fn call(&self, tx: &TxRequest) -> Result<Bytes, ChainError> {
        self.request("eth_call", vec![tx_json(tx), serde_json::json!("latest")])
            .await
    }

    async fn send_transaction(&self, tx: &TxRequest, gas_limit: u64) -> Result<B256, ChainError> {
        match &self.signer {
            Some(signer) if signer.address() == tx.from => {
                self.send_signed(signer, tx, gas_limit).await
            }
            _ => {
                let mut object = tx_json(tx);
                object["gas"] = serde_json::json!(U64::from(gas_limit));
                self.request("eth_sendTransaction", vec![object]).await
            }
        }
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .request(
                "eth_getTransactionReceipt",
                vec![serde_json::json!(tx_hash)],
            )
            .await?;
        Ok(receipt.map(Receipt::from))
    }
}
