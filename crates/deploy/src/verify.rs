//! Source verification on an Etherscan-compatible explorer.
//!
//! Verification is best effort: every failure ends up in
//! [`VerificationOutcome::Failed`] and is only logged.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ArgValue, Error, NetworkProfile, Result, artifact::encode_args};

/// Default Etherscan API endpoint (multichain, selected with `chainid`).
pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Configuration of the verification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Explorer API endpoint.
    pub api_url: Url,
    /// API key. Verification is skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Path to the flattened source of the contract.
    pub source_path: PathBuf,
    /// Solidity compiler version, as the explorer expects it (`v0.8.8+commit.dddeac2f`).
    pub compiler_version: String,
    /// Optimizer runs, `None` if the optimizer was disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer_runs: Option<u32>,
    /// How many times to poll the verification status.
    pub status_attempts: u32,
    /// Seconds between two status polls.
    pub status_interval: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            api_key: None,
            source_path: PathBuf::from("contracts/FundMe.sol"),
            compiler_version: "v0.8.8+commit.dddeac2f".to_string(),
            optimizer_runs: None,
            status_attempts: 10,
            status_interval: 5,
        }
    }
}

/// Why verification was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    DevelopmentNetwork,
    MissingCredential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The explorer accepted and verified the source.
    Submitted { guid: String },
    /// Verification was not attempted. No I/O was performed.
    Skipped(SkipReason),
    /// The explorer rejected the submission or could not be reached.
    Failed { reason: String },
}

/// Explorer API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

impl ApiResponse {
    fn into_result(self) -> Result<String> {
        if self.status == "1" {
            Ok(self.result)
        } else {
            Err(Error::VerificationFailed(format!(
                "{} ({})",
                self.result, self.message
            )))
        }
    }
}

/// Submits contract sources to the explorer.
#[derive(Debug, Clone)]
pub struct Verifier {
    client: reqwest::Client,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(config: VerifyConfig) -> Result<Self> {
        Ok(Self {
            client: crate::rpc::create_client()?,
            config,
        })
    }

    /// Whether verification would be attempted on this network.
    pub fn precondition(&self, profile: &NetworkProfile) -> std::result::Result<&str, SkipReason> {
        if profile.is_development() {
            return Err(SkipReason::DevelopmentNetwork);
        }
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(SkipReason::MissingCredential)
    }

    /// Verify `contract_name` at `address`, deployed with `args`.
    pub async fn verify(
        &self,
        profile: &NetworkProfile,
        contract_name: &str,
        address: Address,
        args: &[ArgValue],
    ) -> VerificationOutcome {
        let api_key = match self.precondition(profile) {
            Ok(key) => key,
            Err(reason) => {
                tracing::info!(network = %profile.name, %reason, "Skipping verification");
                return VerificationOutcome::Skipped(reason);
            }
        };

        tracing::info!(%address, contract = contract_name, "Verifying contract...");

        match self
            .submit(profile, api_key, contract_name, address, args)
            .await
        {
            Ok(guid) => {
                tracing::info!(%address, guid = %guid, "Contract verified");
                VerificationOutcome::Submitted { guid }
            }
            Err(e) => {
                tracing::warn!(%address, error = %e, "Verification failed, continuing");
                VerificationOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn submit(
        &self,
        profile: &NetworkProfile,
        api_key: &str,
        contract_name: &str,
        address: Address,
        args: &[ArgValue],
    ) -> Result<String> {
        let source = tokio::fs::read_to_string(&self.config.source_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read contract source {}",
                    self.config.source_path.display()
                )
            })?;

        let chain_id = profile.chain_id.to_string();
        let address = address.to_string();
        let constructor_args = hex::encode(encode_args(args));
        let optimization_used = if self.config.optimizer_runs.is_some() { "1" } else { "0" };
        let runs = self.config.optimizer_runs.unwrap_or(200).to_string();

        let form = [
            ("chainid", chain_id.as_str()),
            ("apikey", api_key),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", "solidity-single-file"),
            ("contractname", contract_name),
            ("compilerversion", self.config.compiler_version.as_str()),
            ("optimizationUsed", optimization_used),
            ("runs", runs.as_str()),
            // Misspelled on the explorer side.
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: ApiResponse = self
            .client
            .post(self.config.api_url.clone())
            .form(&form)
            .send()
            .await
            .context("Failed to reach verification service")?
            .json()
            .await
            .context("Failed to parse verification response")?;
        let guid = response.into_result()?;

        self.wait_for_status(&chain_id, api_key, &guid).await?;
        Ok(guid)
    }

    async fn wait_for_status(&self, chain_id: &str, api_key: &str, guid: &str) -> Result<()> {
        let interval = Duration::from_secs(self.config.status_interval);

        for attempt in 1..=self.config.status_attempts {
            tokio::time::sleep(interval).await;

            let response: ApiResponse = self
                .client
                .get(self.config.api_url.clone())
                .query(&[
                    ("chainid", chain_id),
                    ("apikey", api_key),
                    ("module", "contract"),
                    ("action", "checkverifystatus"),
                    ("guid", guid),
                ])
                .send()
                .await
                .context("Failed to reach verification service")?
                .json()
                .await
                .context("Failed to parse verification status")?;

            match classify_status(&response) {
                VerifyStatus::Verified => return Ok(()),
                VerifyStatus::Pending => {
                    tracing::debug!(guid, attempt, result = %response.result, "Verification pending");
                }
                VerifyStatus::Rejected => {
                    return Err(Error::VerificationFailed(response.result));
                }
            }
        }

        Err(Error::VerificationFailed(format!(
            "verification {} still pending after {} attempts",
            guid, self.config.status_attempts
        )))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum VerifyStatus {
    Verified,
    Pending,
    Rejected,
}

fn classify_status(response: &ApiResponse) -> VerifyStatus {
    if response.status == "1" {
        return VerifyStatus::Verified;
    }
    if response.result.to_lowercase().contains("pending") {
        VerifyStatus::Pending
    } else {
        VerifyStatus::Rejected
    }
}
