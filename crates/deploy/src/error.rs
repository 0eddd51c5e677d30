//! Error kinds surfaced by the deployment pipeline and the transaction driver.

use alloy_core::primitives::{Address, B256};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the deployment pipeline, the scripts and the transaction driver.
///
/// Every variant except [`Error::VerificationFailed`] aborts the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network identifier has no configured profile.
    #[error("unknown network '{0}'")]
    UnknownNetwork(String),

    /// A live network has no price feed address configured.
    #[error("network '{0}' has no price feed address configured")]
    MissingDependencyAddress(String),

    /// The mock price feed has not been deployed on this development network.
    #[error("mock '{name}' not found in the deployments of network '{network}'")]
    MockNotFound { name: String, network: String },

    /// The contract creation transaction reverted.
    #[error("deployment of {contract} reverted{}", fmt_reason(.reason))]
    DeploymentReverted {
        contract: String,
        tx_hash: Option<B256>,
        reason: Option<String>,
    },

    /// The creation transaction did not reach the required confirmations in time.
    #[error("deployment transaction {tx_hash} did not reach {confirmations} confirmation(s) in time")]
    ConfirmationTimeout { tx_hash: B256, confirmations: u64 },

    /// A state-changing call was rejected by the chain.
    #[error("call {method} on {contract} reverted{}", fmt_reason(.reason))]
    Reverted {
        contract: Address,
        method: &'static str,
        tx_hash: Option<B256>,
        reason: Option<String>,
    },

    /// A state-changing call was not included within the confirmation window.
    #[error("transaction {tx_hash} was not confirmed in time")]
    Timeout { tx_hash: B256 },

    /// Source verification did not go through. Never aborts a deployment.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fmt_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl Error {
    /// Whether this error is a chain-level revert, either of a call or of a creation.
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted { .. } | Self::DeploymentReverted { .. })
    }
}

/// Error returned at the chain seam.
///
/// Reverts are kept apart from transport failures so that callers can map
/// them to [`Error::Reverted`] or [`Error::DeploymentReverted`].
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("execution reverted{}", fmt_reason(.0))]
    Revert(Option<String>),
    /// The node answered, but with something this client cannot decode.
    /// Asking again will not help.
    #[error(transparent)]
    Decode(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason() {
        let err = Error::Reverted {
            contract: Address::ZERO,
            method: "withdraw()",
            tx_hash: None,
            reason: Some("FundMe__NotOwner".to_string()),
        };
        assert!(err.to_string().ends_with("reverted: FundMe__NotOwner"));
        assert!(err.is_revert());
    }

    #[test]
    fn test_display_without_reason() {
        let err = ChainError::Revert(None);
        assert_eq!(err.to_string(), "execution reverted");
    }
}
