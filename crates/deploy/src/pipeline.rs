//! The deployment pipeline: provision the price feed, deploy `FundMe`, verify.

use std::collections::BTreeSet;

use alloy_core::primitives::{Address, I256};
use derive_more::Deref;

use crate::{
    ArgValue, ArtifactSource, ConfirmationPolicy, ContractDeployer, DeploymentRecord,
    DeploymentRegistry, NetworkProfile, Result, SkipReason, VerificationOutcome, Verifier,
    chain::Chain,
    contracts::{FUND_ME, MOCK_DECIMALS, MOCK_INITIAL_ANSWER, MOCK_V3_AGGREGATOR},
    provision::resolve_dependency,
};

/// Selects which deployment steps run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum DeployTag {
    /// Every step.
    All,
    /// The mock price feed, on development networks only.
    Mocks,
    /// The `FundMe` contract and its verification.
    #[strum(serialize = "fundme")]
    FundMe,
}

/// The set of steps selected by a list of tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct DeployTags(BTreeSet<DeployTag>);

impl DeployTags {
    pub fn all() -> Self {
        Self::from_iter([DeployTag::All])
    }

    pub fn includes(&self, tag: DeployTag) -> bool {
        self.0.contains(&DeployTag::All) || self.0.contains(&tag)
    }
}

impl FromIterator<DeployTag> for DeployTags {
    fn from_iter<I: IntoIterator<Item = DeployTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// What a pipeline run produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeploySummary {
    pub mock: Option<DeploymentRecord>,
    pub fund_me: Option<DeploymentRecord>,
    pub verification: Option<VerificationOutcome>,
}

/// Runs the deployment steps for one network, in order.
///
/// The network profile is resolved by the caller and passed in; the
/// pipeline never looks up the network on its own.
pub struct Pipeline<'a, C> {
    chain: &'a C,
    profile: &'a NetworkProfile,
    registry: &'a dyn DeploymentRegistry,
    artifacts: &'a dyn ArtifactSource,
    verifier: Option<&'a Verifier>,
    policy: ConfirmationPolicy,
}

impl<'a, C: Chain> Pipeline<'a, C> {
    pub fn new(
        chain: &'a C,
        profile: &'a NetworkProfile,
        registry: &'a dyn DeploymentRegistry,
        artifacts: &'a dyn ArtifactSource,
    ) -> Self {
        Self {
            chain,
            profile,
            registry,
            artifacts,
            verifier: None,
            policy: ConfirmationPolicy::for_profile(profile),
        }
    }

    pub fn verifier(mut self, verifier: &'a Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn deployer(&self) -> ContractDeployer<'a, C> {
        ContractDeployer::new(self.chain, self.profile).with_policy(self.policy)
    }

    /// Run the steps selected by `tags`, deploying from `from`.
    ///
    /// Any failure except a verification failure aborts the run.
    pub async fn run(&self, tags: &DeployTags, from: Address) -> Result<DeploySummary> {
        tracing::info!(
            network = %self.profile.name,
            chain_id = self.profile.chain_id,
            development = self.profile.is_development(),
            deployer = %from,
            "Starting deployment..."
        );

        let mut summary = DeploySummary::default();

        if tags.includes(DeployTag::Mocks) {
            summary.mock = self.deploy_mocks(from).await?;
        }

        if tags.includes(DeployTag::FundMe) {
            let dependency = resolve_dependency(self.profile, self.registry)?;
            let record = self.deploy_fund_me(dependency, from).await?;
            summary.verification = Some(self.verify(&record).await);
            summary.fund_me = Some(record);
        }

        tracing::info!("===================================================================");
        Ok(summary)
    }

    /// Deploy the mock price feed on a development network.
    pub async fn deploy_mocks(&self, from: Address) -> Result<Option<DeploymentRecord>> {
        if !self.profile.is_development() {
            tracing::info!(network = %self.profile.name, "Live network, no mocks to deploy");
            return Ok(None);
        }

        tracing::info!("Local network detected! Deploying mocks...");
        let artifact = self.artifacts.artifact(MOCK_V3_AGGREGATOR)?;
        let args = vec![
            ArgValue::Uint8(MOCK_DECIMALS),
            ArgValue::Int256(I256::try_from(MOCK_INITIAL_ANSWER).map_err(anyhow::Error::msg)?),
        ];

        let record = self.deployer().deploy(&artifact, args, from).await?;
        self.registry.save(&record)?;
        tracing::info!(address = %record.address, "Mocks deployed!");
        Ok(Some(record))
    }

    /// Deploy `FundMe` wired to `dependency` and record it.
    pub async fn deploy_fund_me(
        &self,
        dependency: Address,
        from: Address,
    ) -> Result<DeploymentRecord> {
        let artifact = self.artifacts.artifact(FUND_ME)?;
        tracing::info!(price_feed = %dependency, "Deploying FundMe...");

        let record = self
            .deployer()
            .deploy(&artifact, vec![ArgValue::Address(dependency)], from)
            .await?;
        self.registry.save(&record)?;
        Ok(record)
    }

    async fn verify(&self, record: &DeploymentRecord) -> VerificationOutcome {
        if self.profile.is_development() {
            return VerificationOutcome::Skipped(SkipReason::DevelopmentNetwork);
        }
        match self.verifier {
            Some(verifier) => {
                verifier
                    .verify(
                        self.profile,
                        &record.contract_name,
                        record.address,
                        &record.constructor_args,
                    )
                    .await
            }
            None => VerificationOutcome::Skipped(SkipReason::MissingCredential),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!(DeployTag::from_str("all").unwrap(), DeployTag::All);
        assert_eq!(DeployTag::from_str("mocks").unwrap(), DeployTag::Mocks);
        assert_eq!(DeployTag::from_str("fundme").unwrap(), DeployTag::FundMe);
        assert!(DeployTag::from_str("everything").is_err());
    }

    #[test]
    fn test_all_includes_every_step() {
        let tags = DeployTags::all();
        assert!(tags.includes(DeployTag::Mocks));
        assert!(tags.includes(DeployTag::FundMe));
    }

    #[test]
    fn test_single_tag() {
        let tags = DeployTags::from_iter([DeployTag::FundMe]);
        assert!(tags.includes(DeployTag::FundMe));
        assert!(!tags.includes(DeployTag::Mocks));
    }
}
