//! End-to-end tests of the deployment pipeline, the scripts and the invariants
//! against the in-memory development chain.
//!
//! Run with: cargo test --test fundme_test

use std::time::Duration;

use alloy_core::primitives::{Address, I256, U256, utils::parse_ether};
use fundme_deploy::{
    Chain, ConfirmationPolicy, DeployTag, DeployTags, DeploymentRecord, DeploymentRegistry, Error,
    FUND_AMOUNT, InvariantChecker, MemoryRegistry, NetworkProfile, NetworksConfig, Pipeline,
    SkipReason, TransactionDriver, TxStatus, VerificationOutcome, Verifier, VerifyConfig,
    WithdrawKind,
    contracts::{FUND_ME, IFundMe, MOCK_V3_AGGREGATOR},
    invariant::{FunderState, read_funders},
    network::SEPOLIA_ETH_USD_FEED,
    scripts,
    testing::{DevChain, artifacts},
    tx::read,
};

/// Test setup: a development chain, a registry and the `hardhat` profile.
struct TestContext {
    chain: DevChain,
    registry: MemoryRegistry,
    profile: NetworkProfile,
    accounts: Vec<Address>,
}

impl TestContext {
    async fn new(network: &str) -> Self {
        let chain = DevChain::default();
        let accounts = chain.accounts().await.unwrap();
        Self {
            chain,
            registry: MemoryRegistry::default(),
            profile: NetworksConfig::default().resolve(network).unwrap(),
            accounts,
        }
    }

    fn deployer(&self) -> Address {
        self.accounts[0]
    }

    fn policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::single(&self.profile)
            .with_timeout(Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(10))
    }

    fn driver(&self) -> TransactionDriver<'_, DevChain> {
        TransactionDriver::new(&self.chain, self.policy())
    }

    /// Run the whole pipeline and return the `FundMe` record.
    async fn deploy(&self) -> DeploymentRecord {
        let artifacts = artifacts();
        let summary = Pipeline::new(&self.chain, &self.profile, &self.registry, &artifacts)
            .policy(self.policy())
            .run(&DeployTags::all(), self.deployer())
            .await
            .unwrap();
        summary.fund_me.unwrap()
    }

    async fn fund(&self, contract: Address, from: Address, value: U256) {
        let outcome = self
            .driver()
            .send(contract, &IFundMe::fundCall {}, value, from)
            .await
            .unwrap();
        assert_eq!(outcome.status, TxStatus::Success);
    }
}

fn send_value() -> U256 {
    parse_ether("0.1").unwrap()
}

#[tokio::test]
async fn test_development_pipeline_wires_the_mock() {
    let ctx = TestContext::new("hardhat").await;
    let artifacts = artifacts();

    let summary = Pipeline::new(&ctx.chain, &ctx.profile, &ctx.registry, &artifacts)
        .policy(ctx.policy())
        .run(&DeployTags::all(), ctx.deployer())
        .await
        .unwrap();

    let mock = summary.mock.unwrap();
    let fund_me = summary.fund_me.unwrap();

    let price_feed = read(&ctx.chain, fund_me.address, &IFundMe::s_priceFeedCall {})
        .await
        .unwrap();
    assert_eq!(price_feed, mock.address);
    assert_ne!(price_feed, Address::ZERO);

    let owner = read(&ctx.chain, fund_me.address, &IFundMe::i_ownerCall {})
        .await
        .unwrap();
    assert_eq!(owner, ctx.deployer());

    // No verifier is configured, the development network still takes precedence.
    assert_eq!(
        summary.verification,
        Some(VerificationOutcome::Skipped(SkipReason::DevelopmentNetwork))
    );

    // Both deployments are recorded for the network.
    let recorded = ctx.registry.get("hardhat", MOCK_V3_AGGREGATOR).unwrap().unwrap();
    assert_eq!(recorded.address, mock.address);
    let recorded = ctx.registry.get("hardhat", FUND_ME).unwrap().unwrap();
    assert_eq!(recorded, fund_me);
}

#[tokio::test]
async fn test_fundme_tag_alone_requires_the_mock() {
    let ctx = TestContext::new("hardhat").await;
    let artifacts = artifacts();

    let err = Pipeline::new(&ctx.chain, &ctx.profile, &ctx.registry, &artifacts)
        .policy(ctx.policy())
        .run(&DeployTags::from_iter([DeployTag::FundMe]), ctx.deployer())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MockNotFound { ref network, .. } if network == "hardhat"));
    assert!(ctx.registry.get("hardhat", FUND_ME).unwrap().is_none());
}

#[tokio::test]
async fn test_mocks_then_fundme_runs() {
    let ctx = TestContext::new("hardhat").await;
    let artifacts = artifacts();
    let pipeline = Pipeline::new(&ctx.chain, &ctx.profile, &ctx.registry, &artifacts)
        .policy(ctx.policy());

    let mocks = pipeline
        .run(&DeployTags::from_iter([DeployTag::Mocks]), ctx.deployer())
        .await
        .unwrap();
    assert!(mocks.fund_me.is_none());

    let fund_me = pipeline
        .run(&DeployTags::from_iter([DeployTag::FundMe]), ctx.deployer())
        .await
        .unwrap();
    assert!(fund_me.mock.is_none());

    let price_feed = read(
        &ctx.chain,
        fund_me.fund_me.unwrap().address,
        &IFundMe::s_priceFeedCall {},
    )
    .await
    .unwrap();
    assert_eq!(price_feed, mocks.mock.unwrap().address);
}

#[tokio::test]
async fn test_live_pipeline_uses_configured_feed() {
    let ctx = TestContext::new("sepolia").await;
    let artifacts = artifacts();
    let verifier = Verifier::new(VerifyConfig::default()).unwrap();

    let summary = Pipeline::new(&ctx.chain, &ctx.profile, &ctx.registry, &artifacts)
        .verifier(&verifier)
        .policy(ctx.policy())
        .run(&DeployTags::all(), ctx.deployer())
        .await
        .unwrap();

    assert!(summary.mock.is_none());
    assert!(ctx.registry.get("sepolia", MOCK_V3_AGGREGATOR).unwrap().is_none());

    let fund_me = summary.fund_me.unwrap();
    let price_feed = read(&ctx.chain, fund_me.address, &IFundMe::s_priceFeedCall {})
        .await
        .unwrap();
    assert_eq!(price_feed, SEPOLIA_ETH_USD_FEED);

    assert_eq!(
        summary.verification,
        Some(VerificationOutcome::Skipped(SkipReason::MissingCredential))
    );
}

#[tokio::test]
async fn test_live_pipeline_without_verifier_lacks_a_credential() {
    let ctx = TestContext::new("sepolia").await;
    let artifacts = artifacts();

    let summary = Pipeline::new(&ctx.chain, &ctx.profile, &ctx.registry, &artifacts)
        .policy(ctx.policy())
        .run(&DeployTags::all(), ctx.deployer())
        .await
        .unwrap();

    assert!(summary.fund_me.is_some());
    assert_eq!(
        summary.verification,
        Some(VerificationOutcome::Skipped(SkipReason::MissingCredential))
    );
}

#[tokio::test]
async fn test_fund_updates_mapping_and_funders() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let funder = ctx.accounts[1];

    ctx.fund(fund_me.address, funder, send_value()).await;

    let amount = read(
        &ctx.chain,
        fund_me.address,
        &IFundMe::s_addressToAmountCall { funder },
    )
    .await
    .unwrap();
    assert_eq!(amount, send_value());

    let first = read(
        &ctx.chain,
        fund_me.address,
        &IFundMe::s_fundersCall { index: U256::ZERO },
    )
    .await
    .unwrap();
    assert_eq!(first, funder);
    assert_eq!(
        ctx.chain.balance(fund_me.address).await.unwrap(),
        send_value()
    );
}

#[tokio::test]
async fn test_fund_below_minimum_is_rejected() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let funder = ctx.accounts[1];

    // 0.01 ETH at 2000 USD is 20 USD.
    let checker = InvariantChecker::new(&ctx.chain, fund_me.address);
    checker
        .rejected_funding(&ctx.driver(), funder, parse_ether("0.01").unwrap(), &[funder])
        .await
        .unwrap();

    let err = ctx
        .driver()
        .send(fund_me.address, &IFundMe::fundCall {}, U256::ZERO, funder)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Reverted { tx_hash: None, .. }));
}

#[tokio::test]
async fn test_minimum_follows_the_feed_price() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let mock = ctx.registry.get("hardhat", MOCK_V3_AGGREGATOR).unwrap().unwrap();
    let funder = ctx.accounts[1];

    // 0.01 ETH at 10 000 USD is 100 USD.
    ctx.chain
        .set_price(mock.address, I256::try_from(10_000_00000000i64).unwrap());
    ctx.fund(fund_me.address, funder, parse_ether("0.01").unwrap())
        .await;
}

#[tokio::test]
async fn test_withdraw_from_single_funder() {
    for kind in [WithdrawKind::Standard, WithdrawKind::Cheaper] {
        let ctx = TestContext::new("hardhat").await;
        let fund_me = ctx.deploy().await;
        let funder = ctx.accounts[1];
        ctx.fund(fund_me.address, funder, send_value()).await;

        let checker = InvariantChecker::new(&ctx.chain, fund_me.address);
        let outcome = checker
            .owner_withdrawal(&ctx.driver(), kind, ctx.deployer(), &[funder])
            .await
            .unwrap();

        assert_eq!(outcome.status, TxStatus::Success);
        assert!(ctx.chain.balance(fund_me.address).await.unwrap().is_zero());
    }
}

#[tokio::test]
async fn test_withdraw_from_multiple_funders() {
    for kind in [WithdrawKind::Standard, WithdrawKind::Cheaper] {
        let ctx = TestContext::new("hardhat").await;
        let fund_me = ctx.deploy().await;
        let funders = &ctx.accounts[1..6];

        for funder in funders {
            ctx.fund(fund_me.address, *funder, send_value()).await;
        }
        assert_eq!(
            ctx.chain.balance(fund_me.address).await.unwrap(),
            send_value() * U256::from(funders.len())
        );

        let checker = InvariantChecker::new(&ctx.chain, fund_me.address);
        checker
            .owner_withdrawal(&ctx.driver(), kind, ctx.deployer(), funders)
            .await
            .unwrap();

        let state = FunderState::read(&ctx.chain, fund_me.address, funders)
            .await
            .unwrap();
        assert!(state.funders.is_empty());
        assert!(state.amounts.values().all(|amount| amount.is_zero()));

        let err = read(
            &ctx.chain,
            fund_me.address,
            &IFundMe::s_fundersCall { index: U256::ZERO },
        )
        .await
        .unwrap_err();
        assert!(err.is_revert());
    }
}

#[tokio::test]
async fn test_withdraw_with_no_funders() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;

    let checker = InvariantChecker::new(&ctx.chain, fund_me.address);
    checker
        .owner_withdrawal(&ctx.driver(), WithdrawKind::Standard, ctx.deployer(), &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_repeated_funding_accumulates() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let funder = ctx.accounts[1];

    ctx.fund(fund_me.address, funder, send_value()).await;
    ctx.fund(fund_me.address, funder, send_value()).await;

    let state = FunderState::read(&ctx.chain, fund_me.address, &[])
        .await
        .unwrap();
    assert_eq!(state.funders, vec![funder, funder]);
    assert_eq!(state.amounts[&funder], send_value() * U256::from(2));
}

#[tokio::test]
async fn test_non_owner_cannot_withdraw() {
    for kind in [WithdrawKind::Standard, WithdrawKind::Cheaper] {
        let ctx = TestContext::new("hardhat").await;
        let fund_me = ctx.deploy().await;
        let funder = ctx.accounts[1];
        let attacker = ctx.accounts[2];
        ctx.fund(fund_me.address, funder, send_value()).await;

        let checker = InvariantChecker::new(&ctx.chain, fund_me.address);
        checker
            .non_owner_withdrawal(&ctx.driver(), kind, attacker, &[funder])
            .await
            .unwrap();

        assert_eq!(
            ctx.chain.balance(fund_me.address).await.unwrap(),
            send_value()
        );
        assert_eq!(
            read_funders(&ctx.chain, fund_me.address).await.unwrap(),
            vec![funder]
        );
    }
}

#[tokio::test]
async fn test_fund_and_withdraw_scripts() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let driver = ctx.driver();

    scripts::fund(&driver, &ctx.registry, &ctx.profile, ctx.deployer(), FUND_AMOUNT)
        .await
        .unwrap();

    let status = scripts::status(&ctx.chain, &ctx.registry, &ctx.profile)
        .await
        .unwrap();
    assert_eq!(status.address, fund_me.address);
    assert_eq!(status.owner, ctx.deployer());
    assert_eq!(status.balance, FUND_AMOUNT);
    assert_eq!(status.funders.funders, vec![ctx.deployer()]);

    scripts::withdraw(
        &driver,
        &ctx.registry,
        &ctx.profile,
        ctx.deployer(),
        WithdrawKind::Cheaper,
    )
    .await
    .unwrap();

    let status = scripts::status(&ctx.chain, &ctx.registry, &ctx.profile)
        .await
        .unwrap();
    assert!(status.balance.is_zero());
    assert!(status.funders.funders.is_empty());
}

#[tokio::test]
async fn test_scripts_require_a_deployment() {
    let ctx = TestContext::new("hardhat").await;

    let err = scripts::fund(
        &ctx.driver(),
        &ctx.registry,
        &ctx.profile,
        ctx.deployer(),
        FUND_AMOUNT,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("not deployed"));
}

#[tokio::test]
async fn test_unconfirmed_call_times_out() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let funder = ctx.accounts[1];
    ctx.chain.pause_mining();

    let err = ctx
        .driver()
        .send(fund_me.address, &IFundMe::fundCall {}, send_value(), funder)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    // The transaction is only pending: nothing was resubmitted.
    ctx.chain.resume_mining();
    assert_eq!(
        read_funders(&ctx.chain, fund_me.address).await.unwrap(),
        vec![funder]
    );
}

#[tokio::test]
async fn test_reverted_inclusion_reports_the_hash() {
    let ctx = TestContext::new("hardhat").await;
    let fund_me = ctx.deploy().await;
    let funder = ctx.accounts[1];
    ctx.chain.revert_next_inclusion();

    let err = ctx
        .driver()
        .send(fund_me.address, &IFundMe::fundCall {}, send_value(), funder)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Reverted { tx_hash: Some(_), .. }));
    assert!(ctx.chain.balance(fund_me.address).await.unwrap().is_zero());
}
