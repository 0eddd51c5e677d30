//! fundme is a CLI tool to deploy the FundMe contract and drive its funding and withdrawals.

mod cli;

use alloy_core::primitives::{Address, utils::format_ether};
use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use fundme_deploy::{
    Chain, ConfirmationPolicy, Config, DeployTags, NetworkProfile, Pipeline, RpcChain,
    TransactionDriver, VerificationOutcome, Verifier, WithdrawKind, scripts,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = Config::load(&cli.config)?;
    let registry = config.registry();

    match cli.command {
        Command::Deploy { tags } => {
            let (profile, chain, from) = connect(&config, &cli.network).await?;
            let artifacts = config.artifacts();
            let verifier = Verifier::new(config.verify.clone())?;
            let tags = if tags.is_empty() {
                DeployTags::all()
            } else {
                tags.into_iter().collect()
            };

            let summary = Pipeline::new(&chain, &profile, &registry, &artifacts)
                .verifier(&verifier)
                .run(&tags, from)
                .await?;

            if let Some(mock) = &summary.mock {
                println!("MockV3Aggregator deployed at {}", mock.address);
            }
            if let Some(fund_me) = &summary.fund_me {
                println!("FundMe deployed at {}", fund_me.address);
            }
            match summary.verification {
                Some(VerificationOutcome::Submitted { guid }) => println!("Verified ({guid})"),
                Some(VerificationOutcome::Skipped(reason)) => {
                    println!("Verification skipped: {reason}")
                }
                Some(VerificationOutcome::Failed { reason }) => {
                    println!("Verification failed: {reason}")
                }
                None => {}
            }
        }
        Command::Fund { value } => {
            let (profile, chain, from) = connect(&config, &cli.network).await?;
            let driver = TransactionDriver::new(&chain, ConfirmationPolicy::single(&profile));
            println!("Funding Contract...");
            let outcome = scripts::fund(&driver, &registry, &profile, from, value).await?;
            tracing::debug!(tx_hash = %outcome.tx_hash, gas_used = outcome.gas_used, "Fund confirmed");
            println!("Funded {} ETH", format_ether(value));
        }
        Command::Withdraw { cheaper } => {
            let (profile, chain, from) = connect(&config, &cli.network).await?;
            let driver = TransactionDriver::new(&chain, ConfirmationPolicy::single(&profile));
            let kind = if cheaper {
                WithdrawKind::Cheaper
            } else {
                WithdrawKind::Standard
            };
            println!("Withdrawing...");
            let outcome = scripts::withdraw(&driver, &registry, &profile, from, kind).await?;
            tracing::debug!(tx_hash = %outcome.tx_hash, gas_used = outcome.gas_used, "Withdrawal confirmed");
            println!("Withdrawal successful!");
        }
        Command::Status => {
            let (profile, chain, _) = connect(&config, &cli.network).await?;
            let status = scripts::status(&chain, &registry, &profile).await?;
            print!("{status}");
        }
        Command::Init { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists, pass --force to overwrite it",
                    cli.config.display()
                );
            }
            Config::default().save_to_file(&cli.config)?;
            println!("Configuration written to {}", cli.config.display());
        }
    }

    Ok(())
}

/// Resolve `network`, check the node serves the expected chain and pick the sending account.
async fn connect(config: &Config, network: &str) -> Result<(NetworkProfile, RpcChain, Address)> {
    let profile = config.networks.resolve(network)?;
    let chain = config.chain(&profile)?;

    let chain_id = chain
        .chain_id()
        .await
        .with_context(|| format!("Failed to reach {}", chain.url()))?;
    if chain_id != profile.chain_id {
        anyhow::bail!(
            "Node at {} reports chain id {}, network '{}' expects {}",
            chain.url(),
            chain_id,
            profile.name,
            profile.chain_id
        );
    }

    let accounts = chain.accounts().await.context("Failed to list accounts")?;
    let from = accounts.first().copied().with_context(|| {
        format!(
            "No account available on '{}', set PRIVATE_KEY or unlock an account",
            profile.name
        )
    })?;

    tracing::info!(
        network = %profile.name,
        chain_id = profile.chain_id,
        rpc_url = %chain.url(),
        account = %from,
        "Connected"
    );

    Ok((profile, chain, from))
}
