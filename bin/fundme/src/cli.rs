use std::path::PathBuf;

use alloy_core::primitives::{U256, utils::parse_ether};
use clap::{Parser, Subcommand};
use fundme_deploy::{CONFIG_FILENAME, DeployTag};
use tracing::level_filters::LevelFilter;

/// The network used when none is given.
const DEFAULT_NETWORK: &str = "localhost";

#[derive(Parser)]
#[command(name = "fundme")]
#[command(author, version, about = "Deploy, fund and withdraw the FundMe contract")]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "FUNDME_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// The target network, as named in the configuration.
    ///
    /// `hardhat`, `localhost` and `anvil` are development networks: a mock
    /// price feed is deployed there. `sepolia` and `mainnet` use the Chainlink
    /// ETH/USD aggregator.
    #[arg(short, long, env = "FUNDME_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    /// Path to the configuration file. Built-in defaults are used if it does not exist.
    #[arg(long, alias = "conf", env = "FUNDME_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the price feed mock (development networks) and FundMe, then verify.
    Deploy {
        /// Deployment steps to run: all, mocks, fundme.
        #[arg(long, value_delimiter = ',', default_value = "all")]
        tags: Vec<DeployTag>,
    },

    /// Fund the deployed contract from the first account.
    Fund {
        /// Amount in ETH.
        #[arg(long, default_value = "0.05", value_parser = parse_eth)]
        value: U256,
    },

    /// Withdraw every contribution to the owner.
    Withdraw {
        /// Use `cheaperWithdraw` instead of `withdraw`.
        #[arg(long)]
        cheaper: bool,
    },

    /// Print the deployed contract, its balance and its funders.
    Status,

    /// Write the built-in configuration to the `--config` path.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn parse_eth(value: &str) -> Result<U256, String> {
    parse_ether(value).map_err(|e| format!("invalid ETH amount '{value}': {e}"))
}
