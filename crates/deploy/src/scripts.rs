//! Operator actions against an already deployed `FundMe`.

use std::fmt;

use alloy_core::primitives::{Address, U256, utils::format_ether};
use comfy_table::{Table, presets::UTF8_FULL};

use crate::{
    DeploymentRecord, DeploymentRegistry, NetworkProfile, Result, TransactionDriver,
    TransactionOutcome,
    chain::Chain,
    contracts::{FUND_ME, IFundMe},
    invariant::FunderState,
    tx::read,
};

/// Value attached by the `fund` script: 0.05 ETH.
pub const FUND_AMOUNT: U256 = U256::from_limbs([50_000_000_000_000_000, 0, 0, 0]);

/// The two withdrawal entry points of `FundMe`.
///
/// Both must satisfy the same conservation and state-clearing invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum WithdrawKind {
    Standard,
    Cheaper,
}

impl WithdrawKind {
    pub async fn send<C: Chain>(
        self,
        driver: &TransactionDriver<'_, C>,
        contract: Address,
        from: Address,
    ) -> Result<TransactionOutcome> {
        match self {
            Self::Standard => {
                driver
                    .send(contract, &IFundMe::withdrawCall {}, U256::ZERO, from)
                    .await
            }
            Self::Cheaper => {
                driver
                    .send(contract, &IFundMe::cheaperWithdrawCall {}, U256::ZERO, from)
                    .await
            }
        }
    }
}

/// The `FundMe` deployment of `profile`'s network.
pub fn deployed_fund_me(
    registry: &dyn DeploymentRegistry,
    profile: &NetworkProfile,
) -> Result<DeploymentRecord> {
    let record = registry.get(&profile.name, FUND_ME)?.ok_or_else(|| {
        anyhow::anyhow!(
            "{} is not deployed on network '{}', run `fundme deploy` first",
            FUND_ME,
            profile.name
        )
    })?;
    Ok(record)
}

/// Fund the deployed contract with `value` wei from `from`.
pub async fn fund<C: Chain>(
    driver: &TransactionDriver<'_, C>,
    registry: &dyn DeploymentRegistry,
    profile: &NetworkProfile,
    from: Address,
    value: U256,
) -> Result<TransactionOutcome> {
    let fund_me = deployed_fund_me(registry, profile)?;
    tracing::info!(contract = %fund_me.address, value = %format_ether(value), "Funding contract...");

    driver
        .send(fund_me.address, &IFundMe::fundCall {}, value, from)
        .await
}

/// Sweep the contract balance to the owner.
pub async fn withdraw<C: Chain>(
    driver: &TransactionDriver<'_, C>,
    registry: &dyn DeploymentRegistry,
    profile: &NetworkProfile,
    from: Address,
    kind: WithdrawKind,
) -> Result<TransactionOutcome> {
    let fund_me = deployed_fund_me(registry, profile)?;
    tracing::info!(contract = %fund_me.address, %kind, "Withdrawing...");

    kind.send(driver, fund_me.address, from).await
}

/// Read-only view of the deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractStatus {
    pub network: String,
    pub address: Address,
    pub owner: Address,
    pub price_feed: Address,
    pub balance: U256,
    pub funders: FunderState,
}

pub async fn status<C: Chain>(
    chain: &C,
    registry: &dyn DeploymentRegistry,
    profile: &NetworkProfile,
) -> Result<ContractStatus> {
    let fund_me = deployed_fund_me(registry, profile)?;
    let address = fund_me.address;

    let balance = chain
        .balance(address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read contract balance: {}", e))?;

    Ok(ContractStatus {
        network: profile.name.clone(),
        address,
        owner: read(chain, address, &IFundMe::i_ownerCall {}).await?,
        price_feed: read(chain, address, &IFundMe::s_priceFeedCall {}).await?,
        balance,
        funders: FunderState::read(chain, address, &[]).await?,
    })
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FundMe on {}", self.network)?;
        writeln!(f, "  Address:    {}", self.address)?;
        writeln!(f, "  Owner:      {}", self.owner)?;
        writeln!(f, "  Price feed: {}", self.price_feed)?;
        writeln!(f, "  Balance:    {} ETH", format_ether(self.balance))?;

        if self.funders.funders.is_empty() {
            return writeln!(f, "  No funders");
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["#", "Funder", "Amount (ETH)"]);
        for (index, funder) in self.funders.funders.iter().enumerate() {
            let amount = self
                .funders
                .amounts
                .get(funder)
                .copied()
                .unwrap_or_default();
            table.add_row(vec![
                index.to_string(),
                funder.to_string(),
                format_ether(amount),
            ]);
        }
        write!(f, "{table}")
    }
}
