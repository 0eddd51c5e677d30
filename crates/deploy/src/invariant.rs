//! Balance and funder-state invariants of `FundMe`.
//!
//! Each check captures the state before acting through the
//! [`TransactionDriver`], captures it again afterwards and compares:
//!
//! - an owner withdrawal empties the contract and conserves value:
//!   `contract_before + owner_before == owner_after + gas_cost`;
//! - it also clears the funder list and every recorded amount;
//! - a rejected call (non-owner withdrawal, under-minimum funding) reverts and
//!   leaves balances and funder state untouched.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, U256};

use crate::{
    Error, Result, TransactionDriver, TransactionOutcome, WithdrawKind,
    chain::Chain,
    contracts::IFundMe,
    tx::read,
};

/// Native balance of an address at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub address: Address,
    pub amount: U256,
}

impl BalanceSnapshot {
    pub async fn take<C: Chain>(chain: &C, address: Address) -> Result<Self> {
        let amount = chain
            .balance(address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read balance of {}: {}", address, e))?;
        Ok(Self { address, amount })
    }
}

/// The funder list of the contract and the recorded amounts of watched addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunderState {
    pub funders: Vec<Address>,
    pub amounts: BTreeMap<Address, U256>,
}

impl FunderState {
    /// Read the whole funder list plus the amount of every funder and every
    /// address in `watched`.
    pub async fn read<C: Chain>(chain: &C, contract: Address, watched: &[Address]) -> Result<Self> {
        let funders = read_funders(chain, contract).await?;

        let mut amounts = BTreeMap::new();
        for address in funders.iter().chain(watched) {
            if amounts.contains_key(address) {
                continue;
            }
            let amount = read(
                chain,
                contract,
                &IFundMe::s_addressToAmountCall { funder: *address },
            )
            .await?;
            amounts.insert(*address, amount);
        }

        Ok(Self { funders, amounts })
    }
}

/// Read `s_funders` until the index runs past the end of the array.
pub async fn read_funders<C: Chain>(chain: &C, contract: Address) -> Result<Vec<Address>> {
    let mut funders = Vec::new();
    loop {
        let call = IFundMe::s_fundersCall {
            index: U256::from(funders.len()),
        };
        match read(chain, contract, &call).await {
            Ok(funder) => funders.push(funder),
            Err(Error::Reverted { .. }) => return Ok(funders),
            Err(e) => return Err(e),
        }
    }
}

/// Everything an invariant compares, captured at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    pub contract: BalanceSnapshot,
    pub account: BalanceSnapshot,
    pub funders: FunderState,
}

/// A broken invariant, or a failure while checking one.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("contract still holds {0} wei after withdrawal")]
    ContractNotEmpty(U256),

    #[error("value not conserved: contract + owner before = {before}, owner after + gas = {after}")]
    NotConserved { before: U256, after: U256 },

    #[error("funder list not cleared: {0:?}")]
    FundersNotCleared(Vec<Address>),

    #[error("funder {funder} still has {amount} wei recorded")]
    AmountNotReset { funder: Address, amount: U256 },

    #[error("expected the call to revert, but it was confirmed")]
    NotReverted,

    #[error("rejected call changed state: before {before:?}, after {after:?}")]
    StateChanged {
        before: Box<ContractState>,
        after: Box<ContractState>,
    },

    #[error(transparent)]
    Call(#[from] Error),
}

/// Runs invariant checks against one deployed `FundMe`.
#[derive(Debug)]
pub struct InvariantChecker<'a, C> {
    chain: &'a C,
    contract: Address,
}

impl<'a, C: Chain> InvariantChecker<'a, C> {
    pub fn new(chain: &'a C, contract: Address) -> Self {
        Self { chain, contract }
    }

    pub async fn capture(&self, account: Address, watched: &[Address]) -> Result<ContractState> {
        Ok(ContractState {
            contract: BalanceSnapshot::take(self.chain, self.contract).await?,
            account: BalanceSnapshot::take(self.chain, account).await?,
            funders: FunderState::read(self.chain, self.contract, watched).await?,
        })
    }

    /// Withdraw as `owner` and check emptiness, conservation and state clearing.
    pub async fn owner_withdrawal(
        &self,
        driver: &TransactionDriver<'_, C>,
        kind: WithdrawKind,
        owner: Address,
        watched: &[Address],
    ) -> Result<TransactionOutcome, CheckError> {
        let pre = self.capture(owner, watched).await?;
        let outcome = kind.send(driver, self.contract, owner).await?;
        let post = self.capture(owner, watched).await?;

        check_withdrawal(&pre, &post, &outcome)?;
        Ok(outcome)
    }

    /// Withdraw as a non-owner and check the call reverts without side effects.
    pub async fn non_owner_withdrawal(
        &self,
        driver: &TransactionDriver<'_, C>,
        kind: WithdrawKind,
        account: Address,
        watched: &[Address],
    ) -> Result<(), CheckError> {
        let pre = self.capture(account, watched).await?;
        let result = kind.send(driver, self.contract, account).await;
        let post = self.capture(account, watched).await?;

        check_rejected(pre, post, result)
    }

    /// Fund with `value` and check the call reverts without side effects.
    pub async fn rejected_funding(
        &self,
        driver: &TransactionDriver<'_, C>,
        account: Address,
        value: U256,
        watched: &[Address],
    ) -> Result<(), CheckError> {
        let pre = self.capture(account, watched).await?;
        let result = driver
            .send(self.contract, &IFundMe::fundCall {}, value, account)
            .await;
        let post = self.capture(account, watched).await?;

        check_rejected(pre, post, result)
    }
}

/// Check a successful owner withdrawal.
pub fn check_withdrawal(
    pre: &ContractState,
    post: &ContractState,
    outcome: &TransactionOutcome,
) -> Result<(), CheckError> {
    if !post.contract.amount.is_zero() {
        return Err(CheckError::ContractNotEmpty(post.contract.amount));
    }

    let before = pre.contract.amount + pre.account.amount;
    let after = post.account.amount + outcome.gas_cost();
    if before != after {
        return Err(CheckError::NotConserved { before, after });
    }

    if !post.funders.funders.is_empty() {
        return Err(CheckError::FundersNotCleared(post.funders.funders.clone()));
    }

    for funder in pre.funders.amounts.keys() {
        let amount = post
            .funders
            .amounts
            .get(funder)
            .copied()
            .unwrap_or_default();
        if !amount.is_zero() {
            return Err(CheckError::AmountNotReset {
                funder: *funder,
                amount,
            });
        }
    }

    Ok(())
}

/// Check that a call reverted and that nothing observable changed.
pub fn check_rejected(
    pre: ContractState,
    post: ContractState,
    result: Result<TransactionOutcome>,
) -> Result<(), CheckError> {
    match result {
        Err(Error::Reverted { .. }) => {}
        Err(e) => return Err(CheckError::Call(e)),
        Ok(_) => return Err(CheckError::NotReverted),
    }

    if pre != post {
        return Err(CheckError::StateChanged {
            before: Box::new(pre),
            after: Box::new(post),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::B256;

    use super::*;
    use crate::TxStatus;

    const CONTRACT: Address = Address::repeat_byte(0xc0);
    const OWNER: Address = Address::repeat_byte(0x01);
    const FUNDER: Address = Address::repeat_byte(0x02);

    fn state(contract: u64, account: u64, funders: &[(Address, u64)]) -> ContractState {
        ContractState {
            contract: BalanceSnapshot {
                address: CONTRACT,
                amount: U256::from(contract),
            },
            account: BalanceSnapshot {
                address: OWNER,
                amount: U256::from(account),
            },
            funders: FunderState {
                funders: funders.iter().map(|(a, _)| *a).collect(),
                amounts: funders.iter().map(|(a, v)| (*a, U256::from(*v))).collect(),
            },
        }
    }

    fn outcome(gas_used: u64, price: u128) -> TransactionOutcome {
        TransactionOutcome {
            tx_hash: B256::ZERO,
            block_number: 1,
            gas_used,
            effective_gas_price: price,
            status: TxStatus::Success,
        }
    }

    #[test]
    fn test_conserving_withdrawal_passes() {
        let pre = state(100, 1_000, &[(FUNDER, 100)]);
        let mut post = state(0, 1_090, &[]);
        post.funders.amounts.insert(FUNDER, U256::ZERO);

        check_withdrawal(&pre, &post, &outcome(5, 2)).unwrap();
    }

    #[test]
    fn test_non_conserving_withdrawal_fails() {
        let pre = state(100, 1_000, &[]);
        let post = state(0, 1_095, &[]);

        let err = check_withdrawal(&pre, &post, &outcome(5, 2)).unwrap_err();
        assert!(matches!(err, CheckError::NotConserved { .. }));
    }

    #[test]
    fn test_leftover_balance_fails() {
        let pre = state(100, 1_000, &[]);
        let post = state(1, 1_089, &[]);

        let err = check_withdrawal(&pre, &post, &outcome(5, 2)).unwrap_err();
        assert!(matches!(err, CheckError::ContractNotEmpty(amount) if amount == U256::from(1)));
    }

    #[test]
    fn test_uncleared_amount_fails() {
        let pre = state(100, 1_000, &[(FUNDER, 100)]);
        let mut post = state(0, 1_090, &[]);
        post.funders.amounts.insert(FUNDER, U256::from(100));

        let err = check_withdrawal(&pre, &post, &outcome(5, 2)).unwrap_err();
        assert!(matches!(err, CheckError::AmountNotReset { funder, .. } if funder == FUNDER));
    }

    #[test]
    fn test_rejected_requires_revert() {
        let pre = state(100, 1_000, &[]);
        let err = check_rejected(pre.clone(), pre, Ok(outcome(1, 1))).unwrap_err();
        assert!(matches!(err, CheckError::NotReverted));
    }

    #[test]
    fn test_rejected_requires_unchanged_state() {
        let pre = state(100, 1_000, &[(FUNDER, 100)]);
        let post = state(100, 999, &[(FUNDER, 100)]);
        let reverted = Err(Error::Reverted {
            contract: CONTRACT,
            method: "withdraw()",
            tx_hash: None,
            reason: None,
        });

        let err = check_rejected(pre, post, reverted).unwrap_err();
        assert!(matches!(err, CheckError::StateChanged { .. }));
    }
}
