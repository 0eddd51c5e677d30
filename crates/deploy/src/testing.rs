//! In-memory development chain.
//!
//! [`DevChain`] implements [`Chain`] without a node. It knows two creation
//! codes, `FundMe` and `MockV3Aggregator`, and executes their calls with the
//! same rules as the Solidity contracts: a minimum contribution of 50 USD at
//! the feed's price, owner-only withdrawals that sweep the balance and clear
//! the funders. Gas is charged at a fixed price so that balance accounting is
//! exact.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes, I256, U256, keccak256},
    sol_types::SolInterface,
};

use crate::{
    Artifact, ChainError,
    chain::{Chain, Receipt, TxRequest},
    contracts::{
        FUND_ME, IAggregatorV3::IAggregatorV3Calls, IFundMe::IFundMeCalls, MOCK_V3_AGGREGATOR,
    },
};

/// Chain id reported by [`DevChain`].
pub const DEV_CHAIN_ID: u64 = crate::network::DEVELOPMENT_CHAIN_ID;
/// Effective gas price of every transaction: 1 gwei.
pub const GAS_PRICE: u128 = 1_000_000_000;
/// Balance of every account at genesis: 10 000 ETH.
pub const INITIAL_BALANCE: U256 = U256::from_limbs([0x19e0c9bab2400000, 0x21e, 0, 0]);

const TRANSFER_GAS: u64 = 21_000;
const CREATE_GAS: u64 = 800_000;
const FUND_GAS: u64 = 90_000;
const WITHDRAW_GAS: u64 = 35_000;
const WITHDRAW_GAS_PER_FUNDER: u64 = 7_500;
const CHEAPER_WITHDRAW_GAS_PER_FUNDER: u64 = 5_000;

const FUND_ME_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x01];
const AGGREGATOR_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x02];

/// The creation code of `FundMe` understood by [`DevChain`].
pub fn fund_me_artifact() -> Artifact {
    Artifact {
        contract_name: FUND_ME.to_string(),
        abi: serde_json::Value::Array(vec![]),
        bytecode: Bytes::from_static(FUND_ME_CODE),
    }
}

/// The creation code of `MockV3Aggregator` understood by [`DevChain`].
pub fn mock_artifact() -> Artifact {
    Artifact {
        contract_name: MOCK_V3_AGGREGATOR.to_string(),
        abi: serde_json::Value::Array(vec![]),
        bytecode: Bytes::from_static(AGGREGATOR_CODE),
    }
}

/// Both artifacts, keyed by contract name.
pub fn artifacts() -> BTreeMap<String, Artifact> {
    BTreeMap::from([
        (FUND_ME.to_string(), fund_me_artifact()),
        (MOCK_V3_AGGREGATOR.to_string(), mock_artifact()),
    ])
}

/// 50 USD with 18 decimals.
fn minimum_usd() -> U256 {
    U256::from(50u64) * U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Debug, Clone)]
struct FundMeState {
    owner: Address,
    price_feed: Address,
    funders: Vec<Address>,
    amounts: HashMap<Address, U256>,
}

#[derive(Debug, Clone)]
enum Contract {
    FundMe(FundMeState),
    Aggregator { decimals: u8, answer: I256 },
}

#[derive(Debug)]
struct Execution {
    gas_used: u64,
    output: Bytes,
    created: Option<Address>,
}

type Revert = Option<String>;

/// A failure returned by the next receipt query instead of the receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptFault {
    /// The node could not be reached. Worth polling again.
    Unreachable,
    /// The node answered with a receipt that does not decode.
    Undecodable,
}

#[derive(Debug, Clone)]
struct State {
    block: u64,
    accounts: Vec<Address>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, Contract>,
    receipts: HashMap<B256, Receipt>,
    pending: Vec<(B256, TxRequest, u64)>,
    mining: bool,
    auto_advance: bool,
    revert_next: bool,
    receipt_faults: VecDeque<ReceiptFault>,
}

impl State {
    fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn credit(&mut self, address: Address, amount: U256) {
        *self.balances.entry(address).or_default() += amount;
    }

    fn debit(&mut self, address: Address, amount: U256) -> Result<(), Revert> {
        let balance = self.balances.entry(address).or_default();
        if *balance < amount {
            return Err(Some("insufficient funds".to_string()));
        }
        *balance -= amount;
        Ok(())
    }

    /// Apply `tx` to the state. On revert the state must be discarded by the caller.
    fn execute(&mut self, tx: &TxRequest) -> Result<Execution, Revert> {
        let nonce = self.nonces.get(&tx.from).copied().unwrap_or_default();

        match tx.to {
            None => {
                let created = tx.from.create(nonce);
                let contract = Self::construct(tx)?;
                self.debit(tx.from, tx.value)?;
                self.credit(created, tx.value);
                self.contracts.insert(created, contract);
                Ok(Execution {
                    gas_used: CREATE_GAS,
                    output: Bytes::new(),
                    created: Some(created),
                })
            }
            Some(to) => match self.contracts.get(&to).cloned() {
                Some(Contract::FundMe(state)) => self.call_fund_me(to, state, tx),
                Some(Contract::Aggregator { decimals, answer }) => {
                    Self::call_aggregator(decimals, answer, tx)
                }
                None => {
                    self.debit(tx.from, tx.value)?;
                    self.credit(to, tx.value);
                    Ok(Execution {
                        gas_used: TRANSFER_GAS,
                        output: Bytes::new(),
                        created: None,
                    })
                }
            },
        }
    }

    fn construct(tx: &TxRequest) -> Result<Contract, Revert> {
        let input = tx.input.as_ref();
        if let Some(args) = input.strip_prefix(FUND_ME_CODE) {
            if args.len() != 32 {
                return Err(Some("FundMe expects one address argument".to_string()));
            }
            return Ok(Contract::FundMe(FundMeState {
                owner: tx.from,
                price_feed: Address::from_slice(&args[12..]),
                funders: Vec::new(),
                amounts: HashMap::new(),
            }));
        }
        if let Some(args) = input.strip_prefix(AGGREGATOR_CODE) {
            if args.len() != 64 {
                return Err(Some("MockV3Aggregator expects (uint8,int256)".to_string()));
            }
            return Ok(Contract::Aggregator {
                decimals: args[31],
                answer: I256::from_raw(U256::from_be_slice(&args[32..])),
            });
        }
        Err(Some("unknown creation code".to_string()))
    }

    fn price(&self, feed: Address) -> Result<U256, Revert> {
        match self.contracts.get(&feed) {
            Some(Contract::Aggregator { answer, .. }) if answer.is_positive() => {
                Ok(answer.into_raw())
            }
            _ => Err(None),
        }
    }

    fn call_fund_me(
        &mut self,
        address: Address,
        mut state: FundMeState,
        tx: &TxRequest,
    ) -> Result<Execution, Revert> {
        let call = IFundMeCalls::abi_decode(&tx.input)
            .map_err(|_| Some("unknown selector".to_string()))?;
        let view = |output: DynSolValue| -> Result<Execution, Revert> {
            Ok(Execution {
                gas_used: TRANSFER_GAS,
                output: output.abi_encode().into(),
                created: None,
            })
        };

        if !tx.value.is_zero() && !matches!(call, IFundMeCalls::fund(_)) {
            return Err(None);
        }

        match call {
            IFundMeCalls::fund(_) => {
                // ETH/USD answer has 8 decimals, scaled to 18.
                let price = self.price(state.price_feed)? * U256::from(10_000_000_000u64);
                let usd = price * tx.value / U256::from(10u64).pow(U256::from(18u64));
                if usd < minimum_usd() {
                    return Err(Some("You need to spend more ETH!".to_string()));
                }

                self.debit(tx.from, tx.value)?;
                self.credit(address, tx.value);
                state.funders.push(tx.from);
                *state.amounts.entry(tx.from).or_default() += tx.value;
                self.contracts.insert(address, Contract::FundMe(state));

                Ok(Execution {
                    gas_used: FUND_GAS,
                    output: Bytes::new(),
                    created: None,
                })
            }
            IFundMeCalls::withdraw(_) => self.sweep(address, state, tx, WITHDRAW_GAS_PER_FUNDER),
            IFundMeCalls::cheaperWithdraw(_) => {
                self.sweep(address, state, tx, CHEAPER_WITHDRAW_GAS_PER_FUNDER)
            }
            IFundMeCalls::s_priceFeed(_) => view(DynSolValue::Address(state.price_feed)),
            IFundMeCalls::i_owner(_) => view(DynSolValue::Address(state.owner)),
            IFundMeCalls::MINIMUM_USD(_) => view(DynSolValue::Uint(minimum_usd(), 256)),
            IFundMeCalls::s_funders(call) => {
                let funder = usize::try_from(call.index)
                    .ok()
                    .and_then(|index| state.funders.get(index).copied())
                    .ok_or(None::<String>)?;
                view(DynSolValue::Address(funder))
            }
            IFundMeCalls::s_addressToAmount(call) => {
                let amount = state.amounts.get(&call.funder).copied().unwrap_or_default();
                view(DynSolValue::Uint(amount, 256))
            }
        }
    }

    /// Owner-only: move the whole balance to the owner and clear every funder.
    fn sweep(
        &mut self,
        address: Address,
        mut state: FundMeState,
        tx: &TxRequest,
        gas_per_funder: u64,
    ) -> Result<Execution, Revert> {
        if tx.from != state.owner {
            return Err(Some("FundMe__NotOwner()".to_string()));
        }
        let gas_used = WITHDRAW_GAS + gas_per_funder * state.funders.len() as u64;

        for funder in std::mem::take(&mut state.funders) {
            state.amounts.insert(funder, U256::ZERO);
        }
        let balance = self.balance(&address);
        self.debit(address, balance)?;
        self.credit(state.owner, balance);
        self.contracts.insert(address, Contract::FundMe(state));

        Ok(Execution {
            gas_used,
            output: Bytes::new(),
            created: None,
        })
    }

    fn call_aggregator(decimals: u8, answer: I256, tx: &TxRequest) -> Result<Execution, Revert> {
        let output = match IAggregatorV3Calls::abi_decode(&tx.input)
            .map_err(|_| Some("unknown selector".to_string()))?
        {
            IAggregatorV3Calls::decimals(_) => DynSolValue::Uint(U256::from(decimals), 8).abi_encode(),
            IAggregatorV3Calls::latestRoundData(_) => DynSolValue::Tuple(vec![
                DynSolValue::Uint(U256::from(1u64), 80),
                DynSolValue::Int(answer, 256),
                DynSolValue::Uint(U256::ZERO, 256),
                DynSolValue::Uint(U256::ZERO, 256),
                DynSolValue::Uint(U256::from(1u64), 80),
            ])
            .abi_encode_params(),
        };

        Ok(Execution {
            gas_used: TRANSFER_GAS,
            output: output.into(),
            created: None,
        })
    }

    /// Include `tx` in a new block, charging gas whatever the outcome.
    fn include(&mut self, tx_hash: B256, tx: &TxRequest, gas_limit: u64) {
        let mut next = self.clone();
        let execution = if std::mem::take(&mut self.revert_next) {
            None
        } else {
            next.execute(tx).ok().filter(|exec| exec.gas_used <= gas_limit)
        };

        let (gas_used, status, contract_address) = match execution {
            Some(exec) => {
                *self = next;
                (exec.gas_used, true, exec.created)
            }
            None => (gas_limit.min(CREATE_GAS), false, None),
        };

        *self.nonces.entry(tx.from).or_default() += 1;
        self.block += 1;

        let fee = U256::from(gas_used) * U256::from(GAS_PRICE);
        let balance = self.balances.entry(tx.from).or_default();
        *balance = balance.saturating_sub(fee);

        self.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                block_number: self.block,
                gas_used,
                effective_gas_price: GAS_PRICE,
                status,
                contract_address,
            },
        );
    }
}

/// In-memory chain with automining, ten funded accounts and the two known contracts.
#[derive(Debug)]
pub struct DevChain {
    state: Mutex<State>,
}

impl Default for DevChain {
    fn default() -> Self {
        Self::new(10)
    }
}

impl DevChain {
    /// A chain with `accounts` accounts holding [`INITIAL_BALANCE`] each.
    pub fn new(accounts: usize) -> Self {
        let accounts: Vec<Address> = (0..accounts)
            .map(|i| {
                let mut bytes = [0u8; 20];
                bytes[0] = 0xac;
                bytes[12..].copy_from_slice(&(i as u64 + 1).to_be_bytes());
                Address::from(bytes)
            })
            .collect();
        let balances = accounts.iter().map(|a| (*a, INITIAL_BALANCE)).collect();

        Self {
            state: Mutex::new(State {
                block: 0,
                accounts,
                balances,
                nonces: HashMap::new(),
                contracts: HashMap::new(),
                receipts: HashMap::new(),
                pending: Vec::new(),
                mining: true,
                auto_advance: false,
                revert_next: false,
                receipt_faults: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, ChainError> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("DevChain state lock poisoned").into())
    }

    /// Stop including transactions. Sent transactions stay pending.
    pub fn pause_mining(&self) {
        if let Ok(mut state) = self.lock() {
            state.mining = false;
        }
    }

    /// Include every pending transaction, then automine again.
    pub fn resume_mining(&self) {
        if let Ok(mut state) = self.lock() {
            state.mining = true;
            for (hash, tx, gas_limit) in std::mem::take(&mut state.pending) {
                state.include(hash, &tx, gas_limit);
            }
        }
    }

    /// Produce an empty block on every `block_number` query.
    pub fn set_auto_advance(&self, enabled: bool) {
        if let Ok(mut state) = self.lock() {
            state.auto_advance = enabled;
        }
    }

    /// Include the next transaction as reverted, as if the state changed after estimation.
    pub fn revert_next_inclusion(&self) {
        if let Ok(mut state) = self.lock() {
            state.revert_next = true;
        }
    }

    /// Fail the next receipt queries with `faults`, in order.
    pub fn inject_receipt_faults(&self, faults: impl IntoIterator<Item = ReceiptFault>) {
        if let Ok(mut state) = self.lock() {
            state.receipt_faults.extend(faults);
        }
    }

    /// Replace the answer of a deployed mock aggregator.
    pub fn set_price(&self, feed: Address, answer: I256) {
        if let Ok(mut state) = self.lock() {
            if let Some(Contract::Aggregator { answer: current, .. }) = state.contracts.get_mut(&feed) {
                *current = answer;
            }
        }
    }
}

impl Chain for DevChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(DEV_CHAIN_ID)
    }

    async fn accounts(&self) -> Result<Vec<Address>, ChainError> {
        Ok(self.lock()?.accounts.clone())
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self.lock()?.balance(&address))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let mut state = self.lock()?;
        if state.auto_advance {
            state.block += 1;
        }
        Ok(state.block)
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, ChainError> {
        let mut scratch = self.lock()?.clone();
        scratch
            .execute(tx)
            .map(|exec| exec.gas_used)
            .map_err(ChainError::Revert)
    }

    async fn call(&self, tx: &TxRequest) -> Result<Bytes, ChainError> {
        let mut scratch = self.lock()?.clone();
        scratch
            .execute(tx)
            .map(|exec| exec.output)
            .map_err(ChainError::Revert)
    }

    async fn send_transaction(&self, tx: &TxRequest, gas_limit: u64) -> Result<B256, ChainError> {
        let mut state = self.lock()?;
        if !state.accounts.contains(&tx.from) {
            return Err(anyhow::anyhow!("unknown account {}", tx.from).into());
        }

        let nonce = state.nonces.get(&tx.from).copied().unwrap_or_default()
            + state.pending.iter().filter(|(_, p, _)| p.from == tx.from).count() as u64;
        let mut preimage = tx.from.to_vec();
        preimage.extend(nonce.to_be_bytes());
        preimage.extend(tx.input.as_ref());
        let tx_hash = keccak256(preimage);

        if state.mining {
            state.include(tx_hash, tx, gas_limit);
        } else {
            state.pending.push((tx_hash, tx.clone(), gas_limit));
        }
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ChainError> {
        let mut state = self.lock()?;
        match state.receipt_faults.pop_front() {
            Some(ReceiptFault::Unreachable) => {
                Err(anyhow::anyhow!("Failed to send eth_getTransactionReceipt request").into())
            }
            Some(ReceiptFault::Undecodable) => Err(ChainError::Decode(anyhow::anyhow!(
                "Failed to deserialize eth_getTransactionReceipt result"
            ))),
            None => Ok(state.receipts.get(&tx_hash).cloned()),
        }
    }
}
