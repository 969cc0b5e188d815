//! In-process ledger implementing [`ChainClient`].
//!
//! Models the stablecoin and the settlement contract closely enough to run
//! the payment and sponsorship flows without a node: transfers, approvals,
//! allowance deposits and spends all move balances, and insufficient funds
//! produce reverted receipts. Failures can be injected per call kind.

use std::collections::{HashMap, VecDeque};

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChainClient, Contracts, TxReceipt};
use crate::error::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Transfer,
    Approve,
    DepositAllowance,
    SpendFrom,
}

/// A write that reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedCall {
    Transfer {
        from: Address,
        to: Address,
        amount: U256,
    },
    Approve {
        owner: Address,
        spender: Address,
        amount: U256,
    },
    DepositAllowance {
        sponsor: Address,
        beneficiary: Address,
        amount: U256,
    },
    SpendFrom {
        beneficiary: Address,
        sponsor: Address,
        recipient: Address,
        amount: U256,
    },
}

#[derive(Default)]
struct Ledger {
    decimals: Option<u8>,
    balances: HashMap<Address, U256>,
    /// ERC-20 approvals keyed by (owner, spender)
    token_allowances: HashMap<(Address, Address), U256>,
    /// Settlement allowances keyed by (beneficiary, sponsor)
    sponsor_allowances: HashMap<(Address, Address), U256>,
    /// AllowanceDeposited events: (sponsor, beneficiary, amount)
    deposits: Vec<(Address, Address, U256)>,
    submitted: Vec<SubmittedCall>,
    receipts: HashMap<TxHash, TxReceipt>,
    block: u64,
    balance_reads: usize,
    allowance_reads: usize,
    submit_failures: HashMap<CallKind, VecDeque<ChainError>>,
    receipt_failures: VecDeque<ChainError>,
    read_failure: Option<ChainError>,
}

impl Ledger {
    fn balance(&self, addr: &Address) -> U256 {
        self.balances.get(addr).copied().unwrap_or(U256::ZERO)
    }

    fn move_tokens(&mut self, from: Address, to: Address, amount: U256) -> bool {
        let available = self.balance(&from);
        if available < amount {
            return false;
        }
        self.balances.insert(from, available - amount);
        let credited = self.balance(&to).saturating_add(amount);
        self.balances.insert(to, credited);
        true
    }

    fn mine(&mut self, success: bool) -> TxHash {
        self.block += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&self.block.to_be_bytes());
        let hash = TxHash::from(bytes);
        self.receipts.insert(
            hash,
            TxReceipt {
                hash,
                block_number: self.block,
                success,
            },
        );
        hash
    }

    fn take_submit_failure(&mut self, kind: CallKind) -> Option<ChainError> {
        self.submit_failures.get_mut(&kind).and_then(VecDeque::pop_front)
    }
}

pub struct InMemoryChain {
    contracts: Contracts,
    ledger: Mutex<Ledger>,
}

impl InMemoryChain {
    /// Empty ledger for a 6-decimal stablecoin.
    pub fn new(contracts: Contracts) -> Self {
        let ledger = Ledger {
            decimals: Some(6),
            ..Ledger::default()
        };
        Self {
            contracts,
            ledger: Mutex::new(ledger),
        }
    }

    /// `None` makes `decimals()` fail, as on a token without metadata.
    pub fn with_decimals(self, decimals: Option<u8>) -> Self {
        self.ledger.lock().decimals = decimals;
        self
    }

    pub fn contracts(&self) -> &Contracts {
        &self.contracts
    }

    pub fn set_balance(&self, owner: Address, amount: U256) {
        self.ledger.lock().balances.insert(owner, amount);
    }

    pub fn balance_of(&self, owner: Address) -> U256 {
        self.ledger.lock().balance(&owner)
    }

    /// Seed a historical deposit: credits the allowance and records the
    /// AllowanceDeposited event without touching token balances.
    pub fn record_deposit(&self, sponsor: Address, beneficiary: Address, amount: U256) {
        let mut ledger = self.ledger.lock();
        let entry = ledger
            .sponsor_allowances
            .entry((beneficiary, sponsor))
            .or_insert(U256::ZERO);
        *entry = entry.saturating_add(amount);
        ledger.deposits.push((sponsor, beneficiary, amount));
    }

    /// Overwrite an allowance without emitting an event.
    pub fn set_sponsor_allowance(&self, beneficiary: Address, sponsor: Address, amount: U256) {
        self.ledger
            .lock()
            .sponsor_allowances
            .insert((beneficiary, sponsor), amount);
    }

    pub fn sponsor_allowance_of(&self, beneficiary: Address, sponsor: Address) -> U256 {
        self.ledger
            .lock()
            .sponsor_allowances
            .get(&(beneficiary, sponsor))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn token_allowance_of(&self, owner: Address, spender: Address) -> U256 {
        self.ledger
            .lock()
            .token_allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Make the next submission of `kind` fail before it reaches the ledger.
    pub fn fail_next(&self, kind: CallKind, err: ChainError) {
        self.ledger
            .lock()
            .submit_failures
            .entry(kind)
            .or_default()
            .push_back(err);
    }

    /// Make the next receipt wait fail.
    pub fn fail_next_receipt(&self, err: ChainError) {
        self.ledger.lock().receipt_failures.push_back(err);
    }

    /// Make every balance/allowance read fail until cleared with `None`.
    pub fn fail_reads(&self, err: Option<ChainError>) {
        self.ledger.lock().read_failure = err;
    }

    pub fn submitted(&self) -> Vec<SubmittedCall> {
        self.ledger.lock().submitted.clone()
    }

    pub fn balance_reads(&self) -> usize {
        self.ledger.lock().balance_reads
    }

    pub fn allowance_reads(&self) -> usize {
        self.ledger.lock().allowance_reads
    }

    fn submit(&self, kind: CallKind, call: SubmittedCall) -> Result<TxHash, ChainError> {
        let mut ledger = self.ledger.lock();
        if let Some(err) = ledger.take_submit_failure(kind) {
            return Err(err);
        }

        let settlement = self.contracts.settlement;
        let success = match &call {
            SubmittedCall::Transfer { from, to, amount } => ledger.move_tokens(*from, *to, *amount),
            SubmittedCall::Approve {
                owner,
                spender,
                amount,
            } => {
                ledger.token_allowances.insert((*owner, *spender), *amount);
                true
            }
            SubmittedCall::DepositAllowance {
                sponsor,
                beneficiary,
                amount,
            } => {
                let approved = ledger
                    .token_allowances
                    .get(&(*sponsor, settlement))
                    .copied()
                    .unwrap_or(U256::ZERO);
                if approved < *amount || !ledger.move_tokens(*sponsor, settlement, *amount) {
                    false
                } else {
                    ledger
                        .token_allowances
                        .insert((*sponsor, settlement), approved - *amount);
                    let entry = ledger
                        .sponsor_allowances
                        .entry((*beneficiary, *sponsor))
                        .or_insert(U256::ZERO);
                    *entry = entry.saturating_add(*amount);
                    ledger.deposits.push((*sponsor, *beneficiary, *amount));
                    true
                }
            }
            SubmittedCall::SpendFrom {
                beneficiary,
                sponsor,
                recipient,
                amount,
            } => {
                let key = (*beneficiary, *sponsor);
                let granted = ledger
                    .sponsor_allowances
                    .get(&key)
                    .copied()
                    .unwrap_or(U256::ZERO);
                if granted < *amount || !ledger.move_tokens(settlement, *recipient, *amount) {
                    false
                } else {
                    ledger.sponsor_allowances.insert(key, granted - *amount);
                    true
                }
            }
        };

        ledger.submitted.push(call);
        Ok(ledger.mine(success))
    }
}

#[async_trait]
impl ChainClient for InMemoryChain {
    async fn token_decimals(&self) -> Result<u8, ChainError> {
        self.ledger.lock().decimals.ok_or(ChainError::Rpc {
            code: 3,
            message: "execution reverted: decimals() not implemented".into(),
        })
    }

    async fn token_balance(&self, owner: Address) -> Result<U256, ChainError> {
        let mut ledger = self.ledger.lock();
        ledger.balance_reads += 1;
        if let Some(err) = ledger.read_failure.clone() {
            return Err(err);
        }
        Ok(ledger.balance(&owner))
    }

    async fn sponsor_allowance(
        &self,
        beneficiary: Address,
        sponsor: Address,
    ) -> Result<U256, ChainError> {
        let mut ledger = self.ledger.lock();
        ledger.allowance_reads += 1;
        if let Some(err) = ledger.read_failure.clone() {
            return Err(err);
        }
        Ok(ledger
            .sponsor_allowances
            .get(&(beneficiary, sponsor))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn sponsors_of(&self, beneficiary: Address) -> Result<Vec<Address>, ChainError> {
        let ledger = self.ledger.lock();
        if let Some(err) = ledger.read_failure.clone() {
            return Err(err);
        }
        let mut sponsors = Vec::new();
        for (sponsor, to, _) in &ledger.deposits {
            if *to == beneficiary && !sponsors.contains(sponsor) {
                sponsors.push(*sponsor);
            }
        }
        Ok(sponsors)
    }

    async fn transfer(&self, from: Address, to: Address, amount: U256) -> Result<TxHash, ChainError> {
        self.submit(CallKind::Transfer, SubmittedCall::Transfer { from, to, amount })
    }

    async fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.submit(
            CallKind::Approve,
            SubmittedCall::Approve {
                owner,
                spender,
                amount,
            },
        )
    }

    async fn deposit_allowance(
        &self,
        sponsor: Address,
        beneficiary: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.submit(
            CallKind::DepositAllowance,
            SubmittedCall::DepositAllowance {
                sponsor,
                beneficiary,
                amount,
            },
        )
    }

    async fn spend_from(
        &self,
        beneficiary: Address,
        sponsor: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.submit(
            CallKind::SpendFrom,
            SubmittedCall::SpendFrom {
                beneficiary,
                sponsor,
                recipient,
                amount,
            },
        )
    }

    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        _confirmations: u64,
    ) -> Result<TxReceipt, ChainError> {
        let mut ledger = self.ledger.lock();
        if let Some(err) = ledger.receipt_failures.pop_front() {
            return Err(err);
        }
        let receipt = ledger
            .receipts
            .get(&hash)
            .copied()
            .ok_or_else(|| ChainError::Other(format!("unknown transaction {}", hash)))?;
        if !receipt.success {
            return Err(ChainError::Reverted { hash });
        }
        Ok(receipt)
    }
}
