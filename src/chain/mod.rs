//! Chain access for the wallet core.
//!
//! [`ChainClient`] is the whole surface the core needs from the stablecoin
//! token and the AmiPay settlement contract. Writes are submitted on behalf
//! of the `from` account and signed by whatever wallet backs the client;
//! the core never touches keys.

pub mod abi;
pub mod evm;
pub mod memory;
pub mod rpc;
#[cfg(test)]
pub(crate) mod test_node;

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

pub use evm::EvmChainClient;
pub use memory::InMemoryChain;
pub use rpc::RpcClient;

/// Token and settlement contract addresses a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contracts {
    pub stablecoin: Address,
    pub settlement: Address,
}

/// Mined transaction, as far as the wallet cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Decimal precision of the stablecoin.
    async fn token_decimals(&self) -> Result<u8, ChainError>;

    /// Stablecoin balance of `owner`, in smallest units.
    async fn token_balance(&self, owner: Address) -> Result<U256, ChainError>;

    /// Allowance `sponsor` has deposited for `beneficiary` in the settlement
    /// contract.
    async fn sponsor_allowance(
        &self,
        beneficiary: Address,
        sponsor: Address,
    ) -> Result<U256, ChainError>;

    /// Sponsors that ever deposited an allowance for `beneficiary`, in the
    /// order their first deposit was emitted.
    async fn sponsors_of(&self, beneficiary: Address) -> Result<Vec<Address>, ChainError>;

    /// `token.transfer(to, amount)` sent by `from`.
    async fn transfer(&self, from: Address, to: Address, amount: U256)
        -> Result<TxHash, ChainError>;

    /// `token.approve(spender, amount)` sent by `owner`.
    async fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    /// `settlement.depositAllowance(beneficiary, amount)` sent by `sponsor`.
    async fn deposit_allowance(
        &self,
        sponsor: Address,
        beneficiary: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    /// `settlement.spendFrom(sponsor, recipient, amount)` sent by
    /// `beneficiary`.
    async fn spend_from(
        &self,
        beneficiary: Address,
        sponsor: Address,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    /// Wait until `hash` is mined with at least `confirmations` blocks on
    /// top (counting its own). A reverted transaction is an error.
    async fn wait_for_receipt(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> Result<TxReceipt, ChainError>;
}
