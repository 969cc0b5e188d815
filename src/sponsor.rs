//! "Give a hand": granting a friend a sponsor allowance.
//!
//! Two transactions, not atomic:
//! 1. `token.approve(settlement, amount)`, waited on until confirmed
//! 2. `settlement.depositAllowance(friend, amount)`, submitted right after
//!
//! The deposit's confirmation is tracked separately by the caller. If the
//! approval confirmed but the deposit failed, the error carries the approval
//! so only the deposit has to be retried ([`Sponsorship::resume_deposit`]).

use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::address::parse_address;
use crate::chain::{ChainClient, TxReceipt};
use crate::error::{ChainError, FundingError};
use crate::units::parse_units;

/// Validated "give a hand" input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub sponsor: Address,
    pub beneficiary: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
}

impl Grant {
    /// Validate the friend address and amount typed into the form.
    pub fn from_input(
        sponsor: Address,
        beneficiary: &str,
        amount: &str,
        decimals: u8,
    ) -> Result<Self, FundingError> {
        let beneficiary = parse_address(beneficiary)?;
        let amount = parse_units(amount, decimals)?;
        if amount.is_zero() {
            return Err(FundingError::ZeroAmount);
        }
        Ok(Self {
            sponsor,
            beneficiary,
            amount,
        })
    }
}

/// Approval confirmed, deposit submitted but not yet confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub grant: Grant,
    pub approval: TxHash,
    pub deposit: TxHash,
}

pub struct Sponsorship<'a> {
    pub client: &'a dyn ChainClient,
    pub settlement: Address,
    pub confirmations: u64,
}

impl<'a> Sponsorship<'a> {
    /// Approve, wait for the approval, then submit the deposit.
    pub async fn give_a_hand(&self, grant: Grant) -> Result<PendingDeposit, FundingError> {
        let approval = self
            .client
            .approve(grant.sponsor, self.settlement, grant.amount)
            .await
            .map_err(FundingError::Approve)?;
        self.client
            .wait_for_receipt(approval, self.confirmations)
            .await
            .map_err(FundingError::Approve)?;
        tracing::info!(
            sponsor = %grant.sponsor,
            amount = %grant.amount,
            tx = %approval,
            "settlement contract approved"
        );

        self.resume_deposit(grant, approval).await
    }

    /// Submit the deposit for a grant whose approval already confirmed.
    pub async fn resume_deposit(
        &self,
        grant: Grant,
        approval: TxHash,
    ) -> Result<PendingDeposit, FundingError> {
        let deposit = self
            .client
            .deposit_allowance(grant.sponsor, grant.beneficiary, grant.amount)
            .await
            .map_err(|source| FundingError::Deposit { approval, source })?;
        tracing::info!(
            sponsor = %grant.sponsor,
            beneficiary = %grant.beneficiary,
            amount = %grant.amount,
            tx = %deposit,
            "allowance deposit submitted"
        );

        Ok(PendingDeposit {
            grant,
            approval,
            deposit,
        })
    }

    /// Wait for a submitted deposit to confirm.
    pub async fn confirm_deposit(&self, pending: &PendingDeposit) -> Result<TxReceipt, FundingError> {
        self.client
            .wait_for_receipt(pending.deposit, self.confirmations)
            .await
            .map_err(|source: ChainError| FundingError::Deposit {
                approval: pending.approval,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::{CallKind, SubmittedCall};
    use crate::chain::{Contracts, InMemoryChain};
    use crate::error::ErrorClass;

    fn setup() -> (InMemoryChain, Contracts, Address, Address) {
        let contracts = Contracts {
            stablecoin: Address::repeat_byte(0xc0),
            settlement: Address::repeat_byte(0x5e),
        };
        let chain = InMemoryChain::new(contracts);
        let sponsor = Address::repeat_byte(1);
        let friend = Address::repeat_byte(2);
        chain.set_balance(sponsor, U256::from(100_000_000u64));
        (chain, contracts, sponsor, friend)
    }

    #[test]
    fn validates_form_input() {
        let sponsor = Address::repeat_byte(1);
        let friend = "0xd90891f098ee6762c919b110d4830d186c5f6bf4";

        let grant = Grant::from_input(sponsor, friend, "2.5", 6).unwrap();
        assert_eq!(grant.amount, U256::from(2_500_000u64));

        assert!(matches!(
            Grant::from_input(sponsor, "bob", "2.5", 6),
            Err(FundingError::InvalidBeneficiary(_))
        ));
        assert!(matches!(
            Grant::from_input(sponsor, friend, "", 6),
            Err(FundingError::InvalidAmount(_))
        ));
        assert_eq!(
            Grant::from_input(sponsor, friend, "0.00", 6),
            Err(FundingError::ZeroAmount)
        );
    }

    #[tokio::test]
    async fn approve_then_deposit_grants_the_allowance() {
        let (chain, contracts, sponsor, friend) = setup();
        let flow = Sponsorship {
            client: &chain,
            settlement: contracts.settlement,
            confirmations: 1,
        };
        let grant = Grant {
            sponsor,
            beneficiary: friend,
            amount: U256::from(20_000_000u64),
        };

        let pending = flow.give_a_hand(grant).await.unwrap();
        flow.confirm_deposit(&pending).await.unwrap();

        assert_eq!(chain.sponsor_allowance_of(friend, sponsor), grant.amount);
        assert_eq!(chain.balance_of(sponsor), U256::from(80_000_000u64));
        assert!(matches!(chain.submitted()[0], SubmittedCall::Approve { .. }));
        assert!(matches!(chain.submitted()[1], SubmittedCall::DepositAllowance { .. }));
    }

    #[tokio::test]
    async fn failed_approval_never_submits_a_deposit() {
        let (chain, contracts, sponsor, friend) = setup();
        chain.fail_next(CallKind::Approve, ChainError::Network("Failed to fetch".into()));
        let flow = Sponsorship {
            client: &chain,
            settlement: contracts.settlement,
            confirmations: 1,
        };
        let grant = Grant {
            sponsor,
            beneficiary: friend,
            amount: U256::from(1u64),
        };

        let err = flow.give_a_hand(grant).await.unwrap_err();
        assert!(matches!(err, FundingError::Approve(_)));
        assert_eq!(err.class(), ErrorClass::TransientNetwork);
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn deposit_failure_after_approval_is_resumable() {
        let (chain, contracts, sponsor, friend) = setup();
        chain.fail_next(CallKind::DepositAllowance, ChainError::Rejected);
        let flow = Sponsorship {
            client: &chain,
            settlement: contracts.settlement,
            confirmations: 1,
        };
        let grant = Grant {
            sponsor,
            beneficiary: friend,
            amount: U256::from(5_000_000u64),
        };

        let err = flow.give_a_hand(grant).await.unwrap_err();
        let approval = err.approved().expect("approval should have confirmed");
        assert_eq!(chain.token_allowance_of(sponsor, contracts.settlement), grant.amount);
        assert_eq!(chain.sponsor_allowance_of(friend, sponsor), U256::ZERO);

        let pending = flow.resume_deposit(grant, approval).await.unwrap();
        flow.confirm_deposit(&pending).await.unwrap();
        assert_eq!(chain.sponsor_allowance_of(friend, sponsor), grant.amount);
        // Approve + one deposit; the rejected attempt never reached the ledger
        assert_eq!(chain.submitted().len(), 2);
    }
}
