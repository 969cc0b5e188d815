//! Settling a scanned payment request.
//!
//! Funding sources are tried in the account's priority order. The first one
//! whose balance (self) or allowance (sponsor) covers the whole amount pays
//! in a single transaction; amounts are never split across sources. A source
//! that cannot cover the amount is skipped silently, but once a transaction
//! has been submitted any failure ends the attempt.

use alloy_primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::chain::ChainClient;
use crate::error::PaymentError;
use crate::priority::PriorityBook;
use crate::qr::PaymentRequest;
use crate::source::FundingSource;
use crate::units::parse_units;

/// A payment that made it on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub source: FundingSource,
    pub tx_hash: TxHash,
    pub recipient: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
    pub block_number: u64,
}

/// Everything a payment attempt needs besides the request itself.
pub struct PaymentResolver<'a> {
    pub client: Option<&'a dyn ChainClient>,
    pub priority: &'a PriorityBook,
    /// Address of the only token the settlement contract accepts
    pub stablecoin: Address,
    pub confirmations: u64,
}

impl<'a> PaymentResolver<'a> {
    pub async fn settle(
        &self,
        account: Option<Address>,
        decimals: Option<u8>,
        request: &PaymentRequest,
    ) -> Result<Settlement, PaymentError> {
        let account = account.ok_or(PaymentError::NotConnected)?;
        let client = self.client.ok_or(PaymentError::ClientNotReady)?;
        let decimals = decimals.ok_or(PaymentError::DecimalsUnknown)?;
        if request.token != self.stablecoin {
            return Err(PaymentError::UnsupportedToken {
                token: request.token,
            });
        }

        let amount = parse_units(&request.amount, decimals)?;
        let order = self.priority.effective_order(&account);
        tracing::debug!(
            account = %account,
            amount = %amount,
            sources = order.len(),
            "settling payment"
        );

        for source in order {
            let tx_hash = match source {
                FundingSource::SelfBalance => {
                    let balance = client.token_balance(account).await?;
                    if balance < amount {
                        tracing::debug!(balance = %balance, "own balance not enough, skip");
                        continue;
                    }
                    client.transfer(account, request.merchant, amount).await?
                }
                FundingSource::Sponsor(sponsor) => {
                    let allowance = client.sponsor_allowance(account, sponsor).await?;
                    if allowance < amount {
                        tracing::debug!(
                            sponsor = %sponsor,
                            allowance = %allowance,
                            "sponsor allowance not enough, skip"
                        );
                        continue;
                    }
                    client
                        .spend_from(account, sponsor, request.merchant, amount)
                        .await?
                }
            };

            let receipt = client.wait_for_receipt(tx_hash, self.confirmations).await?;
            tracing::info!(
                source = %source,
                tx = %tx_hash,
                merchant = %request.merchant,
                amount = %amount,
                "payment settled"
            );
            return Ok(Settlement {
                source,
                tx_hash,
                recipient: request.merchant,
                amount,
                block_number: receipt.block_number,
            });
        }

        Err(PaymentError::NoFundingSource)
    }
}
