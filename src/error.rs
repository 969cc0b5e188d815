//! Error types for the wallet core.
//!
//! Chain failures carry a structured kind from the client that produced
//! them. The user-facing messages only distinguish a transient network
//! class from everything else; [`ChainError::is_transient`] decides which.

use alloy_primitives::{Address, TxHash};
use thiserror::Error;

use crate::address::AddressError;
use crate::units::UnitsError;

/// Markers of a flaky RPC node in free-form error descriptions. Only
/// consulted when the error kind itself is not already a network kind.
pub const TRANSIENT_MARKERS: [&str; 4] = [
    "RPC endpoint not found",
    "Failed to fetch",
    "Network error",
    "timeout",
];

pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
}

/// Failures reported by a [`crate::chain::ChainClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("User rejected the request")]
    Rejected,

    #[error("Transaction {hash} reverted")]
    Reverted { hash: TxHash },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Network(_) | ChainError::Timeout(_) => true,
            ChainError::Rejected | ChainError::Reverted { .. } => false,
            other => is_transient_message(&other.to_string()),
        }
    }
}

/// Coarse error classes a UI needs to choose a message and a retry hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Something had to be in place before the action could start.
    Precondition,
    /// Every funding source was checked and none could cover the amount.
    InsufficientCapacity,
    TransientNetwork,
    Failure,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("no wallet connected")]
    NotConnected,

    #[error("chain client not ready")]
    ClientNotReady,

    #[error("token decimals not loaded")]
    DecimalsUnknown,

    #[error("unsupported token {token}")]
    UnsupportedToken { token: Address },

    #[error("invalid payment amount: {0}")]
    InvalidAmount(#[from] UnitsError),

    #[error("no available sponsor allowance or personal balance for this amount")]
    NoFundingSource,

    #[error("no scanned payment to settle")]
    NoPendingPayment,

    #[error("a payment is already in progress")]
    Busy,

    #[error("payment failed: {0}")]
    Chain(#[from] ChainError),
}

impl PaymentError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PaymentError::NotConnected
            | PaymentError::ClientNotReady
            | PaymentError::DecimalsUnknown
            | PaymentError::UnsupportedToken { .. }
            | PaymentError::InvalidAmount(_)
            | PaymentError::NoPendingPayment
            | PaymentError::Busy => ErrorClass::Precondition,
            PaymentError::NoFundingSource => ErrorClass::InsufficientCapacity,
            PaymentError::Chain(e) if e.is_transient() => ErrorClass::TransientNetwork,
            PaymentError::Chain(_) => ErrorClass::Failure,
        }
    }

    /// Message shown next to the pay button.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::NotConnected => "Please connect your wallet first.".into(),
            PaymentError::ClientNotReady => "RPC client not ready. Please try again.".into(),
            PaymentError::DecimalsUnknown => {
                "Token decimals not loaded yet. Please try again.".into()
            }
            PaymentError::UnsupportedToken { .. } => "This QR uses an unsupported token.".into(),
            PaymentError::InvalidAmount(_) => "This QR carries an invalid amount.".into(),
            PaymentError::NoFundingSource => {
                "No available sponsor allowance or personal balance for this amount.".into()
            }
            PaymentError::NoPendingPayment => "Scan a payment QR code first.".into(),
            PaymentError::Busy => "A payment is already in progress.".into(),
            PaymentError::Chain(e) if e.is_transient() => {
                "RPC endpoint may be unstable. Please try again.".into()
            }
            PaymentError::Chain(_) => {
                "Payment failed. Please check your wallet and try again.".into()
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("no wallet connected")]
    NotConnected,

    #[error("chain client not ready")]
    ClientNotReady,

    #[error("token decimals not loaded")]
    DecimalsUnknown,

    #[error("invalid beneficiary: {0}")]
    InvalidBeneficiary(#[from] AddressError),

    #[error("invalid deposit amount: {0}")]
    InvalidAmount(#[from] UnitsError),

    #[error("deposit amount must be greater than zero")]
    ZeroAmount,

    #[error("a sponsorship is already in progress")]
    Busy,

    #[error("no stalled deposit to retry")]
    NothingToRetry,

    #[error("approve failed: {0}")]
    Approve(#[source] ChainError),

    /// The approval is confirmed on chain but the allowance was not
    /// recorded. Retrying only the deposit completes the grant.
    #[error("deposit failed after approval {approval}: {source}")]
    Deposit {
        approval: TxHash,
        #[source]
        source: ChainError,
    },
}

impl FundingError {
    /// Confirmed approval left behind by a failed deposit, if any.
    pub fn approved(&self) -> Option<TxHash> {
        match self {
            FundingError::Deposit { approval, .. } => Some(*approval),
            _ => None,
        }
    }

    fn chain_error(&self) -> Option<&ChainError> {
        match self {
            FundingError::Approve(e) | FundingError::Deposit { source: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self.chain_error() {
            Some(e) if e.is_transient() => ErrorClass::TransientNetwork,
            Some(_) => ErrorClass::Failure,
            None => ErrorClass::Precondition,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            FundingError::NotConnected => "Please connect your wallet first.".into(),
            FundingError::ClientNotReady => "RPC client not ready. Please try again.".into(),
            FundingError::DecimalsUnknown => {
                "Token decimals not loaded yet. Please try again.".into()
            }
            FundingError::InvalidBeneficiary(_) => "Please enter a valid friend address.".into(),
            FundingError::InvalidAmount(_) | FundingError::ZeroAmount => {
                "Please enter a valid amount.".into()
            }
            FundingError::Busy => "A sponsorship is already in progress.".into(),
            FundingError::NothingToRetry => "There is no deposit to retry.".into(),
            _ if self.class() == ErrorClass::TransientNetwork => {
                "The RPC node may be unstable. Please try again.".into()
            }
            _ => "Transaction failed. Please check the details and try again.".into(),
        }
    }
}

/// Key-value persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}
