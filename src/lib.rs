// ---- Clippy/lints: keep signals high, noise low ----
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! AmiPay wallet core.
//!
//! Parses AmiPay QR payment requests, settles them against the connected
//! account's stablecoin balance or a friend's sponsor allowance (in the
//! user's priority order), and runs the "give a hand" sponsorship flow.
//! The chain is reached through [`chain::ChainClient`]; persistence through
//! [`store::KvStore`].

pub mod activity;
pub mod address;
pub mod chain;
pub mod config;
pub mod error;
pub mod logging;
pub mod priority;
pub mod qr;
pub mod settlement;
pub mod source;
pub mod sponsor;
pub mod store;
pub mod units;
pub mod wallet;

pub use error::{ChainError, ErrorClass, FundingError, PaymentError, StoreError};
pub use qr::{parse_payment_qr, PaymentRequest};
pub use source::FundingSource;
pub use wallet::{WalletController, WalletState};
