#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use amipay_core::chain::{ChainClient, Contracts, InMemoryChain};
use amipay_core::priority::PriorityBook;
use amipay_core::store::KvStore;
use amipay_core::wallet::WalletSettings;
use amipay_core::WalletController;
use tracing::Level;

pub fn init_test_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

pub fn contracts() -> Contracts {
    Contracts {
        stablecoin: "0xCad6980d7c09EEcd20D4c12110C8b89755D9A227".parse().unwrap(),
        settlement: "0x7b07761ae6D912B33Af13dFc962162ff8F611EaC".parse().unwrap(),
    }
}

/// Whole tokens at 6 decimals.
pub fn usdc(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000u64)
}

pub fn wallet_on(chain: Arc<InMemoryChain>, store: Arc<dyn KvStore>) -> WalletController {
    WalletController::new(
        Some(chain as Arc<dyn ChainClient>),
        PriorityBook::new(store),
        WalletSettings {
            contracts: contracts(),
            confirmations: 1,
            refresh_delay: Duration::ZERO,
        },
    )
}

pub fn payment_qr(merchant: Address, amount: &str, memo: &str) -> String {
    format!(
        "amipay://?v=1&chain=hoodi&merchant={}&token={}&amount={}&memo={}",
        merchant,
        contracts().stablecoin,
        amount,
        memo
    )
}
