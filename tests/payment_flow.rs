mod common;

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use amipay_core::activity::{ActivityKind, ActivityStatus};
use amipay_core::chain::InMemoryChain;
use amipay_core::store::{KvStore, SledStore};
use amipay_core::{FundingSource, PaymentError};
use tempfile::TempDir;

use common::{contracts, init_test_tracing, payment_qr, usdc, wallet_on};

#[tokio::test]
async fn friend_funds_then_beneficiary_pays_with_the_allowance() {
    init_test_tracing();
    let chain = Arc::new(InMemoryChain::new(contracts()));
    let dir = TempDir::new().unwrap();
    let db = sled::open(dir.path().join("prefs")).unwrap();

    let sponsor = Address::repeat_byte(0x51);
    let beneficiary = Address::repeat_byte(0xbe);
    let merchant: Address = "0xd90891f098ee6762c919b110d4830d186c5f6bf4".parse().unwrap();
    chain.set_balance(sponsor, usdc(100));
    chain.set_balance(beneficiary, usdc(3));

    // Sponsor's wallet grants 20 USDC
    let sponsor_wallet = wallet_on(chain.clone(), Arc::new(SledStore::from_db(&db).unwrap()));
    sponsor_wallet.connect(sponsor);
    sponsor_wallet.load_token_info().await.unwrap();
    let pending = sponsor_wallet
        .give_a_hand(&beneficiary.to_string(), "20")
        .await
        .unwrap();
    sponsor_wallet.confirm_deposit(&pending).await.unwrap();
    assert_eq!(sponsor_wallet.display_balance(), "80.00");

    // Beneficiary sees the sponsor and pins it
    let store: Arc<dyn KvStore> = Arc::new(SledStore::from_db(&db).unwrap());
    let wallet = wallet_on(chain.clone(), store.clone());
    wallet.connect(beneficiary);
    wallet.load_token_info().await.unwrap();
    let entries = wallet.load_priority_entries().await.unwrap();
    assert_eq!(entries[1].source, FundingSource::Sponsor(sponsor));
    assert_eq!(entries[1].subtitle, "Balance 20.00 USDC");
    wallet.pin(FundingSource::Sponsor(sponsor)).unwrap();

    let request = wallet
        .handle_scan(&payment_qr(merchant, "12.5", "coffee"))
        .unwrap();
    assert_eq!(request.memo.as_deref(), Some("coffee"));

    let settled = wallet.pay_pending().await.unwrap();
    assert_eq!(settled.source, FundingSource::Sponsor(sponsor));
    assert_eq!(chain.balance_of(merchant), U256::from(12_500_000u64));
    assert_eq!(chain.sponsor_allowance_of(beneficiary, sponsor), U256::from(7_500_000u64));
    assert_eq!(wallet.display_balance(), "3.00");

    let payment = &wallet.activity().by_kind(ActivityKind::Payment)[0];
    assert_eq!(payment.status, ActivityStatus::Confirmed);
    assert_eq!(payment.tx_hash, Some(settled.tx_hash));
    assert_eq!(payment.source, Some(FundingSource::Sponsor(sponsor)));

    // A fresh controller on the same store sees the pinned order
    let reopened = wallet_on(chain.clone(), store);
    reopened.connect(beneficiary);
    assert_eq!(
        reopened.priority_order(),
        vec![FundingSource::Sponsor(sponsor), FundingSource::SelfBalance]
    );

    // Remaining allowance is short, own balance is short: nothing can pay
    reopened.load_token_info().await.unwrap();
    reopened.handle_scan(&payment_qr(merchant, "8", "lunch"));
    let err = reopened.pay_pending().await.unwrap_err();
    assert_eq!(err, PaymentError::NoFundingSource);
}

#[tokio::test]
async fn qr_for_another_token_is_refused_before_reading_balances() {
    init_test_tracing();
    let chain = Arc::new(InMemoryChain::new(contracts()));
    let wallet = wallet_on(chain.clone(), Arc::new(amipay_core::store::MemoryStore::new()));
    let account = Address::repeat_byte(0xaa);
    chain.set_balance(account, usdc(100));
    wallet.connect(account);
    wallet.load_token_info().await.unwrap();

    let text = format!(
        "amipay://?merchant={}&token={}&amount=1",
        Address::repeat_byte(0x33),
        Address::repeat_byte(0x44)
    );
    let request = wallet.handle_scan(&text).unwrap();
    assert_eq!(request.version, 1);
    assert_eq!(request.chain, "hoodi");

    let err = wallet.pay_pending().await.unwrap_err();
    assert_eq!(err.user_message(), "This QR uses an unsupported token.");
    assert_eq!(chain.balance_reads(), 0);
    assert!(chain.submitted().is_empty());
}
