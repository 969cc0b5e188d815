//! Wallet controller.
//!
//! Owns everything a wallet screen shows and serialises the user actions
//! that touch the chain. Each action runs as one async flow; a busy flag
//! rejects a second invocation of the same action while the first one is
//! still running. State is read through [`WalletController::snapshot`].

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, TxHash, U256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityKind, ActivityLog, ActivityRecord, ActivityStatus};
use crate::address::short_addr;
use crate::chain::{ChainClient, Contracts, TxReceipt};
use crate::config::ResolvedConfig;
use crate::error::{ChainError, FundingError, PaymentError, StoreError};
use crate::priority::{load_entries, PriorityBook, PriorityEntry};
use crate::qr::{parse_payment_qr, PaymentRequest};
use crate::settlement::{PaymentResolver, Settlement};
use crate::source::FundingSource;
use crate::sponsor::{Grant, PendingDeposit, Sponsorship};
use crate::units::{format_display, format_units};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletSettings {
    pub contracts: Contracts,
    pub confirmations: u64,
    /// Pause after a confirmation before re-reading the balance
    pub refresh_delay: Duration,
}

impl WalletSettings {
    pub fn from_config(cfg: &ResolvedConfig) -> Self {
        Self {
            contracts: cfg.contracts,
            confirmations: cfg.confirmations,
            refresh_delay: cfg.refresh_delay,
        }
    }
}

/// Approval confirmed but the allowance deposit never made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalledDeposit {
    pub grant: Grant,
    pub approval: TxHash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub account: Option<Address>,
    pub decimals: Option<u8>,
    pub balance: Option<U256>,
    /// Raw text of the last scan, recognised or not
    pub last_scanned: Option<String>,
    pub pending_payment: Option<PaymentRequest>,
    pub is_paying: bool,
    pub pay_error: Option<String>,
    pub last_payment: Option<Settlement>,
    pub is_funding: bool,
    pub fund_error: Option<String>,
    pub last_deposit_hash: Option<TxHash>,
    pub awaiting_deposit: bool,
    pub stalled_deposit: Option<StalledDeposit>,
    pub priority_entries: Vec<PriorityEntry>,
}

fn paying(s: &mut WalletState) -> &mut bool {
    &mut s.is_paying
}

fn funding(s: &mut WalletState) -> &mut bool {
    &mut s.is_funding
}

fn awaiting_deposit(s: &mut WalletState) -> &mut bool {
    &mut s.awaiting_deposit
}

/// Raises a busy flag for as long as it lives, even if the flow holding it
/// is dropped half way.
struct BusyGuard<'a> {
    state: &'a RwLock<WalletState>,
    flag: fn(&mut WalletState) -> &mut bool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(state: &'a RwLock<WalletState>, flag: fn(&mut WalletState) -> &mut bool) -> Option<Self> {
        let mut s = state.write();
        let raised = flag(&mut s);
        if *raised {
            return None;
        }
        *raised = true;
        drop(s);
        Some(Self { state, flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut s = self.state.write();
        *(self.flag)(&mut s) = false;
    }
}

pub struct WalletController {
    client: RwLock<Option<Arc<dyn ChainClient>>>,
    priority: PriorityBook,
    settings: WalletSettings,
    state: RwLock<WalletState>,
    activity: ActivityLog,
}

impl WalletController {
    pub fn new(
        client: Option<Arc<dyn ChainClient>>,
        priority: PriorityBook,
        settings: WalletSettings,
    ) -> Self {
        Self {
            client: RwLock::new(client),
            priority,
            settings,
            state: RwLock::new(WalletState::default()),
            activity: ActivityLog::default(),
        }
    }

    pub fn set_client(&self, client: Option<Arc<dyn ChainClient>>) {
        *self.client.write() = client;
    }

    fn client(&self) -> Option<Arc<dyn ChainClient>> {
        self.client.read().clone()
    }

    pub fn settings(&self) -> &WalletSettings {
        &self.settings
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn snapshot(&self) -> WalletState {
        self.state.read().clone()
    }

    // ---- account ----

    /// Switch to `account`. Account-scoped state is reset on a change.
    pub fn connect(&self, account: Address) {
        let mut s = self.state.write();
        if s.account == Some(account) {
            return;
        }
        s.account = Some(account);
        s.balance = None;
        s.priority_entries.clear();
        s.stalled_deposit = None;
        s.pay_error = None;
        s.fund_error = None;
        tracing::info!(account = %account, "wallet connected");
    }

    pub fn disconnect(&self) {
        let mut s = self.state.write();
        if let Some(account) = s.account.take() {
            tracing::info!(account = %account, "wallet disconnected");
        }
        s.balance = None;
        s.priority_entries.clear();
        s.stalled_deposit = None;
        s.pending_payment = None;
        s.pay_error = None;
        s.fund_error = None;
    }

    /// Read the stablecoin precision once; later calls reuse it.
    pub async fn load_token_info(&self) -> Result<u8, ChainError> {
        if let Some(decimals) = self.state.read().decimals {
            return Ok(decimals);
        }
        let client = self
            .client()
            .ok_or_else(|| ChainError::Other("RPC client not ready".into()))?;
        let decimals = client.token_decimals().await?;
        self.state.write().decimals = Some(decimals);
        tracing::debug!(decimals, "token decimals loaded");
        Ok(decimals)
    }

    /// Re-read the connected account's balance. `None` when not connected
    /// or no client is configured.
    pub async fn refresh_balance(&self) -> Result<Option<U256>, ChainError> {
        let account = self.state.read().account;
        let (Some(account), Some(client)) = (account, self.client()) else {
            return Ok(None);
        };
        let balance = client.token_balance(account).await?;

        let mut s = self.state.write();
        // The account may have changed while the read was in flight
        if s.account == Some(account) {
            s.balance = Some(balance);
        }
        Ok(Some(balance))
    }

    async fn refresh_after_confirmation(&self) {
        if !self.settings.refresh_delay.is_zero() {
            tokio::time::sleep(self.settings.refresh_delay).await;
        }
        if let Err(e) = self.refresh_balance().await {
            tracing::warn!(error = %e, "balance refresh after confirmation failed");
        }
    }

    // ---- scanning & paying ----

    /// Feed the text a scanner produced. A recognised payment request
    /// becomes the pending payment; anything else only updates the last
    /// scanned text and clears the pending payment.
    pub fn handle_scan(&self, text: &str) -> Option<PaymentRequest> {
        let request = parse_payment_qr(text);

        let mut record = ActivityRecord::new(ActivityKind::Scan, ActivityStatus::Recorded)
            .with_detail(text);
        if let Some(req) = &request {
            record = record
                .with_counterparty(req.merchant)
                .with_amount(req.amount.clone());
        }
        self.activity.push(record);

        let mut s = self.state.write();
        s.last_scanned = Some(text.to_string());
        s.pending_payment = request.clone();
        s.pay_error = None;
        request
    }

    /// Drop the pending payment. Not possible while it is being paid.
    pub fn dismiss_pending(&self) -> bool {
        let mut s = self.state.write();
        if s.is_paying {
            return false;
        }
        s.pending_payment = None;
        s.pay_error = None;
        true
    }

    /// Settle the pending payment, then refresh the balance.
    pub async fn pay_pending(&self) -> Result<Settlement, PaymentError> {
        let Some(_busy) = BusyGuard::acquire(&self.state, paying) else {
            return Err(PaymentError::Busy);
        };

        let (account, decimals, request) = {
            let mut s = self.state.write();
            s.pay_error = None;
            (s.account, s.decimals, s.pending_payment.clone())
        };
        let Some(request) = request else {
            return Err(self.pay_failed(PaymentError::NoPendingPayment, None));
        };

        let activity_id = self.activity.push(
            ActivityRecord::new(ActivityKind::Payment, ActivityStatus::Pending)
                .with_counterparty(request.merchant)
                .with_amount(request.amount.clone()),
        );

        let client = self.client();
        let resolver = PaymentResolver {
            client: client.as_deref(),
            priority: &self.priority,
            stablecoin: self.settings.contracts.stablecoin,
            confirmations: self.settings.confirmations,
        };

        match resolver.settle(account, decimals, &request).await {
            Ok(settlement) => {
                self.activity.set_tx(activity_id, settlement.tx_hash);
                self.activity.set_source(activity_id, settlement.source);
                self.activity
                    .update(activity_id, ActivityStatus::Confirmed, request.memo.clone());
                {
                    let mut s = self.state.write();
                    s.last_payment = Some(settlement.clone());
                    if s.pending_payment.as_ref() == Some(&request) {
                        s.pending_payment = None;
                    }
                }
                self.refresh_after_confirmation().await;
                Ok(settlement)
            }
            Err(e) => Err(self.pay_failed(e, Some(activity_id))),
        }
    }

    fn pay_failed(&self, err: PaymentError, activity_id: Option<u64>) -> PaymentError {
        let message = err.user_message();
        tracing::warn!(error = %err, class = ?err.class(), "payment failed");
        if let Some(id) = activity_id {
            self.activity
                .update(id, ActivityStatus::Failed, Some(message.clone()));
        }
        self.state.write().pay_error = Some(message);
        err
    }

    // ---- give a hand ----

    fn sponsorship<'a>(&'a self, client: &'a dyn ChainClient) -> Sponsorship<'a> {
        Sponsorship {
            client,
            settlement: self.settings.contracts.settlement,
            confirmations: self.settings.confirmations,
        }
    }

    /// Grant `beneficiary` an allowance of `amount` (decimal text) from the
    /// connected account. Returns once the deposit is submitted; follow up
    /// with [`WalletController::confirm_deposit`].
    pub async fn give_a_hand(
        &self,
        beneficiary: &str,
        amount: &str,
    ) -> Result<PendingDeposit, FundingError> {
        if self.state.read().awaiting_deposit {
            return Err(FundingError::Busy);
        }
        let Some(_busy) = BusyGuard::acquire(&self.state, funding) else {
            return Err(FundingError::Busy);
        };
        self.state.write().fund_error = None;

        let (grant, client) = match self.funding_preconditions(beneficiary, amount) {
            Ok(ready) => ready,
            Err(e) => return Err(self.fund_failed(e, None)),
        };

        let activity_id = self.activity.push(
            ActivityRecord::new(ActivityKind::Deposit, ActivityStatus::Pending)
                .with_counterparty(grant.beneficiary)
                .with_amount(amount.trim()),
        );

        match self.sponsorship(client.as_ref()).give_a_hand(grant).await {
            Ok(pending) => {
                self.deposit_submitted(&pending, activity_id);
                Ok(pending)
            }
            Err(e) => {
                if let Some(approval) = e.approved() {
                    self.state.write().stalled_deposit = Some(StalledDeposit { grant, approval });
                }
                Err(self.fund_failed(e, Some(activity_id)))
            }
        }
    }

    /// Submit the deposit again for a grant whose approval already
    /// confirmed.
    pub async fn retry_deposit(&self) -> Result<PendingDeposit, FundingError> {
        if self.state.read().awaiting_deposit {
            return Err(FundingError::Busy);
        }
        let Some(_busy) = BusyGuard::acquire(&self.state, funding) else {
            return Err(FundingError::Busy);
        };

        let stalled = {
            let mut s = self.state.write();
            s.fund_error = None;
            s.stalled_deposit
        };
        let Some(stalled) = stalled else {
            return Err(self.fund_failed(FundingError::NothingToRetry, None));
        };
        let Some(client) = self.client() else {
            return Err(self.fund_failed(FundingError::ClientNotReady, None));
        };

        let activity_id = self.activity.push(
            ActivityRecord::new(ActivityKind::Deposit, ActivityStatus::Pending)
                .with_counterparty(stalled.grant.beneficiary)
                .with_detail("retry"),
        );

        match self
            .sponsorship(client.as_ref())
            .resume_deposit(stalled.grant, stalled.approval)
            .await
        {
            Ok(pending) => {
                self.deposit_submitted(&pending, activity_id);
                Ok(pending)
            }
            Err(e) => Err(self.fund_failed(e, Some(activity_id))),
        }
    }

    /// Wait for a submitted deposit, pause, then refresh the balance.
    pub async fn confirm_deposit(&self, pending: &PendingDeposit) -> Result<TxReceipt, FundingError> {
        let Some(_awaiting) = BusyGuard::acquire(&self.state, awaiting_deposit) else {
            return Err(FundingError::Busy);
        };
        let Some(client) = self.client() else {
            return Err(self.fund_failed(FundingError::ClientNotReady, None));
        };
        let activity_id = self.activity.find_tx(&pending.deposit).map(|r| r.id);

        match self.sponsorship(client.as_ref()).confirm_deposit(pending).await {
            Ok(receipt) => {
                if let Some(id) = activity_id {
                    self.activity.update(id, ActivityStatus::Confirmed, None);
                }
                tracing::info!(
                    tx = %pending.deposit,
                    block = receipt.block_number,
                    "allowance deposit confirmed"
                );
                self.refresh_after_confirmation().await;
                Ok(receipt)
            }
            Err(e) => {
                self.state.write().stalled_deposit = Some(StalledDeposit {
                    grant: pending.grant,
                    approval: pending.approval,
                });
                Err(self.fund_failed(e, activity_id))
            }
        }
    }

    fn funding_preconditions(
        &self,
        beneficiary: &str,
        amount: &str,
    ) -> Result<(Grant, Arc<dyn ChainClient>), FundingError> {
        let (account, decimals) = {
            let s = self.state.read();
            (s.account, s.decimals)
        };
        let account = account.ok_or(FundingError::NotConnected)?;
        let client = self.client().ok_or(FundingError::ClientNotReady)?;
        let decimals = decimals.ok_or(FundingError::DecimalsUnknown)?;
        let grant = Grant::from_input(account, beneficiary.trim(), amount.trim(), decimals)?;
        Ok((grant, client))
    }

    fn deposit_submitted(&self, pending: &PendingDeposit, activity_id: u64) {
        self.activity.set_tx(activity_id, pending.deposit);
        let mut s = self.state.write();
        s.last_deposit_hash = Some(pending.deposit);
        s.stalled_deposit = None;
    }

    fn fund_failed(&self, err: FundingError, activity_id: Option<u64>) -> FundingError {
        let message = err.user_message();
        tracing::warn!(error = %err, class = ?err.class(), "sponsorship failed");
        if let Some(id) = activity_id {
            self.activity
                .update(id, ActivityStatus::Failed, Some(message.clone()));
        }
        self.state.write().fund_error = Some(message);
        err
    }

    // ---- priority ----

    /// Rebuild the payment priority sheet for the connected account.
    pub async fn load_priority_entries(&self) -> Result<Vec<PriorityEntry>, PaymentError> {
        let (account, decimals) = {
            let s = self.state.read();
            (s.account, s.decimals)
        };
        let account = account.ok_or(PaymentError::NotConnected)?;
        let client = self.client().ok_or(PaymentError::ClientNotReady)?;

        let entries = load_entries(client.as_ref(), &self.priority, account, decimals).await?;
        let mut s = self.state.write();
        if s.account == Some(account) {
            s.priority_entries = entries.clone();
        }
        Ok(entries)
    }

    /// Current order: the loaded sheet if there is one, else what is saved.
    pub fn priority_order(&self) -> Vec<FundingSource> {
        let s = self.state.read();
        let Some(account) = s.account else {
            return Vec::new();
        };
        if s.priority_entries.is_empty() {
            drop(s);
            self.priority.effective_order(&account)
        } else {
            s.priority_entries.iter().map(|e| e.source).collect()
        }
    }

    /// Pin `source` to the top of the connected account's order. `None`
    /// when not connected.
    pub fn pin(&self, source: FundingSource) -> Result<Option<Vec<FundingSource>>, StoreError> {
        let Some(account) = self.state.read().account else {
            return Ok(None);
        };
        let current = self.priority_order();
        let order = self.priority.pin_to_top(&account, &current, source)?;

        let mut s = self.state.write();
        s.priority_entries
            .sort_by_key(|e| order.iter().position(|o| *o == e.source).unwrap_or(usize::MAX));
        Ok(Some(order))
    }

    // ---- display ----

    pub fn display_account(&self) -> String {
        match self.state.read().account {
            Some(account) => short_addr(&account.to_string()),
            None => "Not connected".to_string(),
        }
    }

    pub fn display_balance(&self) -> String {
        let s = self.state.read();
        match (s.balance, s.decimals) {
            (Some(balance), Some(decimals)) => format_display(balance, decimals),
            _ => "0.00".to_string(),
        }
    }

    /// Exact balance, e.g. for a "max" button.
    pub fn exact_balance(&self) -> Option<String> {
        let s = self.state.read();
        Some(format_units(s.balance?, s.decimals?))
    }
}
