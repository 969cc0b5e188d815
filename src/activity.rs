//! Activity log
//!
//! Session history of what the wallet did: scans, payments and sponsorship
//! deposits, with their on-chain status. Kept in memory only; the newest
//! entries win once the log is full.

use std::collections::VecDeque;

use alloy_primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::source::FundingSource;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// QR text delivered by the scanner
    Scan,
    /// Payment to a merchant
    Payment,
    /// Allowance granted to a friend
    Deposit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    /// Submitted, not confirmed yet
    Pending,
    Confirmed,
    Failed,
    /// Nothing to confirm (scans)
    Recorded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub tx_hash: Option<TxHash>,
    /// Merchant for payments, friend for deposits
    pub counterparty: Option<Address>,
    /// Human-readable token amount as entered or scanned
    pub amount: Option<String>,
    pub source: Option<FundingSource>,
    /// Scanned text, memo or failure message
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(kind: ActivityKind, status: ActivityStatus) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            kind,
            status,
            tx_hash: None,
            counterparty: None,
            amount: None,
            source: None,
            detail: None,
            timestamp: now,
            updated_at: now,
        }
    }

    pub fn with_counterparty(mut self, addr: Address) -> Self {
        self.counterparty = Some(addr);
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_source(mut self, source: FundingSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Default)]
struct Inner {
    records: VecDeque<ActivityRecord>,
    next_id: u64,
}

/// Bounded, thread-safe activity history.
pub struct ActivityLog {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Append a record and return its id.
    pub fn push(&self, mut record: ActivityRecord) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        record.id = inner.next_id;
        let id = record.id;
        tracing::debug!(id, kind = ?record.kind, status = ?record.status, "activity recorded");

        inner.records.push_back(record);
        while inner.records.len() > self.capacity {
            inner.records.pop_front();
        }
        id
    }

    /// Move a record to a new status. Returns false when the id has been
    /// evicted or never existed.
    pub fn update(&self, id: u64, status: ActivityStatus, detail: Option<String>) -> bool {
        let mut inner = self.inner.lock();
        match inner.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.status = status;
                if detail.is_some() {
                    record.detail = detail;
                }
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Attach the transaction hash once it is known.
    pub fn set_tx(&self, id: u64, hash: TxHash) -> bool {
        let mut inner = self.inner.lock();
        match inner.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.tx_hash = Some(hash);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Note which source paid, once the resolver has picked one.
    pub fn set_source(&self, id: u64, source: FundingSource) -> bool {
        let mut inner = self.inner.lock();
        match inner.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.source = Some(source);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<ActivityRecord> {
        self.inner.lock().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn find_tx(&self, hash: &TxHash) -> Option<ActivityRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .rev()
            .find(|r| r.tx_hash.as_ref() == Some(hash))
            .cloned()
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn by_kind(&self, kind: ActivityKind) -> Vec<ActivityRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn pending(&self) -> Vec<ActivityRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.status == ActivityStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().records.clear();
    }
}
