//! Payment priority: the order in which funding sources are tried.
//!
//! One JSON array of source ids is stored per connected account under
//! `amipay-priority-<lower-case address>`. The order is overwritten
//! wholesale on every save. Unreadable or corrupt data counts as "no
//! preference" and never blocks a payment.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::address::{format_address, lower_hex};
use crate::chain::ChainClient;
use crate::error::{ChainError, StoreError};
use crate::source::FundingSource;
use crate::store::KvStore;
use crate::units::format_display;

pub const PRIORITY_KEY_PREFIX: &str = "amipay-priority-";

pub fn priority_key(account: &Address) -> String {
    format!("{}{}", PRIORITY_KEY_PREFIX, lower_hex(account))
}

/// Drop repeated entries, keeping the first occurrence.
fn dedup(order: Vec<FundingSource>) -> Vec<FundingSource> {
    let mut out: Vec<FundingSource> = Vec::with_capacity(order.len());
    for source in order {
        if !out.contains(&source) {
            out.push(source);
        }
    }
    out
}

/// Self first, then sponsors in discovery order.
pub fn default_order(sponsors: &[Address]) -> Vec<FundingSource> {
    dedup(
        std::iter::once(FundingSource::SelfBalance)
            .chain(sponsors.iter().copied().map(FundingSource::Sponsor))
            .collect(),
    )
}

/// Order `default` by position in `saved`. Entries the user never placed
/// keep their default relative order at the end. Saved entries missing
/// from `default` are dropped.
pub fn merge_order(saved: &[FundingSource], default: &[FundingSource]) -> Vec<FundingSource> {
    let mut merged = default.to_vec();
    merged.sort_by_key(|source| saved.iter().position(|s| s == source).unwrap_or(usize::MAX));
    merged
}

/// Move `source` to the front. `None` when it is absent or already first.
pub fn move_to_front(order: &[FundingSource], source: FundingSource) -> Option<Vec<FundingSource>> {
    let idx = order.iter().position(|s| *s == source)?;
    if idx == 0 {
        return None;
    }
    let mut moved = order.to_vec();
    let item = moved.remove(idx);
    moved.insert(0, item);
    Some(moved)
}

/// Per-account priority orders on top of a [`KvStore`].
#[derive(Clone)]
pub struct PriorityBook {
    store: Arc<dyn KvStore>,
}

impl PriorityBook {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Saved order, or empty when nothing usable is stored.
    pub fn load(&self, account: &Address) -> Vec<FundingSource> {
        let key = priority_key(account);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read payment priority");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<FundingSource>>(&raw) {
            Ok(order) => dedup(order),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring corrupt payment priority");
                Vec::new()
            }
        }
    }

    pub fn save(&self, account: &Address, order: &[FundingSource]) -> Result<(), StoreError> {
        let json = serde_json::to_string(order)?;
        self.store.set(&priority_key(account), &json)?;
        tracing::debug!(account = %account, entries = order.len(), "saved payment priority");
        Ok(())
    }

    /// Move `source` to the top of `current` and persist the result
    /// immediately. Returns the order now in effect.
    pub fn pin_to_top(
        &self,
        account: &Address,
        current: &[FundingSource],
        source: FundingSource,
    ) -> Result<Vec<FundingSource>, StoreError> {
        match move_to_front(current, source) {
            Some(order) => {
                self.save(account, &order)?;
                tracing::info!(account = %account, source = %source, "pinned funding source");
                Ok(order)
            }
            None => Ok(current.to_vec()),
        }
    }

    /// Order the resolver walks: the saved one, or self alone.
    pub fn effective_order(&self, account: &Address) -> Vec<FundingSource> {
        let order = self.load(account);
        if order.is_empty() {
            vec![FundingSource::SelfBalance]
        } else {
            order
        }
    }
}

/// One row of the payment priority sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub source: FundingSource,
    pub label: String,
    pub subtitle: String,
    /// Live sponsor allowance; `None` for self
    pub allowance: Option<U256>,
}

impl PriorityEntry {
    fn own_wallet() -> Self {
        Self {
            source: FundingSource::SelfBalance,
            label: "Use my own wallet".to_string(),
            subtitle: String::new(),
            allowance: None,
        }
    }

    fn sponsor(sponsor: Address, allowance: U256, decimals: Option<u8>) -> Self {
        let shown = decimals
            .map(|d| format_display(allowance, d))
            .unwrap_or_else(|| "0.00".to_string());
        Self {
            source: FundingSource::Sponsor(sponsor),
            label: format_address(&sponsor),
            subtitle: format!("Balance {} USDC", shown),
            allowance: Some(allowance),
        }
    }
}

/// Build the priority sheet for `account`: discover sponsors from past
/// allowance deposits, read each live allowance, then apply the saved order.
pub async fn load_entries(
    client: &dyn ChainClient,
    book: &PriorityBook,
    account: Address,
    decimals: Option<u8>,
) -> Result<Vec<PriorityEntry>, ChainError> {
    let sponsors = client.sponsors_of(account).await?;

    let mut sponsor_entries = Vec::with_capacity(sponsors.len());
    for sponsor in &sponsors {
        let allowance = client.sponsor_allowance(account, *sponsor).await?;
        sponsor_entries.push(PriorityEntry::sponsor(*sponsor, allowance, decimals));
    }

    let order = merge_order(&book.load(&account), &default_order(&sponsors));
    let entries = order
        .into_iter()
        .filter_map(|source| match source {
            FundingSource::SelfBalance => Some(PriorityEntry::own_wallet()),
            FundingSource::Sponsor(_) => sponsor_entries.iter().find(|e| e.source == source).cloned(),
        })
        .collect();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sponsor(n: u8) -> FundingSource {
        FundingSource::Sponsor(Address::repeat_byte(n))
    }

    fn book() -> (PriorityBook, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PriorityBook::new(store.clone()), store)
    }

    #[test]
    fn pin_moves_entry_to_front_and_persists() {
        let (book, _) = book();
        let account = Address::repeat_byte(0xaa);
        let (a, b) = (sponsor(1), sponsor(2));
        let current = vec![FundingSource::SelfBalance, a, b];

        let pinned = book.pin_to_top(&account, &current, b).unwrap();
        assert_eq!(pinned, vec![b, FundingSource::SelfBalance, a]);
        assert_eq!(book.load(&account), pinned);
        assert_eq!(book.load(&account), book.load(&account));
    }

    #[test]
    fn pinning_the_top_entry_writes_nothing() {
        let (book, store) = book();
        let account = Address::repeat_byte(0xaa);
        let current = vec![FundingSource::SelfBalance, sponsor(1)];

        let order = book
            .pin_to_top(&account, &current, FundingSource::SelfBalance)
            .unwrap();
        assert_eq!(order, current);
        assert_eq!(store.get(&priority_key(&account)).unwrap(), None);
    }

    #[test]
    fn keys_are_lower_cased() {
        let account: Address = "0xCad6980d7c09EEcd20D4c12110C8b89755D9A227".parse().unwrap();
        assert_eq!(
            priority_key(&account),
            "amipay-priority-0xcad6980d7c09eecd20d4c12110c8b89755d9a227"
        );
    }

    #[test]
    fn corrupt_storage_reads_as_empty() {
        let (book, store) = book();
        let account = Address::repeat_byte(0xaa);

        store.set(&priority_key(&account), "{not json").unwrap();
        assert!(book.load(&account).is_empty());

        store.set(&priority_key(&account), "{\"SELF\": 1}").unwrap();
        assert!(book.load(&account).is_empty());

        store.set(&priority_key(&account), "[\"SELF\", \"nope\"]").unwrap();
        assert!(book.load(&account).is_empty());

        assert_eq!(book.effective_order(&account), vec![FundingSource::SelfBalance]);
    }

    #[test]
    fn duplicates_are_dropped_on_load() {
        let (book, store) = book();
        let account = Address::repeat_byte(0xaa);
        let json = serde_json::to_string(&vec![sponsor(1), FundingSource::SelfBalance, sponsor(1)])
            .unwrap();
        store.set(&priority_key(&account), &json).unwrap();
        assert_eq!(book.load(&account), vec![sponsor(1), FundingSource::SelfBalance]);
    }

    #[test]
    fn merge_appends_unseen_entries_in_default_order() {
        let default = default_order(&[
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        ]);
        let saved = vec![sponsor(2), FundingSource::SelfBalance, sponsor(9)];

        assert_eq!(
            merge_order(&saved, &default),
            vec![sponsor(2), FundingSource::SelfBalance, sponsor(1), sponsor(3)]
        );
        assert_eq!(merge_order(&[], &default), default);
    }

    #[test]
    fn default_order_puts_self_first_without_duplicates() {
        let a = Address::repeat_byte(1);
        assert_eq!(
            default_order(&[a, a]),
            vec![FundingSource::SelfBalance, FundingSource::Sponsor(a)]
        );
    }
}
