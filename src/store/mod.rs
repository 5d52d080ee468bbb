//! Local Store Accessor
//!
//! The local store is the first tier of every resolution. It is assumed to be
//! reachable: any error here aborts the call, unlike remote failures which are
//! absorbed per provider.
//!
//! Two implementations ship:
//! - [`MemoryValuationStore`] (always available, used by tests and the CLI)
//! - [`postgres::PgValuationStore`] (behind the `database` feature)

pub mod predicate;
#[cfg(feature = "database")]
pub mod postgres;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use valuation_types::{IdentityKey, ValuationRecord};

use crate::error::StoreResult;

pub use predicate::{Predicate, StorePredicates};

// ============================================================================
// TRAIT
// ============================================================================

/// Read/write access to locally cached valuation records
#[async_trait]
pub trait ValuationStore: Send + Sync {
    /// All records matching every predicate, ordered newest first
    async fn find(&self, predicates: &StorePredicates) -> StoreResult<Vec<ValuationRecord>>;

    /// Insert or replace records by identity key; returns rows written
    async fn upsert(&self, records: &[ValuationRecord]) -> StoreResult<usize>;

    async fn count(&self) -> StoreResult<usize>;
}

/// Result ordering used by every store: valuation date descending, then
/// identifier, then provider.
pub fn record_order(a: &ValuationRecord, b: &ValuationRecord) -> Ordering {
    b.valuation_date
        .cmp(&a.valuation_date)
        .then_with(|| a.identifier.cmp(&b.identifier))
        .then_with(|| a.provider.cmp(&b.provider))
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Process-local store keyed by identity
#[derive(Default)]
pub struct MemoryValuationStore {
    records: RwLock<BTreeMap<IdentityKey, ValuationRecord>>,
}

impl MemoryValuationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ValuationRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.identity_key(), r))
            .collect::<BTreeMap<_, _>>();
        Self {
            records: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ValuationStore for MemoryValuationStore {
    async fn find(&self, predicates: &StorePredicates) -> StoreResult<Vec<ValuationRecord>> {
        let records = self.records.read().await;
        let mut found: Vec<ValuationRecord> = records
            .values()
            .filter(|r| predicates.matches(r))
            .cloned()
            .collect();
        found.sort_by(record_order);
        Ok(found)
    }

    async fn upsert(&self, incoming: &[ValuationRecord]) -> StoreResult<usize> {
        let mut records = self.records.write().await;
        for record in incoming {
            records.insert(record.identity_key(), record.clone());
        }
        Ok(incoming.len())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use valuation_types::{Provider, SearchQuery};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_identity() {
        let store = MemoryValuationStore::new();
        let mut r = ValuationRecord::new("COB07CDOPY71", d(2025, 6, 3), Provider::Precia);
        r.clean_price = Some(99.5);
        store.upsert(&[r.clone()]).await.unwrap();
        r.clean_price = Some(100.1);
        store.upsert(&[r.clone()]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let found = store
            .find(&StorePredicates::from_query(&SearchQuery::exact("COB07CDOPY71")))
            .await
            .unwrap();
        assert_eq!(found[0].clean_price, Some(100.1));
    }

    #[tokio::test]
    async fn test_find_orders_newest_first() {
        let store = MemoryValuationStore::with_records(vec![
            ValuationRecord::new("COB07CDOPY71", d(2025, 6, 2), Provider::Precia),
            ValuationRecord::new("COB07CDOPY71", d(2025, 6, 3), Provider::Precia),
            ValuationRecord::new("COB07CDOPY71", d(2025, 6, 3), Provider::PipLatam),
        ]);
        let found = store.find(&StorePredicates::default()).await.unwrap();
        let order: Vec<_> = found.iter().map(|r| (r.valuation_date, r.provider)).collect();
        assert_eq!(
            order,
            vec![
                (d(2025, 6, 3), Provider::PipLatam),
                (d(2025, 6, 3), Provider::Precia),
                (d(2025, 6, 2), Provider::Precia),
            ]
        );
    }
}
