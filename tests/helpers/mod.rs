//! Shared fixtures for the integration tests
//!
//! Provider tables are built as raw rows with the column names the real
//! tables use, so every scenario goes through column probing and projection.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use bond_query::config::RemoteConfig;
use bond_query::error::{StoreError, StoreResult};
use bond_query::remote::RemoteRow;
use bond_query::store::StorePredicates;
use bond_query::{
    MemoryRemoteSource, MemoryValuationStore, RemoteAccessor, ResolverPolicy, ValuationRecord,
    ValuationStore,
};

pub const PIP_TABLE: &str = "BD_PIP";
pub const PRECIA_TABLE: &str = "BD_Precia";

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// A provider-table row in the shape the PostgREST tables return
pub fn provider_row(identifier: &str, mnemonic: &str, maturity: &str, coupon: Value) -> RemoteRow {
    json!({
        "ISIN": identifier,
        "NEMOTECNICO": mnemonic,
        "EMISOR": "BANCO EJEMPLO",
        "FECHA_VALORACION": "2025-06-03",
        "FECHA_VENCIMIENTO": maturity,
        "TASA_FACIAL": coupon,
        "PRECIO_LIMPIO": 100.125,
        "TIR": 9.42,
    })
    .as_object()
    .cloned()
    .unwrap()
}

pub fn remote_config() -> RemoteConfig {
    RemoteConfig {
        base_url: None,
        api_key: None,
        table_pip: PIP_TABLE.to_string(),
        table_precia: PRECIA_TABLE.to_string(),
        page_size: 2,
        max_pages: 20,
        max_rows: 10_000,
        request_timeout: std::time::Duration::from_secs(5),
    }
}

pub fn accessor(source: MemoryRemoteSource) -> (Arc<MemoryRemoteSource>, Arc<RemoteAccessor>) {
    let source = Arc::new(source);
    let accessor = Arc::new(RemoteAccessor::new(source.clone(), remote_config()));
    (source, accessor)
}

pub fn policy() -> ResolverPolicy {
    ResolverPolicy {
        mnemonic_cache_ttl: None,
        write_back: true,
    }
}

/// Store whose every call fails, as when the database is unreachable
pub struct UnreachableStore;

#[async_trait]
impl ValuationStore for UnreachableStore {
    async fn find(&self, _predicates: &StorePredicates) -> StoreResult<Vec<ValuationRecord>> {
        Err(StoreError::Unavailable {
            message: "connection refused".to_string(),
        })
    }

    async fn upsert(&self, _records: &[ValuationRecord]) -> StoreResult<usize> {
        Err(StoreError::Unavailable {
            message: "connection refused".to_string(),
        })
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(0)
    }
}

/// In-memory store that counts lookups
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryValuationStore,
    pub finds: AtomicUsize,
}

impl CountingStore {
    pub fn with_records(records: Vec<ValuationRecord>) -> Self {
        Self {
            inner: MemoryValuationStore::with_records(records),
            finds: AtomicUsize::new(0),
        }
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValuationStore for CountingStore {
    async fn find(&self, predicates: &StorePredicates) -> StoreResult<Vec<ValuationRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(predicates).await
    }

    async fn upsert(&self, records: &[ValuationRecord]) -> StoreResult<usize> {
        self.inner.upsert(records).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

/// In-memory store whose lookups take a while, recording how many overlap
pub struct SlowStore {
    pub inner: MemoryValuationStore,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowStore {
    pub fn with_records(records: Vec<ValuationRecord>, delay: Duration) -> Self {
        Self {
            inner: MemoryValuationStore::with_records(records),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ValuationStore for SlowStore {
    async fn find(&self, predicates: &StorePredicates) -> StoreResult<Vec<ValuationRecord>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let result = self.inner.find(predicates).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn upsert(&self, records: &[ValuationRecord]) -> StoreResult<usize> {
        self.inner.upsert(records).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}
