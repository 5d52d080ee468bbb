//! Resolver (Query Engine)
//!
//! Turns one [`SearchQuery`] into a merged, deduplicated, ordered list of
//! [`ValuationRecord`]s drawn from the local store and, when needed, from the
//! two provider tables.
//!
//! ```text
//! local pass ──► needs remote? ──► per-provider fetch (concurrent) ──► project
//!                                   │                                   │
//!                                   └── failures absorbed ──────────────┤
//!                                                                       ▼
//!          sort ◄── dual-provider completion ◄── merge/dedup ◄── exact filter
//! ```
//!
//! Only local-store failures propagate. Remote failures degrade completeness
//! for the provider that failed and nothing else.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use valuation_types::{IdentifierFilter, IdentityKey, Provider, SearchQuery, ValuationRecord};

use crate::config::ResolverPolicy;
use crate::error::ResolutionError;
use crate::projector::project_rows;
use crate::remote::{RemoteAccessor, RemoteCriteria};
use crate::store::{record_order, Predicate, StorePredicates, ValuationStore};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Resolution result plus what happened on the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub records: Vec<ValuationRecord>,
    /// The remote tier was queried for this resolution
    pub remote_consulted: bool,
    /// Providers whose remote fetch failed outright
    pub failed_providers: Vec<Provider>,
}

/// Why the remote tier is (not) consulted
#[derive(Debug, Clone, PartialEq)]
enum RemotePlan {
    Skip,
    Fetch(RemoteCriteria),
}

/// Outcome of one provider's remote pass, already projected and filtered
struct ProviderPass {
    provider: Provider,
    records: Vec<ValuationRecord>,
    /// Complete (no mid-stream failure), so it may supersede local rows
    authoritative: bool,
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct Resolver {
    store: Arc<dyn ValuationStore>,
    remote: Option<Arc<RemoteAccessor>>,
    policy: ResolverPolicy,
    /// Last complete remote fetch per mnemonic query
    mnemonic_fetches: RwLock<HashMap<String, Instant>>,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn ValuationStore>,
        remote: Option<Arc<RemoteAccessor>>,
        policy: ResolverPolicy,
    ) -> Self {
        Self {
            store,
            remote,
            policy,
            mnemonic_fetches: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ValuationStore> {
        &self.store
    }

    pub fn remote(&self) -> Option<&Arc<RemoteAccessor>> {
        self.remote.as_ref()
    }

    /// Resolve a query to its final record list
    pub async fn resolve(&self, query: &SearchQuery) -> Result<Vec<ValuationRecord>, ResolutionError> {
        Ok(self.resolve_with_report(query).await?.records)
    }

    /// Resolve a query, reporting remote activity alongside the records
    pub async fn resolve_with_report(
        &self,
        query: &SearchQuery,
    ) -> Result<Resolution, ResolutionError> {
        let predicates = StorePredicates::from_query(query);
        let local = self.store.find(&predicates).await?;
        debug!("Local pass returned {} rows for {:?}", local.len(), query.identifier);

        let plan = self.plan_remote(query, &local).await;
        let mut resolution = Resolution::default();

        let merged = match plan {
            RemotePlan::Skip => local,
            RemotePlan::Fetch(criteria) => {
                resolution.remote_consulted = true;
                let (passes, failed) = self.fetch_providers(query, &criteria).await;
                resolution.failed_providers = failed;

                self.write_back(passes.iter().flat_map(|p| p.records.iter().cloned()).collect())
                    .await;
                if query.identifier.is_mnemonic()
                    && resolution.failed_providers.is_empty()
                    && passes.iter().all(|p| p.authoritative)
                {
                    self.mark_mnemonic_fetched(query).await;
                }

                merge(query, local, passes)
            }
        };

        let mut records = self.complete_other_provider(query, merged).await?;
        records.sort_by(record_order);
        info!(
            "Resolved {} records (remote: {}, failed providers: {:?})",
            records.len(),
            resolution.remote_consulted,
            resolution.failed_providers
        );
        resolution.records = records;
        Ok(resolution)
    }

    // ------------------------------------------------------------------------
    // Remote decision
    // ------------------------------------------------------------------------

    async fn plan_remote(&self, query: &SearchQuery, local: &[ValuationRecord]) -> RemotePlan {
        if self.remote.is_none() {
            return RemotePlan::Skip;
        }
        let criteria = RemoteCriteria::from_query(query);

        match &query.identifier {
            IdentifierFilter::Mnemonic(code) => {
                if !local.is_empty() && self.mnemonic_is_fresh(query).await {
                    debug!("Mnemonic {} fetched recently; local cache is authoritative", code);
                    RemotePlan::Skip
                } else {
                    RemotePlan::Fetch(criteria)
                }
            }
            IdentifierFilter::List(ids) => {
                let found: HashSet<String> =
                    local.iter().map(|r| r.identifier.to_uppercase()).collect();
                let missing: Vec<String> = ids
                    .iter()
                    .map(|id| id.trim().to_uppercase())
                    .filter(|id| !id.is_empty() && !found.contains(id))
                    .collect();
                if missing.is_empty() {
                    RemotePlan::Skip
                } else {
                    debug!("{} of {} identifiers missing locally", missing.len(), ids.len());
                    RemotePlan::Fetch(criteria.with_identifiers(missing))
                }
            }
            IdentifierFilter::Exact(_) | IdentifierFilter::None => {
                if local.is_empty() {
                    RemotePlan::Fetch(criteria)
                } else {
                    RemotePlan::Skip
                }
            }
        }
    }

    fn mnemonic_key(query: &SearchQuery) -> Option<String> {
        query
            .identifier
            .is_mnemonic()
            .then(|| serde_json::to_string(query).ok())
            .flatten()
    }

    async fn mnemonic_is_fresh(&self, query: &SearchQuery) -> bool {
        let (Some(ttl), Some(key)) = (self.policy.mnemonic_cache_ttl, Self::mnemonic_key(query))
        else {
            return false;
        };
        self.mnemonic_fetches
            .read()
            .await
            .get(&key)
            .map(|at| at.elapsed() < ttl)
            .unwrap_or(false)
    }

    /// Record a complete fetch, dropping entries that have already expired
    async fn mark_mnemonic_fetched(&self, query: &SearchQuery) {
        let (Some(ttl), Some(key)) = (self.policy.mnemonic_cache_ttl, Self::mnemonic_key(query))
        else {
            return;
        };
        let mut fetches = self.mnemonic_fetches.write().await;
        fetches.retain(|_, at| at.elapsed() < ttl);
        fetches.insert(key, Instant::now());
    }

    // ------------------------------------------------------------------------
    // Remote fetch
    // ------------------------------------------------------------------------

    async fn fetch_providers(
        &self,
        query: &SearchQuery,
        criteria: &RemoteCriteria,
    ) -> (Vec<ProviderPass>, Vec<Provider>) {
        let Some(remote) = &self.remote else {
            return (Vec::new(), Vec::new());
        };
        let providers: Vec<Provider> = match query.provider {
            Some(p) => vec![p],
            None => Provider::ALL.to_vec(),
        };

        let exact = StorePredicates::from_query(query);
        let fetches = providers.iter().map(|provider| {
            let remote = Arc::clone(remote);
            let provider = *provider;
            async move { (provider, remote.fetch_provider(provider, criteria).await) }
        });

        let mut passes = Vec::new();
        let mut failed = Vec::new();
        for (provider, result) in join_all(fetches).await {
            match result {
                Ok(batch) => {
                    let projected = project_rows(provider, &batch.rows, &batch.catalog);
                    let records = exact.filter(&projected);
                    debug!(
                        "{} ({}): {} rows in {} pages, {} projected, {} after exact filter",
                        provider,
                        batch.table,
                        batch.rows.len(),
                        batch.pages,
                        projected.len(),
                        records.len()
                    );
                    passes.push(ProviderPass {
                        provider,
                        records,
                        authoritative: !batch.partial,
                    });
                }
                // Already logged with full context by the accessor
                Err(_) => failed.push(provider),
            }
        }
        (passes, failed)
    }

    async fn write_back(&self, records: Vec<ValuationRecord>) {
        if !self.policy.write_back || records.is_empty() {
            return;
        }
        match self.store.upsert(&records).await {
            Ok(n) => debug!("Cached {} remote records locally", n),
            Err(e) => warn!("Cache write-back of {} records failed: {}", records.len(), e),
        }
    }

    // ------------------------------------------------------------------------
    // Dual-provider completion
    // ------------------------------------------------------------------------

    /// With exactly one record and no provider filter, look up the same
    /// identifier at the other provider and append its closest record.
    ///
    /// The lookup keeps every date and attribute predicate of the query, so
    /// the appended record satisfies the query on its own.
    async fn complete_other_provider(
        &self,
        query: &SearchQuery,
        records: Vec<ValuationRecord>,
    ) -> Result<Vec<ValuationRecord>, ResolutionError> {
        if records.len() != 1 || query.provider.is_some() {
            return Ok(records);
        }
        let found = &records[0];
        let other = found.provider.other();

        let completion = SearchQuery {
            identifier: IdentifierFilter::Exact(found.identifier.clone()),
            provider: Some(other),
            valuation_date: query.valuation_date,
            date_from: query.date_from,
            date_to: query.date_to,
            maturity_date: query.maturity_date,
            coupon_rate: query.coupon_rate,
            ..Default::default()
        };

        let mut candidates = self
            .store
            .find(&StorePredicates::from_query(&completion))
            .await?;

        if candidates.is_empty() {
            if let Some(remote) = &self.remote {
                let criteria = RemoteCriteria::from_query(&completion);
                if let Ok(batch) = remote.fetch_provider(other, &criteria).await {
                    let projected = project_rows(other, &batch.rows, &batch.catalog);
                    candidates = StorePredicates::from_query(&completion).filter(&projected);
                    self.write_back(candidates.clone()).await;
                }
            }
        }

        let pick = candidates
            .iter()
            .find(|r| r.valuation_date == found.valuation_date)
            .or_else(|| candidates.iter().max_by_key(|r| r.valuation_date))
            .cloned();

        let mut records = records;
        if let Some(pick) = pick {
            debug!("Completed {} with {} record", pick.identifier, other);
            records.push(pick);
        }
        Ok(records)
    }
}

// ============================================================================
// MERGE / FILTER
// ============================================================================

/// Merge local rows with remote passes, deduplicating on the identity key.
///
/// Mnemonic searches let each complete remote pass supersede that provider's
/// local rows; every other search unions the sets (remote wins on conflicts).
fn merge(
    query: &SearchQuery,
    local: Vec<ValuationRecord>,
    passes: Vec<ProviderPass>,
) -> Vec<ValuationRecord> {
    let superseded: HashSet<Provider> = if query.identifier.is_mnemonic() {
        passes
            .iter()
            .filter(|p| p.authoritative)
            .map(|p| p.provider)
            .collect()
    } else {
        HashSet::new()
    };

    let mut by_key: BTreeMap<IdentityKey, ValuationRecord> = BTreeMap::new();
    for record in local.into_iter().filter(|r| !superseded.contains(&r.provider)) {
        by_key.insert(record.identity_key(), record);
    }
    for record in passes.into_iter().flat_map(|p| p.records) {
        by_key.insert(record.identity_key(), record);
    }
    by_key.into_values().collect()
}

/// Attribute-only filter over held records, ordered like a resolution
pub fn filter_held(held: &[ValuationRecord], query: &SearchQuery) -> Vec<ValuationRecord> {
    let mut predicates = StorePredicates::attributes_only(query);
    if let IdentifierFilter::Exact(id) = &query.identifier {
        // A refinement that names one of the held identifiers narrows to it
        predicates.push(Predicate::IdentifierEq(id.trim().to_uppercase()));
    }
    let mut records = predicates.filter(held);
    records.sort_by(record_order);
    records
}
