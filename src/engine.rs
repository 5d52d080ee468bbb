//! QueryEngine
//!
//! The caller-facing facade. One call to [`QueryEngine::resolve_query`] is one
//! conversational turn:
//!
//! ```text
//! extraction ──► normalize ──► refine or fresh?
//!                                 │            │
//!                    filter held results    Resolver (local ─► remote)
//!                                 │            │
//!                                 └──► outcome (results | refine | empty)
//!                                              │
//!                                       session state
//! ```
//!
//! The session's turn lock is held from the state read to the state write.
//! [`QueryEngine::answer`] additionally routes "compare PIP and PRECIA for X"
//! messages to the provider comparison, which leaves session state alone.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use valuation_types::{
    EmptyReason, ExtractedQuery, IdentifierFilter, ResolutionOutcome, SearchQuery,
    ValuationRecord,
};

use crate::compare::{compare_providers, missing_data_alerts, DataAlert, ProviderComparison};
use crate::config::{EngineConfig, ResolverPolicy, SessionConfig};
use crate::conversation::{
    decide_turn, merge_refinement, ConversationState, MemorySessionStore, SessionStateStore,
    TurnKind,
};
use crate::error::ResolutionError;
use crate::normalize::{normalize_identifier, IncomingQuery};
use crate::refine::refinement_questions;
use crate::remote::{PostgrestSource, RemoteAccessor};
use crate::resolver::{filter_held, Resolver};
use crate::store::{MemoryValuationStore, ValuationStore};

/// Similar identifiers offered when an identifier search finds nothing
pub const SUGGESTION_LIMIT: usize = 5;

/// What one message produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TurnAnswer {
    Outcome(ResolutionOutcome),
    Comparison {
        comparison: ProviderComparison,
        alerts: Vec<DataAlert>,
    },
}

pub struct QueryEngine {
    resolver: Arc<Resolver>,
    sessions: Arc<dyn SessionStateStore>,
    session_config: SessionConfig,
    /// Fixed "today" for relative dates; the local clock when unset
    today: Option<NaiveDate>,
}

impl QueryEngine {
    pub fn new(
        resolver: Arc<Resolver>,
        sessions: Arc<dyn SessionStateStore>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            resolver,
            sessions,
            session_config,
            today: None,
        }
    }

    /// Engine over an in-memory session store
    pub fn in_memory(
        store: Arc<dyn ValuationStore>,
        remote: Option<Arc<RemoteAccessor>>,
        policy: ResolverPolicy,
    ) -> Self {
        Self::new(
            Arc::new(Resolver::new(store, remote, policy)),
            Arc::new(MemorySessionStore::new()),
            SessionConfig::default(),
        )
    }

    /// Build the store, remote accessor and session store from configuration.
    ///
    /// Uses Postgres when the `database` feature is enabled and `DATABASE_URL`
    /// is set, the in-memory store otherwise. The remote tier is enabled only
    /// when a base URL is configured.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, ResolutionError> {
        let store = build_store(config).await?;

        let remote = if config.remote.is_configured() {
            let source = PostgrestSource::from_config(&config.remote).map_err(|e| {
                ResolutionError::Config {
                    message: e.to_string(),
                }
            })?;
            Some(Arc::new(RemoteAccessor::new(
                Arc::new(source),
                config.remote.clone(),
            )))
        } else {
            info!("SUPABASE_URL not set; remote provider tables disabled");
            None
        };

        let resolver = Resolver::new(store, remote, config.resolver.clone());
        Ok(Self::new(
            Arc::new(resolver),
            Arc::new(MemorySessionStore::new()),
            config.sessions.clone(),
        ))
    }

    /// Pin the date used for "hoy"/"ayer"
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    // ========================================================================
    // TURNS
    // ========================================================================

    /// Answer one message: a provider comparison when it asks to compare a
    /// single identifier, a conversational turn otherwise
    pub async fn answer(
        &self,
        extracted: &ExtractedQuery,
        session_id: &str,
    ) -> Result<TurnAnswer, ResolutionError> {
        let incoming = IncomingQuery::from_extracted(extracted, self.today());
        if let Some(identifier) = incoming.comparison_target() {
            debug!(session = session_id, "Comparing providers for {}", identifier);
            let comparison = self.compare(identifier, incoming.valuation_date).await?;
            let alerts = missing_data_alerts(&comparison);
            return Ok(TurnAnswer::Comparison { comparison, alerts });
        }
        self.resolve_query(extracted, session_id)
            .await
            .map(TurnAnswer::Outcome)
    }

    /// Resolve one extracted message in the context of `session_id`
    pub async fn resolve_query(
        &self,
        extracted: &ExtractedQuery,
        session_id: &str,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        if let Some(idle_ttl) = self.session_config.idle_ttl {
            self.sessions.evict_idle(idle_ttl).await;
        }

        let lock = self.sessions.turn_lock(session_id).await;
        let _turn = lock.lock().await;

        let incoming = IncomingQuery::from_extracted(extracted, self.today());
        let state = self.sessions.get(session_id).await;

        if let Some(prior) = state {
            if decide_turn(Some(&prior), &incoming) == TurnKind::Refine {
                return Ok(self.refine_turn(session_id, prior, &incoming).await);
            }
        }
        self.fresh_turn(session_id, &incoming).await
    }

    /// Filter-only pass over the held results; never touches store or remote
    async fn refine_turn(
        &self,
        session_id: &str,
        prior: ConversationState,
        incoming: &IncomingQuery,
    ) -> ResolutionOutcome {
        let query = merge_refinement(&prior.last_query, incoming);
        let records = filter_held(&prior.last_results, &query);
        debug!(
            session = session_id,
            "Refinement kept {} of {} held records",
            records.len(),
            prior.last_results.len()
        );

        if records.is_empty() {
            return ResolutionOutcome::empty(EmptyReason::NoRefinedMatches);
        }

        let outcome = outcome_for(&records, &query);
        self.sessions
            .set(session_id, ConversationState::new(query, records))
            .await;
        outcome
    }

    async fn fresh_turn(
        &self,
        session_id: &str,
        incoming: &IncomingQuery,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        let query = incoming.to_search_query();
        if !query.has_meaningful_filter() && !query.has_date_filter() {
            debug!(session = session_id, "No usable filter in message");
            return Ok(ResolutionOutcome::empty(EmptyReason::MissingCriteria));
        }

        let records = self.resolver.resolve(&query).await?;

        let outcome = if records.is_empty() {
            ResolutionOutcome::Empty {
                reason: EmptyReason::NoMatches,
                suggestions: self.suggestions(&query).await,
            }
        } else {
            outcome_for(&records, &query)
        };

        if query.has_meaningful_filter() {
            self.sessions
                .set(session_id, ConversationState::new(query, records))
                .await;
        }
        Ok(outcome)
    }

    async fn suggestions(&self, query: &SearchQuery) -> Vec<String> {
        let (IdentifierFilter::Exact(id), Some(remote)) = (&query.identifier, self.resolver.remote())
        else {
            return Vec::new();
        };
        remote.similar_identifiers(id, SUGGESTION_LIMIT).await
    }

    // ========================================================================
    // STATE BOUNDARY
    // ========================================================================

    pub async fn get_state(&self, session_id: &str) -> Option<ConversationState> {
        self.sessions.get(session_id).await
    }

    /// Replace a session's state (e.g. restored by the persistence layer)
    pub async fn set_state(&self, session_id: &str, state: ConversationState) {
        let lock = self.sessions.turn_lock(session_id).await;
        let _turn = lock.lock().await;
        self.sessions.set(session_id, state).await;
    }

    pub async fn clear_state(&self, session_id: &str) -> Option<ConversationState> {
        self.sessions.remove(session_id).await
    }

    // ========================================================================
    // COMPARISON
    // ========================================================================

    /// Both providers' valuations of one identifier on `date` (latest if `None`)
    pub async fn compare(
        &self,
        identifier: &str,
        date: Option<NaiveDate>,
    ) -> Result<ProviderComparison, ResolutionError> {
        let Some(identifier) = normalize_identifier(identifier) else {
            return Ok(compare_providers(&[], "", date));
        };
        let query = SearchQuery {
            valuation_date: date,
            ..SearchQuery::exact(identifier.clone())
        };
        let records = self.resolver.resolve(&query).await?;
        Ok(compare_providers(&records, &identifier, date))
    }
}

fn outcome_for(records: &[ValuationRecord], query: &SearchQuery) -> ResolutionOutcome {
    let questions = refinement_questions(records, query);
    if questions.is_empty() {
        ResolutionOutcome::Results {
            records: records.to_vec(),
        }
    } else {
        ResolutionOutcome::Refine {
            questions,
            candidate_count: records.len(),
        }
    }
}

#[cfg(feature = "database")]
async fn build_store(config: &EngineConfig) -> Result<Arc<dyn ValuationStore>, ResolutionError> {
    if config.database.database_url.is_some() {
        let store = crate::store::postgres::PgValuationStore::connect(&config.database).await?;
        return Ok(Arc::new(store));
    }
    info!("DATABASE_URL not set; using in-memory valuation store");
    Ok(Arc::new(MemoryValuationStore::new()))
}

#[cfg(not(feature = "database"))]
async fn build_store(_config: &EngineConfig) -> Result<Arc<dyn ValuationStore>, ResolutionError> {
    Ok(Arc::new(MemoryValuationStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use valuation_types::{Provider, RefinementAttribute};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy() -> ResolverPolicy {
        ResolverPolicy {
            mnemonic_cache_ttl: None,
            write_back: false,
        }
    }

    fn record(id: &str, provider: Provider, coupon: f64) -> ValuationRecord {
        let mut r = ValuationRecord::new(id, d(2025, 6, 3), provider);
        r.mnemonic = Some("CDTCLPS5V".to_string());
        r.coupon_rate = Some(coupon);
        r.maturity_date = Some(d(2027, 8, 30));
        r
    }

    fn engine(records: Vec<ValuationRecord>) -> QueryEngine {
        QueryEngine::in_memory(
            Arc::new(MemoryValuationStore::with_records(records)),
            None,
            policy(),
        )
        .with_today(d(2025, 6, 3))
    }

    fn message(text: &str) -> ExtractedQuery {
        ExtractedQuery {
            raw_message: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_filterless_message_is_missing_criteria() {
        let engine = engine(vec![record("COB07CDOPY71", Provider::Precia, 8.85)]);
        let outcome = engine.resolve_query(&message("show me bonds"), "s1").await.unwrap();
        assert_eq!(outcome, ResolutionOutcome::empty(EmptyReason::MissingCriteria));
        assert!(engine.get_state("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_identifier_search_sets_state() {
        let engine = engine(vec![
            record("COB07CDOPY71", Provider::Precia, 8.85),
            record("COB07CDOPY71", Provider::PipLatam, 8.85),
        ]);
        let extracted = ExtractedQuery {
            identifiers: vec!["cob07cdopy71".to_string()],
            ..message("precio del cob07cdopy71")
        };
        let outcome = engine.resolve_query(&extracted, "s1").await.unwrap();
        match outcome {
            ResolutionOutcome::Results { records } => assert_eq!(records.len(), 2),
            other => panic!("expected results, got {:?}", other),
        }
        let state = engine.get_state("s1").await.unwrap();
        assert_eq!(state.last_query, SearchQuery::exact("COB07CDOPY71"));
    }

    #[tokio::test]
    async fn test_refinement_without_matches_keeps_state() {
        let engine = engine(vec![
            record("COB07CDOPY71", Provider::Precia, 8.85),
            record("COB07CDOPY72", Provider::Precia, 9.10),
        ]);
        let extracted = ExtractedQuery {
            mnemonic: Some("CDTCLPS5V".to_string()),
            ..message("CDTCLPS5V")
        };
        let first = engine.resolve_query(&extracted, "s1").await.unwrap();
        match first {
            ResolutionOutcome::Refine { questions, candidate_count } => {
                assert_eq!(candidate_count, 2);
                assert_eq!(questions[0].attribute, RefinementAttribute::Identifier);
            }
            other => panic!("expected refine, got {:?}", other),
        }

        let refinement = ExtractedQuery {
            coupon: Some(json!("7,5%")),
            ..message("el que tiene la tasa del 7,5%")
        };
        let outcome = engine.resolve_query(&refinement, "s1").await.unwrap();
        assert_eq!(outcome, ResolutionOutcome::empty(EmptyReason::NoRefinedMatches));
        assert_eq!(engine.get_state("s1").await.unwrap().last_results.len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_without_remote_has_no_suggestions() {
        let engine = engine(Vec::new());
        let extracted = ExtractedQuery {
            identifiers: vec!["COB07CDOPY99".to_string()],
            ..message("COB07CDOPY99")
        };
        let outcome = engine.resolve_query(&extracted, "s1").await.unwrap();
        assert_eq!(outcome, ResolutionOutcome::empty(EmptyReason::NoMatches));
    }

    #[tokio::test]
    async fn test_compare_uses_latest_date() {
        let mut pip = record("COB07CDOPY71", Provider::PipLatam, 8.85);
        pip.clean_price = Some(100.0);
        let mut precia = record("COB07CDOPY71", Provider::Precia, 8.85);
        precia.clean_price = Some(100.25);
        let engine = engine(vec![pip, precia]);

        let cmp = engine.compare("cob07cdopy71", None).await.unwrap();
        assert_eq!(cmp.valuation_date, Some(d(2025, 6, 3)));
        assert_eq!(cmp.differences.unwrap().clean_price, Some(0.25));
    }

    #[tokio::test]
    async fn test_comparison_message_is_answered_with_comparison() {
        let mut pip = record("COB07CDOPY71", Provider::PipLatam, 8.85);
        pip.clean_price = Some(100.0);
        let engine = engine(vec![pip]);

        let extracted = ExtractedQuery {
            identifiers: vec!["COB07CDOPY71".to_string()],
            comparison: true,
            ..message("compara PIP y PRECIA para COB07CDOPY71")
        };
        match engine.answer(&extracted, "s1").await.unwrap() {
            TurnAnswer::Comparison { comparison, alerts } => {
                assert!(comparison.pip_latam.is_some());
                assert!(comparison.precia.is_none());
                assert!(!alerts.is_empty());
            }
            other => panic!("expected comparison, got {:?}", other),
        }
        assert!(engine.get_state("s1").await.is_none());

        let plain = ExtractedQuery {
            identifiers: vec!["COB07CDOPY71".to_string()],
            ..message("precio del COB07CDOPY71")
        };
        assert!(matches!(
            engine.answer(&plain, "s1").await.unwrap(),
            TurnAnswer::Outcome(ResolutionOutcome::Results { .. })
        ));
    }
}
