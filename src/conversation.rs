//! Conversation State Manager
//!
//! Per-session memory of the last resolved query and its results, the
//! refine-vs-new decision for each incoming message, and the filter merge for
//! refinements.
//!
//! A session is **Idle** until a query with a meaningful filter resolves; from
//! then on it is **Active**. Filterless queries never create or overwrite an
//! Active state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use valuation_types::{QueryFields, SearchQuery, ValuationRecord};

use crate::normalize::{fold_text, IncomingQuery};

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Active,
}

/// What a session remembers between turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub last_query: SearchQuery,
    pub last_results: Vec<ValuationRecord>,
    /// Dual-field snapshot of `last_query`, as exchanged with persistence
    pub last_params: QueryFields,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(query: SearchQuery, results: Vec<ValuationRecord>) -> Self {
        Self {
            last_params: query.to_fields(),
            last_query: query,
            last_results: results,
            updated_at: Utc::now(),
        }
    }
}

/// Phase of a session given its (possibly absent) state
pub fn phase(state: Option<&ConversationState>) -> SessionPhase {
    match state {
        Some(_) => SessionPhase::Active,
        None => SessionPhase::Idle,
    }
}

// ============================================================================
// TURN DECISION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// Replace the search context
    Fresh,
    /// Narrow the held results
    Refine,
}

/// Phrases that mark a follow-up as narrowing the previous answer.
/// Compared against accent-folded, lowercased text.
const REFINEMENT_CUES: &[&str] = &[
    "estoy buscando",
    "busco el",
    "busco la",
    "el que tiene",
    "la que tiene",
    "el que tenga",
    "la que tenga",
    "que tenga",
    "tiene la tasa",
    "tiene el cupon",
    "con la tasa",
    "con tasa",
    "con el cupon",
    "con cupon",
    "que vence",
    "con vencimiento",
    "de esos",
    "de esas",
    "i'm looking for",
    "im looking for",
    "looking for the",
    "the one that has",
    "the one with",
    "with the rate",
    "with a rate",
    "with the coupon",
    "that matures",
    "of those",
];

pub fn has_refinement_cue(message: &str) -> bool {
    let folded = fold_text(message);
    REFINEMENT_CUES.iter().any(|cue| folded.contains(cue))
}

/// Decide whether `incoming` refines the session's held results
pub fn decide_turn(state: Option<&ConversationState>, incoming: &IncomingQuery) -> TurnKind {
    let Some(state) = state else {
        return TurnKind::Fresh;
    };
    if incoming.carries_identity() {
        return TurnKind::Fresh;
    }
    let narrows = incoming.carries_discriminator() || has_refinement_cue(&incoming.message);
    if narrows && !state.last_results.is_empty() {
        TurnKind::Refine
    } else {
        TurnKind::Fresh
    }
}

/// Combine the prior query with a refinement turn.
///
/// Identity (identifier, list or mnemonic) always carries forward. Maturity,
/// coupon, provider and valuation date take the new value when the turn
/// supplies one, otherwise the prior one.
pub fn merge_refinement(prior: &SearchQuery, incoming: &IncomingQuery) -> SearchQuery {
    SearchQuery {
        identifier: prior.identifier.clone(),
        provider: incoming.provider.or(prior.provider),
        valuation_date: incoming.valuation_date.or(prior.valuation_date),
        date_from: prior.date_from,
        date_to: prior.date_to,
        issuer: prior.issuer.clone(),
        instrument_type: prior.instrument_type.clone(),
        maturity_date: incoming.maturity_date.or(prior.maturity_date),
        coupon_rate: incoming.coupon_rate.or(prior.coupon_rate),
    }
}

// ============================================================================
// SESSION STORE
// ============================================================================

/// Session-keyed state with per-session turn serialization.
///
/// A turn holds the session's `turn_lock` from reading state until writing the
/// new one, so two in-flight requests for one session never interleave.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<ConversationState>;

    async fn set(&self, session_id: &str, state: ConversationState);

    async fn remove(&self, session_id: &str) -> Option<ConversationState>;

    /// The mutex that serializes turns for one session
    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>>;

    /// Drop sessions not updated within `max_idle`; returns how many
    async fn evict_idle(&self, max_idle: Duration) -> usize;
}

/// Process-local session store
#[derive(Default)]
pub struct MemorySessionStore {
    states: RwLock<HashMap<String, ConversationState>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStateStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<ConversationState> {
        self.states.read().await.get(session_id).cloned()
    }

    async fn set(&self, session_id: &str, state: ConversationState) {
        self.states
            .write()
            .await
            .insert(session_id.to_string(), state);
    }

    async fn remove(&self, session_id: &str) -> Option<ConversationState> {
        self.states.write().await.remove(session_id)
    }

    async fn turn_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn evict_idle(&self, max_idle: Duration) -> usize {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;

        let mut states = self.states.write().await;
        let stale: Vec<String> = states
            .iter()
            .filter(|(_, s)| s.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            states.remove(id);
        }
        drop(states);

        let mut locks = self.locks.lock().await;
        // Keep locks someone is still holding a handle to
        locks.retain(|id, lock| !stale.contains(id) || Arc::strong_count(lock) > 1);

        if !stale.is_empty() {
            debug!("Evicted {} idle sessions", stale.len());
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use valuation_types::{IdentifierFilter, Provider};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn active() -> ConversationState {
        let mut query = SearchQuery::mnemonic("CDTCLPS5V");
        query.maturity_date = Some(d(2027, 8, 30));
        query.coupon_rate = Some(9.10);
        ConversationState::new(
            query,
            vec![ValuationRecord::new("COB07CDOPY71", d(2025, 6, 3), Provider::Precia)],
        )
    }

    fn incoming(message: &str) -> IncomingQuery {
        IncomingQuery {
            message: message.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_idle_is_never_refinement() {
        let mut turn = incoming("el que tiene la tasa del 8.85");
        turn.coupon_rate = Some(8.85);
        assert_eq!(decide_turn(None, &turn), TurnKind::Fresh);
    }

    #[test]
    fn test_new_identity_is_fresh() {
        let state = active();
        let mut turn = incoming("y el COB07CDOPY72 que tiene la tasa");
        turn.identifiers = vec!["COB07CDOPY72".to_string()];
        assert_eq!(decide_turn(Some(&state), &turn), TurnKind::Fresh);
    }

    #[test]
    fn test_discriminator_or_cue_refines() {
        let state = active();
        let mut turn = incoming("8.85");
        turn.coupon_rate = Some(8.85);
        assert_eq!(decide_turn(Some(&state), &turn), TurnKind::Refine);
        assert_eq!(
            decide_turn(Some(&state), &incoming("Estoy buscando el de Precia")),
            TurnKind::Refine
        );
        assert_eq!(decide_turn(Some(&state), &incoming("hola")), TurnKind::Fresh);
    }

    #[test]
    fn test_empty_held_results_do_not_refine() {
        let mut state = active();
        state.last_results.clear();
        let mut turn = incoming("con la tasa 8.85");
        turn.coupon_rate = Some(8.85);
        assert_eq!(decide_turn(Some(&state), &turn), TurnKind::Fresh);
    }

    #[test]
    fn test_cue_matching_ignores_accents() {
        assert!(has_refinement_cue("Con el cupón del 8,85"));
        assert!(!has_refinement_cue("precio de hoy"));
    }

    #[test]
    fn test_merge_prefers_new_coupon_and_keeps_identity() {
        let prior = active().last_query;
        let mut turn = incoming("tiene la tasa facial del 8.85");
        turn.coupon_rate = Some(8.85);
        let merged = merge_refinement(&prior, &turn);
        assert_eq!(merged.identifier, IdentifierFilter::Mnemonic("CDTCLPS5V".to_string()));
        assert_eq!(merged.coupon_rate, Some(8.85));
        assert_eq!(merged.maturity_date, Some(d(2027, 8, 30)));

        let merged = merge_refinement(&prior, &incoming("the one that has"));
        assert_eq!(merged.coupon_rate, Some(9.10));
    }

    #[test]
    fn test_state_snapshot_uses_dual_fields() {
        let state = active();
        assert_eq!(state.last_params.issuer.as_deref(), Some("CDTCLPS5V"));
        assert_eq!(state.last_params.instrument_type.as_deref(), Some("CDTCLPS5V"));
        assert_eq!(phase(Some(&state)), SessionPhase::Active);
        assert_eq!(phase(None), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_turn_lock_is_shared_per_session() {
        let store = MemorySessionStore::new();
        let a = store.turn_lock("s1").await;
        let b = store.turn_lock("s1").await;
        let c = store.turn_lock("s2").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _held = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(c.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let store = MemorySessionStore::new();
        let mut old = active();
        old.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.set("old", old).await;
        store.set("fresh", active()).await;

        let evicted = store.evict_idle(Duration::from_secs(3600)).await;
        assert_eq!(evicted, 1);
        assert!(store.get("old").await.is_none());
        assert!(store.get("fresh").await.is_some());
    }
}
