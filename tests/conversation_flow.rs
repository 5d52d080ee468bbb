//! Multi-turn conversations through the QueryEngine
//!
//! Messages go through the keyword extractor exactly as the CLI sends them.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use bond_query::conversation::{phase, SessionPhase};
use bond_query::{
    EmptyReason, KeywordExtractor, MemoryRemoteSource, MemoryValuationStore, Provider,
    QueryEngine, RefinementAttribute, ResolutionOutcome, ValuationRecord,
};

use helpers::{
    accessor, d, policy, provider_row, CountingStore, SlowStore, PIP_TABLE, PRECIA_TABLE,
};

fn extract(message: &str) -> bond_query::ExtractedQuery {
    KeywordExtractor::new().extract_sync(message).unwrap()
}

/// Two identifiers under one mnemonic, each valued by both providers
fn clps_source() -> MemoryRemoteSource {
    let rows = vec![
        provider_row("COB07CDOPY71", "CDTCLPS5V", "2027-08-30", json!(8.85)),
        provider_row("COB07CDOPY72", "CDTCLPS5V", "2028-02-15", json!(9.10)),
    ];
    MemoryRemoteSource::new()
        .with_table(PIP_TABLE, rows.clone())
        .with_table(PRECIA_TABLE, rows)
}

#[tokio::test]
async fn test_coupon_refinement_filters_held_results_without_fetching() {
    let (source, remote) = accessor(clps_source());
    let engine = QueryEngine::in_memory(Arc::new(MemoryValuationStore::new()), Some(remote), policy())
        .with_today(d(2025, 6, 3));

    let first = engine
        .resolve_query(&extract("Busco el CDTCLPS5V"), "desk")
        .await
        .unwrap();
    match &first {
        ResolutionOutcome::Refine {
            questions,
            candidate_count,
        } => {
            assert_eq!(*candidate_count, 4);
            assert_eq!(questions[0].attribute, RefinementAttribute::Identifier);
        }
        other => panic!("expected refine, got {:?}", other),
    }
    let fetches = source.total_fetches().await;

    let second = engine
        .resolve_query(&extract("tiene la tasa facial del 8.85"), "desk")
        .await
        .unwrap();
    match second {
        ResolutionOutcome::Results { records } => {
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r.identifier == "COB07CDOPY71"));
            assert!(records.iter().all(|r| r.coupon_rate == Some(8.85)));
            let providers: Vec<_> = records.iter().map(|r| r.provider).collect();
            assert_eq!(providers, vec![Provider::PipLatam, Provider::Precia]);
        }
        other => panic!("expected results, got {:?}", other),
    }
    assert_eq!(source.total_fetches().await, fetches);

    let state = engine.get_state("desk").await.unwrap();
    assert_eq!(state.last_results.len(), 2);
    assert_eq!(state.last_query.coupon_rate, Some(8.85));
    assert_eq!(state.last_params.issuer.as_deref(), Some("CDTCLPS5V"));
}

#[tokio::test]
async fn test_maturity_refinement_uses_held_results() {
    let (source, remote) = accessor(clps_source());
    let engine = QueryEngine::in_memory(Arc::new(MemoryValuationStore::new()), Some(remote), policy());

    engine
        .resolve_query(&extract("CDTCLPS5V"), "desk")
        .await
        .unwrap();
    let fetches = source.total_fetches().await;

    let outcome = engine
        .resolve_query(&extract("el que vence el 15/02/2028"), "desk")
        .await
        .unwrap();
    match outcome {
        ResolutionOutcome::Results { records } => {
            assert_eq!(records.len(), 2);
            assert!(records.iter().all(|r| r.maturity_date == Some(d(2028, 2, 15))));
        }
        other => panic!("expected results, got {:?}", other),
    }
    assert_eq!(source.total_fetches().await, fetches);
}

#[tokio::test]
async fn test_filterless_messages_keep_session_idle() {
    let store = Arc::new(CountingStore::with_records(Vec::new()));
    let (source, remote) = accessor(clps_source());
    let engine = QueryEngine::in_memory(store.clone(), Some(remote), policy());

    for message in ["show me bonds", "show me those"] {
        let outcome = engine.resolve_query(&extract(message), "browse").await.unwrap();
        assert_eq!(outcome, ResolutionOutcome::empty(EmptyReason::MissingCriteria));
        assert_eq!(phase(engine.get_state("browse").await.as_ref()), SessionPhase::Idle);
    }
    assert_eq!(store.finds(), 0);
    assert_eq!(source.total_fetches().await, 0);
}

#[tokio::test]
async fn test_filterless_message_does_not_overwrite_active_state() {
    let (_, remote) = accessor(clps_source());
    let engine = QueryEngine::in_memory(Arc::new(MemoryValuationStore::new()), Some(remote), policy());

    engine
        .resolve_query(&extract("CDTCLPS5V"), "desk")
        .await
        .unwrap();
    let before = engine.get_state("desk").await.unwrap();

    engine
        .resolve_query(&extract("show me bonds"), "desk")
        .await
        .unwrap();
    let after = engine.get_state("desk").await.unwrap();
    assert_eq!(before.last_query, after.last_query);
    assert_eq!(before.last_results, after.last_results);
}

#[tokio::test]
async fn test_new_identifier_replaces_context() {
    let (_, remote) = accessor(clps_source());
    let engine = QueryEngine::in_memory(Arc::new(MemoryValuationStore::new()), Some(remote), policy());

    engine
        .resolve_query(&extract("CDTCLPS5V"), "desk")
        .await
        .unwrap();
    let outcome = engine
        .resolve_query(&extract("y el COB07CDOPY72 que tiene la tasa del 9,10"), "desk")
        .await
        .unwrap();
    match outcome {
        ResolutionOutcome::Results { records } => {
            assert!(records.iter().all(|r| r.identifier == "COB07CDOPY72"));
            assert_eq!(records.len(), 2);
        }
        other => panic!("expected results, got {:?}", other),
    }
    let state = engine.get_state("desk").await.unwrap();
    assert!(state.last_query.identifier.mnemonic().is_none());
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let (_, remote) = accessor(clps_source());
    let engine = Arc::new(
        QueryEngine::in_memory(Arc::new(MemoryValuationStore::new()), Some(remote), policy()),
    );

    let a = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.resolve_query(&extract("CDTCLPS5V"), "a").await })
    };
    let b = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.resolve_query(&extract("show me bonds"), "b").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert!(engine.get_state("a").await.is_some());
    assert!(engine.get_state("b").await.is_none());
}

#[tokio::test]
async fn test_unknown_identifier_offers_similar_ones() {
    let (_, remote) = accessor(clps_source());
    let engine = QueryEngine::in_memory(Arc::new(MemoryValuationStore::new()), Some(remote), policy());

    let outcome = engine
        .resolve_query(&extract("precio del COB07CDOPY79"), "desk")
        .await
        .unwrap();
    match outcome {
        ResolutionOutcome::Empty {
            reason,
            suggestions,
        } => {
            assert_eq!(reason, EmptyReason::NoMatches);
            assert!(suggestions.contains(&"COB07CDOPY71".to_string()));
            assert!(suggestions.contains(&"COB07CDOPY72".to_string()));
        }
        other => panic!("expected empty, got {:?}", other),
    }
}

/// Store holding both providers' valuations of two identifiers
fn held_records() -> Vec<ValuationRecord> {
    ["COB07CDOPY71", "COB07CDOPY72"]
        .iter()
        .flat_map(|id| {
            Provider::ALL
                .into_iter()
                .map(move |p| ValuationRecord::new(*id, d(2025, 6, 3), p))
        })
        .collect()
}

#[tokio::test]
async fn test_turns_on_one_session_run_one_at_a_time() {
    let store = Arc::new(SlowStore::with_records(held_records(), Duration::from_millis(30)));
    let engine = Arc::new(QueryEngine::in_memory(store.clone(), None, policy()));

    let turns: Vec<_> = ["precio del COB07CDOPY71", "precio del COB07CDOPY72"]
        .into_iter()
        .map(|message| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.resolve_query(&extract(message), "desk").await })
        })
        .collect();
    for turn in turns {
        assert!(matches!(
            turn.await.unwrap().unwrap(),
            ResolutionOutcome::Results { .. }
        ));
    }

    assert_eq!(store.max_in_flight(), 1);
    let state = engine.get_state("desk").await.unwrap();
    let identifiers: Vec<_> = state.last_results.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(identifiers.len(), 2);
    assert!(identifiers.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_turns_on_different_sessions_overlap() {
    let store = Arc::new(SlowStore::with_records(held_records(), Duration::from_millis(30)));
    let engine = Arc::new(QueryEngine::in_memory(store.clone(), None, policy()));

    let turns: Vec<_> = [("a", "precio del COB07CDOPY71"), ("b", "precio del COB07CDOPY72")]
        .into_iter()
        .map(|(session, message)| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.resolve_query(&extract(message), session).await })
        })
        .collect();
    for turn in turns {
        turn.await.unwrap().unwrap();
    }
    assert_eq!(store.max_in_flight(), 2);
}
