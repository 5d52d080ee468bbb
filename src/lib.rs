//! bond-query - conversational query resolution over bond valuations
//!
//! Answers "what is the valuation of X?" questions against a local cache of
//! valuation records and two remote provider tables (PIP_LATAM and PRECIA),
//! keeping enough per-session state to turn follow-ups into refinements.
//!
//! ## Call chain
//! Extraction -> Normalizer -> Conversation decision -> Resolver (local, then
//! remote) -> Refinement questions -> ResolutionOutcome
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bond_query::{QueryEngine, MemoryValuationStore, ResolverPolicy};
//! use bond_query::extract::KeywordExtractor;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = QueryEngine::in_memory(
//!     Arc::new(MemoryValuationStore::new()),
//!     None,
//!     ResolverPolicy::default(),
//! );
//! let extracted = KeywordExtractor::new().extract_sync("precio del COB07CDOPY71 hoy")?;
//! let outcome = engine.resolve_query(&extracted, "session-1").await?;
//! println!("{}", serde_json::to_string_pretty(&outcome)?);
//! # Ok(())
//! # }
//! ```

// Core error handling and configuration
pub mod config;
pub mod error;

// Pure value normalization
pub mod normalize;

// Storage tiers
pub mod remote;
pub mod store;

// Raw remote rows -> records
pub mod projector;

// Resolution and conversation
pub mod conversation;
pub mod refine;
pub mod resolver;

// Collaborators and reporting
pub mod compare;
pub mod extract;

// Facade
pub mod engine;

pub use valuation_types;
pub use valuation_types::{
    EmptyReason, ExtractedQuery, IdentifierFilter, Intent, Provider, QueryFields,
    RefinementAttribute, RefinementQuestion, ResolutionOutcome, SearchQuery, ValuationRecord,
};

pub use compare::{compare_providers, missing_data_alerts, DataAlert, ProviderComparison};
pub use config::{EngineConfig, RemoteConfig, ResolverPolicy, SessionConfig};
pub use conversation::{ConversationState, MemorySessionStore, SessionPhase, SessionStateStore};
pub use engine::{QueryEngine, TurnAnswer};
pub use error::{ExtractError, RemoteError, ResolutionError, StoreError};
pub use extract::{Extractor, FallbackExtractor, KeywordExtractor};
pub use remote::{MemoryRemoteSource, PostgrestSource, RemoteAccessor, RemoteSource};
pub use resolver::{Resolution, Resolver};
pub use store::{MemoryValuationStore, ValuationStore};
