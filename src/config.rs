//! Engine configuration
//!
//! Everything is read from the environment (a `.env` file is honoured through
//! `dotenvy`). Every value has a default so the engine can start with nothing
//! but an in-memory store.

use std::time::Duration;

use valuation_types::Provider;

/// Rows requested per remote page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Hard cap on page iterations per provider fetch
pub const MAX_PAGE_ITERATIONS: usize = 20;

/// Pagination stops early once this many rows have been collected
pub const MAX_REMOTE_ROWS: usize = 10_000;

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub resolver: ResolverPolicy,
    pub sessions: SessionConfig,
}

impl EngineConfig {
    /// Load `.env` (if present) and read the configuration from the environment
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self {
            sessions: SessionConfig::from_env(),
            ..Self::default()
        }
    }
}

/// Local store connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: env_string("DATABASE_URL"),
            max_connections: env_parse("DATABASE_POOL_SIZE").unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Remote provider tables (PostgREST)
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub base_url: Option<String>,
    /// API key or user access token
    pub api_key: Option<String>,
    pub table_pip: String,
    pub table_precia: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub max_rows: usize,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn table_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::PipLatam => &self.table_pip,
            Provider::Precia => &self.table_precia,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: env_string("SUPABASE_URL"),
            api_key: env_string("SUPABASE_API_KEY"),
            table_pip: env_string("SUPABASE_TABLE_PIP").unwrap_or_else(|| "BD_PIP".to_string()),
            table_precia: env_string("SUPABASE_TABLE_PRECIA")
                .unwrap_or_else(|| "BD_Precia".to_string()),
            page_size: env_parse("REMOTE_PAGE_SIZE").unwrap_or(DEFAULT_PAGE_SIZE),
            max_pages: env_parse("REMOTE_MAX_PAGES").unwrap_or(MAX_PAGE_ITERATIONS),
            max_rows: env_parse("REMOTE_MAX_ROWS").unwrap_or(MAX_REMOTE_ROWS),
            request_timeout: Duration::from_secs(env_parse("REMOTE_TIMEOUT_SECS").unwrap_or(30)),
        }
    }
}

/// Resolver behaviour knobs
#[derive(Debug, Clone)]
pub struct ResolverPolicy {
    /// How long a remote mnemonic fetch keeps the local cache authoritative.
    /// `None` means every mnemonic search goes to the remote tier.
    pub mnemonic_cache_ttl: Option<Duration>,
    /// Upsert remote records into the local store after a remote pass
    pub write_back: bool,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        let ttl_secs: u64 = env_parse("MNEMONIC_CACHE_TTL_SECS").unwrap_or(600);
        Self {
            mnemonic_cache_ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            write_back: env_parse("CACHE_WRITE_BACK").unwrap_or(true),
        }
    }
}

/// Session state retention
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Sessions idle for longer than this are evicted; `None` keeps them forever
    pub idle_ttl: Option<Duration>,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            idle_ttl: env_parse::<u64>("SESSION_IDLE_TTL_SECS").map(Duration::from_secs),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}
