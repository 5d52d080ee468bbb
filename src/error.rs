//! Error taxonomy for the bond query engine
//!
//! Only [`StoreError`] escapes the resolver: the local store is assumed to be
//! always reachable, so losing it fails the call. Remote failures are absorbed
//! per provider and parse failures are absorbed as "absent" values.

use thiserror::Error;

/// Error returned to the engine's callers
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Local store failures (fatal for the current resolution)
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid stored row for '{identifier}': {reason}")]
    InvalidRow { identifier: String, reason: String },
}

/// Remote provider table failures (absorbed per provider)
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Remote API error {status} on table '{table}': {body}")]
    Http {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from table '{table}': {message}")]
    Decode { table: String, message: String },

    #[error("Table '{table}' has no column for {column}")]
    MissingColumn { table: String, column: String },

    #[error("Table '{table}' is not available")]
    UnknownTable { table: String },

    #[error("Remote source not configured: {message}")]
    NotConfigured { message: String },
}

impl RemoteError {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Transport(_) => "transport",
            RemoteError::Http { .. } => "http",
            RemoteError::Decode { .. } => "decode",
            RemoteError::MissingColumn { .. } => "missing_column",
            RemoteError::UnknownTable { .. } => "unknown_table",
            RemoteError::NotConfigured { .. } => "not_configured",
        }
    }
}

/// Natural-language extraction failures
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Extractor backend failed: {message}")]
    Backend { message: String },

    #[error("Extractor returned malformed output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Empty message")]
    EmptyMessage,
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type RemoteResult<T> = Result<T, RemoteError>;
