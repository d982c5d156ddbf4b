//! Error types for the Weft domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error type; the engine folds them
//! into [`Error`] only where a failure is allowed to reach the caller.

use thiserror::Error;

/// The top-level error type for all Weft operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Engine errors ---
    /// The agent cannot be turned into a system prompt. The only failure a
    /// context build surfaces to its caller.
    #[error("Precondition failed for agent '{agent_id}': {reason}")]
    Precondition { agent_id: String, reason: String },

    /// A cache write tried to replace a newer snapshot with an older one.
    /// Unreachable while every write goes through the per-thread lock.
    #[error(
        "Cache race on thread '{thread_id}': cached version {cached_version}, attempted {attempted_version}"
    )]
    CacheRaceDetected {
        thread_id: String,
        cached_version: u64,
        attempted_version: u64,
    },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend failure: {0}")]
    Backend(String),

    #[error("Store call timed out: {0}")]
    Timeout(String),

    #[error("Stored value has unexpected shape: {0}")]
    Serialization(String),
}
