//! The immutable result of a context build.

use crate::token::TokenStats;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use weft_core::memory::MemoryRecord;
use weft_core::message::Turn;

/// Everything an agent needs to answer the next message of a thread.
///
/// Snapshots are never mutated after construction; the cache hands out
/// clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub thread_id: String,
    pub user_id: String,
    pub agent_id: String,

    /// Messages to send to the model, budgeted and possibly compressed
    pub history: Vec<Turn>,

    pub token_stats: TokenStats,

    /// Ranked memories retrieved for the message, whether or not they fit
    /// into `history`
    pub memories: Vec<MemoryRecord>,

    /// Cross-agent key/value view of the thread
    #[serde(default)]
    pub shared_data: serde_json::Map<String, serde_json::Value>,

    /// Rendered list of the thread's active documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_context: Option<String>,

    /// Per-thread build counter, starting at 1
    pub version: u64,

    pub content_hash: String,

    pub created_at: DateTime<Utc>,

    /// Older turns were summarized or truncated
    #[serde(default)]
    pub compressed: bool,

    /// The memory system message is part of `history`
    #[serde(default)]
    pub memory_injected: bool,
}

impl ContextSnapshot {
    /// The latest user turns, oldest first, at most `n`.
    pub fn recent_user_turns(&self, n: usize) -> Vec<&Turn> {
        let mut turns: Vec<&Turn> = self
            .history
            .iter()
            .rev()
            .filter(|t| t.role == weft_core::message::Role::User)
            .take(n)
            .collect();
        turns.reverse();
        turns
    }
}

/// Identity hash of a snapshot: SHA-256 over the identifiers and the
/// creation time, truncated to 16 hex digits.
pub fn content_hash(
    thread_id: &str,
    user_id: &str,
    agent_id: &str,
    created_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    for part in [thread_id, user_id, agent_id] {
        hasher.update(part.as_bytes());
        hasher.update([0x1fu8]);
    }
    hasher.update(created_at.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
