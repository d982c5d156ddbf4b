//! Memory fusion: parallel retrieval from three scopes, merged by score.
//!
//! One embedding of the inbound message drives three vector-store queries
//! issued concurrently: episodic memories of the thread, episodic memories
//! of the user, and an organization-wide semantic search. Every call is
//! time-bounded and fails soft; fusion as a whole never returns an error.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use weft_config::EngineConfig;
use weft_core::memory::{MemoryRecord, MemoryType};
use weft_core::message::Turn;
use weft_core::provider::EmbeddingGenerator;
use weft_core::store::{VectorFilter, VectorMatch, VectorQuery, VectorStore};

/// Memories kept after the merge when the caller has no preference.
pub const DEFAULT_FUSION_LIMIT: usize = 5;

const MEMORY_HEADER: &str = "Relevant context from previous interactions:";
const MEMORY_FOOTER: &str = "Use this context to inform your response when it is relevant.";

/// Retrieval scope, in merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Thread,
    User,
    Semantic,
}

impl Source {
    fn as_str(self) -> &'static str {
        match self {
            Source::Thread => "thread",
            Source::User => "user",
            Source::Semantic => "semantic",
        }
    }

    /// Memory type assumed when a match carries no `type` metadata.
    fn default_type(self) -> MemoryType {
        match self {
            Source::Thread | Source::User => MemoryType::Episodic,
            Source::Semantic => MemoryType::Semantic,
        }
    }
}

/// Retrieves and ranks long-term memories for a message.
pub struct MemoryFusionEngine {
    embedder: Arc<dyn EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
    organization_id: String,
    thread_top_k: usize,
    user_top_k: usize,
    semantic_top_k: usize,
    min_relevance: f32,
    timeout: Duration,
}

impl MemoryFusionEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingGenerator>,
        store: Arc<dyn VectorStore>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            organization_id: organization_id.into(),
            thread_top_k: 3,
            user_top_k: 3,
            semantic_top_k: 2,
            min_relevance: 0.0,
            timeout: Duration::from_secs(2),
        }
    }

    pub fn from_config(
        embedder: Arc<dyn EmbeddingGenerator>,
        store: Arc<dyn VectorStore>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            organization_id: config.organization_id.clone(),
            thread_top_k: config.memory.thread_top_k,
            user_top_k: config.memory.user_top_k,
            semantic_top_k: config.memory.semantic_top_k,
            min_relevance: config.memory.min_relevance,
            timeout: config.memory.retrieval_timeout(),
        }
    }

    /// Drop memories scoring below `min_relevance` before the merge.
    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Retrieve at most `limit` memories relevant to `query`.
    ///
    /// Results are the concatenation of the thread, user and semantic
    /// sources, stable-sorted by descending score. Cross-source duplicates
    /// are kept.
    pub async fn fuse(
        &self,
        query: &str,
        user_id: &str,
        thread_id: &str,
        limit: usize,
    ) -> Vec<MemoryRecord> {
        if limit == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let vector = match tokio::time::timeout(self.timeout, self.embedder.embed(query)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!(error = %e, "Embedding failed, skipping memory retrieval");
                return Vec::new();
            }
            Err(_) => {
                warn!("Embedding timed out, skipping memory retrieval");
                return Vec::new();
            }
        };

        let org = VectorFilter::for_organization(&self.organization_id);
        let (thread, user, semantic) = tokio::join!(
            self.search(
                Source::Thread,
                &vector,
                self.thread_top_k,
                org.clone().thread(thread_id).memory_type(MemoryType::Episodic),
            ),
            self.search(
                Source::User,
                &vector,
                self.user_top_k,
                org.clone().user(user_id).memory_type(MemoryType::Episodic),
            ),
            self.search(Source::Semantic, &vector, self.semantic_top_k, org),
        );

        let mut merged: Vec<MemoryRecord> = thread
            .into_iter()
            .chain(user)
            .chain(semantic)
            .filter(|m| m.score >= self.min_relevance)
            .collect();
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(limit);

        debug!(
            thread_id,
            memories = merged.len(),
            "Fused memories from thread, user, and semantic scopes"
        );
        merged
    }

    async fn search(
        &self,
        source: Source,
        vector: &[f32],
        top_k: usize,
        filter: VectorFilter,
    ) -> Vec<MemoryRecord> {
        if top_k == 0 {
            return Vec::new();
        }
        let query = VectorQuery {
            vector: vector.to_vec(),
            top_k,
            filter,
        };
        match tokio::time::timeout(self.timeout, self.store.query(query)).await {
            Ok(Ok(matches)) => matches
                .into_iter()
                .filter_map(|m| record_from_match(m, source.default_type()))
                .collect(),
            Ok(Err(e)) => {
                warn!(
                    source = source.as_str(),
                    store = self.store.name(),
                    error = %e,
                    "Memory search failed"
                );
                Vec::new()
            }
            Err(_) => {
                warn!(
                    source = source.as_str(),
                    store = self.store.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Memory search timed out"
                );
                Vec::new()
            }
        }
    }
}

/// Turn a vector store hit into a memory. Hits without text content are
/// skipped.
fn record_from_match(m: VectorMatch, default_type: MemoryType) -> Option<MemoryRecord> {
    let metadata = &m.metadata;
    let content = metadata.get("content")?.as_str()?.to_string();

    let memory_type = metadata
        .get("type")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_type);
    let tags: BTreeSet<String> = metadata
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let importance = metadata
        .get("importance")
        .and_then(|v| v.as_f64())
        .map(|v| (v as f32).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    let created_at = metadata
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default();

    Some(MemoryRecord {
        id: m.id,
        memory_type,
        content,
        score: m.score.unwrap_or(0.0).clamp(0.0, 1.0),
        tags,
        importance,
        created_at,
    })
}

/// Render memories as the system message injected after the prompt.
/// Returns `None` for an empty set.
pub fn render_memory_context(memories: &[MemoryRecord]) -> Option<Turn> {
    if memories.is_empty() {
        return None;
    }
    let mut text = String::from(MEMORY_HEADER);
    for (i, memory) in memories.iter().enumerate() {
        text.push_str(&format!("\n[Memory {}] {}", i + 1, memory.content));
    }
    text.push_str("\n\n");
    text.push_str(MEMORY_FOOTER);
    Some(Turn::system(text))
}
