//! Conversation context builder: the engine's entry point.
//!
//! A build goes through these stages:
//!
//! 1. Serve a fresh cached snapshot unless a refresh is forced
//! 2. Take the thread lock and look again (single flight)
//! 3. Read history, degrading to empty
//! 4. Budget the candidate message list, compressing when needed
//! 5. Fuse memories and inject them if they fit
//! 6. Attach documents and shared data
//! 7. Version, cache and return the snapshot
//!
//! Stage 7 has no await point: a build dropped before it completes leaves
//! the cache and the version counter untouched.

use crate::cache::{CacheKey, ContextCache};
use crate::fusion::{DEFAULT_FUSION_LIMIT, MemoryFusionEngine, render_memory_context};
use crate::shared::{
    format_document_context, merge_shared_entries, read_documents, read_shared_data,
};
use crate::snapshot::{ContextSnapshot, content_hash};
use crate::token::{Compression, TokenBudgetManager, count_turns};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use weft_config::EngineConfig;
use weft_core::agent::AgentProfile;
use weft_core::error::Result;
use weft_core::event::{ContextEvent, EventBus};
use weft_core::message::Turn;
use weft_core::provider::{CompletionProvider, EmbeddingGenerator};
use weft_core::store::{SharedStateStore, TurnLog, VectorStore};

/// Per-build switches.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Skip the cache lookup and always rebuild
    pub force_refresh: bool,
    pub include_documents: bool,
    pub include_shared_context: bool,
    /// Target model; the configured default when absent
    pub model: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            include_documents: true,
            include_shared_context: true,
            model: None,
        }
    }
}

impl BuildOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Assembles budgeted, memory-enriched context snapshots.
pub struct ConversationContextBuilder {
    budget: TokenBudgetManager,
    fusion: MemoryFusionEngine,
    cache: Arc<ContextCache>,
    turn_log: Arc<dyn TurnLog>,
    shared_state: Arc<dyn SharedStateStore>,
    events: Option<Arc<EventBus>>,
    default_model: String,
    memory_limit: usize,
    retrieval_timeout: Duration,
}

impl ConversationContextBuilder {
    pub fn new(
        budget: TokenBudgetManager,
        fusion: MemoryFusionEngine,
        cache: Arc<ContextCache>,
        turn_log: Arc<dyn TurnLog>,
        shared_state: Arc<dyn SharedStateStore>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            budget,
            fusion,
            cache,
            turn_log,
            shared_state,
            events: None,
            default_model: default_model.into(),
            memory_limit: DEFAULT_FUSION_LIMIT,
            retrieval_timeout: Duration::from_secs(2),
        }
    }

    /// Wire every collaborator from the loaded configuration.
    pub fn from_config(
        config: &EngineConfig,
        summarizer: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn EmbeddingGenerator>,
        vector_store: Arc<dyn VectorStore>,
        turn_log: Arc<dyn TurnLog>,
        shared_state: Arc<dyn SharedStateStore>,
    ) -> Self {
        Self {
            budget: TokenBudgetManager::from_config(summarizer, config),
            fusion: MemoryFusionEngine::from_config(embedder, vector_store, config),
            cache: Arc::new(ContextCache::from_config(config)),
            turn_log,
            shared_state,
            events: None,
            default_model: config.default_model.clone(),
            memory_limit: config.memory.limit,
            retrieval_timeout: config.memory.retrieval_timeout(),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub fn budget(&self) -> &TokenBudgetManager {
        &self.budget
    }

    pub fn shared_state(&self) -> &Arc<dyn SharedStateStore> {
        &self.shared_state
    }

    pub fn events(&self) -> Option<&Arc<EventBus>> {
        self.events.as_ref()
    }

    fn publish(&self, event: ContextEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    /// Build (or serve from cache) the context for `message` in a thread.
    ///
    /// Fails only when the agent has no usable system prompt, or when the
    /// cache reports a version race.
    pub async fn build(
        &self,
        thread_id: &str,
        user_id: &str,
        agent: &AgentProfile,
        message: &str,
        options: &BuildOptions,
    ) -> Result<ContextSnapshot> {
        let system_prompt = agent.resolve_system_prompt()?;
        let key = CacheKey::new(thread_id, user_id, &agent.id);

        if !options.force_refresh {
            if let Some(snapshot) = self.cached(&key) {
                return Ok(snapshot);
            }
        }

        let lock = self.cache.thread_lock(thread_id);
        let _guard = lock.lock().await;

        // Another build may have finished while we waited
        if !options.force_refresh {
            if let Some(snapshot) = self.cached(&key) {
                return Ok(snapshot);
            }
        }

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let history = self.read_history(thread_id).await;
        let mut candidate = Vec::with_capacity(history.len() + 2);
        candidate.push(Turn::system(system_prompt));
        candidate.extend(history);
        candidate.push(Turn::user(message));

        let mut compressed = false;
        if self.budget.should_compress(&candidate, &model) {
            let tokens_before = count_turns(&candidate);
            let prepared = self.budget.prepare(&candidate, &model).await;
            if prepared.compression != Compression::Unchanged {
                compressed = true;
                let tokens_after = count_turns(&prepared.turns);
                debug!(
                    thread_id,
                    tokens_before,
                    tokens_after,
                    compression = ?prepared.compression,
                    "Compressed history"
                );
                self.publish(ContextEvent::CompressionApplied {
                    thread_id: thread_id.to_string(),
                    tokens_before,
                    tokens_after,
                    timestamp: Utc::now(),
                });
            }
            candidate = prepared.turns;
        }

        let memories = self
            .fusion
            .fuse(message, user_id, thread_id, self.memory_limit)
            .await;

        let mut memory_injected = false;
        if let Some(memory_turn) = render_memory_context(&memories) {
            let at = candidate.len().min(1);
            candidate.insert(at, memory_turn);
            if count_turns(&candidate) > self.budget.usable_budget(&model) {
                candidate.remove(at);
                debug!(
                    thread_id,
                    memories = memories.len(),
                    "Memory context does not fit, leaving it out"
                );
            } else {
                memory_injected = true;
            }
        }

        let document_context = if options.include_documents {
            let documents =
                read_documents(self.shared_state.as_ref(), thread_id, self.retrieval_timeout).await;
            format_document_context(&documents)
        } else {
            None
        };

        let shared_data = if options.include_shared_context {
            read_shared_data(self.shared_state.as_ref(), thread_id, self.retrieval_timeout).await
        } else {
            serde_json::Map::new()
        };

        // No await below this point
        let token_stats = self.budget.stats(&candidate, &model);
        let created_at = Utc::now();
        let version = self.cache.next_version(thread_id);
        let snapshot = ContextSnapshot {
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            agent_id: agent.id.clone(),
            history: candidate,
            token_stats,
            memories,
            shared_data,
            document_context,
            version,
            content_hash: content_hash(thread_id, user_id, &agent.id, created_at),
            created_at,
            compressed,
            memory_injected,
        };
        self.cache.put(key, snapshot.clone())?;

        info!(
            thread_id,
            agent_id = %agent.id,
            version,
            tokens = snapshot.token_stats.current_tokens,
            usage = snapshot.token_stats.usage_percentage,
            memories = snapshot.memories.len(),
            compressed,
            "Built context snapshot"
        );
        self.publish(ContextEvent::SnapshotBuilt {
            thread_id: thread_id.to_string(),
            version,
            current_tokens: snapshot.token_stats.current_tokens,
            memories: snapshot.memories.len(),
            timestamp: created_at,
        });

        Ok(snapshot)
    }

    /// Merge entries into the thread's shared data and drop its cached
    /// snapshots so the next build sees them.
    pub async fn update_shared_context(
        &self,
        thread_id: &str,
        entries: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let lock = self.cache.thread_lock(thread_id);
        let _guard = lock.lock().await;
        merge_shared_entries(self.shared_state.as_ref(), thread_id, entries).await?;
        self.invalidate(thread_id);
        Ok(())
    }

    /// Forget a thread's history and cached snapshots. Versions keep
    /// counting from where they were.
    pub async fn clear_thread(&self, thread_id: &str) -> Result<()> {
        let lock = self.cache.thread_lock(thread_id);
        let _guard = lock.lock().await;
        self.turn_log.clear(thread_id).await?;
        self.invalidate(thread_id);
        Ok(())
    }

    fn invalidate(&self, thread_id: &str) {
        let entries_removed = self.cache.invalidate(thread_id);
        debug!(thread_id, entries_removed, "Invalidated cached snapshots");
        self.publish(ContextEvent::CacheInvalidated {
            thread_id: thread_id.to_string(),
            entries_removed,
            timestamp: Utc::now(),
        });
    }

    fn cached(&self, key: &CacheKey) -> Option<ContextSnapshot> {
        let snapshot = self.cache.get(key)?;
        debug!(thread_id = %key.thread_id, version = snapshot.version, "Context cache hit");
        self.publish(ContextEvent::CacheHit {
            thread_id: key.thread_id.clone(),
            version: snapshot.version,
            timestamp: Utc::now(),
        });
        Some(snapshot)
    }

    async fn read_history(&self, thread_id: &str) -> Vec<Turn> {
        match tokio::time::timeout(self.retrieval_timeout, self.turn_log.read(thread_id)).await {
            Ok(Ok(turns)) => turns,
            Ok(Err(e)) => {
                warn!(thread_id, error = %e, "Failed to read history, building without it");
                Vec::new()
            }
            Err(_) => {
                warn!(thread_id, "History read timed out, building without it");
                Vec::new()
            }
        }
    }
}
