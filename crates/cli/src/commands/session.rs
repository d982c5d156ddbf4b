//! Session files and local engine wiring shared by the commands.
//!
//! A session file is a JSON document seeding the in-memory backends:
//!
//! ```json
//! {
//!   "turns": [{"role": "user", "content": "..."}],
//!   "memories": [{"id": "m1", "vector": [0.1, 0.2], "metadata": {"content": "..."}}],
//!   "documents": [{"id": "d1", "title": "...", "summary": "..."}],
//!   "shared": {"key": "value"}
//! }
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use weft_config::EngineConfig;
use weft_context::ConversationContextBuilder;
use weft_core::agent::DocumentRef;
use weft_core::message::Turn;
use weft_core::store::{SharedStateStore, TurnLog, VectorRecord, VectorStore, keys};
use weft_memory::{InMemorySharedState, InMemoryTurnLog, InMemoryVectorStore, NoopVectorStore};
use weft_providers::OpenAiCompatProvider;

#[derive(Debug, Default, Deserialize)]
pub struct SessionFile {
    #[serde(default)]
    pub turns: Vec<Turn>,

    #[serde(default)]
    pub memories: Vec<VectorRecord>,

    #[serde(default)]
    pub documents: Vec<DocumentRef>,

    #[serde(default)]
    pub shared: serde_json::Map<String, serde_json::Value>,
}

impl SessionFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read session file {}: {e}", path.display()))?;
        let session = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid session file {}: {e}", path.display()))?;
        Ok(session)
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Load the config from `path`, or from the default location with
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

/// A builder over in-memory backends, with `session` seeded into
/// `thread_id`.
pub async fn local_builder(
    config: &EngineConfig,
    thread_id: &str,
    session: SessionFile,
) -> Result<ConversationContextBuilder, Box<dyn std::error::Error>> {
    let provider = Arc::new(OpenAiCompatProvider::from_config(
        &config.provider,
        config.summary_model(),
    ));
    if !provider.is_configured() {
        warn!("No API key configured; summaries and memory retrieval will degrade");
    }

    let turn_log = Arc::new(InMemoryTurnLog::new());
    for turn in session.turns {
        turn_log.append(thread_id, turn).await?;
    }

    let shared = Arc::new(InMemorySharedState::new());
    if !session.documents.is_empty() {
        shared
            .set(&keys::documents(thread_id), serde_json::to_value(&session.documents)?)
            .await?;
    }
    if !session.shared.is_empty() {
        shared
            .set(&keys::shared(thread_id), serde_json::Value::Object(session.shared))
            .await?;
    }

    let vector_store: Arc<dyn VectorStore> = if session.memories.is_empty() {
        Arc::new(NoopVectorStore)
    } else {
        let store = InMemoryVectorStore::new();
        let memories = session
            .memories
            .into_iter()
            .map(|mut record| {
                // Seeded memories belong to the configured organization
                record
                    .metadata
                    .entry("organization_id")
                    .or_insert_with(|| config.organization_id.clone().into());
                record
            })
            .collect();
        store.upsert(memories).await?;
        Arc::new(store)
    };

    Ok(ConversationContextBuilder::from_config(
        config,
        provider.clone(),
        provider,
        vector_store,
        turn_log,
        shared,
    ))
}
