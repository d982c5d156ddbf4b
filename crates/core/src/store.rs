//! Storage collaborator traits: vector store, turn log, shared state.
//!
//! The engine only reads through these interfaces (apart from shared-state
//! writes issued on behalf of the host). Every call is fallible; the engine
//! decides per call site whether a failure degrades or propagates.

use crate::error::StoreError;
use crate::memory::MemoryType;
use crate::message::Turn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata filter for a vector query.
///
/// The organization is required: a query can only be constructed through
/// [`VectorFilter::for_organization`], so no caller can forget tenant
/// isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorFilter {
    organization_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_type: Option<MemoryType>,
}

impl VectorFilter {
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            thread_id: None,
            user_id: None,
            memory_type: None,
        }
    }

    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Whether a record's metadata satisfies every constraint of this filter.
    pub fn matches(&self, metadata: &serde_json::Map<String, serde_json::Value>) -> bool {
        let field_is = |key: &str, expected: &str| {
            metadata.get(key).and_then(|v| v.as_str()) == Some(expected)
        };

        if !field_is("organization_id", &self.organization_id) {
            return false;
        }
        if let Some(thread_id) = &self.thread_id {
            if !field_is("thread_id", thread_id) {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if !field_is("user_id", user_id) {
                return false;
            }
        }
        if let Some(memory_type) = &self.memory_type {
            if !field_is("type", memory_type.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A similarity query against a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: VectorFilter,
}

/// A single vector store hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,

    /// Similarity score; some stores omit it
    #[serde(default)]
    pub score: Option<f32>,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A record written to a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// An embedding-similarity index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The backend name (e.g., "pinecone", "in_memory").
    fn name(&self) -> &str;

    async fn query(&self, query: VectorQuery) -> Result<Vec<VectorMatch>, StoreError>;

    /// Not used by the engine; part of the collaborator contract.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), StoreError>;
}

/// Thread-scoped, append-only conversation history.
#[async_trait]
pub trait TurnLog: Send + Sync {
    async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), StoreError>;

    /// All turns of a thread in recording order.
    async fn read(&self, thread_id: &str) -> Result<Vec<Turn>, StoreError>;

    async fn clear(&self, thread_id: &str) -> Result<(), StoreError>;
}

/// Cross-agent key/value state owned by the host.
#[async_trait]
pub trait SharedStateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
}

/// Key layout inside the shared state store.
pub mod keys {
    /// Cross-agent key/value mapping for a thread.
    pub fn shared(thread_id: &str) -> String {
        format!("shared:{thread_id}")
    }

    /// Active documents of a thread (JSON array of `DocumentRef`).
    pub fn documents(thread_id: &str) -> String {
        format!("documents:{thread_id}")
    }

    /// Handoff package published from `source_thread_id` to `target_thread_id`.
    pub fn handoff(target_thread_id: &str, source_thread_id: &str) -> String {
        format!("handoff:{target_thread_id}:{source_thread_id}")
    }
}
