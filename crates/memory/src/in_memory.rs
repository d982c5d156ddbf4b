//! In-memory backends: useful for testing and ephemeral sessions.

use crate::vector::vector_search;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use weft_core::error::StoreError;
use weft_core::message::Turn;
use weft_core::store::{
    SharedStateStore, TurnLog, VectorMatch, VectorQuery, VectorRecord, VectorStore,
};

/// A turn log that keeps every thread in a `Vec`.
///
/// With a capacity set it behaves as a per-thread ring buffer: appending to
/// a full thread drops its oldest turn.
#[derive(Clone, Default)]
pub struct InMemoryTurnLog {
    threads: Arc<RwLock<HashMap<String, Vec<Turn>>>>,
    max_turns: Option<usize>,
}

impl InMemoryTurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_turns` turns per thread.
    pub fn with_capacity(max_turns: usize) -> Self {
        Self {
            threads: Arc::default(),
            max_turns: Some(max_turns.max(1)),
        }
    }

    /// Number of threads with at least one recorded turn.
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl TurnLog for InMemoryTurnLog {
    async fn append(&self, thread_id: &str, turn: Turn) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let turns = threads.entry(thread_id.to_string()).or_default();
        turns.push(turn);
        if let Some(max) = self.max_turns {
            if turns.len() > max {
                let overflow = turns.len() - max;
                turns.drain(..overflow);
                debug!(thread_id, dropped = overflow, "Turn log at capacity, dropped oldest turns");
            }
        }
        Ok(())
    }

    async fn read(&self, thread_id: &str) -> Result<Vec<Turn>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, thread_id: &str) -> Result<(), StoreError> {
        self.threads.write().await.remove(thread_id);
        Ok(())
    }
}

/// A brute-force vector store over an in-memory record list.
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    records: Arc<RwLock<Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<VectorMatch>, StoreError> {
        let records = self.records.read().await;
        Ok(vector_search(
            &records,
            &query.vector,
            query.top_k,
            &query.filter,
        ))
    }

    async fn upsert(&self, new_records: Vec<VectorRecord>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        debug!(count = new_records.len(), "Upserting vector records");
        for record in new_records {
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        Ok(())
    }
}

/// A shared state store backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct InMemorySharedState {
    values: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemorySharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SharedStateStore for InMemorySharedState {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
