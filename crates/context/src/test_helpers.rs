//! Shared collaborator mocks for engine unit tests.

use std::sync::Mutex;
use std::time::Duration;
use weft_core::error::{ProviderError, StoreError};
use weft_core::message::Turn;
use weft_core::provider::{Completion, CompletionProvider, CompletionRequest, EmbeddingGenerator};
use weft_core::store::{
    SharedStateStore, TurnLog, VectorMatch, VectorQuery, VectorRecord, VectorStore,
};

/// A summarizer that always answers with the same text and records calls.
pub struct ScriptedSummarizer {
    reply: String,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedSummarizer {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedSummarizer {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request);
        Ok(Completion {
            content: self.reply.clone(),
            model: "mock-model".into(),
        })
    }
}

/// A provider whose every call fails.
pub struct FailingProvider;

#[async_trait::async_trait]
impl CompletionProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::Api {
            status_code: 500,
            message: "internal error".into(),
        })
    }
}

/// A provider that sleeps before answering.
pub struct SlowProvider {
    delay: Duration,
}

impl SlowProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow_mock"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(Completion {
            content: "late summary".into(),
            model: "mock-model".into(),
        })
    }
}

/// Returns the same embedding for every input.
pub struct StaticEmbedder(pub Vec<f32>);

#[async_trait::async_trait]
impl EmbeddingGenerator for StaticEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.0.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait::async_trait]
impl EmbeddingGenerator for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::Unavailable("no embedding service".into()))
    }
}

/// Serves canned matches and records every query it receives.
#[derive(Default)]
pub struct RecordingVectorStore {
    matches: Vec<VectorMatch>,
    queries: Mutex<Vec<VectorQuery>>,
}

impl RecordingVectorStore {
    pub fn with_matches(matches: Vec<VectorMatch>) -> Self {
        Self {
            matches,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<VectorQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl VectorStore for RecordingVectorStore {
    fn name(&self) -> &str {
        "recording_mock"
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<VectorMatch>, StoreError> {
        let top_k = query.top_k;
        let filter = query.filter.clone();
        self.queries.lock().unwrap().push(query);
        Ok(self
            .matches
            .iter()
            .filter(|m| filter.matches(&m.metadata))
            .take(top_k)
            .cloned()
            .collect())
    }

    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct FailingVectorStore;

#[async_trait::async_trait]
impl VectorStore for FailingVectorStore {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn query(&self, _query: VectorQuery) -> Result<Vec<VectorMatch>, StoreError> {
        Err(StoreError::Unavailable("index offline".into()))
    }

    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("index offline".into()))
    }
}

/// A turn log that cannot be read.
pub struct FailingTurnLog;

#[async_trait::async_trait]
impl TurnLog for FailingTurnLog {
    async fn append(&self, _thread_id: &str, _turn: Turn) -> Result<(), StoreError> {
        Err(StoreError::Backend("log offline".into()))
    }

    async fn read(&self, _thread_id: &str) -> Result<Vec<Turn>, StoreError> {
        Err(StoreError::Backend("log offline".into()))
    }

    async fn clear(&self, _thread_id: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("log offline".into()))
    }
}

/// A shared state store whose every call fails.
pub struct FailingSharedState;

#[async_trait::async_trait]
impl SharedStateStore for FailingSharedState {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Err(StoreError::Timeout("shared state".into()))
    }

    async fn set(&self, _key: &str, _value: serde_json::Value) -> Result<(), StoreError> {
        Err(StoreError::Timeout("shared state".into()))
    }
}
