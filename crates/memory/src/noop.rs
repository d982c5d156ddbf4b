//! No-op vector store: disables long-term memory retrieval entirely.

use async_trait::async_trait;
use weft_core::error::StoreError;
use weft_core::store::{VectorMatch, VectorQuery, VectorRecord, VectorStore};

/// A vector store that stores nothing and finds nothing.
pub struct NoopVectorStore;

#[async_trait]
impl VectorStore for NoopVectorStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn query(&self, _query: VectorQuery) -> Result<Vec<VectorMatch>, StoreError> {
        Ok(Vec::new())
    }

    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<(), StoreError> {
        Ok(())
    }
}
