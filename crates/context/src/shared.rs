//! Reads and writes against the host's shared state store.

use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;
use weft_core::agent::DocumentRef;
use weft_core::error::{Result, StoreError};
use weft_core::store::{SharedStateStore, keys};

/// The thread's cross-agent key/value view. Degrades to an empty map.
pub async fn read_shared_data(
    store: &dyn SharedStateStore,
    thread_id: &str,
    timeout: Duration,
) -> Map<String, Value> {
    match read_key(store, &keys::shared(thread_id), timeout).await {
        Ok(Some(Value::Object(map))) => map,
        Ok(Some(other)) => {
            warn!(thread_id, kind = value_kind(&other), "Shared data is not an object, ignoring");
            Map::new()
        }
        Ok(None) => Map::new(),
        Err(e) => {
            warn!(thread_id, error = %e, "Failed to read shared data");
            Map::new()
        }
    }
}

/// The thread's active documents. Degrades to an empty list.
pub async fn read_documents(
    store: &dyn SharedStateStore,
    thread_id: &str,
    timeout: Duration,
) -> Vec<DocumentRef> {
    match read_key(store, &keys::documents(thread_id), timeout).await {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!(thread_id, error = %e, "Malformed document list, ignoring");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(thread_id, error = %e, "Failed to read documents");
            Vec::new()
        }
    }
}

/// Render documents as a bullet list, `None` when there are none.
pub fn format_document_context(documents: &[DocumentRef]) -> Option<String> {
    if documents.is_empty() {
        return None;
    }
    let mut text = String::from("Active documents:");
    for doc in documents {
        if doc.summary.trim().is_empty() {
            text.push_str(&format!("\n- {}", doc.title));
        } else {
            text.push_str(&format!("\n- {}: {}", doc.title, doc.summary));
        }
    }
    Some(text)
}

/// Merge `entries` into the thread's shared object, replacing keys that
/// already exist. A non-object value under the key is overwritten.
pub async fn merge_shared_entries(
    store: &dyn SharedStateStore,
    thread_id: &str,
    entries: Map<String, Value>,
) -> Result<()> {
    let key = keys::shared(thread_id);
    let mut current = match store.get(&key).await? {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    current.extend(entries);
    store.set(&key, Value::Object(current)).await?;
    Ok(())
}

async fn read_key(
    store: &dyn SharedStateStore,
    key: &str,
    timeout: Duration,
) -> std::result::Result<Option<Value>, StoreError> {
    tokio::time::timeout(timeout, store.get(key))
        .await
        .map_err(|_| StoreError::Timeout(format!("reading '{key}'")))?
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
