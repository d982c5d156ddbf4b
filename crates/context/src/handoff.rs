//! Agent-to-agent handoff.
//!
//! A handoff renders what one agent knows about a thread into text the next
//! agent can start from, and optionally publishes it as a structured package
//! in the shared store.

use crate::builder::ConversationContextBuilder;
use crate::cache::ContextCache;
use crate::shared::{merge_shared_entries, read_documents};
use crate::snapshot::ContextSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use weft_core::agent::{AgentProfile, DocumentRef};
use weft_core::error::Result;
use weft_core::event::{ContextEvent, EventBus};
use weft_core::store::{SharedStateStore, keys};

/// Returned by [`HandoffCoordinator::build_handoff`] when the source agent
/// has no snapshot in the thread.
pub const NO_CONTEXT_SENTINEL: &str = "No previous context available for handoff.";

const DEFAULT_GOAL: &str = "Continue assisting the user with their current task.";
const SUMMARY_TURNS: usize = 5;
const MAX_INSIGHTS: usize = 3;
const CLIP_CHARS: usize = 200;

/// Identity of the agent a package came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAgent {
    pub id: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub name: String,
}

impl From<&AgentProfile> for SourceAgent {
    fn from(agent: &AgentProfile) -> Self {
        Self {
            id: agent.id.clone(),
            agent_type: agent.agent_type.clone(),
            name: agent.name.clone(),
        }
    }
}

/// Structured handoff written to `handoff:<target>:<source>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPackage {
    pub conversation_summary: String,
    #[serde(default)]
    pub document_refs: Vec<DocumentRef>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub transfer_data: serde_json::Map<String, serde_json::Value>,
    pub source_agent: SourceAgent,
    pub synced_at: DateTime<Utc>,
}

/// Builds handoff text from cached snapshots and publishes packages.
pub struct HandoffCoordinator {
    cache: Arc<ContextCache>,
    shared_state: Arc<dyn SharedStateStore>,
    events: Option<Arc<EventBus>>,
    timeout: Duration,
}

impl HandoffCoordinator {
    pub fn new(cache: Arc<ContextCache>, shared_state: Arc<dyn SharedStateStore>) -> Self {
        Self {
            cache,
            shared_state,
            events: None,
            timeout: Duration::from_secs(2),
        }
    }

    /// A coordinator sharing the builder's cache, store and event bus.
    pub fn for_builder(builder: &ConversationContextBuilder) -> Self {
        Self {
            cache: builder.cache().clone(),
            shared_state: builder.shared_state().clone(),
            events: builder.events().cloned(),
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Render the latest context `from` built in a thread for `to`.
    ///
    /// Never fails: without a snapshot the result is
    /// [`NO_CONTEXT_SENTINEL`].
    pub fn build_handoff(&self, thread_id: &str, from: &AgentProfile, to: &AgentProfile) -> String {
        match self.cache.latest_for_agent(thread_id, &from.id) {
            Some(snapshot) => render_handoff(&snapshot, from, to),
            None => {
                debug!(thread_id, agent_id = %from.id, "No snapshot to hand off");
                NO_CONTEXT_SENTINEL.to_string()
            }
        }
    }

    /// Publish a handoff package from one thread to another.
    ///
    /// Overwrites any earlier package for the same thread pair, records the
    /// handoff in the target's shared data and drops the target's cached
    /// snapshots.
    pub async fn sync(
        &self,
        source_thread_id: &str,
        target_thread_id: &str,
        source_agent: &AgentProfile,
        target_agent: &AgentProfile,
        transfer_data: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<HandoffPackage> {
        let snapshot = self.cache.latest_for_agent(source_thread_id, &source_agent.id);
        let conversation_summary = match &snapshot {
            Some(snapshot) => render_handoff(snapshot, source_agent, target_agent),
            None => NO_CONTEXT_SENTINEL.to_string(),
        };
        let key_insights = snapshot
            .as_ref()
            .map(|s| {
                s.memories
                    .iter()
                    .take(MAX_INSIGHTS)
                    .map(|m| m.content.clone())
                    .collect()
            })
            .unwrap_or_default();
        let document_refs =
            read_documents(self.shared_state.as_ref(), source_thread_id, self.timeout).await;

        let package = HandoffPackage {
            conversation_summary,
            document_refs,
            key_insights,
            transfer_data: transfer_data.unwrap_or_default(),
            source_agent: SourceAgent::from(source_agent),
            synced_at: Utc::now(),
        };

        self.shared_state
            .set(
                &keys::handoff(target_thread_id, source_thread_id),
                serde_json::to_value(&package)?,
            )
            .await?;

        let lock = self.cache.thread_lock(target_thread_id);
        let _guard = lock.lock().await;

        let mut marker = serde_json::Map::new();
        marker.insert(
            "last_handoff".into(),
            serde_json::json!({
                "source_thread_id": source_thread_id,
                "source_agent": package.source_agent,
                "synced_at": package.synced_at,
            }),
        );
        merge_shared_entries(self.shared_state.as_ref(), target_thread_id, marker).await?;
        let entries_removed = self.cache.invalidate(target_thread_id);

        info!(
            source_thread_id,
            target_thread_id,
            from = %source_agent.id,
            to = %target_agent.id,
            entries_removed,
            "Published handoff package"
        );
        if let Some(events) = &self.events {
            events.publish(ContextEvent::HandoffPublished {
                source_thread_id: source_thread_id.to_string(),
                target_thread_id: target_thread_id.to_string(),
                timestamp: package.synced_at,
            });
        }

        Ok(package)
    }
}

fn clip(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= CLIP_CHARS {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(CLIP_CHARS).collect();
    clipped.push_str("...");
    clipped
}

fn render_handoff(snapshot: &ContextSnapshot, from: &AgentProfile, to: &AgentProfile) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Handoff from {} ({}) to {} ({}).",
        from.name, from.agent_type, to.name, to.agent_type
    );

    let user_turns = snapshot.recent_user_turns(SUMMARY_TURNS);
    if !user_turns.is_empty() {
        out.push_str("\nRecent user requests:\n");
        for (i, turn) in user_turns.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, clip(&turn.content));
        }
    }

    if let Some(documents) = &snapshot.document_context {
        let _ = writeln!(out, "\n{documents}");
    }

    if !snapshot.memories.is_empty() {
        out.push_str("\nKey context:\n");
        for memory in snapshot.memories.iter().take(MAX_INSIGHTS) {
            let _ = writeln!(out, "- {}", clip(&memory.content));
        }
    }

    let goal = user_turns
        .last()
        .map(|t| clip(&t.content))
        .unwrap_or_else(|| DEFAULT_GOAL.to_string());
    let _ = write!(out, "\nUser goal: {goal}");
    out
}
