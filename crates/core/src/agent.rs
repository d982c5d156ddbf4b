//! Agent profiles and document references.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// The identity of an agent a context is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable agent identifier (part of the cache key)
    pub id: String,

    /// Agent category, e.g. "research" or "support"
    #[serde(rename = "type")]
    pub agent_type: String,

    /// Human-readable display name
    pub name: String,

    /// The agent's system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl AgentProfile {
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            name: name.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Resolve the system prompt a context build starts from.
    ///
    /// Fails with [`Error::Precondition`] when the agent has no id or no
    /// non-blank prompt.
    pub fn resolve_system_prompt(&self) -> Result<&str, Error> {
        if self.id.trim().is_empty() {
            return Err(Error::Precondition {
                agent_id: self.id.clone(),
                reason: "agent id is empty".into(),
            });
        }
        match self.system_prompt.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => Ok(prompt),
            Some(_) => Err(Error::Precondition {
                agent_id: self.id.clone(),
                reason: "system prompt is blank".into(),
            }),
            None => Err(Error::Precondition {
                agent_id: self.id.clone(),
                reason: "no system prompt configured".into(),
            }),
        }
    }
}

/// A document that is active in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
}
