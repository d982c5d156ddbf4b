//! Memory records: long-term context retrieved for a build.
//!
//! Records are produced by retrieval collaborators (vector store queries).
//! The engine ranks, filters, and truncates the set it retrieved, but never
//! rewrites a record's content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The kind of memory a record represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Something that happened in a conversation
    #[default]
    Episodic,
    /// A fact about the world or the user
    Semantic,
    /// How to do something
    Procedural,
    Working,
    Emotional,
    Spatial,
    Temporal,
    Social,
    Preference,
    Contextual,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Working => "working",
            MemoryType::Emotional => "emotional",
            MemoryType::Spatial => "spatial",
            MemoryType::Temporal => "temporal",
            MemoryType::Social => "social",
            MemoryType::Preference => "preference",
            MemoryType::Contextual => "contextual",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "episodic" => Ok(MemoryType::Episodic),
            "semantic" => Ok(MemoryType::Semantic),
            "procedural" => Ok(MemoryType::Procedural),
            "working" => Ok(MemoryType::Working),
            "emotional" => Ok(MemoryType::Emotional),
            "spatial" => Ok(MemoryType::Spatial),
            "temporal" => Ok(MemoryType::Temporal),
            "social" => Ok(MemoryType::Social),
            "preference" => Ok(MemoryType::Preference),
            "contextual" => Ok(MemoryType::Contextual),
            other => Err(format!("unknown memory type '{other}'")),
        }
    }
}

/// A single retrieved memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique ID for this memory
    pub id: String,

    /// What kind of memory this is
    #[serde(rename = "type", default)]
    pub memory_type: MemoryType,

    /// The content of the memory
    pub content: String,

    /// Relevance score from retrieval (0.0-1.0)
    #[serde(default)]
    pub score: f32,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// How much this memory matters regardless of the query (0.0-1.0)
    #[serde(default)]
    pub importance: f32,

    /// When this memory was created
    pub created_at: DateTime<Utc>,
}
