//! # Weft Core
//!
//! Domain types, collaborator traits, and error definitions for the Weft
//! conversation context engine. This crate has **zero framework
//! dependencies**: it defines the model that the engine and every
//! collaborator implementation are written against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion provider, embedding generator,
//! vector store, turn log, shared state store) is a trait here.
//! Implementations live in their own crates, which keeps the engine testable
//! against mocks and lets hosts plug in whatever persistence they run.

pub mod agent;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentProfile, DocumentRef};
pub use error::{Error, ProviderError, Result, StoreError};
pub use event::{ContextEvent, EventBus};
pub use memory::{MemoryRecord, MemoryType};
pub use message::{Role, Turn};
pub use provider::{Completion, CompletionProvider, CompletionRequest, EmbeddingGenerator};
pub use store::{
    SharedStateStore, TurnLog, VectorFilter, VectorMatch, VectorQuery, VectorRecord, VectorStore,
};
