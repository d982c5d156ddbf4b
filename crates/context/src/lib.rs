//! # weft-context
//!
//! The conversation context engine. Given a thread, a user, an agent and an
//! inbound message, it assembles a [`ContextSnapshot`]: the agent's system
//! prompt, the thread history compressed to fit the target model, relevant
//! long-term memories, and the thread's shared data and documents.
//!
//! Snapshots are cached per `(thread, user, agent)` for a short TTL and
//! versioned per thread. The [`HandoffCoordinator`] turns the latest
//! snapshot of one agent into a briefing for another.

pub mod builder;
pub mod cache;
pub mod fusion;
pub mod handoff;
pub mod shared;
pub mod snapshot;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use builder::{BuildOptions, ConversationContextBuilder};
pub use cache::{CacheKey, ContextCache};
pub use fusion::{MemoryFusionEngine, render_memory_context};
pub use handoff::{HandoffCoordinator, HandoffPackage, NO_CONTEXT_SENTINEL, SourceAgent};
pub use snapshot::ContextSnapshot;
pub use token::{Compression, Prepared, TokenBudgetManager, TokenStats, estimate_tokens};
