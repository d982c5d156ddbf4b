//! Collaborator backends for Weft that live entirely in process.
//!
//! Hosts with real persistence implement the `weft-core` traits against
//! their own databases; these backends cover tests, demos, and
//! single-process deployments.

pub mod in_memory;
pub mod noop;
pub mod vector;

pub use in_memory::{InMemorySharedState, InMemoryTurnLog, InMemoryVectorStore};
pub use noop::NoopVectorStore;
pub use vector::{cosine_similarity, vector_search};
