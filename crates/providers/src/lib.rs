//! Completion and embedding provider implementations for Weft.
//!
//! Providers implement `weft_core::CompletionProvider` and
//! `weft_core::EmbeddingGenerator`. The engine only ever sees the traits.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
