//! Greedy sequence-to-sequence reply generation for a chat front end.
//!
//! A prompt is encoded, padded to a fixed source length, and decoded one
//! token at a time through an [`engine::InferenceEngine`] until an end or
//! pad marker is picked or the generation bound is reached. The binaries
//! wire this to a terminal chat and a one-shot generator.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod generation;
pub mod model;
pub mod session;
pub mod tensor;
pub mod tokenizer;

pub use context::ModelContext;
pub use error::GenerationError;
pub use generation::{GenerationConfig, Generator};
pub use session::ChatSession;
