//! Error types shared across the generation pipeline.
//!
//! Every failure is terminal for the current message only. Nothing here is
//! retried, and nothing leaves the [`ModelContext`](crate::context::ModelContext)
//! unusable for the next prompt.

use std::path::PathBuf;
use thiserror::Error;

use crate::tokenizer::TokenId;

/// Errors raised by a [`Tokenizer`](crate::tokenizer::Tokenizer).
#[derive(Debug, Error)]
pub enum TokenizerError {
    /// A word is missing from the vocabulary and no `unk` id is configured.
    #[error("word {0:?} is not in the vocabulary")]
    UnknownWord(String),

    /// An id outside the vocabulary was handed to `decode`.
    #[error("token id {0} is not in the vocabulary")]
    UnknownId(TokenId),

    #[error("vocabulary is empty")]
    EmptyVocab,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tokenizer config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by an [`InferenceEngine`](crate::engine::InferenceEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("missing input tensor {0:?}")]
    MissingInput(String),

    #[error("missing output tensor {0:?}")]
    MissingOutput(String),

    #[error("tensor {name:?} has dtype {found}, expected {expected}")]
    DType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("tensor {name:?} has shape {found:?}, expected {expected}")]
    Shape {
        name: String,
        expected: String,
        found: Vec<usize>,
    },

    #[error("token id {id} out of range for vocabulary of {vocab_size}")]
    TokenOutOfRange { id: i64, vocab_size: usize },

    #[error("inference backend failed: {0}")]
    Backend(String),
}

/// Errors surfaced by the generation loop and [`ModelContext`](crate::context::ModelContext).
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The tokenizer or engine has not been initialized yet.
    #[error("model dependencies are not initialized")]
    DependencyNotReady,

    #[error("model dependencies are already initialized")]
    AlreadyInitialized,

    /// The tokenizer rejected the prompt.
    #[error("failed to encode prompt: {0}")]
    Encoding(#[source] TokenizerError),

    #[error("failed to decode reply: {0}")]
    Decoding(#[source] TokenizerError),

    /// The engine call failed or returned something unusable.
    #[error("inference failed at step {step}: {source}")]
    Inference {
        step: usize,
        #[source]
        source: EngineError,
    },

    #[error("invalid generation config: {0}")]
    InvalidConfig(String),
}

impl GenerationError {
    pub(crate) fn inference(step: usize, source: EngineError) -> Self {
        Self::Inference { step, source }
    }
}

/// Errors raised while loading an [`AppConfig`](crate::config::AppConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
