//! Shared tokenizer and engine handles owned by the hosting application.
//!
//! A [`ModelContext`] is created empty, initialized once when the model has
//! loaded, and then read by every reply. Replies may be requested before
//! initialization; they fail with [`GenerationError::DependencyNotReady`]
//! without touching any tensor.

use std::sync::{Arc, OnceLock};

use crate::engine::InferenceEngine;
use crate::error::GenerationError;
use crate::generation::{Generation, GenerationConfig, Generator};
use crate::tokenizer::Tokenizer;

struct Handles {
    tokenizer: Arc<dyn Tokenizer>,
    engine: Arc<dyn InferenceEngine>,
}

/// Initialize-once holder for the tokenizer and inference engine.
pub struct ModelContext {
    config: GenerationConfig,
    handles: OnceLock<Handles>,
}

impl ModelContext {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config, handles: OnceLock::new() }
    }

    /// Install the loaded dependencies. Only the first call succeeds.
    pub fn initialize(
        &self,
        tokenizer: Arc<dyn Tokenizer>,
        engine: Arc<dyn InferenceEngine>,
    ) -> Result<(), GenerationError> {
        self.config.validate()?;
        self.handles
            .set(Handles { tokenizer, engine })
            .map_err(|_| GenerationError::AlreadyInitialized)?;
        tracing::info!(
            max_source_len = self.config.max_source_len,
            max_generation_len = self.config.max_generation_len,
            "model context ready"
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.handles.get().is_some()
    }

    /// Tokenizer handle, for decoding ids from [`generate_ids`](Self::generate_ids).
    pub fn tokenizer(&self) -> Option<&Arc<dyn Tokenizer>> {
        self.handles.get().map(|h| &h.tokenizer)
    }

    /// Reply text for `prompt`; empty when the first pick is a stop marker.
    pub async fn get_reply(&self, prompt: &str) -> Result<String, GenerationError> {
        let handles = self.handles.get().ok_or(GenerationError::DependencyNotReady)?;
        Generator::new(handles.tokenizer.as_ref(), handles.engine.as_ref(), &self.config)
            .generate(prompt)
            .await
    }

    /// Like [`get_reply`](Self::get_reply) but returns the raw ids and stop reason.
    pub async fn generate_ids(&self, prompt: &str) -> Result<Generation, GenerationError> {
        let handles = self.handles.get().ok_or(GenerationError::DependencyNotReady)?;
        Generator::new(handles.tokenizer.as_ref(), handles.engine.as_ref(), &self.config)
            .generate_ids(prompt)
            .await
    }
}
