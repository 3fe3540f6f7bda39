//! Bounded greedy autoregressive decoding.
//!
//! One call runs `Encoding -> Stepping(0..max_generation_len) -> Decoding`.
//! Each step pads the generated prefix to a fixed length, runs the engine
//! once, and appends the highest scoring id at the current position unless
//! it is the end or pad marker. Nothing is kept between calls.

use ndarray::{s, ArrayD, Ix3};
use serde::{Deserialize, Serialize};

use crate::engine::{InferenceEngine, IoNames};
use crate::error::{EngineError, GenerationError};
use crate::tensor::{Tensor, TensorMap};
use crate::tokenizer::{TokenId, Tokenizer};

/// Fixed tensor lengths and tensor names for one generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Source tensor length; prompts are truncated or padded to it.
    pub max_source_len: usize,
    /// Target tensor length and upper bound on generated ids.
    pub max_generation_len: usize,
    pub io: IoNames,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_source_len: 128,
            max_generation_len: 50,
            io: IoNames::default(),
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.max_source_len == 0 {
            return Err(GenerationError::InvalidConfig("max_source_len must be positive".into()));
        }
        if self.max_generation_len == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_generation_len must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndMarker,
    PadMarker,
    MaxLength,
}

/// Result of [`Generator::generate_ids`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    /// Generated ids, without the leading begin marker.
    pub ids: Vec<TokenId>,
    pub stop: StopReason,
    /// Number of engine calls made.
    pub steps: usize,
}

/// First `len` ids of `ids`, right-padded with `pad` when shorter.
pub fn pad_or_truncate(ids: &[TokenId], len: usize, pad: TokenId) -> Vec<TokenId> {
    let mut out: Vec<TokenId> = ids.iter().copied().take(len).collect();
    out.resize(len, pad);
    out
}

/// `ids` right-padded with `pad` up to `len`. Never truncates.
pub fn pad_to(ids: &[TokenId], len: usize, pad: TokenId) -> Vec<TokenId> {
    let mut out = ids.to_vec();
    if out.len() < len {
        out.resize(len, pad);
    }
    out
}

/// Index of the largest value; ties go to the lowest index and NaN never wins
/// over a number. `None` for an empty row.
pub fn argmax<'a, I>(row: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in row.into_iter().enumerate() {
        match best {
            None => best = Some((i, v)),
            Some((_, b)) if v > b || (b.is_nan() && !v.is_nan()) => best = Some((i, v)),
            _ => {}
        }
    }
    best.map(|(i, _)| i)
}

fn to_tensor(ids: &[TokenId]) -> Tensor {
    let ids: Vec<i64> = ids.iter().map(|&id| i64::from(id)).collect();
    Tensor::int64_row(&ids)
}

/// Runs the decoding loop over borrowed tokenizer and engine handles.
pub struct Generator<'a> {
    tokenizer: &'a dyn Tokenizer,
    engine: &'a dyn InferenceEngine,
    config: &'a GenerationConfig,
}

impl<'a> Generator<'a> {
    pub fn new(
        tokenizer: &'a dyn Tokenizer,
        engine: &'a dyn InferenceEngine,
        config: &'a GenerationConfig,
    ) -> Self {
        Self { tokenizer, engine, config }
    }

    /// Fixed-length source ids for `prompt`.
    pub fn encode_source(&self, prompt: &str) -> Result<Vec<TokenId>, GenerationError> {
        let ids = self.tokenizer.encode(prompt).map_err(GenerationError::Encoding)?;
        let pad = self.tokenizer.special_tokens().pad;
        if ids.len() > self.config.max_source_len {
            tracing::debug!(
                len = ids.len(),
                max = self.config.max_source_len,
                "truncating prompt"
            );
        }
        Ok(pad_or_truncate(&ids, self.config.max_source_len, pad))
    }

    /// Generate reply ids for `prompt`.
    pub async fn generate_ids(&self, prompt: &str) -> Result<Generation, GenerationError> {
        self.config.validate()?;
        let special = self.tokenizer.special_tokens();
        let gmax = self.config.max_generation_len;
        let io = &self.config.io;

        let source = to_tensor(&self.encode_source(prompt)?);
        let mut generated = vec![special.begin];
        let mut stop = StopReason::MaxLength;
        let mut steps = 0;

        for step in 0..gmax {
            let mut inputs = TensorMap::new();
            inputs.insert(io.source.clone(), source.clone());
            inputs.insert(io.target.clone(), to_tensor(&pad_to(&generated, gmax, special.pad)));

            steps += 1;
            let outputs = self
                .engine
                .run(inputs)
                .await
                .map_err(|e| GenerationError::inference(step, e))?;
            let next = self
                .next_token(&outputs, step)
                .map_err(|e| GenerationError::inference(step, e))?;
            tracing::trace!(step, next, "selected token");

            if special.is_stop(next) {
                stop = if next == special.end {
                    StopReason::EndMarker
                } else {
                    StopReason::PadMarker
                };
                break;
            }
            generated.push(next);
        }

        generated.remove(0);
        tracing::debug!(tokens = generated.len(), steps, ?stop, "generation finished");
        Ok(Generation { ids: generated, stop, steps })
    }

    /// Generate and decode a reply. May be empty.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let generation = self.generate_ids(prompt).await?;
        self.tokenizer
            .decode(&generation.ids)
            .map_err(GenerationError::Decoding)
    }

    /// Greedy pick from the logits at `position`.
    fn next_token(&self, outputs: &TensorMap, position: usize) -> Result<TokenId, EngineError> {
        let name = &self.config.io.output;
        let tensor = outputs
            .get(name)
            .ok_or_else(|| EngineError::MissingOutput(name.clone()))?;
        let logits = tensor.as_float32().ok_or_else(|| EngineError::DType {
            name: name.clone(),
            expected: "float32",
            found: tensor.dtype(),
        })?;
        let logits = self.check_output_shape(name, logits)?;
        let row = logits.slice(s![0, position, ..]);
        let id = argmax(row.iter()).ok_or_else(|| EngineError::Shape {
            name: name.clone(),
            expected: "a non-empty vocabulary axis".to_string(),
            found: logits.shape().to_vec(),
        })?;
        TokenId::try_from(id).map_err(|_| EngineError::Backend(format!("token id {id} overflows")))
    }

    fn check_output_shape<'t>(
        &self,
        name: &str,
        logits: &'t ArrayD<f32>,
    ) -> Result<ndarray::ArrayView3<'t, f32>, EngineError> {
        let gmax = self.config.max_generation_len;
        let shape = logits.shape().to_vec();
        let bad = || EngineError::Shape {
            name: name.to_string(),
            expected: format!("[1, {gmax}, vocab]"),
            found: shape.clone(),
        };
        let view = logits.view().into_dimensionality::<Ix3>().map_err(|_| bad())?;
        if view.dim().0 != 1 || view.dim().1 != gmax {
            return Err(bad());
        }
        Ok(view)
    }
}
