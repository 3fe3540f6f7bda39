#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;

use seq2seq_chat::engine::InferenceEngine;
use seq2seq_chat::error::{EngineError, TokenizerError};
use seq2seq_chat::tensor::{float32, TensorMap};
use seq2seq_chat::tokenizer::{SpecialTokens, TokenId, Tokenizer};

pub const BEGIN: TokenId = 2;
pub const END: TokenId = 3;
pub const PAD: TokenId = 0;
pub const VOCAB: usize = 16;

/// "hello" encodes to [5, 6]; any other word to 8. Ids decode to `t<id>`.
pub struct MockTokenizer;

impl Tokenizer for MockTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        Ok(text
            .split_whitespace()
            .flat_map(|w| if w == "hello" { vec![5, 6] } else { vec![8] })
            .collect())
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError> {
        Ok(ids.iter().map(|id| format!("t{id}")).collect::<Vec<_>>().join(" "))
    }

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens { begin: BEGIN, end: END, pad: PAD }
    }

    fn vocab_size(&self) -> usize {
        VOCAB
    }
}

/// Rejects every prompt.
pub struct FailingTokenizer;

impl Tokenizer for FailingTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        Err(TokenizerError::UnknownWord(text.to_string()))
    }

    fn decode(&self, _ids: &[TokenId]) -> Result<String, TokenizerError> {
        Ok(String::new())
    }

    fn special_tokens(&self) -> SpecialTokens {
        SpecialTokens::default()
    }

    fn vocab_size(&self) -> usize {
        VOCAB
    }
}

/// Inputs seen by one engine call.
#[derive(Clone, Debug)]
pub struct Call {
    pub source: Vec<i64>,
    pub target: Vec<i64>,
}

type Script = Box<dyn Fn(usize) -> Result<TokenId, EngineError> + Send + Sync>;

/// Returns logits of shape `[1, gmax, VOCAB]` favouring `script(call_index)`
/// at every position, or `positions[p]` at position `p` when built with
/// [`ScriptedEngine::positional`].
pub struct ScriptedEngine {
    gmax: usize,
    script: Script,
    positions: Option<Vec<TokenId>>,
    output_name: String,
    pub calls: Mutex<Vec<Call>>,
}

impl ScriptedEngine {
    pub fn new(gmax: usize, script: impl Fn(usize) -> Result<TokenId, EngineError> + Send + Sync + 'static) -> Self {
        Self {
            gmax,
            script: Box::new(script),
            positions: None,
            output_name: "output".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always favours `id`.
    pub fn constant(gmax: usize, id: TokenId) -> Self {
        Self::new(gmax, move |_| Ok(id))
    }

    /// Favours `ids[step]`, then the end marker.
    pub fn sequence(gmax: usize, ids: Vec<TokenId>) -> Self {
        Self::new(gmax, move |step| Ok(ids.get(step).copied().unwrap_or(END)))
    }

    /// Favours `ids[p]` at position `p` on every call, the end marker past them.
    pub fn positional(gmax: usize, ids: Vec<TokenId>) -> Self {
        Self {
            positions: Some(ids),
            ..Self::constant(gmax, END)
        }
    }

    pub fn with_output_name(mut self, name: &str) -> Self {
        self.output_name = name.to_string();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

fn ids(inputs: &TensorMap, name: &str) -> Result<Vec<i64>, EngineError> {
    let tensor = inputs
        .get(name)
        .ok_or_else(|| EngineError::MissingInput(name.to_string()))?;
    let array = tensor.as_int64().ok_or_else(|| EngineError::DType {
        name: name.to_string(),
        expected: "int64",
        found: tensor.dtype(),
    })?;
    assert_eq!(array.ndim(), 2);
    assert_eq!(array.shape()[0], 1);
    Ok(array.iter().copied().collect())
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn run(&self, inputs: TensorMap) -> Result<TensorMap, EngineError> {
        let call = Call { source: ids(&inputs, "source")?, target: ids(&inputs, "target")? };
        let step = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            calls.len() - 1
        };
        let favoured = (self.script)(step)?;

        let mut data = vec![0.0_f32; self.gmax * VOCAB];
        for pos in 0..self.gmax {
            let id = match &self.positions {
                Some(ids) => ids.get(pos).copied().unwrap_or(END),
                None => favoured,
            };
            data[pos * VOCAB + id as usize] = 1.0;
        }
        let mut out = TensorMap::new();
        out.insert(self.output_name.clone(), float32(&[1, self.gmax, VOCAB], data).unwrap());
        Ok(out)
    }
}
