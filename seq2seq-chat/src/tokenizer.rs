//! Tokenizer seam and a word-level vocabulary tokenizer.
//!
//! The generation loop only needs `encode`, `decode` and the three marker
//! ids, so anything implementing [`Tokenizer`] can be plugged in. The
//! bundled [`VocabTokenizer`] splits on whitespace and looks words up in a
//! fixed vocabulary, which is enough for local runs and tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::TokenizerError;

/// Integer id of a vocabulary entry.
pub type TokenId = u32;

const DEFAULT_BEGIN_ID: TokenId = 0;
const DEFAULT_END_ID: TokenId = 1;
const DEFAULT_PAD_ID: TokenId = 0;

/// Text <-> id conversion plus the reserved marker ids.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError>;
    fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError>;
    fn special_tokens(&self) -> SpecialTokens;
    fn vocab_size(&self) -> usize;
}

/// Tokenizer configuration as stored next to the vocabulary.
///
/// Uses the Hugging Face field names so an existing `tokenizer_config.json`
/// or `config.json` can be read directly. Unknown fields are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub bos_token_id: Option<TokenId>,
    pub eos_token_id: Option<TokenId>,
    pub pad_token_id: Option<TokenId>,
    pub unk_token_id: Option<TokenId>,
    pub do_lower_case: bool,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            bos_token_id: None,
            eos_token_id: None,
            pad_token_id: None,
            unk_token_id: None,
            do_lower_case: true,
        }
    }
}

impl TokenizerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TokenizerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| TokenizerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Begin, end and pad marker ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialTokens {
    pub begin: TokenId,
    pub end: TokenId,
    pub pad: TokenId,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            begin: DEFAULT_BEGIN_ID,
            end: DEFAULT_END_ID,
            pad: DEFAULT_PAD_ID,
        }
    }
}

impl SpecialTokens {
    /// Resolve marker ids from a config, falling back to 0/1/0.
    ///
    /// A fallback id may be a real vocabulary entry. That is only reported,
    /// never remapped.
    pub fn resolve(config: &TokenizerConfig) -> Self {
        let pick = |value: Option<TokenId>, default: TokenId, name: &str| {
            value.unwrap_or_else(|| {
                tracing::warn!(marker = name, id = default, "tokenizer config has no {name} id, using default");
                default
            })
        };
        let tokens = Self {
            begin: pick(config.bos_token_id, DEFAULT_BEGIN_ID, "begin"),
            end: pick(config.eos_token_id, DEFAULT_END_ID, "end"),
            pad: pick(config.pad_token_id, DEFAULT_PAD_ID, "pad"),
        };
        for (a, b) in tokens.collisions() {
            tracing::warn!(id = tokens.id_of(a), "{a} and {b} markers share an id");
        }
        tokens
    }

    /// Pairs of marker names that resolve to the same id.
    pub fn collisions(&self) -> Vec<(&'static str, &'static str)> {
        let mut out = Vec::new();
        if self.begin == self.end {
            out.push(("begin", "end"));
        }
        if self.begin == self.pad {
            out.push(("begin", "pad"));
        }
        if self.end == self.pad {
            out.push(("end", "pad"));
        }
        out
    }

    /// True when `id` terminates generation.
    pub fn is_stop(&self, id: TokenId) -> bool {
        id == self.end || id == self.pad
    }

    fn id_of(&self, name: &str) -> TokenId {
        match name {
            "begin" => self.begin,
            "end" => self.end,
            _ => self.pad,
        }
    }
}

/// Vocabulary used when no vocab file is supplied.
const DEMO_VOCAB: &[&str] = &[
    "<pad>", "<unk>", "<start>", "<end>",
    "hello", "world", "how", "are", "you", "i", "am", "fine", "what", "is", "your", "name",
    "my", "assistant", "help", "can", "please", "thank", "yes", "no",
    "the", "and", "a", "to", "of", "in", "that", "have", "it", "for", "not", "on",
    "with", "he", "as", "his", "they", "be", "at", "this", "from", "or", "had",
    "good", "great", "nice", "bad", "ok", "sure", "maybe", "think", "know", "see",
];

/// Whitespace tokenizer backed by a fixed vocabulary.
pub struct VocabTokenizer {
    vocab: Vec<String>,
    word_to_id: HashMap<String, TokenId>,
    config: TokenizerConfig,
    special: SpecialTokens,
}

impl VocabTokenizer {
    /// Create a tokenizer from an ordered token list; a token's id is its index.
    ///
    /// Duplicate entries keep the id of their first occurrence.
    pub fn new(tokens: Vec<String>, config: TokenizerConfig) -> Result<Self, TokenizerError> {
        if tokens.is_empty() {
            return Err(TokenizerError::EmptyVocab);
        }
        let mut word_to_id = HashMap::with_capacity(tokens.len());
        for (i, tok) in tokens.iter().enumerate() {
            word_to_id.entry(tok.clone()).or_insert(i as TokenId);
        }
        let special = SpecialTokens::resolve(&config);
        for id in [special.begin, special.end, special.pad] {
            if id as usize >= tokens.len() {
                tracing::warn!(id, vocab_size = tokens.len(), "marker id is outside the vocabulary");
            }
        }
        Ok(Self { vocab: tokens, word_to_id, config, special })
    }

    /// Small built-in vocabulary with `<pad>`, `<unk>`, `<start>`, `<end>` at ids 0..4.
    pub fn demo() -> Self {
        let config = TokenizerConfig {
            bos_token_id: Some(2),
            eos_token_id: Some(3),
            pad_token_id: Some(0),
            unk_token_id: Some(1),
            do_lower_case: true,
        };
        let special = SpecialTokens::resolve(&config);
        let vocab: Vec<String> = DEMO_VOCAB.iter().map(|s| s.to_string()).collect();
        let word_to_id = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i as TokenId))
            .collect();
        Self { vocab, word_to_id, config, special }
    }

    /// Load a vocabulary file (one token per line) and an optional JSON config.
    pub fn from_files<P: AsRef<Path>>(vocab_path: P, config_path: Option<P>) -> Result<Self, TokenizerError> {
        let vocab_path = vocab_path.as_ref();
        let raw = std::fs::read_to_string(vocab_path).map_err(|source| TokenizerError::Io {
            path: vocab_path.to_path_buf(),
            source,
        })?;
        let tokens: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        let config = match config_path {
            Some(p) => TokenizerConfig::from_json_file(p)?,
            None => TokenizerConfig::default(),
        };
        tracing::info!(path = %vocab_path.display(), size = tokens.len(), "loaded vocabulary");
        Self::new(tokens, config)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_id.contains_key(word)
    }
}

impl Tokenizer for VocabTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let text = if self.config.do_lower_case {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        text.split_whitespace()
            .map(|word| match (self.word_to_id.get(word), self.config.unk_token_id) {
                (Some(&id), _) => Ok(id),
                (None, Some(unk)) => Ok(unk),
                (None, None) => Err(TokenizerError::UnknownWord(word.to_string())),
            })
            .collect()
    }

    fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError> {
        let words = ids
            .iter()
            .map(|&id| {
                self.vocab
                    .get(id as usize)
                    .map(String::as_str)
                    .ok_or(TokenizerError::UnknownId(id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words.join(" "))
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }
}
