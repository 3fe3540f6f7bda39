//! Application configuration loaded from TOML.
//!
//! ```toml
//! [generation]
//! max_source_len = 128
//! max_generation_len = 50
//!
//! [model]
//! dim = 64
//! seed = 42
//!
//! [tokenizer]
//! vocab = "vocab.txt"
//! config = "tokenizer_config.json"
//! ```
//!
//! Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, EngineError, TokenizerError};
use crate::generation::GenerationConfig;
use crate::model::{ModelArgs, Seq2SeqTransformer};
use crate::tokenizer::{Tokenizer, VocabTokenizer};

/// Where to find the vocabulary and tokenizer config. Both absent selects
/// the built-in demo vocabulary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerPaths {
    pub vocab: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub model: ModelArgs,
    pub tokenizer: TokenizerPaths,
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                let config = Self::from_file(p)?;
                tracing::info!(path = %p.display(), "loaded config");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn build_tokenizer(&self) -> Result<VocabTokenizer, TokenizerError> {
        match &self.tokenizer.vocab {
            Some(vocab) => VocabTokenizer::from_files(vocab.as_path(), self.tokenizer.config.as_deref()),
            None => {
                tracing::info!("no vocabulary configured, using the demo vocabulary");
                Ok(VocabTokenizer::demo())
            }
        }
    }

    /// Build the local engine sized to `tokenizer`'s vocabulary and pad id.
    pub fn build_engine(&self, tokenizer: &dyn Tokenizer) -> Result<Seq2SeqTransformer, EngineError> {
        let args = ModelArgs {
            vocab_size: tokenizer.vocab_size(),
            pad_id: tokenizer.special_tokens().pad,
            ..self.model.clone()
        };
        Ok(Seq2SeqTransformer::new(args)?.with_io_names(self.generation.io.clone()))
    }
}
