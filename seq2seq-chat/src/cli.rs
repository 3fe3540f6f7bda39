//! Flags and start-up shared by the `chat` and `generate` binaries.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::context::ModelContext;

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Source length prompts are padded or truncated to
    #[arg(long)]
    pub max_source_len: Option<usize>,

    /// Maximum number of generated tokens
    #[arg(long)]
    pub max_generation_len: Option<usize>,

    /// Vocabulary file, one token per line
    #[arg(long)]
    pub vocab: Option<PathBuf>,

    /// Tokenizer config JSON with marker ids
    #[arg(long)]
    pub tokenizer_config: Option<PathBuf>,

    /// Seed for model weights
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Config file contents with flags applied on top.
    pub fn app_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(n) = self.max_source_len {
            config.generation.max_source_len = n;
        }
        if let Some(n) = self.max_generation_len {
            config.generation.max_generation_len = n;
        }
        if let Some(path) = &self.vocab {
            config.tokenizer.vocab = Some(path.clone());
        }
        if let Some(path) = &self.tokenizer_config {
            config.tokenizer.config = Some(path.clone());
        }
        if let Some(seed) = self.seed {
            config.model.seed = seed;
        }
        Ok(config)
    }
}

/// Log to stderr, filtered by `RUST_LOG` or the verbosity flag.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Trim prompts and drop the blank ones.
pub fn clean_prompts<I, S>(prompts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    prompts
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Load the tokenizer and engine and return a ready context.
pub fn build_context(config: &AppConfig) -> Result<Arc<ModelContext>> {
    let context = Arc::new(ModelContext::new(config.generation.clone()));
    let tokenizer = config.build_tokenizer().context("failed to load tokenizer")?;
    let engine = config
        .build_engine(&tokenizer)
        .context("failed to initialise the model")?;
    context.initialize(Arc::new(tokenizer), Arc::new(engine))?;
    Ok(context)
}
