//! One-shot reply generation for prompts given on the command line or in a
//! file (one prompt per line).

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use seq2seq_chat::cli::{build_context, clean_prompts, init_tracing, CommonArgs};
use seq2seq_chat::session::EMPTY_REPLY;
use seq2seq_chat::tokenizer::Tokenizer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate replies for a batch of prompts")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Input file with prompts (one per line)
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Print generated token ids and the stop reason
    #[arg(long)]
    ids: bool,

    /// Prompts to answer
    prompts: Vec<String>,
}

async fn load_prompts(path: &PathBuf) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read prompts from {}", path.display()))?;
    Ok(clean_prompts(content.lines()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.common.verbose);
    let config = args.common.app_config()?;

    let mut prompts = clean_prompts(&args.prompts);
    if let Some(path) = &args.input_file {
        prompts.extend(load_prompts(path).await?);
    }
    if prompts.is_empty() {
        bail!("no prompts given; pass them as arguments or with --input-file");
    }

    let context = build_context(&config)?;
    let tokenizer = context.tokenizer().context("model context is not ready")?;
    for prompt in &prompts {
        println!("Prompt: {}", prompt);
        let reply = if args.ids {
            let generation = context.generate_ids(prompt).await?;
            println!("Ids: {:?} ({:?} after {} steps)", generation.ids, generation.stop, generation.steps);
            tokenizer.decode(&generation.ids)?
        } else {
            context.get_reply(prompt).await?
        };
        println!("Completion: {}\n", if reply.is_empty() { EMPTY_REPLY } else { reply.as_str() });
    }
    Ok(())
}
