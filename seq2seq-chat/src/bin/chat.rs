//! Interactive terminal chat over the greedy seq2seq generator.
//!
//! Type a message and press enter. `!clear` wipes the transcript and
//! `quit` exits.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use seq2seq_chat::cli::{build_context, init_tracing, CommonArgs};
use seq2seq_chat::session::{Message, Sender};
use seq2seq_chat::{ChatSession, ModelContext};

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with a local seq2seq model")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

fn print_message(message: &Message) {
    let who = match message.sender {
        Sender::User => "You",
        Sender::Bot => "Assistant",
        Sender::Notice => "--",
    };
    println!("[{}] {}: {}", message.time_label(), who, message.text);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.common.verbose);
    let config = args.common.app_config()?;

    println!("Initializing AI model...");
    let context: Arc<ModelContext> = build_context(&config)?;
    let session = ChatSession::new(context);
    println!("Model loaded. Ask me something! ('!clear' clears the chat, 'quit' exits)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "quit" => break,
            "!clear" => {
                session.clear();
                if let Some(notice) = session.transcript().last() {
                    print_message(notice);
                }
                continue;
            }
            _ => {}
        }

        if let Some(reply) = session.submit(&line).await {
            print_message(&reply);
        }
    }
    println!("Goodbye!");
    Ok(())
}
