//! Chat session: the caller side of [`ModelContext::get_reply`].
//!
//! Trims and drops empty input, allows one reply in flight at a time,
//! shows `...` for empty replies, and turns every failure into one fixed
//! message while logging the cause.

use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::context::ModelContext;

pub const EMPTY_REPLY: &str = "...";
pub const NOT_READY: &str = "The AI model is still initializing, please wait.";
pub const BUSY: &str = "Please wait for the current reply to finish.";
pub const MODEL_ERROR: &str = "Error: Could not run the model. Please check the console.";
pub const CLEARED: &str = "Chat cleared. Ask me something!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
    Notice,
}

/// One transcript entry.
#[derive(Clone, Debug)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Local>,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self { sender, text: text.into(), timestamp: Local::now() }
    }

    /// `HH:MM` in local time.
    pub fn time_label(&self) -> String {
        self.timestamp.format("%H:%M").to_string()
    }
}

/// Clears the in-flight flag when the reply finishes, even on error.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatSession {
    context: Arc<ModelContext>,
    busy: AtomicBool,
    transcript: Mutex<Vec<Message>>,
}

impl ChatSession {
    pub fn new(context: Arc<ModelContext>) -> Self {
        Self {
            context,
            busy: AtomicBool::new(false),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Send one user message. Returns the bot's answer, or `None` for blank input.
    pub async fn submit(&self, raw: &str) -> Option<Message> {
        let prompt = raw.trim();
        if prompt.is_empty() {
            return None;
        }
        self.push(Message::new(Sender::User, prompt));

        let text = self.reply_text(prompt).await;
        let reply = Message::new(Sender::Bot, text);
        self.push(reply.clone());
        Some(reply)
    }

    async fn reply_text(&self, prompt: &str) -> String {
        if !self.context.is_ready() {
            return NOT_READY.to_string();
        }
        if self.busy.swap(true, Ordering::AcqRel) {
            return BUSY.to_string();
        }
        let _guard = InFlight(&self.busy);

        match self.context.get_reply(prompt).await {
            Ok(reply) if reply.trim().is_empty() => EMPTY_REPLY.to_string(),
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "error running the chatbot model");
                MODEL_ERROR.to_string()
            }
        }
    }

    /// Drop every message and leave a single notice.
    pub fn clear(&self) {
        let mut transcript = self.lock();
        transcript.clear();
        transcript.push(Message::new(Sender::Notice, CLEARED));
    }

    pub fn transcript(&self) -> Vec<Message> {
        self.lock().clone()
    }

    fn push(&self, message: Message) {
        self.lock().push(message);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.transcript.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
