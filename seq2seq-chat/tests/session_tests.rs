mod common;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

use common::{MockTokenizer, ScriptedEngine, END};
use seq2seq_chat::engine::InferenceEngine;
use seq2seq_chat::error::EngineError;
use seq2seq_chat::generation::GenerationConfig;
use seq2seq_chat::session::{Sender, BUSY, CLEARED, EMPTY_REPLY, MODEL_ERROR, NOT_READY};
use seq2seq_chat::tensor::TensorMap;
use seq2seq_chat::{ChatSession, ModelContext};

const GMAX: usize = 4;

fn session_with(engine: Arc<dyn InferenceEngine>) -> ChatSession {
    let context = ModelContext::new(GenerationConfig {
        max_source_len: 6,
        max_generation_len: GMAX,
        ..Default::default()
    });
    context.initialize(Arc::new(MockTokenizer), engine).unwrap();
    ChatSession::new(Arc::new(context))
}

/// Waits for `gate` before delegating to the inner engine.
struct GatedEngine {
    gate: Arc<Notify>,
    inner: ScriptedEngine,
}

#[async_trait]
impl InferenceEngine for GatedEngine {
    async fn run(&self, inputs: TensorMap) -> Result<TensorMap, EngineError> {
        self.gate.notified().await;
        self.inner.run(inputs).await
    }
}

#[tokio::test]
async fn blank_input_is_ignored() {
    let session = session_with(Arc::new(ScriptedEngine::constant(GMAX, END)));
    assert!(session.submit("   \n").await.is_none());
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn input_is_trimmed_and_reply_recorded() {
    let session = session_with(Arc::new(ScriptedEngine::sequence(GMAX, vec![7])));
    let reply = session.submit("  hello  ").await.unwrap();
    assert_eq!(reply.sender, Sender::Bot);
    assert_eq!(reply.text, "t7");

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].sender, Sender::User);
    assert_eq!(transcript[0].text, "hello");
    assert_eq!(transcript[0].time_label().len(), 5);
}

#[tokio::test]
async fn empty_reply_shows_placeholder() {
    let session = session_with(Arc::new(ScriptedEngine::constant(GMAX, END)));
    let reply = session.submit("hello").await.unwrap();
    assert_eq!(reply.text, EMPTY_REPLY);
}

#[tokio::test]
async fn failure_shows_fixed_message_and_session_recovers() {
    let engine = Arc::new(ScriptedEngine::new(GMAX, |step| {
        if step == 0 {
            Err(EngineError::Backend("offline".into()))
        } else if step == 1 {
            Ok(9)
        } else {
            Ok(END)
        }
    }));
    let session = session_with(engine);
    assert_eq!(session.submit("hello").await.unwrap().text, MODEL_ERROR);
    assert_eq!(session.submit("hello").await.unwrap().text, "t9");
}

#[tokio::test]
async fn not_ready_context_answers_with_notice() {
    let session = ChatSession::new(Arc::new(ModelContext::new(GenerationConfig::default())));
    let reply = session.submit("hello").await.unwrap();
    assert_eq!(reply.text, NOT_READY);
}

#[tokio::test]
async fn only_one_reply_in_flight() {
    let gate = Arc::new(Notify::new());
    let engine = GatedEngine {
        gate: gate.clone(),
        inner: ScriptedEngine::sequence(1, vec![7]),
    };
    let context = ModelContext::new(GenerationConfig {
        max_source_len: 6,
        max_generation_len: 1,
        ..Default::default()
    });
    context.initialize(Arc::new(MockTokenizer), Arc::new(engine)).unwrap();
    let session = ChatSession::new(Arc::new(context));

    let first = session.submit("hello");
    let second = async {
        let reply = session.submit("again").await;
        gate.notify_one();
        reply
    };
    let (first, second) = tokio::join!(first, second);
    assert_eq!(second.unwrap().text, BUSY);
    // max_generation_len 1: the single step favours 7 and the loop ends
    assert_eq!(first.unwrap().text, "t7");

    // flag is released afterwards
    gate.notify_one();
    assert_ne!(session.submit("hello").await.unwrap().text, BUSY);
}

#[tokio::test]
async fn clear_leaves_a_single_notice() {
    let session = session_with(Arc::new(ScriptedEngine::constant(GMAX, END)));
    session.submit("hello").await;
    session.clear();
    let transcript = session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].sender, Sender::Notice);
    assert_eq!(transcript[0].text, CLEARED);
}
