use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{CompletionChunk, CompletionStream, Provider};

enum Script {
    Chunks(Vec<CompletionChunk>),
    Fail(String),
    Hang,
}

/// What the provider was asked for on one call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// A mock provider that replays pre-configured rounds for testing
#[derive(Clone)]
pub struct MockProvider {
    rounds: Arc<Mutex<VecDeque<Script>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    /// Create a new mock provider; each entry is the chunk sequence of one round
    pub fn new(rounds: Vec<Vec<CompletionChunk>>) -> Self {
        Self::from_scripts(rounds.into_iter().map(Script::Chunks).collect())
    }

    /// A provider whose first stream yields an error
    pub fn failing(message: &str) -> Self {
        Self::from_scripts(vec![Script::Fail(message.to_string())])
    }

    /// A provider whose first stream never produces anything
    pub fn hanging() -> Self {
        Self::from_scripts(vec![Script::Hang])
    }

    fn from_scripts(scripts: Vec<Script>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(scripts.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<CompletionStream> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            tools: tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        // Return an empty stream once the script runs out
        let script = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Chunks(Vec::new()));
        let stream = match script {
            Script::Chunks(chunks) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
            Script::Fail(message) => stream::once(async move { Err(anyhow!(message)) }).boxed(),
            Script::Hang => stream::pending().boxed(),
        };
        Ok(stream)
    }
}
