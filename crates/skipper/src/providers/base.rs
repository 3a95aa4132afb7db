use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};

/// One streamed increment of a completion. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionChunk {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }
}

/// A completion in flight. The stream ends when the model is done.
pub type CompletionStream = BoxStream<'static, Result<CompletionChunk>>;

/// Base trait for chat-completion backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streamed completion over `messages`, offering `tools` to the model
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<CompletionStream>;
}

/// Run a tool-less completion and return its full text
pub async fn collect_completion(provider: &dyn Provider, messages: &[Message]) -> Result<String> {
    let mut stream = provider.complete(messages, &[]).await?;
    let mut content = String::new();
    while let Some(chunk) = stream.next().await {
        content.push_str(&chunk?.content);
    }
    Ok(content)
}
