use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{CompletionStream, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_delta_to_chunk,
    tools_to_openai_spec, ToolCallIndex,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
            if let Some(err) = parsed
                .get("error")
                .and_then(check_openai_context_length_error)
            {
                return Err(err.into());
            }
        }
        Err(anyhow!("Request failed: {}: {}", status, body.trim()))
    }
}

/// Decode a `text/event-stream` body into completion chunks, ending at `[DONE]`
fn sse_stream(response: Response) -> CompletionStream {
    Box::pin(async_stream::try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut index = ToolCallIndex::default();

        'events: while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|err| anyhow!("Stream read failed: {}", err))?;
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let Some(data) = line.trim_end().strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    break 'events;
                }

                let event: Value = serde_json::from_str(data)
                    .map_err(|err| anyhow!("Failed to parse stream chunk: {}", err))?;
                let chunk = openai_delta_to_chunk(&event, &mut index)?;
                if !chunk.content.is_empty() || !chunk.tool_calls.is_empty() {
                    yield chunk;
                }
            }
        }
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<CompletionStream> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(messages),
            "stream": true,
        });

        // Add optional parameters
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(tools)?);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        debug!(
            model = %self.config.model,
            messages = messages.len(),
            tools = tools.len(),
            "requesting completion"
        );
        let response = self.post(payload).await?;
        Ok(sse_stream(response))
    }
}
