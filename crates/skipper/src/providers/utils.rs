use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::message::{Message, Role};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::CompletionChunk;

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut converted = json!({
                "role": message.role,
                "content": message.content,
            });

            if message.role == Role::Tool {
                if let Some(id) = &message.tool_call_id {
                    converted["tool_call_id"] = json!(id);
                }
            }

            if !message.tool_calls.is_empty() {
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(&call.name),
                                "arguments": call.arguments,
                            }
                        })
                    })
                    .collect();
                converted["tool_calls"] = json!(tool_calls);
            }

            converted
        })
        .collect()
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Tracks tool-call ids across the deltas of one streamed completion.
/// Continuation deltas only carry the `index`, so the id first seen for an
/// index is reused for every later fragment.
#[derive(Debug, Default)]
pub struct ToolCallIndex {
    ids: HashMap<u64, String>,
}

impl ToolCallIndex {
    fn resolve(&mut self, index: u64, id: Option<&str>) -> String {
        match id.filter(|id| !id.is_empty()) {
            Some(id) => {
                self.ids.insert(index, id.to_string());
                id.to_string()
            }
            None => self
                .ids
                .entry(index)
                .or_insert_with(|| format!("call_{}", uuid::Uuid::new_v4().simple()))
                .clone(),
        }
    }
}

/// Convert one `chat.completion.chunk` event into a completion chunk
pub fn openai_delta_to_chunk(event: &Value, index: &mut ToolCallIndex) -> Result<CompletionChunk> {
    if let Some(error) = event.get("error") {
        if let Some(err) = check_openai_context_length_error(error) {
            return Err(err.into());
        }
        return Err(anyhow!("OpenAI API error: {}", error));
    }

    let Some(delta) = event["choices"].get(0).and_then(|choice| choice.get("delta")) else {
        return Ok(CompletionChunk::default());
    };

    let content = delta
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for (position, call) in calls.iter().enumerate() {
            let call_index = call
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(position as u64);
            let id = index.resolve(call_index, call.get("id").and_then(Value::as_str));
            let function = &call["function"];
            tool_calls.push(ToolCall::new(
                id,
                function["name"].as_str().unwrap_or_default(),
                function["arguments"].as_str().unwrap_or_default(),
            ));
        }
    }

    Ok(CompletionChunk {
        content,
        tool_calls,
    })
}

pub fn sanitize_function_name(name: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    INVALID
        .get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("function name pattern is valid"))
        .replace_all(name, "_")
        .to_string()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
