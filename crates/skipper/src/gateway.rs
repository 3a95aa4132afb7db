use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::tool::Tool;

/// Platform operations exposed to the model by an external tool gateway
/// (stream diagnostics, schema introspection, queries, and so on)
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Tools the gateway offers, advertised to the model alongside the local ones
    fn available_tools(&self) -> Vec<Tool>;

    fn has_tool(&self, name: &str) -> bool {
        self.available_tools().iter().any(|tool| tool.name == name)
    }

    /// Execute a tool with its JSON arguments and return its textual result
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;
}

/// Parse gateway arguments, treating blank input as an empty object
pub(crate) fn parse_arguments(arguments: &str) -> serde_json::Result<Value> {
    if arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(arguments)
}

/// UI payload for a gateway result: the JSON itself when the text is JSON
pub(crate) fn detail_payload(content: &str) -> Value {
    serde_json::from_str(content).unwrap_or_else(|_| json!({ "result": content }))
}
