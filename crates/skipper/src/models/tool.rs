use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::source::Source;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the arguments the tool accepts
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call requested by the model. `arguments` is kept as the raw JSON
/// text because models stream it in fragments that are only valid once joined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// UI-facing detail produced by a tool execution. Never replayed to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDetail {
    pub title: String,
    pub payload: Value,
}

impl ToolDetail {
    pub fn for_tool(name: &str, payload: Value) -> Self {
        Self {
            title: format!("Tool call: {}", name),
            payload,
        }
    }
}

/// The result of executing one tool call. `content` goes back to the model as a
/// tool message; `detail` is kept for the end user only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ToolDetail>,
}

impl ToolOutcome {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_detail(mut self, detail: ToolDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Record of one executed tool call, with its error inline when it failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    pub fn from_call(call: &ToolCall) -> Self {
        let arguments = if call.arguments.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| Value::String(call.arguments.clone())),
            )
        };
        Self {
            name: call.name.clone(),
            arguments,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_keeps_unparseable_arguments_as_text() {
        let record = ToolCallRecord::from_call(&ToolCall::new("1", "x", "{\"a\":1}"));
        assert_eq!(record.arguments, Some(json!({"a": 1})));

        let record = ToolCallRecord::from_call(&ToolCall::new("1", "x", "{broken"));
        assert_eq!(record.arguments, Some(json!("{broken")));

        let record = ToolCallRecord::from_call(&ToolCall::new("1", "x", "  "));
        assert_eq!(record.arguments, None);
    }

    #[test]
    fn test_detail_title_names_the_tool() {
        let detail = ToolDetail::for_tool("search_web", json!({}));
        assert_eq!(detail.title, "Tool call: search_web");
    }
}
