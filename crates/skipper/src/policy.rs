//! Mode-based tool access control.
//!
//! A conversation's mode decides which tools the model is offered and which
//! calls are allowed to execute. Blocked calls produce a readable outcome for
//! the model rather than an error.
use serde_json::Value;
use std::fmt;

use crate::models::tool::Tool;

const DOCS_ALLOWED_TOOLS: &[&str] = &[
    "search_knowledge",
    "search_web",
    "introspect_schema",
    "generate_query",
    "execute_query",
    "get_stream",
    "list_streams",
    "get_stream_health",
    "get_stream_metrics",
    "check_stream_health",
    "diagnose_rebuffering",
    "diagnose_buffer_health",
    "diagnose_packet_loss",
    "diagnose_routing",
    "get_stream_health_summary",
    "get_anomaly_report",
];

const HEARTBEAT_ALLOWED_TOOLS: &[&str] = &["search_knowledge"];

/// The access profile of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    Default,
    Docs,
    Heartbeat,
    Custom(String),
}

impl AccessMode {
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "" | "default" => AccessMode::Default,
            "docs" => AccessMode::Docs,
            "heartbeat" => AccessMode::Heartbeat,
            other => AccessMode::Custom(other.to_string()),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, AccessMode::Default)
    }

    /// Name allow-list, `None` when every tool name is allowed
    fn allowed_tools(&self) -> Option<&'static [&'static str]> {
        match self {
            AccessMode::Docs => Some(DOCS_ALLOWED_TOOLS),
            AccessMode::Heartbeat => Some(HEARTBEAT_ALLOWED_TOOLS),
            AccessMode::Default | AccessMode::Custom(_) => None,
        }
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools()
            .map_or(true, |allowed| allowed.contains(&tool_name))
    }

    fn label(&self) -> &str {
        match self {
            AccessMode::Docs => "documentation",
            AccessMode::Heartbeat => "heartbeat",
            AccessMode::Default => "default",
            AccessMode::Custom(name) => name,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Default => write!(f, "default"),
            AccessMode::Docs => write!(f, "docs"),
            AccessMode::Heartbeat => write!(f, "heartbeat"),
            AccessMode::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for AccessMode {
    fn from(mode: &str) -> Self {
        AccessMode::parse(mode)
    }
}

/// The result of checking one tool call against the active mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    Allowed,
    /// Execution is refused; the message becomes the tool outcome
    Blocked(String),
}

/// Remove the tools the mode does not allow, before the model sees them
pub fn filter_tools(mode: &AccessMode, tools: &[Tool]) -> Vec<Tool> {
    tools
        .iter()
        .filter(|tool| mode.allows(&tool.name))
        .cloned()
        .collect()
}

/// Re-check a requested call at execution time
pub fn check_tool(mode: &AccessMode, name: &str, arguments: &str) -> ToolDecision {
    if !mode.allows(name) {
        return ToolDecision::Blocked(format!(
            "Tool {} is not available in {} mode.",
            name,
            mode.label()
        ));
    }
    if !mode.is_default() && contains_mutation(arguments) {
        return ToolDecision::Blocked(format!(
            "Mutations are not allowed in {} mode. Only read-only queries can be executed.",
            mode
        ));
    }
    ToolDecision::Allowed
}

/// Whether any string in the arguments starts with a `mutation` operation.
///
/// This is a heuristic over the query text, not a parser of the query language.
pub fn contains_mutation(arguments: &str) -> bool {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value) => value_contains_mutation(&value),
        Err(_) => starts_with_mutation(arguments),
    }
}

fn value_contains_mutation(value: &Value) -> bool {
    match value {
        Value::String(text) => starts_with_mutation(text),
        Value::Array(items) => items.iter().any(value_contains_mutation),
        Value::Object(map) => map.values().any(value_contains_mutation),
        _ => false,
    }
}

fn starts_with_mutation(text: &str) -> bool {
    let Some(line) = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
    else {
        return false;
    };

    let keyword = "mutation";
    let Some(head) = line.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    line[keyword.len()..]
        .chars()
        .next()
        .map_or(true, |next| !(next.is_alphanumeric() || next == '_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> Tool {
        Tool::new(name, "", json!({"type": "object"}))
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!(AccessMode::parse(""), AccessMode::Default);
        assert_eq!(AccessMode::parse("DEFAULT"), AccessMode::Default);
        assert_eq!(AccessMode::parse("docs"), AccessMode::Docs);
        assert_eq!(AccessMode::parse(" heartbeat "), AccessMode::Heartbeat);
        assert_eq!(
            AccessMode::parse("partner"),
            AccessMode::Custom("partner".into())
        );
    }

    #[test]
    fn test_filter_tools_by_mode() {
        let tools = vec![
            tool("search_knowledge"),
            tool("execute_query"),
            tool("delete_stream"),
        ];

        let names = |mode: AccessMode| -> Vec<String> {
            filter_tools(&mode, &tools)
                .into_iter()
                .map(|t| t.name)
                .collect()
        };
        assert_eq!(names(AccessMode::Docs), vec!["search_knowledge", "execute_query"]);
        assert_eq!(names(AccessMode::Heartbeat), vec!["search_knowledge"]);
        assert_eq!(names(AccessMode::Default).len(), 3);
        assert_eq!(names(AccessMode::Custom("x".into())).len(), 3);
    }

    #[test]
    fn test_check_tool_rejects_names_outside_allow_list() {
        assert_eq!(
            check_tool(&AccessMode::Docs, "delete_stream", "{}"),
            ToolDecision::Blocked("Tool delete_stream is not available in documentation mode.".into())
        );
        assert_eq!(
            check_tool(&AccessMode::Heartbeat, "search_web", "{}"),
            ToolDecision::Blocked("Tool search_web is not available in heartbeat mode.".into())
        );
        assert_eq!(
            check_tool(&AccessMode::Default, "delete_stream", "{}"),
            ToolDecision::Allowed
        );
    }

    #[test]
    fn test_mutations_blocked_outside_default_mode() {
        let args = json!({"query": "mutation { createStream }"}).to_string();
        match check_tool(&AccessMode::Docs, "execute_query", &args) {
            ToolDecision::Blocked(message) => {
                assert!(message.contains("Mutations are not allowed"))
            }
            ToolDecision::Allowed => panic!("mutation should be blocked"),
        }

        let custom = AccessMode::Custom("partner".into());
        assert!(matches!(
            check_tool(&custom, "anything", &args),
            ToolDecision::Blocked(_)
        ));
        assert_eq!(
            check_tool(&AccessMode::Default, "execute_query", &args),
            ToolDecision::Allowed
        );
    }

    #[test]
    fn test_read_queries_pass() {
        let args = json!({"query": "{ streams { id } }"}).to_string();
        assert_eq!(
            check_tool(&AccessMode::Docs, "execute_query", &args),
            ToolDecision::Allowed
        );
    }

    #[test]
    fn test_mutation_detection_heuristic() {
        assert!(contains_mutation("mutation{ x }"));
        assert!(contains_mutation("  # create it\n\n  MUTATION CreateStream { x }"));
        assert!(contains_mutation(
            &json!({"variables": {}, "nested": ["query { a }", "mutation M { b }"]}).to_string()
        ));
        assert!(!contains_mutation("query { mutationCount }"));
        assert!(!contains_mutation("mutations { list }"));
        assert!(!contains_mutation("# mutation { commented }\nquery { a }"));
        assert!(!contains_mutation(&json!({"mutation": "query { a }"}).to_string()));
        assert!(!contains_mutation(""));
    }
}
