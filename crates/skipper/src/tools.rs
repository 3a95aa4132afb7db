use serde::Deserialize;
use serde_json::json;
use strum_macros::{Display, EnumIter, EnumString};

use crate::models::tool::Tool;

/// Tools implemented inside the core rather than by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum LocalTool {
    SearchKnowledge,
    SearchWeb,
}

impl LocalTool {
    pub fn definition(&self) -> Tool {
        match self {
            LocalTool::SearchKnowledge => Tool::new(
                self.to_string(),
                "Search the knowledge base for platform-specific guidance and verified docs.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query to run against the knowledge base."
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of results to return (default 8)."
                        },
                        "tenant_scope": {
                            "type": "string",
                            "description": "Scope to search: tenant, global, or all (default all)."
                        }
                    },
                    "required": ["query"]
                }),
            ),
            LocalTool::SearchWeb => Tool::new(
                self.to_string(),
                "Search the public web for documentation or references when the knowledge base is insufficient.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query to run against the web."
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of results to return (default 8)."
                        },
                        "search_depth": {
                            "type": "string",
                            "description": "Search depth: basic or advanced (default basic)."
                        }
                    },
                    "required": ["query"]
                }),
            ),
        }
    }
}

/// Where a tool call is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRoute {
    Local(LocalTool),
    Gateway,
}

impl ToolRoute {
    pub fn for_name(name: &str) -> Self {
        name.parse()
            .map(ToolRoute::Local)
            .unwrap_or(ToolRoute::Gateway)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchKnowledgeInput {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub tenant_scope: Option<String>,
}
