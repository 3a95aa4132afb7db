use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{ToolError, ToolResult};
use crate::knowledge::pipeline::rewrite_query;
use crate::knowledge::QueryRewriter;
use crate::models::source::{Source, SourceKind};
use crate::utils::snippet_from_content;

pub const DEFAULT_SEARCH_LIMIT: usize = 8;
pub const MAX_SEARCH_LIMIT: usize = 20;
const DEFAULT_SEARCH_DEPTH: &str = "basic";

/// Result limits applied to search tool calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    /// Used when the model does not ask for a limit
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
            max_limit: MAX_SEARCH_LIMIT,
        }
    }
}

impl SearchLimits {
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        let fallback = Self::default();
        Self {
            default_limit: if default_limit == 0 {
                fallback.default_limit
            } else {
                default_limit
            },
            max_limit: if max_limit == 0 {
                fallback.max_limit
            } else {
                max_limit
            },
        }
    }

    /// The requested limit, or the default, capped at the maximum
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|limit| *limit > 0)
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: usize,
    pub depth: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: f64,
}

/// A web search backend
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<WebResult>>;
}

#[derive(Debug, Deserialize)]
struct SearchWebInput {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    search_depth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSearchHit {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSearchResponse {
    pub query: String,
    pub context: String,
    pub results: Vec<WebSearchHit>,
    pub sources: Vec<Source>,
}

/// The `search_web` tool
pub struct SearchWebTool {
    provider: Arc<dyn WebSearchProvider>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
}

impl SearchWebTool {
    pub fn new(provider: Arc<dyn WebSearchProvider>) -> Self {
        Self {
            provider,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub async fn call(
        &self,
        arguments: &str,
        limits: SearchLimits,
    ) -> ToolResult<WebSearchResponse> {
        let input: SearchWebInput = serde_json::from_str(arguments).map_err(|err| {
            ToolError::InvalidParameters(format!("parse search_web arguments: {}", err))
        })?;

        let query = input.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParameters(
                "search query is required".into(),
            ));
        }
        let limit = limits.resolve(input.limit);
        let depth = input
            .search_depth
            .as_deref()
            .map(str::trim)
            .filter(|depth| !depth.is_empty())
            .unwrap_or(DEFAULT_SEARCH_DEPTH)
            .to_string();

        let search_query = rewrite_query(self.rewriter.as_deref(), query).await;
        let results = self
            .provider
            .search(&search_query, SearchOptions { limit, depth })
            .await
            .map_err(ToolError::execution)?;

        let hits: Vec<WebSearchHit> = results
            .into_iter()
            .map(|result| {
                let url = result.url.trim().to_string();
                let title = match result.title.trim() {
                    "" => url.clone(),
                    title => title.to_string(),
                };
                WebSearchHit {
                    title,
                    url,
                    snippet: snippet_from_content(&result.content),
                    score: result.score,
                }
            })
            .collect();
        let sources = hits
            .iter()
            .map(|hit| Source::new(hit.title.clone(), hit.url.clone(), SourceKind::Web))
            .collect();

        Ok(WebSearchResponse {
            query: query.to_string(),
            context: format_search_context(&hits),
            results: hits,
            sources,
        })
    }
}

fn format_search_context(hits: &[WebSearchHit]) -> String {
    if hits.is_empty() {
        return "No web search results found.".to_string();
    }

    let mut context = String::from("Web search results:\n");
    for (i, hit) in hits.iter().enumerate() {
        context.push_str(&format!("{}. {}\n", i + 1, hit.title));
        if !hit.url.is_empty() {
            context.push_str(&format!("URL: {}\n", hit.url));
        }
        if !hit.snippet.is_empty() {
            context.push_str(&format!("Snippet: {}\n", hit.snippet));
        }
        if i < hits.len() - 1 {
            context.push('\n');
        }
    }
    context.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSearch {
        results: Vec<WebResult>,
        fail: bool,
        seen: Mutex<Vec<(String, SearchOptions)>>,
    }

    #[async_trait]
    impl WebSearchProvider for FakeSearch {
        async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<WebResult>> {
            self.seen.lock().unwrap().push((query.to_string(), options));
            if self.fail {
                return Err(anyhow!("search quota exceeded"));
            }
            Ok(self.results.clone())
        }
    }

    struct UpperRewriter;

    #[async_trait]
    impl QueryRewriter for UpperRewriter {
        async fn rewrite(&self, text: &str) -> Result<String> {
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_call_applies_defaults_and_maps_results() -> ToolResult<()> {
        let provider = Arc::new(FakeSearch {
            results: vec![
                WebResult {
                    title: " OBS guide ".into(),
                    url: "https://obs/guide".into(),
                    content: "Set keyframe\n interval to 2s".into(),
                    score: 0.7,
                },
                WebResult {
                    title: "".into(),
                    url: "https://x/y".into(),
                    content: "".into(),
                    score: 0.1,
                },
            ],
            ..FakeSearch::default()
        });
        let tool = SearchWebTool::new(provider.clone());

        let response = tool
            .call(r#"{"query": " obs keyframe "}"#, SearchLimits::default())
            .await?;

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].0, "obs keyframe");
        assert_eq!(
            seen[0].1,
            SearchOptions {
                limit: DEFAULT_SEARCH_LIMIT,
                depth: "basic".into()
            }
        );
        assert_eq!(
            response.context,
            "Web search results:\n1. OBS guide\nURL: https://obs/guide\nSnippet: Set keyframe interval to 2s\n\n2. https://x/y\nURL: https://x/y"
        );
        assert_eq!(response.sources[1].title, "https://x/y");
        assert!(response.sources.iter().all(|s| s.kind == SourceKind::Web));
        Ok(())
    }

    #[tokio::test]
    async fn test_limit_is_capped_and_query_rewritten() -> ToolResult<()> {
        let provider = Arc::new(FakeSearch::default());
        let tool = SearchWebTool::new(provider.clone()).with_rewriter(Arc::new(UpperRewriter));

        let response = tool
            .call(
                r#"{"query": "srt", "limit": 500, "search_depth": "advanced"}"#,
                SearchLimits::default(),
            )
            .await?;

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].0, "SRT");
        assert_eq!(seen[0].1.limit, MAX_SEARCH_LIMIT);
        assert_eq!(seen[0].1.depth, "advanced");
        assert_eq!(response.query, "srt");
        assert_eq!(response.context, "No web search results found.");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_input_and_provider_errors() {
        let tool = SearchWebTool::new(Arc::new(FakeSearch {
            fail: true,
            ..FakeSearch::default()
        }));

        assert!(matches!(
            tool.call("not json", SearchLimits::default()).await,
            Err(ToolError::InvalidParameters(_))
        ));
        assert!(matches!(
            tool.call(r#"{"query": "  "}"#, SearchLimits::default()).await,
            Err(ToolError::InvalidParameters(_))
        ));
        let err = tool
            .call(r#"{"query": "x"}"#, SearchLimits::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("search quota exceeded"));
    }

    #[tokio::test]
    async fn test_configured_limits() -> ToolResult<()> {
        let provider = Arc::new(FakeSearch::default());
        let tool = SearchWebTool::new(provider.clone());
        let limits = SearchLimits::new(3, 5);

        tool.call(r#"{"query": "srt"}"#, limits).await?;
        tool.call(r#"{"query": "srt", "limit": 9}"#, limits).await?;

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].1.limit, 3);
        assert_eq!(seen[1].1.limit, 5);
        assert_eq!(SearchLimits::new(0, 0), SearchLimits::default());
        Ok(())
    }
}
