use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::rerank::{deduplicate_by_source, rrf_rerank};
use super::store::{Chunk, Embedder, HydeGenerator, KnowledgeStore, QueryRewriter, Reranker};
use crate::config::RetrievalSettings;
use crate::context::RequestContext;
use crate::errors::{ToolError, ToolResult};
use crate::models::source::{Source, SourceKind};
use crate::utils::{first_markdown_heading, snippet_from_content};

pub const DEFAULT_HYDE_TIMEOUT: Duration = Duration::from_secs(15);
const OVER_FETCH_FACTOR: usize = 3;
const NO_RESULTS: &str = "No knowledge base results found.";

/// Which tenants' documents a search covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantScope {
    Global,
    Tenant,
    #[default]
    All,
}

impl TenantScope {
    /// Unset or unrecognised scopes search everything the caller can see
    pub fn parse(scope: Option<&str>) -> Self {
        match scope.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("global") => TenantScope::Global,
            Some("tenant") => TenantScope::Tenant,
            _ => TenantScope::All,
        }
    }
}

/// The tenant ids to search for a scope. The global id is never repeated.
pub fn resolve_tenants(tenant_id: &str, scope: TenantScope, global: Option<&str>) -> Vec<String> {
    let tenant = Some(tenant_id.trim()).filter(|id| !id.is_empty());
    let global = global.map(str::trim).filter(|id| !id.is_empty());

    let mut tenants = Vec::new();
    match scope {
        TenantScope::Global => tenants.extend(global),
        TenantScope::Tenant => tenants.extend(tenant),
        TenantScope::All => {
            tenants.extend(tenant);
            if global != tenant {
                tenants.extend(global);
            }
        }
    }
    tenants.into_iter().map(String::from).collect()
}

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub limit: usize,
    pub scope: TenantScope,
    pub max_per_source: usize,
    /// Apply query rewriting and HyDE before searching
    pub enhance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeHit {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub snippet: String,
    pub similarity: f64,
}

/// Ranked search results plus the text block handed to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub query: String,
    pub context: String,
    pub hits: Vec<KnowledgeHit>,
    pub sources: Vec<Source>,
}

impl Retrieval {
    fn from_chunks(query: &str, chunks: &[Chunk]) -> Self {
        let hits: Vec<KnowledgeHit> = chunks
            .iter()
            .map(|chunk| {
                let title = chunk.source_title.trim();
                let title = if title.is_empty() {
                    chunk.source_url.clone()
                } else {
                    title.to_string()
                };
                KnowledgeHit {
                    title,
                    url: chunk.source_url.clone(),
                    section: first_markdown_heading(&chunk.text).map(String::from),
                    snippet: snippet_from_content(&chunk.text),
                    similarity: chunk.similarity,
                }
            })
            .collect();

        let sources = hits
            .iter()
            .map(|hit| Source::new(hit.title.clone(), hit.url.clone(), SourceKind::KnowledgeBase))
            .collect();

        Self {
            query: query.to_string(),
            context: format_context(&hits),
            hits,
            sources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

fn format_context(hits: &[KnowledgeHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut block = format!("[{}] {} (relevance: {:.2})\n", i + 1, hit.title, hit.similarity);
            if let Some(section) = &hit.section {
                block.push_str(&format!("Section: {}\n", section));
            }
            if !hit.url.is_empty() {
                block.push_str(&format!("URL: {}\n", hit.url));
            }
            block.push_str(&hit.snippet);
            block
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Rewrite, embed, search, rerank and dedupe knowledge-base chunks
pub struct KnowledgePipeline {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    rewriter: Option<Arc<dyn QueryRewriter>>,
    hyde: Option<Arc<dyn HydeGenerator>>,
    global_tenant_id: Option<String>,
    hyde_timeout: Duration,
}

impl KnowledgePipeline {
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            reranker: None,
            rewriter: None,
            hyde: None,
            global_tenant_id: None,
            hyde_timeout: DEFAULT_HYDE_TIMEOUT,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn QueryRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    pub fn with_hyde(mut self, hyde: Arc<dyn HydeGenerator>) -> Self {
        self.hyde = Some(hyde);
        self
    }

    pub fn with_global_tenant<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.global_tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_hyde_timeout(mut self, timeout: Duration) -> Self {
        self.hyde_timeout = timeout;
        self
    }

    /// Apply the global tenant and HyDE timeout from loaded settings
    pub fn with_settings(mut self, settings: &RetrievalSettings) -> Self {
        if let Some(global) = settings.global_tenant_id.as_deref() {
            self = self.with_global_tenant(global);
        }
        if settings.hyde_timeout_secs > 0 {
            self.hyde_timeout = Duration::from_secs(settings.hyde_timeout_secs);
        }
        self
    }

    pub async fn retrieve(
        &self,
        ctx: &RequestContext,
        request: RetrievalRequest,
    ) -> ToolResult<Retrieval> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ToolError::InvalidParameters("query is required".into()));
        }

        let tenants = resolve_tenants(
            &ctx.tenant_id,
            request.scope,
            self.global_tenant_id.as_deref(),
        );
        if tenants.is_empty() {
            return Err(ToolError::TenantRequired);
        }

        let search_query = if request.enhance {
            rewrite_query(self.rewriter.as_deref(), query).await
        } else {
            query.to_string()
        };
        let embedding = self
            .search_embedding(&search_query, request.enhance)
            .await
            .map_err(ToolError::execution)?;

        let chunks = self
            .search_tenants(&tenants, &embedding, &search_query, request.limit)
            .await?;
        let ranked = self.rerank(query, chunks).await;
        let top = deduplicate_by_source(ranked, request.limit, request.max_per_source);

        debug!(
            tenants = tenants.len(),
            hits = top.len(),
            query = %search_query,
            "knowledge retrieval complete"
        );
        Ok(Retrieval::from_chunks(query, &top))
    }

    async fn search_embedding(&self, query: &str, enhance: bool) -> anyhow::Result<Vec<f32>> {
        if enhance {
            if let Some(hyde) = &self.hyde {
                match tokio::time::timeout(self.hyde_timeout, hyde.generate(query)).await {
                    Ok(Ok(passage)) if !passage.trim().is_empty() => {
                        match self.embedder.embed_query(passage.trim()).await {
                            Ok(embedding) => return Ok(embedding),
                            Err(err) => warn!(error = %err, "hyde embedding failed"),
                        }
                    }
                    Ok(Ok(_)) => debug!("hyde produced a blank passage"),
                    Ok(Err(err)) => warn!(error = %err, "hyde generation failed"),
                    Err(_) => warn!(timeout = ?self.hyde_timeout, "hyde generation timed out"),
                }
            }
        }
        self.embedder.embed_query(query).await
    }

    async fn search_tenants(
        &self,
        tenants: &[String],
        embedding: &[f32],
        query: &str,
        limit: usize,
    ) -> ToolResult<Vec<Chunk>> {
        let fetch = limit.saturating_mul(OVER_FETCH_FACTOR);
        let mut chunks = Vec::new();
        let mut succeeded = false;
        let mut last_error = None;

        for tenant in tenants {
            match self.store.hybrid_search(tenant, embedding, query, fetch).await {
                Ok(results) => {
                    succeeded = true;
                    chunks.extend(results);
                }
                Err(err) => {
                    warn!(tenant = %tenant, error = %err, "knowledge search failed for tenant");
                    last_error = Some(err);
                }
            }
        }

        if !succeeded {
            if let Some(err) = last_error {
                return Err(ToolError::execution(err));
            }
        }
        chunks.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(chunks)
    }

    async fn rerank(&self, query: &str, chunks: Vec<Chunk>) -> Vec<Chunk> {
        if chunks.is_empty() {
            return chunks;
        }
        if let Some(reranker) = &self.reranker {
            match reranker.rerank(query, chunks.clone()).await {
                Ok(ranked) => return ranked,
                Err(err) => warn!(error = %err, "reranker failed, using lexical fallback"),
            }
        }
        rrf_rerank(query, chunks)
    }
}

/// Apply the optional rewriter, keeping the original query on any failure
pub(crate) async fn rewrite_query(rewriter: Option<&dyn QueryRewriter>, query: &str) -> String {
    let Some(rewriter) = rewriter else {
        return query.to_string();
    };
    match rewriter.rewrite(query).await {
        Ok(rewritten) if !rewritten.trim().is_empty() => rewritten.trim().to_string(),
        Ok(_) => query.to_string(),
        Err(err) => {
            warn!(error = %err, "query rewrite failed");
            query.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        chunks: Vec<(String, Chunk)>,
        failing: Vec<String>,
        requests: Mutex<Vec<(String, String, usize)>>,
    }

    impl FakeStore {
        fn with(chunks: Vec<(&str, Chunk)>) -> Self {
            Self {
                chunks: chunks
                    .into_iter()
                    .map(|(tenant, chunk)| (tenant.to_string(), chunk))
                    .collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl KnowledgeStore for FakeStore {
        async fn hybrid_search(
            &self,
            tenant_id: &str,
            _embedding: &[f32],
            query_text: &str,
            limit: usize,
        ) -> Result<Vec<Chunk>> {
            self.requests
                .lock()
                .unwrap()
                .push((tenant_id.to_string(), query_text.to_string(), limit));
            if self.failing.iter().any(|t| t == tenant_id) {
                return Err(anyhow!("store offline for {}", tenant_id));
            }
            Ok(self
                .chunks
                .iter()
                .filter(|(tenant, _)| tenant == tenant_id)
                .map(|(_, chunk)| chunk.clone())
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeEmbedder {
        inputs: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.inputs.lock().unwrap().push(text.to_string());
            Ok(vec![0.1, 0.2])
        }
    }

    struct StaticRewriter(Result<String, String>);

    #[async_trait]
    impl QueryRewriter for StaticRewriter {
        async fn rewrite(&self, _text: &str) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    struct SlowHyde;

    #[async_trait]
    impl HydeGenerator for SlowHyde {
        async fn generate(&self, _query: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    struct StaticHyde(&'static str);

    #[async_trait]
    impl HydeGenerator for StaticHyde {
        async fn generate(&self, _query: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        async fn rerank(&self, _query: &str, _chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
            Err(anyhow!("cross-encoder down"))
        }
    }

    fn request(query: &str, enhance: bool) -> RetrievalRequest {
        RetrievalRequest {
            query: query.into(),
            limit: 3,
            scope: TenantScope::All,
            max_per_source: 2,
            enhance,
        }
    }

    #[test]
    fn test_resolve_tenants() {
        assert_eq!(
            resolve_tenants("t1", TenantScope::Global, Some("g")),
            vec!["g"]
        );
        assert!(resolve_tenants("t1", TenantScope::Global, None).is_empty());
        assert!(resolve_tenants("", TenantScope::Tenant, Some("g")).is_empty());
        assert_eq!(resolve_tenants("t1", TenantScope::Tenant, Some("g")), vec!["t1"]);
        assert_eq!(resolve_tenants("t1", TenantScope::All, Some("g")), vec!["t1", "g"]);
        assert_eq!(resolve_tenants("t1", TenantScope::All, None), vec!["t1"]);
        assert_eq!(resolve_tenants("", TenantScope::All, Some("g")), vec!["g"]);
        assert_eq!(resolve_tenants("g", TenantScope::All, Some("g")), vec!["g"]);
    }

    #[test]
    fn test_tenant_scope_parse() {
        assert_eq!(TenantScope::parse(Some("GLOBAL")), TenantScope::Global);
        assert_eq!(TenantScope::parse(Some("tenant")), TenantScope::Tenant);
        assert_eq!(TenantScope::parse(Some("all")), TenantScope::All);
        assert_eq!(TenantScope::parse(Some("")), TenantScope::All);
        assert_eq!(TenantScope::parse(Some("weird")), TenantScope::All);
        assert_eq!(TenantScope::parse(None), TenantScope::All);
    }

    #[tokio::test]
    async fn test_retrieve_formats_context_and_sources() -> ToolResult<()> {
        let store = Arc::new(FakeStore::with(vec![
            (
                "t1",
                Chunk::new(
                    "https://docs/srt",
                    "SRT guide",
                    "## Listener mode\nSet   latency\nto 120ms",
                    0.9,
                ),
            ),
            ("g", Chunk::new("https://docs/hls", "", "HLS segments", 0.5)),
        ]));
        let pipeline = KnowledgePipeline::new(store.clone(), Arc::new(FakeEmbedder::default()))
            .with_global_tenant("g");
        let ctx = RequestContext::new("t1", "u1");

        let retrieval = pipeline.retrieve(&ctx, request("srt latency", false)).await?;

        assert_eq!(retrieval.hits.len(), 2);
        assert_eq!(retrieval.hits[0].title, "SRT guide");
        assert_eq!(retrieval.hits[0].section.as_deref(), Some("Listener mode"));
        assert_eq!(retrieval.hits[1].title, "https://docs/hls");
        assert!(retrieval.context.starts_with("[1] SRT guide (relevance: "));
        assert!(retrieval.context.contains("Section: Listener mode\nURL: https://docs/srt\n"));
        assert!(retrieval.context.contains("\n---\n[2] https://docs/hls"));
        assert!(retrieval
            .sources
            .iter()
            .all(|source| source.kind == SourceKind::KnowledgeBase));

        let requests = store.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], ("t1".to_string(), "srt latency".to_string(), 9));
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_without_results() -> ToolResult<()> {
        let pipeline = KnowledgePipeline::new(
            Arc::new(FakeStore::default()),
            Arc::new(FakeEmbedder::default()),
        );
        let retrieval = pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("anything", true))
            .await?;
        assert!(retrieval.is_empty());
        assert_eq!(retrieval.context, NO_RESULTS);
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_validation_errors() {
        let pipeline = KnowledgePipeline::new(
            Arc::new(FakeStore::default()),
            Arc::new(FakeEmbedder::default()),
        );
        let err = pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("   ", false))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));

        let err = pipeline
            .retrieve(&RequestContext::new("", "u1"), request("q", false))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::TenantRequired);
    }

    #[tokio::test]
    async fn test_failing_tenant_is_skipped_when_another_succeeds() -> ToolResult<()> {
        let mut store = FakeStore::with(vec![("g", Chunk::new("https://g", "G", "text", 0.4))]);
        store.failing = vec!["t1".into()];
        let pipeline = KnowledgePipeline::new(Arc::new(store), Arc::new(FakeEmbedder::default()))
            .with_global_tenant("g");

        let retrieval = pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("text", false))
            .await?;
        assert_eq!(retrieval.hits.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_all_tenants_failing_returns_last_error() {
        let mut store = FakeStore::default();
        store.failing = vec!["t1".into()];
        let pipeline = KnowledgePipeline::new(Arc::new(store), Arc::new(FakeEmbedder::default()));

        let err = pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("text", false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("store offline for t1"));
    }

    #[tokio::test]
    async fn test_enhance_rewrites_and_embeds_hyde_passage() -> ToolResult<()> {
        let store = Arc::new(FakeStore::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let pipeline = KnowledgePipeline::new(store.clone(), embedder.clone())
            .with_rewriter(Arc::new(StaticRewriter(Ok("srt latency tuning".into()))))
            .with_hyde(Arc::new(StaticHyde("Set latency to 4x RTT.")));

        pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("why does srt lag", true))
            .await?;

        assert_eq!(
            *embedder.inputs.lock().unwrap(),
            vec!["Set latency to 4x RTT.".to_string()]
        );
        assert_eq!(store.requests.lock().unwrap()[0].1, "srt latency tuning");
        Ok(())
    }

    #[tokio::test]
    async fn test_enhance_failures_fall_back_to_query() -> ToolResult<()> {
        let store = Arc::new(FakeStore::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let pipeline = KnowledgePipeline::new(store.clone(), embedder.clone())
            .with_rewriter(Arc::new(StaticRewriter(Err("rewrite down".into()))))
            .with_hyde(Arc::new(SlowHyde))
            .with_hyde_timeout(Duration::from_millis(10));

        pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("why does srt lag", true))
            .await?;

        assert_eq!(
            *embedder.inputs.lock().unwrap(),
            vec!["why does srt lag".to_string()]
        );
        assert_eq!(store.requests.lock().unwrap()[0].1, "why does srt lag");
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_rewrite_keeps_original() {
        let rewriter = StaticRewriter(Ok("  ".into()));
        assert_eq!(rewrite_query(Some(&rewriter as &dyn QueryRewriter), "q").await, "q");
        assert_eq!(rewrite_query(None, "q").await, "q");
    }

    #[tokio::test]
    async fn test_settings_supply_global_tenant() -> ToolResult<()> {
        let store = Arc::new(FakeStore::with(vec![(
            "global-docs",
            Chunk::new("https://docs/rtmp", "RTMP", "rtmp ingest", 0.7),
        )]));
        let settings = RetrievalSettings {
            global_tenant_id: Some("global-docs".into()),
            hyde_timeout_secs: 2,
            ..RetrievalSettings::default()
        };
        let pipeline = KnowledgePipeline::new(store.clone(), Arc::new(FakeEmbedder::default()))
            .with_settings(&settings);
        assert_eq!(pipeline.hyde_timeout, Duration::from_secs(2));

        let retrieval = pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("rtmp", false))
            .await?;
        assert_eq!(retrieval.hits[0].title, "RTMP");
        let tenants: Vec<String> = store
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(tenant, _, _)| tenant.clone())
            .collect();
        assert_eq!(tenants, vec!["t1", "global-docs"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reranker_failure_uses_lexical_fallback() -> ToolResult<()> {
        let store = Arc::new(FakeStore::with(vec![
            ("t1", Chunk::new("https://a", "A", "billing", 0.9)),
            ("t1", Chunk::new("https://b", "B", "srt latency", 0.8)),
        ]));
        let pipeline = KnowledgePipeline::new(store, Arc::new(FakeEmbedder::default()))
            .with_reranker(Arc::new(FailingReranker));

        let retrieval = pipeline
            .retrieve(&RequestContext::new("t1", "u1"), request("srt latency", false))
            .await?;
        assert_eq!(retrieval.hits.len(), 2);
        // Fused scores replace the raw similarity
        assert!(retrieval.hits[0].similarity < 0.1);
        Ok(())
    }
}
