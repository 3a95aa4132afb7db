use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A retrieved passage of a knowledge-base document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_url: String,
    pub source_title: String,
    pub text: String,
    /// Relevance score; vector similarity from the store, replaced by the
    /// reranker's score once reranked
    pub similarity: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Chunk {
    pub fn new<U: Into<String>, T: Into<String>, X: Into<String>>(
        source_url: U,
        source_title: T,
        text: X,
        similarity: f64,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            source_title: source_title.into(),
            text: text.into(),
            similarity,
            metadata: Map::new(),
        }
    }
}

/// Hybrid (vector + keyword) search over one tenant's documents
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn hybrid_search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<Chunk>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// A cross-encoder that rescores chunks against the query
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, chunks: Vec<Chunk>) -> Result<Vec<Chunk>>;
}

#[async_trait]
pub trait QueryRewriter: Send + Sync {
    async fn rewrite(&self, text: &str) -> Result<String>;
}

/// Produces a hypothetical answer whose embedding stands in for the query's
#[async_trait]
pub trait HydeGenerator: Send + Sync {
    async fn generate(&self, query: &str) -> Result<String>;
}
