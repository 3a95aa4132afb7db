//! Knowledge-base retrieval: query rewriting, hypothetical-document
//! embedding, hybrid search across tenants, reranking and per-source dedupe.
//!
//! Storage, embedding and cross-encoder models are injected through the
//! traits in [`store`].
pub mod enhance;
pub mod pipeline;
pub mod rerank;
pub mod store;

pub use enhance::{LlmHydeGenerator, LlmQueryRewriter};
pub use pipeline::{
    resolve_tenants, KnowledgeHit, KnowledgePipeline, Retrieval, RetrievalRequest, TenantScope,
};
pub use rerank::{deduplicate_by_source, rrf_rerank};
pub use store::{Chunk, Embedder, HydeGenerator, KnowledgeStore, QueryRewriter, Reranker};
