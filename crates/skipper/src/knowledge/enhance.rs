use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::store::{HydeGenerator, QueryRewriter};
use crate::models::message::Message;
use crate::prompts::{HYDE_INSTRUCTIONS, REWRITE_INSTRUCTIONS};
use crate::providers::base::{collect_completion, Provider};

/// Rewrites conversational questions into search queries with an LLM
pub struct LlmQueryRewriter {
    provider: Arc<dyn Provider>,
}

impl LlmQueryRewriter {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl QueryRewriter for LlmQueryRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let messages = [Message::system(REWRITE_INSTRUCTIONS), Message::user(text)];
        let rewritten = collect_completion(self.provider.as_ref(), &messages).await?;
        Ok(rewritten.trim().trim_matches('"').trim().to_string())
    }
}

pub struct LlmHydeGenerator {
    provider: Arc<dyn Provider>,
}

impl LlmHydeGenerator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl HydeGenerator for LlmHydeGenerator {
    async fn generate(&self, query: &str) -> Result<String> {
        let messages = [Message::system(HYDE_INSTRUCTIONS), Message::user(query)];
        let passage = collect_completion(self.provider.as_ref(), &messages).await?;
        Ok(passage.trim().to_string())
    }
}
