use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, info, warn};

use crate::accumulator::ToolCallAccumulator;
use crate::compaction::{compact_messages, Summarizer};
use crate::config::Settings;
use crate::confidence::{
    format_block, join_confidence_content, parse_confidence_blocks, sources_from_blocks,
    summarize_confidence, ConfidenceStreamFilter,
};
use crate::context::RequestContext;
use crate::errors::{OrchestratorError, ToolError, ToolResult};
use crate::gateway::{detail_payload, parse_arguments, ToolGateway};
use crate::knowledge::pipeline::{KnowledgePipeline, RetrievalRequest, TenantScope};
use crate::models::message::{Message, Role};
use crate::models::source::{append_sources, Confidence, Source};
use crate::models::tool::{Tool, ToolCall, ToolCallRecord, ToolDetail, ToolOutcome};
use crate::policy::{check_tool, filter_tools, ToolDecision};
use crate::prompts::{
    CONVERGENCE_NUDGE, MAX_ROUNDS_NOTICE, UNTRUSTED_CONTEXT_GUIDANCE, UNTRUSTED_CONTEXT_HEADER,
};
use crate::providers::base::{CompletionStream, Provider};
use crate::streamer::TokenStreamer;
use crate::token_counter::{count_message_tokens, estimate_tokens, truncate_to_tokens};
use crate::tools::{LocalTool, SearchKnowledgeInput, ToolRoute};
use crate::web::{SearchLimits, SearchWebTool, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};

pub const DEFAULT_MAX_ROUNDS: usize = 5;
pub const DEFAULT_CONTEXT_BUDGET: usize = 6000;
pub const DEFAULT_PRE_RETRIEVAL_TOKEN_CAP: usize = 1200;
const DEFAULT_MAX_PER_SOURCE: usize = 2;
const PRE_RETRIEVAL_LIMIT: usize = 3;
const EMPTY_TOOL_OUTPUT: &str = "(no output)";

/// Collaborators and limits for an [`Orchestrator`]
#[derive(Clone)]
pub struct OrchestratorConfig {
    pub provider: Option<Arc<dyn Provider>>,
    pub knowledge: Option<Arc<KnowledgePipeline>>,
    pub web: Option<Arc<SearchWebTool>>,
    pub gateway: Option<Arc<dyn ToolGateway>>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub max_rounds: usize,
    /// Approximate token budget per model call; 0 disables compaction
    pub context_budget: usize,
    pub pre_retrieval_token_cap: usize,
    pub search_limit: usize,
    pub max_search_limit: usize,
    pub max_per_source: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: None,
            knowledge: None,
            web: None,
            gateway: None,
            summarizer: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            context_budget: DEFAULT_CONTEXT_BUDGET,
            pre_retrieval_token_cap: DEFAULT_PRE_RETRIEVAL_TOKEN_CAP,
            search_limit: DEFAULT_SEARCH_LIMIT,
            max_search_limit: MAX_SEARCH_LIMIT,
            max_per_source: DEFAULT_MAX_PER_SOURCE,
        }
    }
}

impl OrchestratorConfig {
    /// Limits from loaded settings, with no collaborators attached yet
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_rounds: settings.orchestrator.max_rounds,
            context_budget: settings.orchestrator.context_budget,
            pre_retrieval_token_cap: settings.orchestrator.pre_retrieval_token_cap,
            search_limit: settings.retrieval.default_limit,
            max_search_limit: settings.retrieval.max_limit,
            max_per_source: settings.retrieval.max_per_source,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub input: usize,
    pub output: usize,
}

/// Everything a transport needs to render and persist one answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorResult {
    pub content: String,
    pub confidence: Confidence,
    pub sources: Vec<Source>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub details: Vec<ToolDetail>,
    pub token_counts: TokenCounts,
}

/// Drives the model through rounds of tool calls until it produces an answer
pub struct Orchestrator {
    provider: Option<Arc<dyn Provider>>,
    knowledge: Option<Arc<KnowledgePipeline>>,
    web: Option<Arc<SearchWebTool>>,
    gateway: Option<Arc<dyn ToolGateway>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    tools: Vec<Tool>,
    max_rounds: usize,
    context_budget: usize,
    pre_retrieval_token_cap: usize,
    search_limits: SearchLimits,
    max_per_source: usize,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let mut tools: Vec<Tool> = LocalTool::iter()
            .filter(|tool| match tool {
                LocalTool::SearchKnowledge => config.knowledge.is_some(),
                LocalTool::SearchWeb => config.web.is_some(),
            })
            .map(|tool| tool.definition())
            .collect();
        if let Some(gateway) = &config.gateway {
            tools.extend(
                gateway
                    .available_tools()
                    .into_iter()
                    .filter(|tool| matches!(ToolRoute::for_name(&tool.name), ToolRoute::Gateway)),
            );
        }

        let positive = |value: usize, default: usize| if value == 0 { default } else { value };
        Self {
            provider: config.provider,
            knowledge: config.knowledge,
            web: config.web,
            gateway: config.gateway,
            summarizer: config.summarizer,
            tools,
            max_rounds: positive(config.max_rounds, DEFAULT_MAX_ROUNDS),
            context_budget: config.context_budget,
            pre_retrieval_token_cap: positive(
                config.pre_retrieval_token_cap,
                DEFAULT_PRE_RETRIEVAL_TOKEN_CAP,
            ),
            search_limits: SearchLimits::new(config.search_limit, config.max_search_limit),
            max_per_source: positive(config.max_per_source, DEFAULT_MAX_PER_SOURCE),
        }
    }

    /// Every tool this orchestrator can offer, before mode filtering
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Answer the last message of `messages`, streaming visible text to `streamer`
    pub async fn run(
        &self,
        ctx: &RequestContext,
        messages: Vec<Message>,
        streamer: Option<&dyn TokenStreamer>,
    ) -> Result<OrchestratorResult, OrchestratorError> {
        let provider = self
            .provider
            .as_deref()
            .ok_or(OrchestratorError::MissingProvider)?;

        let mut messages = messages;
        self.pre_retrieve(ctx, &mut messages).await;

        let tools = filter_tools(&ctx.mode, &self.tools);
        let mut filter = ConfidenceStreamFilter::new(streamer);
        let mut response = String::new();
        let mut sources = Vec::new();
        let mut tool_calls = Vec::new();
        let mut details = Vec::new();
        let mut input_tokens = 0;

        for round in 0..self.max_rounds {
            if ctx.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            if self.context_budget > 0 {
                messages =
                    compact_messages(messages, self.context_budget, self.summarizer.as_deref())
                        .await;
            }
            input_tokens += count_message_tokens(&messages);

            let stream = provider
                .complete(&messages, &tools)
                .await
                .map_err(OrchestratorError::Provider)?;
            let (text, calls) = consume_stream(ctx, stream, &mut filter).await?;
            response.push_str(&text);
            filter.flush().await.map_err(OrchestratorError::Streamer)?;

            if calls.is_empty() {
                debug!(round, "model produced a final answer");
                break;
            }
            info!(round, calls = calls.len(), "executing tool calls");

            messages.push(Message::assistant(text).with_tool_calls(calls.clone()));
            for call in &calls {
                let (outcome, record) = self.run_tool_call(ctx, call, streamer).await;
                tool_calls.push(record);
                // every call in the assistant message needs a matching tool message
                let content = match outcome.content.trim() {
                    "" => EMPTY_TOOL_OUTPUT.to_string(),
                    _ => outcome.content,
                };
                messages.push(Message::tool_result(call, content));
                append_sources(&mut sources, outcome.sources);
                details.extend(outcome.detail);
            }

            if round + 2 == self.max_rounds {
                messages.push(Message::user(CONVERGENCE_NUDGE));
            }
            if round + 1 == self.max_rounds {
                warn!(max_rounds = self.max_rounds, "tool round limit reached");
                let notice = format!("\n\n{}", format_block(Confidence::Unknown, MAX_ROUNDS_NOTICE));
                response.push_str(&notice);
                filter
                    .write(&notice)
                    .await
                    .map_err(OrchestratorError::Streamer)?;
                filter.flush().await.map_err(OrchestratorError::Streamer)?;
            }
        }

        let blocks = parse_confidence_blocks(&response);
        let content = join_confidence_content(&blocks);
        append_sources(&mut sources, sources_from_blocks(&blocks));

        Ok(OrchestratorResult {
            confidence: summarize_confidence(&blocks),
            token_counts: TokenCounts {
                input: input_tokens,
                output: estimate_tokens(&content),
            },
            content,
            sources,
            tool_calls,
            details,
        })
    }

    /// Put knowledge relevant to the question in front of the model before the
    /// first round. Any failure leaves the conversation untouched.
    async fn pre_retrieve(&self, ctx: &RequestContext, messages: &mut Vec<Message>) {
        let Some(pipeline) = &self.knowledge else {
            return;
        };
        let query = match messages.last() {
            Some(last) if last.is_role(Role::User) && !last.content.trim().is_empty() => {
                last.content.clone()
            }
            _ => return,
        };

        let request = RetrievalRequest {
            query,
            limit: PRE_RETRIEVAL_LIMIT,
            scope: TenantScope::All,
            max_per_source: DEFAULT_MAX_PER_SOURCE,
            enhance: false,
        };
        let retrieval = match pipeline.retrieve(ctx, request).await {
            Ok(retrieval) => retrieval,
            Err(err) => {
                warn!(error = %err, tenant = %ctx.tenant_id, "pre-retrieval skipped");
                return;
            }
        };
        if retrieval.is_empty() {
            return;
        }

        let block = format!(
            "{}:\n{}\n{}",
            UNTRUSTED_CONTEXT_HEADER, UNTRUSTED_CONTEXT_GUIDANCE, retrieval.context
        );
        let block = truncate_to_tokens(&block, self.pre_retrieval_token_cap);
        debug!(hits = retrieval.hits.len(), "injected pre-retrieved context");

        match messages.first_mut() {
            Some(system) if system.is_role(Role::System) => {
                if !system.content.trim().is_empty() {
                    system.content.push_str("\n\n");
                }
                system.content.push_str(block);
            }
            _ => messages.insert(0, Message::system(block)),
        }
    }

    /// Execute one call with lifecycle events, turning failures into an outcome
    async fn run_tool_call(
        &self,
        ctx: &RequestContext,
        call: &ToolCall,
        streamer: Option<&dyn TokenStreamer>,
    ) -> (ToolOutcome, ToolCallRecord) {
        let events = streamer.and_then(|streamer| streamer.tool_events());
        if let Some(events) = events {
            if let Err(err) = events.send_tool_start(&call.name).await {
                debug!(tool = %call.name, error = %err, "failed to send tool start");
            }
        }

        let mut record = ToolCallRecord::from_call(call);
        let result = match check_tool(&ctx.mode, &call.name, &call.arguments) {
            ToolDecision::Blocked(reason) => {
                info!(tool = %call.name, mode = %ctx.mode, "tool call blocked");
                Ok(ToolOutcome::text(reason))
            }
            ToolDecision::Allowed => self.execute_tool(ctx, call).await,
        };
        let outcome = result.unwrap_or_else(|err| {
            warn!(tool = %call.name, error = %err, "tool execution failed");
            let message = err.to_string();
            record.error = Some(message.clone());
            ToolOutcome::text(format!("Tool {} failed: {}", call.name, message))
                .with_detail(ToolDetail::for_tool(&call.name, json!({ "error": message })))
        });

        if let Some(events) = events {
            if let Err(err) = events
                .send_tool_end(&call.name, record.error.as_deref())
                .await
            {
                debug!(tool = %call.name, error = %err, "failed to send tool end");
            }
        }
        (outcome, record)
    }

    async fn execute_tool(&self, ctx: &RequestContext, call: &ToolCall) -> ToolResult<ToolOutcome> {
        match ToolRoute::for_name(&call.name) {
            ToolRoute::Local(LocalTool::SearchKnowledge) => {
                self.search_knowledge(ctx, &call.arguments).await
            }
            ToolRoute::Local(LocalTool::SearchWeb) => self.search_web(&call.arguments).await,
            ToolRoute::Gateway => self.call_gateway(call).await,
        }
    }

    async fn search_knowledge(
        &self,
        ctx: &RequestContext,
        arguments: &str,
    ) -> ToolResult<ToolOutcome> {
        let pipeline = self
            .knowledge
            .as_ref()
            .ok_or_else(|| ToolError::Unavailable("knowledge search".into()))?;
        let input: SearchKnowledgeInput = serde_json::from_str(arguments).map_err(|err| {
            ToolError::InvalidParameters(format!("parse search_knowledge arguments: {}", err))
        })?;

        let request = RetrievalRequest {
            query: input.query,
            limit: self.search_limits.resolve(input.limit),
            scope: TenantScope::parse(input.tenant_scope.as_deref()),
            max_per_source: self.max_per_source,
            enhance: true,
        };
        let retrieval = pipeline.retrieve(ctx, request).await?;

        let payload =
            serde_json::to_value(&retrieval).map_err(|err| ToolError::execution(err.into()))?;
        Ok(ToolOutcome::text(retrieval.context)
            .with_sources(retrieval.sources)
            .with_detail(ToolDetail::for_tool(
                &LocalTool::SearchKnowledge.to_string(),
                payload,
            )))
    }

    async fn search_web(&self, arguments: &str) -> ToolResult<ToolOutcome> {
        let web = self
            .web
            .as_ref()
            .ok_or_else(|| ToolError::Unavailable("search provider".into()))?;
        let response = web.call(arguments, self.search_limits).await?;

        let payload =
            serde_json::to_value(&response).map_err(|err| ToolError::execution(err.into()))?;
        Ok(ToolOutcome::text(response.context)
            .with_sources(response.sources)
            .with_detail(ToolDetail::for_tool(&LocalTool::SearchWeb.to_string(), payload)))
    }

    async fn call_gateway(&self, call: &ToolCall) -> ToolResult<ToolOutcome> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| ToolError::Unavailable("tool gateway".into()))?;
        if !gateway.has_tool(&call.name) {
            return Err(ToolError::UnsupportedTool(call.name.clone()));
        }
        let arguments = parse_arguments(&call.arguments).map_err(|err| {
            ToolError::InvalidParameters(format!("parse {} arguments: {}", call.name, err))
        })?;

        let content = gateway
            .call_tool(&call.name, arguments)
            .await
            .map_err(ToolError::execution)?;
        let detail = ToolDetail::for_tool(&call.name, detail_payload(&content));
        Ok(ToolOutcome::text(content).with_detail(detail))
    }
}

/// Drain one completion stream, racing it against cancellation
async fn consume_stream(
    ctx: &RequestContext,
    mut stream: CompletionStream,
    filter: &mut ConfidenceStreamFilter<'_>,
) -> Result<(String, Vec<ToolCall>), OrchestratorError> {
    let mut text = String::new();
    let mut accumulator = ToolCallAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(OrchestratorError::Provider)?;

        if !chunk.content.is_empty() {
            text.push_str(&chunk.content);
            filter
                .write(&chunk.content)
                .await
                .map_err(OrchestratorError::Streamer)?;
        }
        if !chunk.tool_calls.is_empty() {
            accumulator.push(chunk.tool_calls);
        }
    }
    Ok((text, accumulator.finish()))
}
