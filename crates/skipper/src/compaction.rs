//! Tiered context compaction.
//!
//! Each tier only runs while the conversation is still over budget, and a tier
//! is only applied when it actually shrinks the token count:
//!
//! 0. tool results older than the last two user turns are always dropped
//! 1. above 80% of the budget, the middle is summarized, keeping the last 4 messages
//! 2. still over, summarize again keeping only the last 2
//! 3. still over, keep just the system message, a truncation notice and the current turn
//!
//! The current turn is the last user message and everything after it. Tool
//! exchanges in front of it that a user message started (the convergence nudge
//! follows them) belong to the turn too. Tiers 1 to 3 never summarize or drop
//! any part of it, and never separate an assistant `tool_calls` message from the
//! tool results answering it.
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::message::{Message, Role};
use crate::prompts::{SUMMARY_INSTRUCTIONS, SUMMARY_PREFIX, TRUNCATION_NOTICE};
use crate::providers::base::{collect_completion, Provider};
use crate::token_counter::count_message_tokens;

const SUMMARIZE_AT_PERCENT: usize = 80;
const TIER1_KEEP_LAST: usize = 4;
const TIER2_KEEP_LAST: usize = 2;
const TOOL_RESULT_USER_TURNS: usize = 2;

/// Condenses a stretch of conversation into a short text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

pub struct LlmSummarizer {
    provider: Arc<dyn Provider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let transcript = messages
            .iter()
            .map(|message| format!("{}: {}", message.role, message.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = [Message::system(SUMMARY_INSTRUCTIONS), Message::user(transcript)];
        let summary = collect_completion(self.provider.as_ref(), &prompt).await?;
        Ok(summary.trim().to_string())
    }
}

/// Shrink `messages` toward `budget` approximate tokens
pub async fn compact_messages(
    messages: Vec<Message>,
    budget: usize,
    summarizer: Option<&dyn Summarizer>,
) -> Vec<Message> {
    let mut current = prune_old_tool_messages(messages);
    let mut tokens = count_message_tokens(&current);
    if tokens * 100 <= budget * SUMMARIZE_AT_PERCENT {
        return current;
    }

    if let Some(summarizer) = summarizer {
        for keep_last in [TIER1_KEEP_LAST, TIER2_KEEP_LAST] {
            if let Some(summarized) = summarize_middle(&current, keep_last, summarizer).await {
                debug!(
                    before = tokens,
                    after = count_message_tokens(&summarized),
                    keep_last,
                    "summarized earlier conversation"
                );
                current = summarized;
                tokens = count_message_tokens(&current);
            }
            if tokens <= budget {
                return current;
            }
        }
    }

    if tokens <= budget {
        return current;
    }
    let emergency = emergency_compact(&current);
    if count_message_tokens(&emergency) < tokens {
        warn!(budget, tokens, "conversation truncated to fit context budget");
        return emergency;
    }
    current
}

/// Drop tool results older than the last two user turns, along with the
/// tool calls that requested them
pub fn prune_old_tool_messages(messages: Vec<Message>) -> Vec<Message> {
    let user_turns: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.is_role(Role::User))
        .map(|(idx, _)| idx)
        .collect();
    if user_turns.len() < TOOL_RESULT_USER_TURNS {
        return messages;
    }
    let boundary = user_turns[user_turns.len() - TOOL_RESULT_USER_TURNS];

    messages
        .into_iter()
        .enumerate()
        .filter_map(|(idx, mut message)| {
            if idx >= boundary {
                return Some(message);
            }
            match message.role {
                Role::Tool => None,
                Role::Assistant if !message.tool_calls.is_empty() => {
                    message.tool_calls.clear();
                    (!message.content.trim().is_empty()).then_some(message)
                }
                _ => Some(message),
            }
        })
        .collect()
}

/// Keep the leading system message, a truncation notice and the current turn
pub fn emergency_compact(messages: &[Message]) -> Vec<Message> {
    let start = system_offset(messages);
    let tail = current_turn_start(messages).max(start);

    let mut compacted = Vec::with_capacity(2 + messages.len() - tail);
    if start == 1 {
        compacted.push(messages[0].clone());
    }
    compacted.push(Message::assistant(TRUNCATION_NOTICE));
    compacted.extend_from_slice(&messages[tail..]);
    compacted
}

/// Index where the turn being answered starts
pub fn current_turn_start(messages: &[Message]) -> usize {
    let Some(mut start) = messages.iter().rposition(|m| m.is_role(Role::User)) else {
        return group_start(messages, messages.len().saturating_sub(1));
    };
    loop {
        let after_exchange = start;
        while start > 0 && is_tool_exchange(&messages[start - 1]) {
            start -= 1;
        }
        if start == after_exchange || start == 0 || !messages[start - 1].is_role(Role::User) {
            return start;
        }
        start -= 1;
    }
}

/// Step back past tool results onto the assistant message that requested them
fn group_start(messages: &[Message], mut idx: usize) -> usize {
    while idx > 0 && messages.get(idx).is_some_and(|m| m.is_role(Role::Tool)) {
        idx -= 1;
    }
    idx
}

fn is_tool_exchange(message: &Message) -> bool {
    message.is_role(Role::Tool)
        || (message.is_role(Role::Assistant) && !message.tool_calls.is_empty())
}

fn system_offset(messages: &[Message]) -> usize {
    usize::from(messages.first().is_some_and(|m| m.is_role(Role::System)))
}

async fn summarize_middle(
    messages: &[Message],
    keep_last: usize,
    summarizer: &dyn Summarizer,
) -> Option<Vec<Message>> {
    let start = system_offset(messages);
    if messages.len() <= start + keep_last {
        return None;
    }
    let end = messages.len() - keep_last;
    let end = group_start(messages, end.min(current_turn_start(messages)));
    if end <= start {
        return None;
    }

    let summary = match summarizer.summarize(&messages[start..end]).await {
        Ok(summary) if !summary.trim().is_empty() => summary,
        Ok(_) => {
            debug!("summarizer returned nothing");
            return None;
        }
        Err(err) => {
            warn!(error = %err, "conversation summary failed");
            return None;
        }
    };

    let mut summarized = Vec::with_capacity(start + 1 + keep_last);
    summarized.extend_from_slice(&messages[..start]);
    summarized.push(Message::assistant(format!(
        "{}{}]",
        SUMMARY_PREFIX,
        summary.trim()
    )));
    summarized.extend_from_slice(&messages[end..]);

    (count_message_tokens(&summarized) < count_message_tokens(messages)).then_some(summarized)
}
