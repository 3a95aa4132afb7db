//! Codec for the confidence-block convention the model uses to tag answer sections:
//!
//! ```text
//! [confidence:<tag>]
//! <content>
//! [sources]
//! - <title> — <url>
//! [/sources]
//! ```
//!
//! [`ConfidenceStreamFilter`] strips the markup from live tokens so it never reaches
//! the end user, and [`parse_confidence_blocks`] recovers the structured sections
//! from the complete text once the run is over.
use anyhow::Result;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::models::source::{Confidence, ConfidenceBlock, Source, SourceKind};
use crate::streamer::TokenStreamer;

const CONFIDENCE_PREFIX: &str = "[confidence:";
const SOURCES_OPEN: &str = "[sources]";
const SOURCES_CLOSE: &str = "[/sources]";

fn inline_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[confidence:[^\]\n]*\][ \t]?").expect("confidence tag pattern is valid")
    })
}

/// Removes every `[confidence:...]` marker in place, leaving the surrounding text
fn strip_inline_tags(text: &str) -> Cow<'_, str> {
    inline_tag_pattern().replace_all(text, "")
}

/// Incrementally filters streamed text so only answer prose reaches the streamer
pub struct ConfidenceStreamFilter<'a> {
    streamer: Option<&'a dyn TokenStreamer>,
    pending: String,
    in_sources: bool,
}

impl<'a> ConfidenceStreamFilter<'a> {
    pub fn new(streamer: Option<&'a dyn TokenStreamer>) -> Self {
        Self {
            streamer,
            pending: String::new(),
            in_sources: false,
        }
    }

    /// Consume a chunk of arbitrary size, forwarding every line it completes
    pub async fn write(&mut self, chunk: &str) -> Result<()> {
        if self.streamer.is_none() || chunk.is_empty() {
            return Ok(());
        }
        self.pending.push_str(chunk);
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            self.process_line(&line[..line.len() - 1], true).await?;
        }
        Ok(())
    }

    /// Process whatever partial line is still buffered
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let line = std::mem::take(&mut self.pending);
        self.process_line(&line, false).await
    }

    async fn process_line(&mut self, line: &str, newline: bool) -> Result<()> {
        let trimmed = line.trim();
        if trimmed == SOURCES_OPEN {
            self.in_sources = true;
            return Ok(());
        }
        if trimmed == SOURCES_CLOSE {
            self.in_sources = false;
            return Ok(());
        }
        if self.in_sources {
            return Ok(());
        }

        let stripped = strip_inline_tags(line);
        if trimmed.contains(CONFIDENCE_PREFIX) && stripped.trim().is_empty() {
            return Ok(());
        }
        // An unterminated tag line is still markup
        if trimmed.starts_with(CONFIDENCE_PREFIX) && !trimmed.contains(']') {
            return Ok(());
        }

        let Some(streamer) = self.streamer else {
            return Ok(());
        };
        if stripped.trim().is_empty() {
            if newline {
                streamer.send_token("\n").await?;
            }
            return Ok(());
        }

        let mut output = stripped.into_owned();
        if newline {
            output.push('\n');
        }
        streamer.send_token(&output).await
    }
}

/// Parse the complete model output into confidence blocks.
///
/// Scanning stops at the first span whose sources block is incomplete. Text
/// without any well-formed span becomes a single `unknown` block.
pub fn parse_confidence_blocks(input: &str) -> Vec<ConfidenceBlock> {
    let mut blocks = Vec::new();
    let mut remaining = input;

    loop {
        let Some(start) = remaining.find(CONFIDENCE_PREFIX) else {
            break;
        };
        let after_prefix = &remaining[start + CONFIDENCE_PREFIX.len()..];
        let Some(tag_end) = after_prefix.find(']') else {
            break;
        };
        let tag = &after_prefix[..tag_end];
        let after_tag = &after_prefix[tag_end + 1..];

        let Some(sources_start) = after_tag.find(SOURCES_OPEN) else {
            break;
        };
        let content = strip_inline_tags(&after_tag[..sources_start])
            .trim()
            .to_string();
        let after_sources = &after_tag[sources_start + SOURCES_OPEN.len()..];
        let Some(sources_end) = after_sources.find(SOURCES_CLOSE) else {
            break;
        };

        blocks.push(ConfidenceBlock {
            content,
            confidence: Confidence::from_tag(tag),
            sources: parse_sources_block(&after_sources[..sources_end]),
        });
        remaining = &after_sources[sources_end + SOURCES_CLOSE.len()..];
    }

    if blocks.is_empty() {
        let stripped = strip_inline_tags(input);
        let trimmed = stripped.trim();
        if !trimmed.is_empty() {
            blocks.push(ConfidenceBlock {
                content: trimmed.to_string(),
                confidence: Confidence::Unknown,
                sources: Vec::new(),
            });
        }
    }
    blocks
}

fn parse_sources_block(block: &str) -> Vec<Source> {
    block
        .lines()
        .map(|line| line.trim().trim_start_matches('-').trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (title, url) = split_source_line(line);
            Source::new(title, url, SourceKind::Unknown)
        })
        .collect()
}

fn split_source_line(line: &str) -> (&str, &str) {
    if let Some((title, url)) = line.split_once('\u{2014}') {
        return (title.trim(), url.trim());
    }
    if let Some((title, url)) = line.split_once(" - ") {
        return (title.trim(), url.trim());
    }
    (line, "")
}

/// Join the non-blank block contents with blank-line separation
pub fn join_confidence_content(blocks: &[ConfidenceBlock]) -> String {
    blocks
        .iter()
        .map(|block| block.content.trim())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The highest-ranked confidence across all blocks, `unknown` when there are none
pub fn summarize_confidence(blocks: &[ConfidenceBlock]) -> Confidence {
    blocks
        .iter()
        .map(|block| block.confidence)
        .max()
        .unwrap_or_default()
}

pub fn sources_from_blocks(blocks: &[ConfidenceBlock]) -> Vec<Source> {
    blocks
        .iter()
        .flat_map(|block| block.sources.iter().cloned())
        .collect()
}

/// Render a single closing block in wire format
pub fn format_block(confidence: Confidence, content: &str) -> String {
    format!(
        "[confidence:{}]\n{}\n{}\n{}\n",
        confidence, content, SOURCES_OPEN, SOURCES_CLOSE
    )
}
