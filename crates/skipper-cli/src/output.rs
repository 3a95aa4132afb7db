use anyhow::Result;
use async_trait::async_trait;
use console::style;
use std::io::{self, Write};

use skipper::streamer::{TokenStreamer, ToolEventStreamer};

/// Writes answer tokens to stdout and tool activity to stderr
pub struct TerminalStreamer;

#[async_trait]
impl TokenStreamer for TerminalStreamer {
    async fn send_token(&self, token: &str) -> Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(token.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn tool_events(&self) -> Option<&dyn ToolEventStreamer> {
        Some(self)
    }
}

#[async_trait]
impl ToolEventStreamer for TerminalStreamer {
    async fn send_tool_start(&self, name: &str) -> Result<()> {
        eprintln!("{} {}", style("▸ running").dim(), style(name).yellow());
        Ok(())
    }

    async fn send_tool_end(&self, name: &str, error: Option<&str>) -> Result<()> {
        match error {
            Some(error) => eprintln!("{} {}: {}", style("✗").red(), name, style(error).red()),
            None => eprintln!("{} {}", style("✓").green(), style(name).dim()),
        }
        Ok(())
    }
}
