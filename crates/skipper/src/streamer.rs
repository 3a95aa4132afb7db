use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Receives the user-visible part of an answer as it is generated
#[async_trait]
pub trait TokenStreamer: Send + Sync {
    async fn send_token(&self, token: &str) -> Result<()>;

    /// Returns the tool lifecycle capability when this streamer supports it
    fn tool_events(&self) -> Option<&dyn ToolEventStreamer> {
        None
    }
}

/// Optional capability for streamers that can render tool activity
#[async_trait]
pub trait ToolEventStreamer: Send + Sync {
    async fn send_tool_start(&self, name: &str) -> Result<()>;

    async fn send_tool_end(&self, name: &str, error: Option<&str>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token {
        content: String,
    },
    ToolStart {
        name: String,
    },
    ToolEnd {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Forwards stream events into an mpsc channel, for transports that drain
/// the receiver on another task.
pub struct ChannelStreamer {
    tx: mpsc::Sender<StreamEvent>,
}

impl ChannelStreamer {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx }
    }

    async fn send(&self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("stream receiver dropped"))
    }
}

#[async_trait]
impl TokenStreamer for ChannelStreamer {
    async fn send_token(&self, token: &str) -> Result<()> {
        self.send(StreamEvent::Token {
            content: token.to_string(),
        })
        .await
    }

    fn tool_events(&self) -> Option<&dyn ToolEventStreamer> {
        Some(self)
    }
}

#[async_trait]
impl ToolEventStreamer for ChannelStreamer {
    async fn send_tool_start(&self, name: &str) -> Result<()> {
        self.send(StreamEvent::ToolStart {
            name: name.to_string(),
        })
        .await
    }

    async fn send_tool_end(&self, name: &str, error: Option<&str>) -> Result<()> {
        self.send(StreamEvent::ToolEnd {
            name: name.to_string(),
            error: error.map(String::from),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_streamer_forwards_events() -> Result<()> {
        let (tx, mut rx) = mpsc::channel(8);
        let streamer = ChannelStreamer::new(tx);

        streamer.send_token("hello").await?;
        let events = streamer.tool_events().expect("tool events supported");
        events.send_tool_start("search_web").await?;
        events.send_tool_end("search_web", Some("boom")).await?;
        drop(streamer);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                StreamEvent::Token {
                    content: "hello".into()
                },
                StreamEvent::ToolStart {
                    name: "search_web".into()
                },
                StreamEvent::ToolEnd {
                    name: "search_web".into(),
                    error: Some("boom".into())
                },
            ]
        );
        Ok(())
    }

    struct TokensOnly;

    #[async_trait]
    impl TokenStreamer for TokensOnly {
        async fn send_token(&self, _token: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tool_events_default_to_unsupported() {
        assert!(TokensOnly.tool_events().is_none());
    }

    #[tokio::test]
    async fn test_send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let streamer = ChannelStreamer::new(tx);
        assert!(streamer.send_token("x").await.is_err());
    }

    #[test]
    fn test_stream_event_wire_shape() {
        let json = serde_json::to_value(StreamEvent::ToolEnd {
            name: "t".into(),
            error: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "tool_end", "name": "t"}));
    }
}
