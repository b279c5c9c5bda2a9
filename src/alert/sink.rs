use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::alert::engine::AlertEvent;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

/// Writes one line per alert. The CLI points it at stderr so stdout carries
/// only the rendered report.
pub struct ConsoleSink<W = io::Stderr> {
    out: Mutex<W>,
}

impl ConsoleSink {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send> AlertSink for ConsoleSink<W> {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("console sink lock poisoned"))?;
        writeln!(out, "[{}] {} - {}", event.source, event.title, event.body)?;
        Ok(())
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let request = if is_discord_webhook(&self.url) {
            let content = format!("**{}**\n{}", event.title, event.body);
            self.client
                .post(&self.url)
                .json(&serde_json::json!({ "content": content }))
        } else {
            self.client.post(&self.url).json(event)
        };

        request.send().await?.error_for_status()?;
        Ok(())
    }
}

fn is_discord_webhook(url: &str) -> bool {
    ["discord.com/api/webhooks", "discordapp.com/api/webhooks"]
        .iter()
        .any(|marker| url.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertEventKind;

    #[test]
    fn console_sink_writes_one_line_per_alert() {
        let sink = ConsoleSink::new(Vec::new());
        let event = AlertEvent {
            kind: AlertEventKind::SourceChanged,
            source: "umwelt-klima".to_string(),
            title: "Catalog changed: Umwelt & Klima".to_string(),
            body: "1 added, 0 removed, 0 modified".to_string(),
        };
        tokio_test::block_on(sink.send(&event)).expect("send");
        let written = String::from_utf8(sink.into_inner()).expect("utf8");
        assert_eq!(
            written,
            "[umwelt-klima] Catalog changed: Umwelt & Klima - 1 added, 0 removed, 0 modified\n"
        );
    }

    #[test]
    fn recognizes_discord_webhooks() {
        assert!(is_discord_webhook("https://discord.com/api/webhooks/1/abc"));
        assert!(!is_discord_webhook("https://hooks.example.org/catalog"));
    }
}
