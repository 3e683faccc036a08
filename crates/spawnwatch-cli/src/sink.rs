use std::io::Write;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use spawnwatch_engine::Reply;

/// Where replies produced by the watcher end up.
pub trait ReplySink: Send + Sync {
    fn deliver(&self, reply: &Reply) -> Result<()>;
}

/// Prints one JSON object per reply on stdout.
pub struct StdoutSink;

impl ReplySink for StdoutSink {
    fn deliver(&self, reply: &Reply) -> Result<()> {
        let line = serde_json::to_string(reply)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Posts replies through the chat platform's REST API.
pub struct RestSink {
    http: HttpClient,
    api_base: String,
    token: String,
}

impl RestSink {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http: HttpClient::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn endpoint(&self, channel_id: &str) -> String {
        format!("{}/channels/{channel_id}/messages", self.api_base)
    }
}

impl ReplySink for RestSink {
    fn deliver(&self, reply: &Reply) -> Result<()> {
        let url = self.endpoint(&reply.channel_id);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .json(&json!({ "content": reply.content }))
            .send()
            .with_context(|| format!("chat reply request failed ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "chat reply rejected ({code}): {}",
                truncate_text(&body, 256)
            );
        }
        Ok(())
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = text.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
