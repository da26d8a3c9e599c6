//! Reqwest-based client for OpenAI-compatible Chat Completions streaming.
//!
//! Only the autofix collaborator talks to the model; the engines never do.

use std::{pin::Pin, time::Duration};

use anyhow::{Context, Result};
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let timeout = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(60);
        let api_base_url = cfg.get("API_BASE_URL").unwrap_or_else(|| "default".into());
        let base_url = normalize_base_url(&api_base_url);
        let api_key = cfg.get("OPENAI_API_KEY");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        Ok(Self { http, base_url, api_key })
    }

    pub fn chat_stream(
        &self,
        messages: Vec<ChatMessage>,
        opts: ChatOptions,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>> {
        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let api_key = self.api_key.clone();

        Box::pin(try_stream! {
            let url = format!("{}/chat/completions", base_url);

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("text/event-stream"));
            if let Some(key) = api_key {
                let hv = HeaderValue::from_str(&format!("Bearer {}", key))?;
                headers.insert(AUTHORIZATION, hv);
            }

            let body = serde_json::json!({
                "model": opts.model,
                "temperature": opts.temperature,
                "messages": messages,
                "stream": true,
                "max_tokens": opts.max_tokens,
            });

            let resp = http
                .post(url)
                .headers(headers)
                .json(&body)
                .send()
                .await
                .context("failed to send chat request")?;

            if !resp.status().is_success() {
                let status = resp.status();
                Err(anyhow::anyhow!("LLM error: {}", status))?;
            }

            let mut buf = String::new();
            let mut stream = resp.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let bytes = chunk.context("stream error")?;
                buf.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() || line.starts_with(':') { continue; }
                    let Some(payload) = line.strip_prefix("data:") else { continue };
                    let payload = payload.trim();
                    if payload == "[DONE]" { yield StreamEvent::Done; return; }
                    // malformed lines are skipped
                    if let Ok(chunk) = serde_json::from_str::<Chunk>(payload) {
                        for choice in chunk.choices {
                            if let Some(content) = choice.delta.and_then(|d| d.content) {
                                if !content.is_empty() {
                                    yield StreamEvent::Content(content);
                                }
                            }
                        }
                    }
                }
            }
            yield StreamEvent::Done;
        })
    }

    /// Drain a streamed completion into one string.
    pub async fn complete(&self, messages: Vec<ChatMessage>, opts: ChatOptions) -> Result<String> {
        let mut stream = self.chat_stream(messages, opts);
        let mut text = String::new();
        while let Some(ev) = stream.next().await {
            match ev? {
                StreamEvent::Content(t) => text.push_str(&t),
                StreamEvent::Done => break,
            }
        }
        Ok(text)
    }
}

fn normalize_base_url(configured: &str) -> String {
    if configured == "default" {
        return "https://api.openai.com/v1".to_string();
    }
    let trimmed = configured.trim_end_matches('/');
    if !trimmed.ends_with("/v1") && !trimmed.contains("/v1/") {
        format!("{}/v1", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug)]
pub enum StreamEvent {
    Content(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}
