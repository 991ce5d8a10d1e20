//! Commit summary generation.
//!
//! The summarizer is an optional external text-generation call. Callers
//! bound it with a timeout and fall back to `message::fallback_message`.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use super::error::{CommitError, CommitResult};
use crate::config::SummarizerConfig;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, paths: &[String]) -> CommitResult<String>;
}

/// Always fails, so every flush uses the fallback message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _paths: &[String]) -> CommitResult<String> {
        Err(CommitError::Summarize("summarizer disabled".to_string()))
    }
}

/// OpenAI-compatible chat completion client.
#[derive(Debug, Clone)]
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_paths: usize,
}

impl HttpSummarizer {
    pub fn new(config: &SummarizerConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                "[summarizer] {} is not set; requests will be sent without credentials",
                config.api_key_env
            );
        }
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_paths: config.max_paths.max(1),
        }
    }

    fn prompt(&self, paths: &[String]) -> String {
        let mut listing: Vec<&str> = paths.iter().take(self.max_paths).map(String::as_str).collect();
        let extra = paths.len().saturating_sub(self.max_paths);
        let more = format!("... and {extra} more");
        if extra > 0 {
            listing.push(&more);
        }
        format!(
            "Write a one-line git commit message (imperative mood, at most 72 characters) \
             describing edits to these notes in a personal knowledge vault. \
             Reply with the message only.\n\n{}",
            listing.join("\n")
        )
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, paths: &[String]) -> CommitResult<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": self.prompt(paths)}
            ],
            "temperature": 0.2,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CommitError::Summarize(e.to_string()))?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| CommitError::Summarize(e.to_string()))?;
        if !status.is_success() {
            return Err(CommitError::Summarize(format!("HTTP {status}: {body}")));
        }

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CommitError::Summarize("response had no message content".to_string()))
    }
}

/// Summarizer selected by `[summarizer] provider`.
pub fn from_config(config: &SummarizerConfig) -> Arc<dyn Summarizer> {
    match config.provider.as_str() {
        "openai" => Arc::new(HttpSummarizer::new(config)),
        _ => Arc::new(DisabledSummarizer),
    }
}
