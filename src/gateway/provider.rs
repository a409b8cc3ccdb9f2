//! External reasoning provider interface.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::PipelineError;
use crate::session::{ConversationPhase, Speaker, Turn};

/// Conversation context passed alongside each prompt.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub call_id: String,
    pub phase: ConversationPhase,
    /// Trimmed history window, oldest first.
    pub history: Vec<Turn>,
}

/// Raw reply from a reasoning provider.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub text: String,
}

/// Abstract reasoning provider.
///
/// Implementations surface content-safety rejection, rate limiting, and
/// network failures as [`PipelineError`] variants embedded in
/// `anyhow::Error`; the gateway converts all of them into fallbacks.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn complete(&self, prompt: &str, context: &ProviderContext) -> Result<ProviderReply>;

    fn name(&self) -> &str {
        "reasoning"
    }
}

const SYSTEM_PROMPT: &str = "You are a friendly voice support agent. Keep responses short and \
conversational — they will be spoken aloud. Answer the caller's question directly.";

/// Reasoning provider backed by an OpenAI-compatible chat completions
/// endpoint.
pub struct HttpReasoningProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl HttpReasoningProvider {
    pub fn new(api_key: &str, api_base: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Build the chat messages array from the context window plus the
    /// current prompt.
    fn build_messages(&self, prompt: &str, context: &ProviderContext) -> Vec<Value> {
        let mut messages = vec![json!({"role": "system", "content": SYSTEM_PROMPT})];
        for turn in &context.history {
            let role = match turn.speaker {
                Speaker::Participant => "user",
                Speaker::Agent => "assistant",
            };
            messages.push(json!({"role": role, "content": turn.text}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        messages
    }
}

#[async_trait]
impl ReasoningProvider for HttpReasoningProvider {
    async fn complete(&self, prompt: &str, context: &ProviderContext) -> Result<ProviderReply> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = json!({
            "model": self.model,
            "messages": self.build_messages(prompt, context),
            "max_tokens": 256,
            "temperature": 0.7,
        });

        debug!(
            "Reasoning request for call {} ({} history turns)",
            context.call_id,
            context.history.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::ProviderUnavailable(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let detail = response.text().await.unwrap_or_default();
            let snippet: String = detail.chars().take(200).collect();
            let err = match status {
                // Content-safety / malformed-prompt rejections.
                400 | 422 => PipelineError::ProviderRejected(snippet),
                429 => PipelineError::ProviderUnavailable(format!("rate limited: {snippet}")),
                _ => PipelineError::ProviderUnavailable(format!("status {status}: {snippet}")),
            };
            return Err(err.into());
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::ProviderUnavailable(format!("bad response body: {e}")))?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        Ok(ProviderReply { text })
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}
