//! External speech synthesis provider interface.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::errors::PipelineError;

/// Voice parameters for a synthesis request.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Rendered audio returned by a synthesis provider.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Abstract speech synthesis provider. Rate limits and timeouts surface as
/// ordinary failures ([`PipelineError`] inside `anyhow::Error`); the
/// streamer degrades to text-only on any of them.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<SynthesizedAudio>;

    fn name(&self) -> &str {
        "synthesis"
    }
}

/// Synthesis provider backed by an ElevenLabs-shaped HTTP endpoint.
pub struct HttpSynthesisProvider {
    client: Client,
    api_key: String,
    api_base: String,
}

impl HttpSynthesisProvider {
    pub fn new(api_key: &str, api_base: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SynthesisProvider for HttpSynthesisProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<SynthesizedAudio> {
        let url = format!("{}/v1/text-to-speech/{}", self.api_base, voice.voice_id);
        let body = json!({
            "text": text,
            "voice_settings": {
                "stability": voice.stability,
                "similarity_boost": voice.similarity_boost,
            },
        });

        debug!("Synthesis request: {} chars, voice {}", text.len(), voice.voice_id);

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::SynthesisFailure(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let detail = response.text().await.unwrap_or_default();
            let snippet: String = detail.chars().take(200).collect();
            let err = match status {
                429 => PipelineError::ProviderUnavailable(format!("synthesis rate limited: {snippet}")),
                _ => PipelineError::SynthesisFailure(format!("status {status}: {snippet}")),
            };
            return Err(err.into());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| PipelineError::SynthesisFailure(format!("body read failed: {e}")))?
            .to_vec();

        Ok(SynthesizedAudio { data, content_type })
    }

    fn name(&self) -> &str {
        "elevenlabs"
    }
}
