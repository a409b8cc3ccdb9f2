//! Configuration schema for voxloop.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so that the JSON
//! config file can use camelCase keys while Rust code uses snake_case
//! fields. Every tunable constant of the pipeline lives here — the
//! illustrative defaults (timeouts, cache TTL, queue depth, latency budget)
//! are configuration, not structure.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Gateway (WebSocket transport) config
// ---------------------------------------------------------------------------

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    18920
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reasoning provider config
// ---------------------------------------------------------------------------

/// External reasoning provider configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_reasoning_base")]
    pub api_base: String,
    #[serde(default = "default_reasoning_model")]
    pub model: String,
    /// Hard per-call timeout; on expiry the gateway falls back.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_reasoning_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_reasoning_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

fn default_cache_capacity() -> usize {
    100
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_reasoning_base(),
            model: default_reasoning_model(),
            timeout_ms: default_provider_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Speech synthesis config
// ---------------------------------------------------------------------------

/// External speech synthesis provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_synthesis_base")]
    pub api_base: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    #[serde(default = "default_synthesis_timeout_ms")]
    pub timeout_ms: u64,
    /// Streaming chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Per-call audio queue depth; overflow drops the oldest item.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Pacing delay between streamed chunks.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Deliver audio as ordered chunks (`audio_stream`) rather than one
    /// buffer (`audio_response`).
    #[serde(default = "default_streaming_delivery")]
    pub streaming_delivery: bool,
}

fn default_synthesis_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.75
}

fn default_synthesis_timeout_ms() -> u64 {
    10_000
}

fn default_chunk_size() -> usize {
    1024
}

fn default_queue_depth() -> usize {
    10
}

fn default_pacing_ms() -> u64 {
    20
}

fn default_streaming_delivery() -> bool {
    true
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_synthesis_base(),
            voice_id: default_voice_id(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            timeout_ms: default_synthesis_timeout_ms(),
            chunk_size: default_chunk_size(),
            queue_depth: default_queue_depth(),
            pacing_ms: default_pacing_ms(),
            streaming_delivery: default_streaming_delivery(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session / engine config
// ---------------------------------------------------------------------------

/// Per-call session lifecycle and turn-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Sessions with no turns for this long are torn down automatically.
    #[serde(default = "default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,
    /// Number of recent turns sent to the reasoning provider (the first
    /// turn is always retained on top of this window).
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Consecutive negative-sentiment participant turns that trigger
    /// escalation.
    #[serde(default = "default_escalation_negative_run")]
    pub escalation_negative_run: u32,
}

fn default_inactivity_timeout_ms() -> u64 {
    1_800_000
}

fn default_context_window() -> usize {
    10
}

fn default_escalation_negative_run() -> u32 {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
            context_window: default_context_window(),
            escalation_negative_run: default_escalation_negative_run(),
        }
    }
}

// ---------------------------------------------------------------------------
// Latency instrumentation config
// ---------------------------------------------------------------------------

/// Latency budget and rolling-window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyConfig {
    /// End-to-end budget for one conversation cycle.
    #[serde(default = "default_latency_budget_ms")]
    pub budget_ms: u64,
    /// Number of completed cycles retained for aggregate reporting.
    #[serde(default = "default_latency_window")]
    pub window: usize,
}

fn default_latency_budget_ms() -> u64 {
    2_000
}

fn default_latency_window() -> usize {
    100
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_latency_budget_ms(),
            window: default_latency_window(),
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence config
// ---------------------------------------------------------------------------

/// Append-only transcript store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_store_enabled")]
    pub enabled: bool,
    /// Transcript directory; defaults to `~/.voxloop/transcripts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_store_enabled() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_store_enabled(),
            dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Root config
// ---------------------------------------------------------------------------

/// Root configuration object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.reasoning.timeout_ms, 30_000);
        assert_eq!(cfg.reasoning.cache_ttl_ms, 300_000);
        assert_eq!(cfg.reasoning.cache_capacity, 100);
        assert_eq!(cfg.synthesis.chunk_size, 1024);
        assert_eq!(cfg.synthesis.queue_depth, 10);
        assert_eq!(cfg.session.inactivity_timeout_ms, 1_800_000);
        assert_eq!(cfg.session.context_window, 10);
        assert_eq!(cfg.session.escalation_negative_run, 3);
        assert_eq!(cfg.latency.budget_ms, 2_000);
        assert_eq!(cfg.latency.window, 100);
    }

    #[test]
    fn test_camel_case_keys() {
        let cfg = Config::default();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"timeoutMs\""));
        assert!(json.contains("\"queueDepth\""));
        assert!(json.contains("\"inactivityTimeoutMs\""));
        assert!(json.contains("\"budgetMs\""));
        assert!(!json.contains("\"timeout_ms\""));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"gateway": {"port": 9000}, "latency": {"budgetMs": 500}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.host, "127.0.0.1");
        assert_eq!(cfg.latency.budget_ms, 500);
        assert_eq!(cfg.latency.window, 100);
        assert_eq!(cfg.synthesis.queue_depth, 10);
    }
}
