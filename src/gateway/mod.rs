//! Response generation gateway.
//!
//! Adapts the external reasoning provider to the turn engine: hard timeout,
//! response cache, and deterministic fallback. [`ResponseGateway::generate`]
//! is a total function — it always yields a usable response, never an
//! unhandled failure. Provider calls are one-shot with immediate fallback;
//! retrying would risk the latency budget.

mod cache;
mod fallback;
mod provider;

pub use cache::{cache_key, ResponseCache};
pub use fallback::{fallback_response, FallbackRule, FALLBACK_RULES};
pub use provider::{HttpReasoningProvider, ProviderContext, ProviderReply, ReasoningProvider};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::classify_intent;
use crate::errors::PipelineError;
use crate::session::Intent;

/// Where a generated response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Provider,
    Cache,
    Fallback,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Provider => "provider",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "fallback",
        }
    }
}

/// A usable agent response, whatever path produced it.
#[derive(Debug, Clone)]
pub struct GeneratedResponse {
    pub text: String,
    pub intent: Intent,
    pub confidence: f64,
    pub should_escalate: bool,
    pub source: ResponseSource,
}

/// Gateway in front of the reasoning provider.
pub struct ResponseGateway {
    provider: Arc<dyn ReasoningProvider>,
    cache: Mutex<ResponseCache>,
    timeout: Duration,
}

impl ResponseGateway {
    pub fn new(
        provider: Arc<dyn ReasoningProvider>,
        timeout: Duration,
        cache_ttl: Duration,
        cache_capacity: usize,
    ) -> Self {
        Self {
            provider,
            cache: Mutex::new(ResponseCache::new(cache_ttl, cache_capacity)),
            timeout,
        }
    }

    /// Produce a response for a participant utterance.
    ///
    /// Checks the cache first (a hit never calls the provider), then calls
    /// the provider under the hard timeout, and on any failure — timeout,
    /// error, content rejection, empty output — falls back to a
    /// deterministic canned response.
    pub async fn generate(&self, text: &str, context: &ProviderContext) -> GeneratedResponse {
        let intent = classify_intent(text);
        let should_escalate = intent == Intent::EscalationRequest;
        let key = cache_key(text, context.phase);

        if let Some(mut hit) = self.cache.lock().expect("cache lock").get(&key) {
            debug!("Cache hit for call {} ({})", context.call_id, key);
            hit.source = ResponseSource::Cache;
            return hit;
        }

        let outcome = tokio::time::timeout(self.timeout, self.provider.complete(text, context)).await;

        let reply_text = match outcome {
            Err(_) => {
                let e = PipelineError::ProviderTimeout(self.timeout.as_millis() as u64);
                warn!("Reasoning provider for call {}: {}", context.call_id, e);
                None
            }
            Ok(Err(e)) => {
                warn!(
                    "Reasoning provider '{}' failed for call {}: {}",
                    self.provider.name(),
                    context.call_id,
                    e
                );
                None
            }
            Ok(Ok(reply)) if reply.text.trim().is_empty() => {
                warn!("Reasoning provider returned empty output for call {}", context.call_id);
                None
            }
            Ok(Ok(reply)) => Some(reply.text),
        };

        match reply_text {
            Some(text_out) => {
                let response = GeneratedResponse {
                    text: text_out,
                    intent,
                    confidence: 0.9,
                    should_escalate,
                    source: ResponseSource::Provider,
                };
                self.cache
                    .lock()
                    .expect("cache lock")
                    .insert(&key, response.clone());
                response
            }
            None => GeneratedResponse {
                text: fallback_response(text).to_string(),
                intent,
                confidence: 0.5,
                should_escalate,
                source: ResponseSource::Fallback,
            },
        }
    }

    /// Number of live cache entries (introspection and tests).
    pub fn cache_len(&self) -> usize {
        self.cache.lock().expect("cache lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::session::ConversationPhase;

    struct MockProvider {
        calls: AtomicUsize,
        delay: Duration,
        reply: Option<String>,
        fail: bool,
    }

    impl MockProvider {
        fn replying(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(0),
                reply: Some(reply.to_string()),
                fail: false,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                reply: Some("late".to_string()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(0),
                reply: None,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ReasoningProvider for MockProvider {
        async fn complete(&self, _prompt: &str, _ctx: &ProviderContext) -> Result<ProviderReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(PipelineError::ProviderUnavailable("mock down".into()).into());
            }
            Ok(ProviderReply {
                text: self.reply.clone().unwrap_or_default(),
            })
        }
    }

    fn context(phase: ConversationPhase) -> ProviderContext {
        ProviderContext {
            call_id: "c1".into(),
            phase,
            history: Vec::new(),
        }
    }

    fn gateway(provider: Arc<MockProvider>) -> ResponseGateway {
        ResponseGateway::new(
            provider,
            Duration::from_millis(200),
            Duration::from_secs(300),
            100,
        )
    }

    #[tokio::test]
    async fn test_provider_success() {
        let provider = Arc::new(MockProvider::replying("Hi! How can I help?"));
        let gw = gateway(provider.clone());

        let r = gw.generate("Hello", &context(ConversationPhase::Greeting)).await;
        assert_eq!(r.text, "Hi! How can I help?");
        assert_eq!(r.source, ResponseSource::Provider);
        assert_eq!(r.intent, Intent::Greeting);
        assert!(!r.should_escalate);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let provider = Arc::new(MockProvider::replying("answer"));
        let gw = gateway(provider.clone());
        let ctx = context(ConversationPhase::Inquiry);

        let first = gw.generate("what are your hours", &ctx).await;
        let second = gw.generate("What are your HOURS?", &ctx).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.text, second.text);
        assert_eq!(second.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_different_phase_misses_cache() {
        let provider = Arc::new(MockProvider::replying("answer"));
        let gw = gateway(provider.clone());

        gw.generate("hello there", &context(ConversationPhase::Greeting)).await;
        gw.generate("hello there", &context(ConversationPhase::Closing)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let provider = Arc::new(MockProvider::slow(Duration::from_secs(5)));
        let gw = gateway(provider.clone());

        let r = gw.generate("what does it cost", &context(ConversationPhase::Inquiry)).await;
        assert_eq!(r.source, ResponseSource::Fallback);
        assert!(r.text.contains("pricing"));
        // Fallbacks are not cached.
        assert_eq!(gw.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let provider = Arc::new(MockProvider::failing());
        let gw = gateway(provider.clone());

        let r = gw.generate("zorp", &context(ConversationPhase::Inquiry)).await;
        assert_eq!(r.source, ResponseSource::Fallback);
        assert!(!r.text.is_empty());
    }

    #[tokio::test]
    async fn test_empty_output_falls_back() {
        let provider = Arc::new(MockProvider::replying(""));
        let gw = gateway(provider.clone());

        let r = gw.generate("hello", &context(ConversationPhase::Greeting)).await;
        assert_eq!(r.source, ResponseSource::Fallback);
        assert!(!r.text.is_empty());
    }

    #[tokio::test]
    async fn test_escalation_flag_set() {
        let provider = Arc::new(MockProvider::replying("transferring you now"));
        let gw = gateway(provider.clone());

        let r = gw
            .generate("give me a manager", &context(ConversationPhase::Inquiry))
            .await;
        assert!(r.should_escalate);
        assert_eq!(r.intent, Intent::EscalationRequest);
    }
}
