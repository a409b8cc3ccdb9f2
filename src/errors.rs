//! Domain error types for the conversation pipeline.
//!
//! Typed errors at module boundaries replace string-encoded errors and
//! enable structured handling via pattern matching. Provider-facing
//! variants are embedded in `anyhow::Error` so the provider trait
//! signatures (`-> anyhow::Result<..>`) stay unchanged while the Gateway
//! and Streamer can downcast: `e.downcast_ref::<PipelineError>()`.

use thiserror::Error;

/// Errors raised inside the conversation pipeline.
///
/// Only `SessionNotFound` and `InvalidInput` are surfaced to callers as
/// client errors; everything provider-facing is converted into a
/// deterministic fallback at the Gateway/Streamer boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("provider call timed out after {0}ms")]
    ProviderTimeout(u64),

    #[error("provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("speech synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("unknown call session: {0}")]
    SessionNotFound(String),

    #[error("audio queue overflow on call {call_id}: dropped {dropped} oldest entries")]
    QueueOverflow { call_id: String, dropped: usize },

    #[error("transport delivery failed for connection {0}")]
    TransportDeliveryFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// True for errors that should surface to the caller as a client error
    /// rather than be swallowed into a fallback path.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::SessionNotFound(_) | PipelineError::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let e = PipelineError::ProviderTimeout(30_000);
        assert_eq!(e.to_string(), "provider call timed out after 30000ms");

        let e = PipelineError::SessionNotFound("call-1".into());
        assert_eq!(e.to_string(), "unknown call session: call-1");

        let e = PipelineError::QueueOverflow {
            call_id: "c9".into(),
            dropped: 2,
        };
        assert!(e.to_string().contains("c9"));
        assert!(e.to_string().contains("2 oldest"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(PipelineError::SessionNotFound("x".into()).is_client_error());
        assert!(PipelineError::InvalidInput("bad".into()).is_client_error());
        assert!(!PipelineError::ProviderTimeout(1).is_client_error());
        assert!(!PipelineError::SynthesisFailure("x".into()).is_client_error());
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let anyhow_err: anyhow::Error =
            PipelineError::ProviderRejected("content policy".into()).into();
        let downcasted = anyhow_err.downcast_ref::<PipelineError>();
        assert!(matches!(
            downcasted,
            Some(PipelineError::ProviderRejected(_))
        ));
    }
}
