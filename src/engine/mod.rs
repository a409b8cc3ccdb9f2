//! Conversational turn engine.
//!
//! Classifies participant utterances, drives the conversation-phase state
//! machine, applies the escalation policy, and produces agent turns through
//! the response gateway. Response production is serialized per call: a
//! second request for the same call queues behind the in-flight one, never
//! runs concurrently. Distinct calls proceed fully in parallel.

mod intent;
mod phase;

pub use intent::{classify_intent, classify_sentiment, IntentRule, INTENT_RULES};
pub use phase::decide_phase;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::schema::SessionConfig;
use crate::errors::PipelineError;
use crate::gateway::{ProviderContext, ResponseGateway};
use crate::session::{
    ConversationPhase, Intent, Sentiment, SessionRegistry, Speaker, Turn,
};

/// Result of recording and classifying a participant turn.
#[derive(Debug, Clone)]
pub struct ParticipantTurnOutcome {
    pub turn: Turn,
    pub intent: Intent,
    pub phase: ConversationPhase,
    pub sentiment: Sentiment,
    /// True when this turn tripped the escalation policy.
    pub escalated_now: bool,
}

/// Drives turn-taking for all calls.
pub struct TurnEngine {
    registry: Arc<SessionRegistry>,
    gateway: Arc<ResponseGateway>,
    /// Per-call generation locks; the map itself is only locked briefly to
    /// fetch or create a call's lock.
    generation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    context_window: usize,
    escalation_negative_run: u32,
}

impl TurnEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        gateway: Arc<ResponseGateway>,
        config: &SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            gateway,
            generation_locks: Mutex::new(HashMap::new()),
            context_window: config.context_window,
            escalation_negative_run: config.escalation_negative_run,
        })
    }

    /// Record a participant turn: classify intent and sentiment, append the
    /// turn, advance the phase state machine, and apply the escalation
    /// policy (explicit keywords or a run of negative-sentiment turns).
    pub async fn handle_participant_turn(
        &self,
        call_id: &str,
        text: &str,
        confidence: f64,
        metadata: HashMap<String, Value>,
    ) -> Result<ParticipantTurnOutcome, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "participant turn text is empty".into(),
            ));
        }

        let intent = classify_intent(text);
        let sentiment = classify_sentiment(text);

        let turn = self
            .registry
            .record_turn(call_id, Speaker::Participant, text, confidence, sentiment, metadata)
            .await?;

        let state = self.registry.state_of(call_id).await?;
        let phase = decide_phase(state.phase, intent);
        let threshold = self.escalation_negative_run;

        let mut escalated_now = false;
        self.registry
            .update_state(call_id, |st| {
                let was_escalated = st.escalation_requested();
                st.intent = Some(intent);
                st.phase = phase;
                if intent == Intent::EscalationRequest {
                    st.request_escalation();
                }
                st.note_sentiment(sentiment, threshold);
                escalated_now = !was_escalated && st.escalation_requested();
            })
            .await?;

        if escalated_now {
            info!("Call {} escalated to a human agent", call_id);
        }

        Ok(ParticipantTurnOutcome {
            turn,
            intent,
            phase,
            sentiment,
            escalated_now,
        })
    }

    /// Produce the agent's response turn for a participant utterance.
    ///
    /// Serialized per call by a generation lock. Returns `Ok(None)` when the
    /// session ended or was reset while the provider call was in flight —
    /// late results are dropped silently.
    pub async fn request_response(
        &self,
        call_id: &str,
        participant_text: &str,
    ) -> Result<Option<Turn>, PipelineError> {
        let lock = self.generation_lock(call_id).await;
        let _guard = lock.lock().await;

        let epoch = self
            .registry
            .epoch_of(call_id)
            .await
            .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
        let state = self.registry.state_of(call_id).await?;
        let history = self.registry.context(call_id, self.context_window).await?;

        let context = ProviderContext {
            call_id: call_id.to_string(),
            phase: state.phase,
            history,
        };

        let started = Instant::now();
        let response = self.gateway.generate(participant_text, &context).await;
        let elapsed_ms = started.elapsed().as_millis() as f64;

        if self.registry.epoch_of(call_id).await != Some(epoch) {
            debug!("Dropping late response for call {} (session gone or reset)", call_id);
            return Ok(None);
        }

        if response.should_escalate {
            self.registry
                .update_state(call_id, |st| st.request_escalation())
                .await?;
        }

        let mut metadata = HashMap::new();
        metadata.insert("intent".to_string(), json!(response.intent));
        metadata.insert("source".to_string(), json!(response.source.as_str()));

        let turn = self
            .registry
            .record_turn(
                call_id,
                Speaker::Agent,
                &response.text,
                response.confidence,
                Sentiment::Neutral,
                metadata,
            )
            .await?;
        self.registry.record_response_time(call_id, elapsed_ms).await?;

        Ok(Some(turn))
    }

    /// Drop the per-call generation lock when a call ends.
    pub async fn forget_call(&self, call_id: &str) {
        self.generation_locks.lock().await.remove(call_id);
    }

    async fn generation_lock(&self, call_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.generation_locks.lock().await;
        locks
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
