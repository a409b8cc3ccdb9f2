//! The conversation pipeline.
//!
//! Wires registry, turn engine, response gateway, synthesis streamer,
//! broadcast hub, latency tracker, and transcript store into the
//! perceive→reason→respond→speak cycle. Constructed explicitly by the host
//! process with injected providers — no singletons. Every internal failure
//! still yields a response turn and/or an idle status transition; the
//! conversation never silently hangs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::schema::Config;
use crate::engine::TurnEngine;
use crate::errors::PipelineError;
use crate::gateway::{ReasoningProvider, ResponseGateway};
use crate::latency::{LatencyReport, LatencyTracker, Stage};
use crate::sched::Scheduler;
use crate::session::{SessionOptions, SessionRegistry, Speaker, Turn};
use crate::store::TranscriptStore;
use crate::synthesis::{SynthesisProvider, SynthesisStreamer, VoiceSettings};
use crate::transport::{BroadcastHub, Connection, ServerEvent, VoiceStatus};

/// Orchestrates all live calls.
pub struct ConversationPipeline {
    registry: Arc<SessionRegistry>,
    engine: Arc<TurnEngine>,
    streamer: Arc<SynthesisStreamer>,
    hub: Arc<BroadcastHub>,
    latency: Arc<LatencyTracker>,
    store: Option<Arc<TranscriptStore>>,
    voice: VoiceSettings,
    streaming_delivery: bool,
}

impl ConversationPipeline {
    /// Build the full pipeline from configuration and the two external
    /// providers.
    pub fn new(
        config: &Config,
        reasoning: Arc<dyn ReasoningProvider>,
        synthesis: Arc<dyn SynthesisProvider>,
    ) -> Arc<Self> {
        let scheduler = Scheduler::new();

        let store = if config.store.enabled {
            let dir = config
                .store
                .dir
                .as_ref()
                .map(std::path::PathBuf::from)
                .unwrap_or_else(TranscriptStore::default_dir);
            Some(Arc::new(TranscriptStore::new(dir)))
        } else {
            None
        };

        let registry = SessionRegistry::new(
            scheduler,
            Duration::from_millis(config.session.inactivity_timeout_ms),
            store.clone(),
        );

        let gateway = Arc::new(ResponseGateway::new(
            reasoning,
            Duration::from_millis(config.reasoning.timeout_ms),
            Duration::from_millis(config.reasoning.cache_ttl_ms),
            config.reasoning.cache_capacity,
        ));

        let engine = TurnEngine::new(registry.clone(), gateway, &config.session);
        let streamer = SynthesisStreamer::new(synthesis, &config.synthesis);
        let hub = BroadcastHub::new();
        let latency = Arc::new(LatencyTracker::new(
            Duration::from_millis(config.latency.budget_ms),
            config.latency.window,
        ));

        Arc::new(Self {
            registry,
            engine,
            streamer,
            hub,
            latency,
            store,
            voice: VoiceSettings {
                voice_id: config.synthesis.voice_id.clone(),
                stability: config.synthesis.stability,
                similarity_boost: config.synthesis.similarity_boost,
            },
            streaming_delivery: config.synthesis.streaming_delivery,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn streamer(&self) -> &Arc<SynthesisStreamer> {
        &self.streamer
    }

    pub fn latency_report(&self) -> LatencyReport {
        self.latency.report()
    }

    /// Attach an observer connection to a call, creating the session if
    /// this is the first contact for the id.
    pub async fn observer_join(
        &self,
        call_id: &str,
        participant: Option<String>,
        conn: Arc<dyn Connection>,
    ) {
        if !self.registry.contains(call_id).await {
            self.registry
                .init_session(call_id, SessionOptions { participant })
                .await;
        }
        let conn_id = conn.id().to_string();
        self.hub.join(call_id, conn).await;
        self.hub
            .send_to(call_id, &conn_id, &ServerEvent::status(VoiceStatus::Listening))
            .await;
    }

    /// Detach an observer. The last one leaving finalizes the session end
    /// time — teardown stays the registry's decision.
    pub async fn observer_leave(&self, call_id: &str, conn_id: &str) {
        let remaining = self.hub.leave(call_id, conn_id).await;
        if remaining == 0 {
            self.registry.finalize_end_time(call_id).await;
        }
    }

    /// Run one full conversation cycle for a participant utterance.
    pub async fn handle_participant_input(
        &self,
        call_id: &str,
        text: &str,
        confidence: f64,
    ) -> Result<(), PipelineError> {
        self.hub
            .broadcast(call_id, &ServerEvent::status(VoiceStatus::Processing))
            .await;

        // Perceive: record and classify the participant turn.
        self.latency.start_timing(call_id, Stage::SpeechToText);
        let outcome = match self
            .engine
            .handle_participant_turn(call_id, text, confidence, HashMap::new())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.hub
                    .broadcast(call_id, &ServerEvent::error(e.to_string()))
                    .await;
                self.hub
                    .broadcast(call_id, &ServerEvent::status(VoiceStatus::Idle))
                    .await;
                self.latency.discard_call(call_id);
                return Err(e);
            }
        };
        self.latency.end_timing(call_id, Stage::SpeechToText);
        self.hub
            .broadcast(call_id, &ServerEvent::transcript_entry(&outcome.turn))
            .await;

        // Reason: produce the agent turn (serialized per call, total).
        self.latency.start_timing(call_id, Stage::AiProcessing);
        let agent_turn = match self.engine.request_response(call_id, text).await {
            Ok(Some(turn)) => turn,
            Ok(None) => {
                // Session ended or reset while generating; drop silently.
                debug!("Cycle for call {} abandoned mid-generation", call_id);
                self.latency.discard_call(call_id);
                return Ok(());
            }
            Err(e) => {
                self.hub
                    .broadcast(call_id, &ServerEvent::status(VoiceStatus::Idle))
                    .await;
                self.latency.discard_call(call_id);
                return Err(e);
            }
        };
        self.latency.end_timing(call_id, Stage::AiProcessing);
        self.hub
            .broadcast(call_id, &ServerEvent::transcript_entry(&agent_turn))
            .await;

        // Respond/speak: render and deliver audio; failures degrade to the
        // text-only transcript that is already out.
        self.speak(call_id, &agent_turn).await;

        self.hub
            .broadcast(call_id, &ServerEvent::status(VoiceStatus::Idle))
            .await;
        self.latency.complete_cycle(call_id);
        Ok(())
    }

    /// Synthesize and deliver the audio for an agent turn.
    async fn speak(&self, call_id: &str, turn: &Turn) {
        self.latency.start_timing(call_id, Stage::TextToSpeech);
        let job = self
            .streamer
            .synthesize(call_id, &turn.text, &self.voice)
            .await;
        self.latency.end_timing(call_id, Stage::TextToSpeech);

        let job = match job {
            Ok(job) => job,
            Err(e) => {
                warn!("Call {} degrading to text-only: {}", call_id, e);
                self.hub
                    .broadcast(
                        call_id,
                        &ServerEvent::error("voice is temporarily unavailable"),
                    )
                    .await;
                if let Some(store) = &self.store {
                    store.store_synthesis_metrics(call_id, "-", "failed", 0, 0);
                }
                return;
            }
        };

        self.hub
            .broadcast(call_id, &ServerEvent::status(VoiceStatus::Speaking))
            .await;

        self.latency.start_timing(call_id, Stage::AudioTransmission);
        if self.streaming_delivery {
            self.streamer
                .enqueue_chunks(call_id, job.chunks.clone())
                .await;
            let pacing = self.streamer.pacing();
            while let Some(chunk) = self.streamer.pop_chunk(call_id).await {
                let is_last = chunk.is_last;
                self.hub
                    .broadcast(call_id, &ServerEvent::audio_stream(turn.seq, &chunk))
                    .await;
                if !is_last && !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
            }
        } else {
            let buffer: Vec<u8> = job.chunks.iter().flat_map(|c| c.data.clone()).collect();
            let content_type = job
                .chunks
                .first()
                .map(|c| c.content_type.clone())
                .unwrap_or_else(|| "audio/mpeg".to_string());
            self.hub
                .broadcast(
                    call_id,
                    &ServerEvent::audio_response(turn.seq, &job.text, &buffer, &content_type),
                )
                .await;
        }
        self.latency.end_timing(call_id, Stage::AudioTransmission);

        if let Some(store) = &self.store {
            let store = store.clone();
            let call_id = call_id.to_string();
            let (id, status, chunks, bytes) = (
                job.id.clone(),
                job.status.as_str(),
                job.chunks.len(),
                job.byte_len(),
            );
            tokio::spawn(async move {
                store.store_synthesis_metrics(&call_id, &id, status, chunks, bytes);
            });
        }
    }

    /// Record and broadcast a turn without driving generation — the demo
    /// simulator replays scripted agent turns through this same contract.
    pub async fn inject_turn(
        &self,
        call_id: &str,
        speaker: Speaker,
        text: &str,
    ) -> Result<Turn, PipelineError> {
        let sentiment = crate::engine::classify_sentiment(text);
        let turn = self
            .registry
            .record_turn(call_id, speaker, text, 1.0, sentiment, HashMap::new())
            .await?;
        self.hub
            .broadcast(call_id, &ServerEvent::transcript_entry(&turn))
            .await;
        Ok(turn)
    }

    /// Explicit call end: tear the session down and release per-call
    /// resources everywhere.
    pub async fn end_call(&self, call_id: &str) {
        if self.registry.end_session(call_id).await.is_some() {
            info!("Call {} ended", call_id);
        }
        self.engine.forget_call(call_id).await;
        self.streamer.discard_call(call_id).await;
        self.latency.discard_call(call_id);
        self.hub
            .broadcast(call_id, &ServerEvent::status(VoiceStatus::Idle))
            .await;
    }

    /// Participant restarted context: clear history but keep the call.
    pub async fn reset_call(&self, call_id: &str) -> Result<(), PipelineError> {
        self.registry.reset_session(call_id).await?;
        self.streamer.discard_call(call_id).await;
        self.hub
            .broadcast(call_id, &ServerEvent::status(VoiceStatus::Listening))
            .await;
        Ok(())
    }

    /// The session's ordered transcript as wire events.
    pub async fn transcript_events(&self, call_id: &str) -> Result<Vec<ServerEvent>, PipelineError> {
        let snapshot = self
            .registry
            .snapshot(call_id)
            .await
            .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
        Ok(snapshot
            .turns
            .iter()
            .map(ServerEvent::transcript_entry)
            .collect())
    }
}
