//! End-to-end pipeline tests with mock providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use voxloop::config::schema::Config;
use voxloop::demo::DemoSimulator;
use voxloop::gateway::{ProviderContext, ProviderReply, ReasoningProvider};
use voxloop::pipeline::ConversationPipeline;
use voxloop::session::{ConversationPhase, SessionOptions, Speaker};
use voxloop::synthesis::{chunk_audio, SynthesisProvider, SynthesizedAudio, VoiceSettings};
use voxloop::transport::{MemoryConnection, ServerEvent, VoiceStatus};

// ─────────────────────────────────────────────────────────────
// Mock providers
// ─────────────────────────────────────────────────────────────

struct MockReasoning {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockReasoning {
    fn new(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReasoningProvider for MockReasoning {
    async fn complete(&self, _prompt: &str, _ctx: &ProviderContext) -> Result<ProviderReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(ProviderReply {
            text: self.reply.clone(),
        })
    }
}

struct MockSynthesis {
    bytes: usize,
    fail: bool,
}

impl MockSynthesis {
    fn new(bytes: usize) -> Arc<Self> {
        Arc::new(Self { bytes, fail: false })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            bytes: 0,
            fail: true,
        })
    }
}

#[async_trait]
impl SynthesisProvider for MockSynthesis {
    async fn synthesize(&self, _text: &str, _voice: &VoiceSettings) -> Result<SynthesizedAudio> {
        if self.fail {
            anyhow::bail!("synthesis backend down");
        }
        Ok(SynthesizedAudio {
            data: vec![0u8; self.bytes],
            content_type: "audio/mpeg".to_string(),
        })
    }
}

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.store.enabled = false;
    cfg.synthesis.pacing_ms = 0;
    cfg
}

fn pipeline_with(
    cfg: &Config,
    reasoning: Arc<MockReasoning>,
    synthesis: Arc<MockSynthesis>,
) -> Arc<ConversationPipeline> {
    ConversationPipeline::new(cfg, reasoning, synthesis)
}

// Collect helper views over delivered events.
fn transcript_pairs(events: &[ServerEvent]) -> Vec<(Speaker, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::TranscriptEntry { speaker, text, .. } => Some((*speaker, text.clone())),
            _ => None,
        })
        .collect()
}

fn stream_chunks(events: &[ServerEvent]) -> Vec<(u32, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::AudioStream {
                chunk_index,
                is_last,
                ..
            } => Some((*chunk_index, *is_last)),
            _ => None,
        })
        .collect()
}

fn statuses(events: &[ServerEvent]) -> Vec<VoiceStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::VoiceStatus { status } => Some(*status),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────
// Happy path (scenario 6) and chunk ordering (property 2)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_cycle_under_budget() {
    let reasoning = MockReasoning::new("Hi! How can I help?", Duration::from_millis(50));
    let synthesis = MockSynthesis::new(3000);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    let observer = MemoryConnection::new("obs");
    pipeline.observer_join("c1", None, observer.clone()).await;

    let started = std::time::Instant::now();
    pipeline
        .handle_participant_input("c1", "Hello", 1.0)
        .await
        .unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(2000),
        "cycle must complete within the latency budget"
    );

    // Phase reached greeting.
    let state = pipeline.registry().state_of("c1").await.unwrap();
    assert_eq!(state.phase, ConversationPhase::Greeting);

    // Transcript has 2 ordered turns.
    let events = observer.events();
    let transcript = transcript_pairs(&events);
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0], (Speaker::Participant, "Hello".to_string()));
    assert_eq!(transcript[1].0, Speaker::Agent);
    assert_eq!(transcript[1].1, "Hi! How can I help?");

    // Audio chunk sequence is 0..n-1 in order, exactly one is_last, at the end.
    let chunks = stream_chunks(&events);
    assert!(!chunks.is_empty());
    for (i, (index, _)) in chunks.iter().enumerate() {
        assert_eq!(*index, i as u32);
    }
    assert_eq!(chunks.iter().filter(|(_, last)| *last).count(), 1);
    assert!(chunks.last().unwrap().1, "final chunk flagged isLast");

    // Status transitions end idle; latency cycle recorded as optimal.
    let seen = statuses(&events);
    assert!(seen.contains(&VoiceStatus::Processing));
    assert!(seen.contains(&VoiceStatus::Speaking));
    assert_eq!(*seen.last().unwrap(), VoiceStatus::Idle);

    let report = pipeline.latency_report();
    assert_eq!(report.cycles, 1);
    assert!((report.optimal_ratio - 1.0).abs() < f64::EPSILON);
}

// ─────────────────────────────────────────────────────────────
// Gapless sequence numbers under concurrency (property 1)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_calls_keep_gapless_sequences() {
    let reasoning = MockReasoning::new("ok", Duration::from_millis(10));
    let synthesis = MockSynthesis::new(100);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    for call in ["a", "b", "c"] {
        pipeline
            .registry()
            .init_session(call, SessionOptions::default())
            .await;
    }

    let mut handles = Vec::new();
    for i in 0..4 {
        for call in ["a", "b", "c"] {
            let p = pipeline.clone();
            let call = call.to_string();
            handles.push(tokio::spawn(async move {
                p.handle_participant_input(&call, &format!("message {i}"), 1.0)
                    .await
                    .unwrap();
            }));
        }
    }
    for h in handles {
        h.await.unwrap();
    }

    for call in ["a", "b", "c"] {
        let snap = pipeline.registry().snapshot(call).await.unwrap();
        let seqs: Vec<u64> = snap.turns.iter().map(|t| t.seq).collect();
        let expected: Vec<u64> = (0..seqs.len() as u64).collect();
        assert_eq!(seqs, expected, "call {call}: strictly increasing, no gaps");
        assert_eq!(snap.turns.len(), 8, "call {call}: 4 exchanges = 8 turns");
    }
}

// ─────────────────────────────────────────────────────────────
// Wire transcript round-trip (property 3)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn transcript_round_trip_preserves_order() {
    let reasoning = MockReasoning::new("answer", Duration::ZERO);
    let synthesis = MockSynthesis::new(10);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    pipeline
        .registry()
        .init_session("c1", SessionOptions::default())
        .await;
    for text in ["Hello", "what are your hours", "goodbye"] {
        pipeline
            .handle_participant_input("c1", text, 1.0)
            .await
            .unwrap();
    }

    let original: Vec<(Speaker, String)> = pipeline
        .registry()
        .snapshot("c1")
        .await
        .unwrap()
        .turns
        .iter()
        .map(|t| (t.speaker, t.text.clone()))
        .collect();

    // Serialize to the wire format and reconstruct.
    let wire: Vec<String> = pipeline
        .transcript_events("c1")
        .await
        .unwrap()
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect();

    let mut reconstructed = Vec::new();
    for line in &wire {
        if let ServerEvent::TranscriptEntry { speaker, text, .. } =
            serde_json::from_str::<ServerEvent>(line).unwrap()
        {
            reconstructed.push((speaker, text));
        }
    }

    assert_eq!(reconstructed, original);
    assert_eq!(reconstructed.len(), 6);
}

// ─────────────────────────────────────────────────────────────
// Cache single provider call (property 4)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_query_same_phase_hits_cache() {
    let reasoning = MockReasoning::new("Hi! How can I help?", Duration::from_millis(5));
    let synthesis = MockSynthesis::new(10);
    let pipeline = pipeline_with(&test_config(), reasoning.clone(), synthesis);

    pipeline
        .registry()
        .init_session("c1", SessionOptions::default())
        .await;

    pipeline
        .handle_participant_input("c1", "Hello", 1.0)
        .await
        .unwrap();
    pipeline
        .handle_participant_input("c1", "Hello", 1.0)
        .await
        .unwrap();

    assert_eq!(
        reasoning.calls.load(Ordering::SeqCst),
        1,
        "second identical (query, phase) request within TTL must be a cache hit"
    );

    // Both exchanges still produced agent turns.
    let snap = pipeline.registry().snapshot("c1").await.unwrap();
    assert_eq!(snap.turns.len(), 4);
}

// ─────────────────────────────────────────────────────────────
// Escalation monotonicity (property 5)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn escalation_flag_never_reverts() {
    let reasoning = MockReasoning::new("connecting you", Duration::ZERO);
    let synthesis = MockSynthesis::new(10);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    pipeline
        .registry()
        .init_session("c1", SessionOptions::default())
        .await;

    pipeline
        .handle_participant_input("c1", "let me speak to a human", 1.0)
        .await
        .unwrap();
    assert!(pipeline
        .registry()
        .state_of("c1")
        .await
        .unwrap()
        .escalation_requested());

    for text in ["actually it's fine", "great, thanks!", "you're wonderful"] {
        pipeline
            .handle_participant_input("c1", text, 1.0)
            .await
            .unwrap();
        assert!(
            pipeline
                .registry()
                .state_of("c1")
                .await
                .unwrap()
                .escalation_requested(),
            "escalation must survive '{text}'"
        );
    }
}

// ─────────────────────────────────────────────────────────────
// Provider timeout fallback (scenario 7)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn provider_timeout_still_completes_cycle() {
    let mut cfg = test_config();
    cfg.reasoning.timeout_ms = 150;

    // Provider far exceeds the configured hard timeout.
    let reasoning = MockReasoning::new("too late", Duration::from_secs(60));
    let synthesis = MockSynthesis::new(100);
    let pipeline = pipeline_with(&cfg, reasoning, synthesis);

    let observer = MemoryConnection::new("obs");
    pipeline.observer_join("c1", None, observer.clone()).await;

    pipeline
        .handle_participant_input("c1", "what does the pro plan cost", 1.0)
        .await
        .unwrap();

    // Fallback text was delivered as the agent turn.
    let events = observer.events();
    let transcript = transcript_pairs(&events);
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].0, Speaker::Agent);
    assert!(!transcript[1].1.is_empty(), "fallback text delivered");
    assert_ne!(transcript[1].1, "too late");

    // The cycle completed and idle was emitted.
    assert_eq!(*statuses(&events).last().unwrap(), VoiceStatus::Idle);
    assert_eq!(pipeline.latency_report().cycles, 1);
}

// ─────────────────────────────────────────────────────────────
// Synthesis failure degrades to text-only
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn synthesis_failure_never_blocks_transcript() {
    let reasoning = MockReasoning::new("the answer", Duration::ZERO);
    let pipeline = pipeline_with(&test_config(), reasoning, MockSynthesis::failing());

    let observer = MemoryConnection::new("obs");
    pipeline.observer_join("c1", None, observer.clone()).await;

    pipeline
        .handle_participant_input("c1", "question", 1.0)
        .await
        .unwrap();

    let events = observer.events();
    let transcript = transcript_pairs(&events);
    assert_eq!(transcript.len(), 2, "both turns delivered despite TTS failure");
    assert!(stream_chunks(&events).is_empty(), "no audio events");
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::Error { .. })));
    assert_eq!(*statuses(&events).last().unwrap(), VoiceStatus::Idle);
}

// ─────────────────────────────────────────────────────────────
// Queue overflow (scenario 8)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn audio_queue_overflow_drops_oldest() {
    let reasoning = MockReasoning::new("x", Duration::ZERO);
    let synthesis = MockSynthesis::new(0);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);
    let streamer = pipeline.streamer();

    // 12 chunks into a depth-10 queue.
    let chunks = chunk_audio(&vec![0u8; 12], "audio/mpeg", 1);
    assert_eq!(chunks.len(), 12);
    let dropped = streamer.enqueue_chunks("c1", chunks).await;

    assert_eq!(dropped, 2, "two oldest dropped with a warning");
    assert_eq!(streamer.queue_len("c1").await, 10);
    assert_eq!(streamer.pop_chunk("c1").await.unwrap().index, 2);
}

// ─────────────────────────────────────────────────────────────
// Inactivity teardown (scenario 9)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn inactive_session_is_torn_down_automatically() {
    let mut cfg = test_config();
    cfg.session.inactivity_timeout_ms = 100;

    let reasoning = MockReasoning::new("x", Duration::ZERO);
    let synthesis = MockSynthesis::new(0);
    let pipeline = pipeline_with(&cfg, reasoning, synthesis);

    pipeline
        .registry()
        .init_session("c1", SessionOptions::default())
        .await;
    assert!(pipeline.registry().contains("c1").await);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        !pipeline.registry().contains("c1").await,
        "session removed after the inactivity threshold"
    );
}

// ─────────────────────────────────────────────────────────────
// Demo cancellation (scenario 10)
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_demo_stops_future_turns() {
    let reasoning = MockReasoning::new("x", Duration::ZERO);
    let synthesis = MockSynthesis::new(0);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    let observer = MemoryConnection::new("obs");
    pipeline.observer_join("demo-1", None, observer.clone()).await;

    let simulator = DemoSimulator::new(pipeline.clone());
    let handle = simulator
        .start_scripted_session("demo-1", "support")
        .unwrap();

    // Wait for the first scripted message to land.
    let mut waited = Duration::ZERO;
    loop {
        if transcript_pairs(&observer.events()).len() >= 1 {
            break;
        }
        assert!(waited < Duration::from_secs(5), "first demo turn never arrived");
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }

    handle.cancel();

    // Long enough for several more scripted turns, had they survived.
    let count_at_cancel = transcript_pairs(&observer.events()).len();
    tokio::time::sleep(Duration::from_secs(3)).await;
    let count_after = transcript_pairs(&observer.events()).len();

    assert!(count_at_cancel <= 2);
    assert_eq!(
        count_after, count_at_cancel,
        "no scheduled messages delivered after cancellation"
    );
}

#[tokio::test]
async fn unknown_demo_template_rejected() {
    let reasoning = MockReasoning::new("x", Duration::ZERO);
    let synthesis = MockSynthesis::new(0);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    let simulator = DemoSimulator::new(pipeline);
    assert!(simulator.start_scripted_session("c", "nope").is_err());
}

// ─────────────────────────────────────────────────────────────
// Batch delivery mode
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_delivery_sends_single_audio_response() {
    let mut cfg = test_config();
    cfg.synthesis.streaming_delivery = false;

    let reasoning = MockReasoning::new("the answer", Duration::ZERO);
    let synthesis = MockSynthesis::new(5000);
    let pipeline = pipeline_with(&cfg, reasoning, synthesis);

    let observer = MemoryConnection::new("obs");
    pipeline.observer_join("c1", None, observer.clone()).await;
    pipeline
        .handle_participant_input("c1", "question", 1.0)
        .await
        .unwrap();

    let events = observer.events();
    assert!(stream_chunks(&events).is_empty());
    let batches: Vec<&ServerEvent> = events
        .iter()
        .filter(|e| matches!(e, ServerEvent::AudioResponse { .. }))
        .collect();
    assert_eq!(batches.len(), 1);
}

// ─────────────────────────────────────────────────────────────
// Unknown session surfaces a client error
// ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_call_is_a_client_error() {
    let reasoning = MockReasoning::new("x", Duration::ZERO);
    let synthesis = MockSynthesis::new(0);
    let pipeline = pipeline_with(&test_config(), reasoning, synthesis);

    let err = pipeline
        .handle_participant_input("ghost", "hello", 1.0)
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}
