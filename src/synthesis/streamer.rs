//! Synthesis jobs, audio chunking, and bounded per-call audio queues.
//!
//! The streamer owns every [`SynthesisJob`]: it normalizes the text, calls
//! the external provider under a timeout, chunks the audio for streaming
//! delivery, and feeds per-call bounded queues that consumers pull from.
//! On overflow the oldest undelivered chunk is dropped with a warning —
//! queues never grow unbounded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::schema::SynthesisConfig;
use crate::errors::PipelineError;
use crate::synthesis::normalize::normalize_for_speech;
use crate::synthesis::provider::{SynthesisProvider, VoiceSettings};

/// Lifecycle of a synthesis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// One chunk of rendered audio. Indices increase monotonically from 0 and
/// exactly one chunk per job carries `is_last`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub index: u32,
    pub data: Vec<u8>,
    pub content_type: String,
    pub is_last: bool,
}

/// A request to render text as spoken audio.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub id: String,
    pub call_id: String,
    pub text: String,
    pub status: JobStatus,
    pub chunks: Vec<AudioChunk>,
    pub created_at: DateTime<Local>,
}

impl SynthesisJob {
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }
}

/// Split an audio buffer into ordered fixed-size chunks, flagging the last.
///
/// An empty buffer still yields one empty terminal chunk so consumers
/// always observe `is_last`.
pub fn chunk_audio(data: &[u8], content_type: &str, chunk_size: usize) -> Vec<AudioChunk> {
    let chunk_size = chunk_size.max(1);
    if data.is_empty() {
        return vec![AudioChunk {
            index: 0,
            data: Vec::new(),
            content_type: content_type.to_string(),
            is_last: true,
        }];
    }

    let total = data.len().div_ceil(chunk_size);
    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, piece)| AudioChunk {
            index: i as u32,
            data: piece.to_vec(),
            content_type: content_type.to_string(),
            is_last: i + 1 == total,
        })
        .collect()
}

/// Converts agent text into deliverable audio.
pub struct SynthesisStreamer {
    provider: Arc<dyn SynthesisProvider>,
    /// Per-call queues of undelivered chunks. Only ever touched under the
    /// map lock; access is scoped by call id so calls never contend.
    queues: Mutex<HashMap<String, VecDeque<AudioChunk>>>,
    timeout: Duration,
    chunk_size: usize,
    queue_depth: usize,
    pacing: Duration,
}

impl SynthesisStreamer {
    pub fn new(provider: Arc<dyn SynthesisProvider>, config: &SynthesisConfig) -> Arc<Self> {
        Arc::new(Self {
            provider,
            queues: Mutex::new(HashMap::new()),
            timeout: Duration::from_millis(config.timeout_ms),
            chunk_size: config.chunk_size,
            queue_depth: config.queue_depth,
            pacing: Duration::from_millis(config.pacing_ms),
        })
    }

    /// Render `text` for `call_id`.
    ///
    /// Returns a completed job with ordered chunks, or `SynthesisFailure`
    /// when the provider errors or times out — the caller degrades to a
    /// text-only response and the transcript turn is never blocked.
    pub async fn synthesize(
        &self,
        call_id: &str,
        text: &str,
        voice: &VoiceSettings,
    ) -> Result<SynthesisJob, PipelineError> {
        let normalized = normalize_for_speech(text);
        let mut job = SynthesisJob {
            id: uuid::Uuid::new_v4().to_string(),
            call_id: call_id.to_string(),
            text: normalized.clone(),
            status: JobStatus::Generating,
            chunks: Vec::new(),
            created_at: Local::now(),
        };

        let outcome = tokio::time::timeout(
            self.timeout,
            self.provider.synthesize(&normalized, voice),
        )
        .await;

        let audio = match outcome {
            Err(_) => {
                job.status = JobStatus::Failed;
                return Err(PipelineError::SynthesisFailure(format!(
                    "provider '{}' timed out after {}ms",
                    self.provider.name(),
                    self.timeout.as_millis()
                )));
            }
            Ok(Err(e)) => {
                job.status = JobStatus::Failed;
                return Err(PipelineError::SynthesisFailure(e.to_string()));
            }
            Ok(Ok(audio)) => audio,
        };

        job.chunks = chunk_audio(&audio.data, &audio.content_type, self.chunk_size);
        job.status = JobStatus::Completed;
        debug!(
            "Synthesis job {} for call {}: {} bytes in {} chunks",
            job.id,
            call_id,
            audio.data.len(),
            job.chunks.len()
        );
        Ok(job)
    }

    /// Push chunks onto a call's bounded queue. Returns how many of the
    /// oldest undelivered chunks were dropped to make room.
    pub async fn enqueue_chunks(&self, call_id: &str, chunks: Vec<AudioChunk>) -> usize {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(call_id.to_string()).or_default();

        let mut dropped = 0;
        for chunk in chunks {
            if queue.len() >= self.queue_depth {
                queue.pop_front();
                dropped += 1;
            }
            queue.push_back(chunk);
        }

        if dropped > 0 {
            let e = PipelineError::QueueOverflow {
                call_id: call_id.to_string(),
                dropped,
            };
            warn!("{}", e);
        }
        dropped
    }

    /// Pull the next undelivered chunk for a call.
    pub async fn pop_chunk(&self, call_id: &str) -> Option<AudioChunk> {
        self.queues
            .lock()
            .await
            .get_mut(call_id)
            .and_then(|q| q.pop_front())
    }

    pub async fn queue_len(&self, call_id: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(call_id)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Discard all undelivered audio for a call (call end).
    pub async fn discard_call(&self, call_id: &str) {
        self.queues.lock().await.remove(call_id);
    }

    /// Pacing delay between streamed chunks.
    pub fn pacing(&self) -> Duration {
        self.pacing
    }
}
