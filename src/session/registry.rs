//! Session registry: ownership and lifecycle of per-call state.
//!
//! The registry is an explicit object with injected dependencies (scheduler,
//! optional store) — no module-level singletons. All access is scoped by
//! call id; the session map lock is held only across synchronous mutation,
//! never across provider awaits.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::PipelineError;
use crate::sched::{Scheduler, TaskHandle};
use crate::session::types::{
    CallSession, Sentiment, SessionOptions, SessionState, Speaker, Turn,
};
use crate::store::TranscriptStore;

/// Final metrics emitted when a session is torn down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub call_id: String,
    pub participant: String,
    pub turn_count: usize,
    pub response_count: u64,
    pub avg_response_ms: f64,
    pub escalation_requested: bool,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
}

/// Owns all live call sessions and their inactivity timers.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, CallSession>>,
    timers: Mutex<HashMap<String, TaskHandle>>,
    scheduler: Scheduler,
    inactivity_timeout: Duration,
    store: Option<Arc<TranscriptStore>>,
    /// Handed to inactivity timers so a dropped registry never keeps firing.
    weak_self: Weak<SessionRegistry>,
}

impl SessionRegistry {
    pub fn new(
        scheduler: Scheduler,
        inactivity_timeout: Duration,
        store: Option<Arc<TranscriptStore>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            sessions: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            scheduler,
            inactivity_timeout,
            store,
            weak_self: weak.clone(),
        })
    }

    /// Create a session for `call_id` if absent; re-initializing an
    /// existing id resets it. Arms the inactivity timer either way.
    pub async fn init_session(&self, call_id: &str, options: SessionOptions) {
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(call_id) {
                Some(existing) => {
                    debug!("Re-initializing session {}, resetting state", call_id);
                    existing.reset();
                }
                None => {
                    info!("Session {} started", call_id);
                    sessions.insert(call_id.to_string(), CallSession::new(call_id, options));
                }
            }
        }
        self.arm_inactivity_timer(call_id).await;
    }

    /// Append a turn with the next sequence number, update last-activity,
    /// and re-arm the inactivity timer.
    pub async fn record_turn(
        &self,
        call_id: &str,
        speaker: Speaker,
        text: &str,
        confidence: f64,
        sentiment: Sentiment,
        metadata: HashMap<String, Value>,
    ) -> Result<Turn, PipelineError> {
        let turn = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(call_id)
                .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
            session.append_turn(speaker, text, confidence, sentiment, metadata)
        };

        if let Some(store) = &self.store {
            let store = store.clone();
            let call_id = call_id.to_string();
            let persisted = turn.clone();
            tokio::spawn(async move {
                store.store_turn(&call_id, &persisted);
            });
        }

        self.arm_inactivity_timer(call_id).await;
        Ok(turn)
    }

    /// Tear the session down: cancel timers, emit final metrics, remove it.
    /// Idempotent — ending an unknown call returns `None`.
    pub async fn end_session(&self, call_id: &str) -> Option<SessionSummary> {
        if let Some(handle) = self.timers.lock().await.remove(call_id) {
            handle.cancel();
        }

        let session = self.sessions.lock().await.remove(call_id)?;
        let summary = SessionSummary {
            call_id: session.id.clone(),
            participant: session.participant.clone(),
            turn_count: session.turns.len(),
            response_count: session.metrics.response_count,
            avg_response_ms: session.metrics.avg_response_ms,
            escalation_requested: session.state.escalation_requested(),
            started_at: session.started_at,
            ended_at: session.ended_at.unwrap_or_else(Local::now),
        };

        info!(
            "Session {} ended: {} turns, {} responses, avg {:.0}ms",
            call_id, summary.turn_count, summary.response_count, summary.avg_response_ms
        );

        if let Some(store) = &self.store {
            let store = store.clone();
            let persisted = summary.clone();
            tokio::spawn(async move {
                store.store_summary(&persisted);
            });
        }

        Some(summary)
    }

    /// Clear history and state while preserving the call id, for
    /// participants that explicitly restart context.
    pub async fn reset_session(&self, call_id: &str) -> Result<(), PipelineError> {
        {
            let mut sessions = self.sessions.lock().await;
            let session = sessions
                .get_mut(call_id)
                .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
            session.reset();
        }
        self.arm_inactivity_timer(call_id).await;
        Ok(())
    }

    /// Stamp the session end time when the last observer disconnects.
    /// The session itself stays alive until explicit end or inactivity.
    pub async fn finalize_end_time(&self, call_id: &str) {
        if let Some(session) = self.sessions.lock().await.get_mut(call_id) {
            session.ended_at = Some(Local::now());
            debug!("Session {} end time finalized (observers gone)", call_id);
        }
    }

    pub async fn contains(&self, call_id: &str) -> bool {
        self.sessions.lock().await.contains_key(call_id)
    }

    /// Current epoch of a call, or `None` if the call is gone. In-flight
    /// work captures this before suspending and drops its result when the
    /// epoch no longer matches.
    pub async fn epoch_of(&self, call_id: &str) -> Option<u64> {
        self.sessions.lock().await.get(call_id).map(|s| s.epoch)
    }

    /// Clone of the full session, for transcript export and status.
    pub async fn snapshot(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.lock().await.get(call_id).cloned()
    }

    pub async fn active_calls(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Conversation context for the reasoning provider: last `window`
    /// turns, first turn always retained.
    pub async fn context(&self, call_id: &str, window: usize) -> Result<Vec<Turn>, PipelineError> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(call_id)
            .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
        Ok(session.context_window(window))
    }

    pub async fn state_of(&self, call_id: &str) -> Result<SessionState, PipelineError> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(call_id)
            .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
        Ok(session.state.clone())
    }

    /// Apply a state mutation under the session lock. Used by the turn
    /// engine — sessions are mutated only on the registry's behalf.
    pub async fn update_state<F>(&self, call_id: &str, f: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(call_id)
            .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
        f(&mut session.state);
        Ok(())
    }

    /// Fold a response time into the session's rolling average.
    pub async fn record_response_time(
        &self,
        call_id: &str,
        elapsed_ms: f64,
    ) -> Result<(), PipelineError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(call_id)
            .ok_or_else(|| PipelineError::SessionNotFound(call_id.to_string()))?;
        session.metrics.record_response(elapsed_ms);
        Ok(())
    }

    /// (Re-)arm the inactivity timer for a call. The timer holds only a
    /// weak reference so a dropped registry never keeps firing.
    async fn arm_inactivity_timer(&self, call_id: &str) {
        let weak = self.weak_self.clone();
        let cid = call_id.to_string();
        let timeout = self.inactivity_timeout;

        let handle = self.scheduler.schedule_once(timeout, async move {
            if let Some(registry) = weak.upgrade() {
                info!(
                    "Session {} inactive for {:?}, ending automatically",
                    cid, timeout
                );
                registry.end_session(&cid).await;
            }
        });

        if let Some(old) = self.timers.lock().await.insert(call_id.to_string(), handle) {
            old.cancel();
        }
    }
}
