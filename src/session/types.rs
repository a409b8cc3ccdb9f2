//! Core conversation data types.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Participant,
    Agent,
}

/// Coarse sentiment of an utterance, used by the escalation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Classified intent of a participant utterance.
///
/// Variants are ordered by classification priority — escalation requests
/// are checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    EscalationRequest,
    Closing,
    Greeting,
    HelpRequest,
    GeneralInquiry,
}

/// Conversation phase state machine value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationPhase {
    Greeting,
    Inquiry,
    Resolution,
    Escalation,
    Closing,
}

/// One utterance in a session's history.
///
/// Immutable once appended; `seq` is assigned by the registry and is
/// gapless and strictly increasing within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub seq: u64,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Local>,
    pub confidence: f64,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Mutable conversation state attached to a session.
///
/// `escalation_requested` is private so monotonicity holds by
/// construction: there is a setter, no clearer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: ConversationPhase,
    pub intent: Option<Intent>,
    escalation_requested: bool,
    negative_run: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: ConversationPhase::Greeting,
            intent: None,
            escalation_requested: false,
            negative_run: 0,
        }
    }
}

impl SessionState {
    pub fn escalation_requested(&self) -> bool {
        self.escalation_requested
    }

    /// Set the escalation flag. Never reverts.
    pub fn request_escalation(&mut self) {
        self.escalation_requested = true;
    }

    /// Track a participant sentiment observation. A run of `threshold`
    /// consecutive negative turns requests escalation; any non-negative
    /// turn resets the run. Returns true if this observation tripped the
    /// threshold.
    pub fn note_sentiment(&mut self, sentiment: Sentiment, threshold: u32) -> bool {
        if sentiment == Sentiment::Negative {
            self.negative_run += 1;
            if self.negative_run >= threshold && !self.escalation_requested {
                self.escalation_requested = true;
                return true;
            }
        } else {
            self.negative_run = 0;
        }
        false
    }

    pub fn negative_run(&self) -> u32 {
        self.negative_run
    }
}

/// Rolling response metrics for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub response_count: u64,
    pub avg_response_ms: f64,
}

impl SessionMetrics {
    /// Fold one response time into the rolling average.
    pub fn record_response(&mut self, elapsed_ms: f64) {
        self.response_count += 1;
        self.avg_response_ms += (elapsed_ms - self.avg_response_ms) / self.response_count as f64;
    }
}

/// Options for initializing a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Participant identity (caller number, widget visitor id, ...).
    pub participant: Option<String>,
}

/// One live (or simulated) conversation.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: String,
    pub participant: String,
    pub started_at: DateTime<Local>,
    pub last_activity: DateTime<Local>,
    /// Set when the last observer leaves; distinct from teardown.
    pub ended_at: Option<DateTime<Local>>,
    pub turns: Vec<Turn>,
    pub state: SessionState,
    pub metrics: SessionMetrics,
    /// Bumped on reset; in-flight generation results from a previous epoch
    /// are dropped.
    pub epoch: u64,
}

impl CallSession {
    pub fn new(id: &str, options: SessionOptions) -> Self {
        let now = Local::now();
        Self {
            id: id.to_string(),
            participant: options.participant.unwrap_or_else(|| "anonymous".to_string()),
            started_at: now,
            last_activity: now,
            ended_at: None,
            turns: Vec::new(),
            state: SessionState::default(),
            metrics: SessionMetrics::default(),
            epoch: 0,
        }
    }

    /// Append a turn with the next sequence number and return a clone of it.
    pub fn append_turn(
        &mut self,
        speaker: Speaker,
        text: &str,
        confidence: f64,
        sentiment: Sentiment,
        metadata: HashMap<String, Value>,
    ) -> Turn {
        let turn = Turn {
            seq: self.turns.len() as u64,
            speaker,
            text: text.to_string(),
            timestamp: Local::now(),
            confidence,
            sentiment,
            metadata,
        };
        self.turns.push(turn.clone());
        self.last_activity = Local::now();
        turn
    }

    /// The conversation context sent to the reasoning provider: the last
    /// `window` turns, always retaining the first turn for orientation.
    pub fn context_window(&self, window: usize) -> Vec<Turn> {
        if window == 0 {
            return Vec::new();
        }
        if self.turns.len() <= window {
            return self.turns.clone();
        }
        let tail_start = self.turns.len() - (window - 1).min(self.turns.len());
        let mut context = Vec::with_capacity(window);
        context.push(self.turns[0].clone());
        for turn in &self.turns[tail_start.max(1)..] {
            context.push(turn.clone());
        }
        context
    }

    /// Clear history and state, keeping the call id. Bumps the epoch so
    /// in-flight generation results for the old context are discarded.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.state = SessionState::default();
        self.metrics = SessionMetrics::default();
        self.last_activity = Local::now();
        self.ended_at = None;
        self.epoch += 1;
    }
}
