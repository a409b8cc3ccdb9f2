//! Latency instrumentation for the conversation cycle.
//!
//! Measures the four pipeline stages of each perceive→reason→respond→speak
//! cycle, compares the total against the end-to-end budget, and keeps a
//! rolling window of completed cycles for aggregate reporting.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Measured pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SpeechToText,
    AiProcessing,
    TextToSpeech,
    AudioTransmission,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SpeechToText => "speech_to_text",
            Stage::AiProcessing => "ai_processing",
            Stage::TextToSpeech => "text_to_speech",
            Stage::AudioTransmission => "audio_transmission",
        }
    }
}

/// One completed conversation cycle.
#[derive(Debug, Clone)]
pub struct LatencyCycle {
    pub call_id: String,
    pub started_at: DateTime<Local>,
    pub stages: HashMap<Stage, Duration>,
    pub total: Duration,
    pub completed: bool,
    /// True when the cycle finished within the budget.
    pub is_optimal: bool,
    /// Stage(s) with the highest duration when the budget was breached.
    pub slowest: Vec<Stage>,
}

/// Aggregates over the rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyReport {
    pub cycles: usize,
    pub min_ms: u64,
    pub avg_ms: u64,
    pub max_ms: u64,
    /// Share of cycles that met the budget, 0.0..=1.0.
    pub optimal_ratio: f64,
}

struct ActiveCycle {
    started_at: DateTime<Local>,
    started: Instant,
    open: HashMap<Stage, Instant>,
    done: HashMap<Stage, Duration>,
}

/// Tracks stage timings per call and the rolling cycle window.
pub struct LatencyTracker {
    budget: Duration,
    window: usize,
    active: Mutex<HashMap<String, ActiveCycle>>,
    history: Mutex<VecDeque<LatencyCycle>>,
}

impl LatencyTracker {
    pub fn new(budget: Duration, window: usize) -> Self {
        Self {
            budget,
            window,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Start timing a stage; implicitly opens the cycle on first use.
    pub fn start_timing(&self, call_id: &str, stage: Stage) {
        let mut active = self.active.lock().expect("active lock");
        let cycle = active.entry(call_id.to_string()).or_insert_with(|| ActiveCycle {
            started_at: Local::now(),
            started: Instant::now(),
            open: HashMap::new(),
            done: HashMap::new(),
        });
        cycle.open.insert(stage, Instant::now());
    }

    /// Stop timing a stage and record its duration.
    pub fn end_timing(&self, call_id: &str, stage: Stage) -> Option<Duration> {
        let mut active = self.active.lock().expect("active lock");
        let cycle = active.get_mut(call_id)?;
        let started = cycle.open.remove(&stage)?;
        let elapsed = started.elapsed();
        cycle.done.insert(stage, elapsed);
        debug!(
            "Call {} stage {} took {}ms",
            call_id,
            stage.as_str(),
            elapsed.as_millis()
        );
        Some(elapsed)
    }

    /// Close the cycle for a call: total the stages, check the budget,
    /// attribute the breach, and push into the rolling window.
    pub fn complete_cycle(&self, call_id: &str) -> Option<LatencyCycle> {
        let finished = self.active.lock().expect("active lock").remove(call_id)?;

        let total: Duration = finished.done.values().sum();
        let is_optimal = total <= self.budget;

        let slowest = if is_optimal {
            Vec::new()
        } else {
            let max = finished.done.values().max().copied().unwrap_or_default();
            finished
                .done
                .iter()
                .filter(|(_, d)| **d == max)
                .map(|(s, _)| *s)
                .collect()
        };

        let cycle = LatencyCycle {
            call_id: call_id.to_string(),
            started_at: finished.started_at,
            stages: finished.done,
            total,
            completed: true,
            is_optimal,
            slowest,
        };

        if !is_optimal {
            let names: Vec<&str> = cycle.slowest.iter().map(|s| s.as_str()).collect();
            warn!(
                "Call {} cycle breached the {}ms budget: {}ms total, slowest stage(s): {}",
                call_id,
                self.budget.as_millis(),
                total.as_millis(),
                names.join(", ")
            );
        }

        let mut history = self.history.lock().expect("history lock");
        history.push_back(cycle.clone());
        while history.len() > self.window {
            history.pop_front();
        }

        Some(cycle)
    }

    /// Drop any in-progress timings for a call (call end mid-cycle).
    pub fn discard_call(&self, call_id: &str) {
        self.active.lock().expect("active lock").remove(call_id);
    }

    /// Aggregate report over the rolling window.
    pub fn report(&self) -> LatencyReport {
        let history = self.history.lock().expect("history lock");
        if history.is_empty() {
            return LatencyReport {
                cycles: 0,
                min_ms: 0,
                avg_ms: 0,
                max_ms: 0,
                optimal_ratio: 1.0,
            };
        }

        let totals: Vec<u64> = history.iter().map(|c| c.total.as_millis() as u64).collect();
        let optimal = history.iter().filter(|c| c.is_optimal).count();

        LatencyReport {
            cycles: history.len(),
            min_ms: *totals.iter().min().expect("non-empty"),
            avg_ms: totals.iter().sum::<u64>() / totals.len() as u64,
            max_ms: *totals.iter().max().expect("non-empty"),
            optimal_ratio: optimal as f64 / history.len() as f64,
        }
    }
}
