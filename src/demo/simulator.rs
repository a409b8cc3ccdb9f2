//! Demo simulator: replays scripted conversations through the live
//! pipeline contracts.
//!
//! Turns go through the same `record_turn`/`broadcast` path as real calls,
//! with randomized-but-bounded inter-turn delays — agent turns land faster
//! than participant turns. The returned handle cancels the remainder of the
//! script immediately.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::demo::scripts;
use crate::errors::PipelineError;
use crate::pipeline::ConversationPipeline;
use crate::sched::{Scheduler, TaskHandle};
use crate::session::{SessionOptions, Speaker};
use crate::transport::{ServerEvent, VoiceStatus};

/// Participant "thinking time" bounds in milliseconds.
const PARTICIPANT_DELAY_MS: (u64, u64) = (800, 1600);
/// Agent response bounds — noticeably faster than the participant.
const AGENT_DELAY_MS: (u64, u64) = (250, 700);

/// Replays scripted sessions against a pipeline.
pub struct DemoSimulator {
    pipeline: Arc<ConversationPipeline>,
    scheduler: Scheduler,
}

impl DemoSimulator {
    pub fn new(pipeline: Arc<ConversationPipeline>) -> Self {
        Self {
            pipeline,
            scheduler: Scheduler::new(),
        }
    }

    /// Start replaying `template_id` as call `call_id`.
    ///
    /// Returns a cancellable handle; cancelling stops all scheduled future
    /// turns immediately. Fails with `InvalidInput` for unknown templates.
    pub fn start_scripted_session(
        &self,
        call_id: &str,
        template_id: &str,
    ) -> Result<TaskHandle, PipelineError> {
        let template = scripts::template(template_id).ok_or_else(|| {
            PipelineError::InvalidInput(format!("unknown demo template: {template_id}"))
        })?;

        info!(
            "Starting scripted session {} ({}, {} turns)",
            call_id,
            template.title,
            template.lines.len()
        );

        let pipeline = self.pipeline.clone();
        let call_id = call_id.to_string();
        let lines = template.lines;

        let handle = self.scheduler.spawn_cancellable(move |token| async move {
            pipeline
                .registry()
                .init_session(
                    &call_id,
                    SessionOptions {
                        participant: Some("demo".to_string()),
                    },
                )
                .await;

            for line in lines {
                let delay = jittered_delay(line.speaker);
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Scripted session {} cancelled", call_id);
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                if token.is_cancelled() {
                    return;
                }

                if let Err(e) = pipeline.inject_turn(&call_id, line.speaker, line.text).await {
                    warn!("Scripted session {} stopped: {}", call_id, e);
                    return;
                }
            }

            pipeline
                .hub()
                .broadcast(&call_id, &ServerEvent::status(VoiceStatus::Idle))
                .await;
            info!("Scripted session {} finished", call_id);
        });

        Ok(handle)
    }
}

/// Bounded random inter-turn delay for a speaker.
fn jittered_delay(speaker: Speaker) -> Duration {
    let (lo, hi) = match speaker {
        Speaker::Participant => PARTICIPANT_DELAY_MS,
        Speaker::Agent => AGENT_DELAY_MS,
    };
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_are_bounded_and_agent_faster() {
        for _ in 0..50 {
            let p = jittered_delay(Speaker::Participant);
            let a = jittered_delay(Speaker::Agent);
            assert!(p >= Duration::from_millis(PARTICIPANT_DELAY_MS.0));
            assert!(p <= Duration::from_millis(PARTICIPANT_DELAY_MS.1));
            assert!(a >= Duration::from_millis(AGENT_DELAY_MS.0));
            assert!(a <= Duration::from_millis(AGENT_DELAY_MS.1));
        }
        // The fastest participant turn is still slower than the slowest
        // agent turn.
        assert!(PARTICIPANT_DELAY_MS.0 > AGENT_DELAY_MS.1);
    }
}
