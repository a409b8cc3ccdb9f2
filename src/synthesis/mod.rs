//! Speech synthesis streaming.
//!
//! Normalizes agent text for speech, adapts to the external synthesis
//! provider, and delivers audio either as a single buffer or as ordered
//! fixed-size chunks through bounded per-call queues.

mod normalize;
mod provider;
mod streamer;

pub use normalize::{expand_abbreviations, normalize_for_speech, split_sentences};
pub use provider::{HttpSynthesisProvider, SynthesisProvider, SynthesizedAudio, VoiceSettings};
pub use streamer::{chunk_audio, AudioChunk, JobStatus, SynthesisJob, SynthesisStreamer};
