//! Wire message envelope.
//!
//! JSON events exchanged with transport clients. Server events fan out to
//! every observer of a call; client events carry participant input and
//! channel membership. Tagged with a `type` field, payload keys camelCase.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::session::{Sentiment, Speaker, Turn};
use crate::synthesis::AudioChunk;

/// Pipeline status shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStatus {
    Listening,
    Processing,
    Speaking,
    Idle,
}

/// Events broadcast from the pipeline to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    TranscriptEntry {
        id: u64,
        speaker: Speaker,
        text: String,
        timestamp: DateTime<Local>,
        confidence: f64,
        sentiment: Sentiment,
    },
    /// Batch audio delivery: the whole utterance in one buffer.
    #[serde(rename_all = "camelCase")]
    AudioResponse {
        transcript_id: u64,
        text: String,
        audio_data: String,
        content_type: String,
    },
    /// Streaming audio delivery: ordered chunks, final chunk flagged.
    #[serde(rename_all = "camelCase")]
    AudioStream {
        transcript_id: u64,
        chunk_index: u32,
        audio_data: String,
        content_type: String,
        is_last: bool,
    },
    VoiceStatus { status: VoiceStatus },
    Error { message: String },
}

impl ServerEvent {
    /// Transcript event for a recorded turn.
    pub fn transcript_entry(turn: &Turn) -> Self {
        ServerEvent::TranscriptEntry {
            id: turn.seq,
            speaker: turn.speaker,
            text: turn.text.clone(),
            timestamp: turn.timestamp,
            confidence: turn.confidence,
            sentiment: turn.sentiment,
        }
    }

    /// Batch audio event for a completed synthesis job.
    pub fn audio_response(transcript_id: u64, text: &str, data: &[u8], content_type: &str) -> Self {
        ServerEvent::AudioResponse {
            transcript_id,
            text: text.to_string(),
            audio_data: BASE64.encode(data),
            content_type: content_type.to_string(),
        }
    }

    /// Streaming audio event for one chunk.
    pub fn audio_stream(transcript_id: u64, chunk: &AudioChunk) -> Self {
        ServerEvent::AudioStream {
            transcript_id,
            chunk_index: chunk.index,
            audio_data: BASE64.encode(&chunk.data),
            content_type: chunk.content_type.clone(),
            is_last: chunk.is_last,
        }
    }

    pub fn status(status: VoiceStatus) -> Self {
        ServerEvent::VoiceStatus { status }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

/// Events received from transport clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Attach this connection to a call's broadcast channel.
    #[serde(rename_all = "camelCase")]
    Join {
        call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<String>,
    },
    /// Transcribed participant input.
    UserMessage {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    EndCall,
    ResetCall,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn turn(seq: u64, speaker: Speaker, text: &str) -> Turn {
        Turn {
            seq,
            speaker,
            text: text.to_string(),
            timestamp: Local::now(),
            confidence: 0.92,
            sentiment: Sentiment::Neutral,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_transcript_entry_wire_shape() {
        let event = ServerEvent::transcript_entry(&turn(3, Speaker::Participant, "hello"));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "transcript_entry");
        assert_eq!(json["id"], 3);
        assert_eq!(json["speaker"], "participant");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["confidence"], 0.92);
        assert_eq!(json["sentiment"], "neutral");
    }

    #[test]
    fn test_audio_stream_wire_shape() {
        let chunk = AudioChunk {
            index: 2,
            data: vec![1, 2, 3],
            content_type: "audio/mpeg".to_string(),
            is_last: true,
        };
        let json = serde_json::to_value(ServerEvent::audio_stream(7, &chunk)).unwrap();

        assert_eq!(json["type"], "audio_stream");
        assert_eq!(json["transcriptId"], 7);
        assert_eq!(json["chunkIndex"], 2);
        assert_eq!(json["isLast"], true);
        assert_eq!(json["audioData"], BASE64.encode([1u8, 2, 3]));
    }

    #[test]
    fn test_voice_status_wire_shape() {
        let json = serde_json::to_value(ServerEvent::status(VoiceStatus::Speaking)).unwrap();
        assert_eq!(json["type"], "voice_status");
        assert_eq!(json["status"], "speaking");
    }

    #[test]
    fn test_transcript_round_trip() {
        let turns = vec![
            turn(0, Speaker::Participant, "Hello"),
            turn(1, Speaker::Agent, "Hi! How can I help?"),
            turn(2, Speaker::Participant, "What are your hours?"),
        ];

        let wire: Vec<String> = turns
            .iter()
            .map(|t| serde_json::to_string(&ServerEvent::transcript_entry(t)).unwrap())
            .collect();

        let mut reconstructed: Vec<(Speaker, String)> = Vec::new();
        for line in &wire {
            match serde_json::from_str::<ServerEvent>(line).unwrap() {
                ServerEvent::TranscriptEntry { speaker, text, .. } => {
                    reconstructed.push((speaker, text))
                }
                other => panic!("unexpected event {other:?}"),
            }
        }

        let original: Vec<(Speaker, String)> =
            turns.iter().map(|t| (t.speaker, t.text.clone())).collect();
        assert_eq!(reconstructed, original);
    }

    #[test]
    fn test_client_join_parses() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join","callId":"c1"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Join {
                call_id: "c1".to_string(),
                participant: None
            }
        );
    }

    #[test]
    fn test_client_user_message_parses() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"user_message","text":"hi","confidence":0.8}"#)
                .unwrap();
        match event {
            ClientEvent::UserMessage { text, confidence } => {
                assert_eq!(text, "hi");
                assert_eq!(confidence, Some(0.8));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_client_end_call_parses() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"end_call"}"#).unwrap();
        assert_eq!(event, ClientEvent::EndCall);
    }
}
