//! Wire format for the cloud realtime transcription backend.
//!
//! Outbound messages are plain JSON text frames; inbound decoding is
//! deliberately tolerant so minor protocol drift (renamed events, extra
//! nesting) degrades to ignored messages instead of errors.

use crate::settings::RemoteRealtimeSettings;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};

/// Protocol-version header sent on the initial upgrade request.
pub const PROTOCOL_VERSION_HEADER: &str = "OpenAI-Beta";
pub const PROTOCOL_VERSION: &str = "realtime=v1";

/// Nested objects deeper than this are not searched for text fields.
const MAX_SEARCH_DEPTH: usize = 4;

/// Encode samples as 16-bit little-endian PCM: clamp to [-1, 1], scale to
/// the full signed 16-bit range.
pub fn encode_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32);
        out.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    out
}

/// Session configuration sent once after connecting. Config is fixed for
/// the session lifetime.
pub fn session_update(settings: &RemoteRealtimeSettings) -> Value {
    let turn_detection = if settings.server_vad {
        json!({
            "type": "server_vad",
            "threshold": settings.server_vad_threshold,
            "silence_duration_ms": settings.server_vad_silence_ms,
        })
    } else {
        Value::Null
    };

    json!({
        "type": "session.update",
        "session": {
            "modalities": ["text"],
            "input_audio_format": "pcm",
            "sample_rate": settings.sample_rate,
            "input_audio_transcription": {
                "language": settings.language,
            },
            "turn_detection": turn_detection,
        }
    })
}

pub fn append_message(samples: &[f32]) -> Value {
    json!({
        "type": "input_audio_buffer.append",
        "audio": BASE64.encode(encode_pcm16le(samples)),
    })
}

pub fn commit_message() -> Value {
    json!({ "type": "input_audio_buffer.commit" })
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Incremental transcript delta.
    Partial(String),
    /// Completed transcript for the current server-VAD turn.
    Final(String),
    /// Declared server error.
    Error(String),
    /// Anything unrecognized. Not an error: the protocol may grow shapes
    /// we do not know about.
    Ignored,
}

/// Classify a raw text frame from the server.
///
/// The kind comes from the declared `type` field; the payload text comes
/// from a depth-limited recursive search over known field names, so nesting
/// changes survive. Partial vs final is decided by substring matching on the
/// type.
pub fn classify_server_message(raw: &str) -> ServerMessage {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return ServerMessage::Ignored,
    };

    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if message_type.contains("error") || value.get("error").is_some() {
        let description = find_text_field(&value, &["message", "error", "reason"], 0)
            .unwrap_or_else(|| "unknown server error".to_string());
        return ServerMessage::Error(description);
    }

    if message_type.contains("delta") {
        return match find_text_field(&value, &["delta", "transcript", "text"], 0) {
            Some(text) => ServerMessage::Partial(text),
            None => ServerMessage::Ignored,
        };
    }

    if message_type.contains("completed")
        || message_type.contains("done")
        || message_type.contains("final")
    {
        return match find_text_field(&value, &["transcript", "text", "delta"], 0) {
            Some(text) => ServerMessage::Final(text),
            None => ServerMessage::Ignored,
        };
    }

    ServerMessage::Ignored
}

/// Breadth-first-ish search: direct fields at this level win, then nested
/// objects and arrays are searched up to [`MAX_SEARCH_DEPTH`].
fn find_text_field(value: &Value, fields: &[&str], depth: usize) -> Option<String> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }

    match value {
        Value::Object(map) => {
            for &field in fields {
                if let Some(text) = map.get(field).and_then(Value::as_str) {
                    return Some(text.to_string());
                }
            }
            map.values()
                .find_map(|nested| find_text_field(nested, fields, depth + 1))
        }
        Value::Array(items) => items
            .iter()
            .find_map(|nested| find_text_field(nested, fields, depth + 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16le_clamps_to_full_range() {
        let bytes = encode_pcm16le(&[-1.5, 0.0, 1.5]);
        let decoded: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(decoded, vec![i16::MIN, 0, i16::MAX]);
    }

    #[test]
    fn test_pcm16le_is_little_endian() {
        let bytes = encode_pcm16le(&[1.0]);
        assert_eq!(bytes, vec![0xFF, 0x7F]);
    }

    #[test]
    fn test_session_update_shape() {
        let settings = RemoteRealtimeSettings {
            endpoint: "wss://example.com/v1/realtime".to_string(),
            api_key: "sk-0123456789abcdefghij".to_string(),
            language: Some("en".to_string()),
            sample_rate: 16000,
            server_vad: true,
            server_vad_threshold: 0.5,
            server_vad_silence_ms: 500,
        };
        let message = session_update(&settings);
        assert_eq!(message["type"], "session.update");
        assert_eq!(message["session"]["input_audio_format"], "pcm");
        assert_eq!(message["session"]["turn_detection"]["type"], "server_vad");

        let mut no_vad = settings;
        no_vad.server_vad = false;
        assert!(session_update(&no_vad)["session"]["turn_detection"].is_null());
    }

    #[test]
    fn test_append_message_round_trips_audio() {
        let message = append_message(&[0.0, 0.5]);
        assert_eq!(message["type"], "input_audio_buffer.append");
        let decoded = BASE64
            .decode(message["audio"].as_str().unwrap())
            .unwrap();
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn test_classify_delta_as_partial() {
        let message =
            classify_server_message(r#"{"type":"response.audio_transcript.delta","delta":"hello"}"#);
        assert_eq!(message, ServerMessage::Partial("hello".to_string()));
    }

    #[test]
    fn test_classify_completed_with_nested_transcript() {
        let message = classify_server_message(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item":{"content":{"transcript":"all done"}}}"#,
        );
        assert_eq!(message, ServerMessage::Final("all done".to_string()));
    }

    #[test]
    fn test_classify_declared_error() {
        let message = classify_server_message(r#"{"type":"error","error":{"message":"x"}}"#);
        assert_eq!(message, ServerMessage::Error("x".to_string()));
    }

    #[test]
    fn test_unknown_shapes_are_ignored() {
        assert_eq!(
            classify_server_message(r#"{"type":"session.created"}"#),
            ServerMessage::Ignored
        );
        assert_eq!(classify_server_message("not json"), ServerMessage::Ignored);
        assert_eq!(
            classify_server_message(r#"{"type":"response.audio_transcript.delta"}"#),
            ServerMessage::Ignored
        );
    }
}
