//! Event stream payloads emitted during a streaming session.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of event emitted by a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Unstable, in-progress hypothesis for the current utterance.
    Partial,
    /// Text promoted out of pending state; never retracted.
    Final,
    /// Translation attached to a previously committed segment.
    Translation,
    /// Diagnostics: timing, audio levels, protocol errors.
    Metrics,
}

/// A single event in a session's ordered event stream.
///
/// Events for one session are causally ordered: a `Translation` for a
/// segment is emitted only after that segment's `Final`.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionEvent {
    pub kind: EventKind,
    pub transcript: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    pub is_stable: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TranscriptionEvent {
    fn new(kind: EventKind, transcript: String, is_stable: bool) -> Self {
        Self {
            kind,
            transcript,
            translation: None,
            is_stable,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Partial hypothesis: committed text plus the volatile pending suffix.
    pub fn partial(transcript: impl Into<String>) -> Self {
        Self::new(EventKind::Partial, transcript.into(), false)
    }

    /// Newly committed segment. Committed text is never retracted.
    pub fn committed(transcript: impl Into<String>) -> Self {
        Self::new(EventKind::Final, transcript.into(), true)
    }

    /// Translation for an already-committed segment.
    pub fn translation(transcript: impl Into<String>, translation: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Translation, transcript.into(), true);
        event.translation = Some(translation.into());
        event
    }

    /// Diagnostic event carrying structured metadata.
    pub fn metrics(metadata: serde_json::Value) -> Self {
        let mut event = Self::new(EventKind::Metrics, String::new(), false);
        event.metadata = Some(metadata);
        event
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
