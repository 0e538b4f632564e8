//! Realtime speech-to-text and speech-translation streaming engine.
//!
//! Given a live, unbounded audio stream this crate produces incremental
//! partial transcripts, irrevocably commits stabilized segments, and
//! attaches translations to each committed segment, without ever stalling
//! audio capture while inference runs. The neural forward pass itself lives
//! behind the [`SpeechEngine`] trait; platform audio capture lives behind
//! [`FrameSource`].

pub mod audio_toolkit;
mod error;
mod events;
pub mod realtime_api;
mod settings;
mod speech_engine;
mod stabilizer;
pub mod streaming;
pub mod translation;

pub use audio_toolkit::{EnergyVad, RingBuffer, VadEvent};
pub use error::StartError;
pub use events::{EventKind, TranscriptionEvent};
pub use realtime_api::RemoteRealtimeClient;
pub use settings::{EngineSettings, RemoteRealtimeSettings, TranslationStrategy, VadSettings};
pub use speech_engine::{parse_engine_output, FrameSource, SpeechEngine, LANGUAGE_DELIMITER};
pub use stabilizer::{StabilizerUpdate, TranscriptStabilizer};
pub use streaming::{RealtimeEngine, StreamingSession};
pub use translation::{CloudTranslationProvider, TranslationIntegration, TranslationProvider};
