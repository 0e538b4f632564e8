//! External collaborator contracts: the speech engine and the frame source.
//!
//! The neural forward pass lives behind [`SpeechEngine`]; this crate only
//! schedules it. Implementations are synchronous and compute-bound; the
//! streaming controller moves calls onto a blocking thread so a slow pass
//! never starves the runtime.

use anyhow::Result;
use tokio::sync::mpsc;

/// Marker separating a detected language name from the transcript text in
/// engine output. Engines that do not detect language return plain text.
pub const LANGUAGE_DELIMITER: &str = "<|text|>";

/// Narrow contract over the underlying speech model.
pub trait SpeechEngine: Send + Sync {
    /// Transcribe an audio window. Output is either plain text or
    /// `"<language-name><DELIM><text>"`; see [`parse_engine_output`].
    fn transcribe(
        &self,
        audio: &[f32],
        sample_rate: u32,
        language_hint: Option<&str>,
        max_tokens: usize,
    ) -> Result<String>;

    /// Run the decoder in free generation mode. Used for
    /// translation-by-generation; `None` means the engine produced nothing.
    fn generate(&self, prompt: &str, max_tokens: usize) -> Result<Option<String>>;
}

/// Split engine output into `(detected_language, text)`.
pub fn parse_engine_output(raw: &str) -> (Option<String>, String) {
    match raw.split_once(LANGUAGE_DELIMITER) {
        Some((language, text)) => {
            let language = language.trim();
            let language = (!language.is_empty()).then(|| language.to_string());
            (language, text.trim().to_string())
        }
        None => (None, raw.trim().to_string()),
    }
}

/// A live, potentially-infinite source of fixed-size mono float frames at a
/// fixed sample rate.
pub trait FrameSource: Send + 'static {
    /// Begin capture and return the frame channel. May fail (permission
    /// denied, device unavailable).
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<Vec<f32>>>;

    /// Stop capture. Idempotent, always succeeds, and terminates the frame
    /// sequence by closing the channel.
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_output() {
        let (language, text) = parse_engine_output("hello world ");
        assert_eq!(language, None);
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_parse_language_tagged_output() {
        let (language, text) = parse_engine_output("German<|text|> guten tag");
        assert_eq!(language.as_deref(), Some("German"));
        assert_eq!(text, "guten tag");
    }

    #[test]
    fn test_parse_empty_language_falls_back() {
        let (language, text) = parse_engine_output("<|text|>hi");
        assert_eq!(language, None);
        assert_eq!(text, "hi");
    }
}
