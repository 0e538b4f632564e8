//! Translation of committed transcript segments.
//!
//! Translation is best-effort: it runs after a segment is committed, races
//! against a bounded timeout, and never blocks or fails transcription. Two
//! strategies exist: re-running the speech engine's decoder in generation
//! mode over the whole utterance and diffing the output, or calling an
//! external text-translation provider on the committed segment directly.

mod provider;

pub use provider::{CloudTranslationProvider, TranslationProvider};

use crate::settings::{EngineSettings, TranslationStrategy};
use crate::speech_engine::SpeechEngine;
use crate::stabilizer::longest_overlap;
use anyhow::{anyhow, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct TranslationIntegration {
    strategy: TranslationStrategy,
    target_language: String,
    source_language: Option<String>,
    timeout: Duration,
    max_tokens: usize,
    engine: Arc<dyn SpeechEngine>,
    provider: Option<Arc<dyn TranslationProvider>>,
    /// Exact source text -> translation. No eviction within a session.
    cache: Mutex<HashMap<String, String>>,
    /// Last full-utterance translation emitted (generation strategy only).
    last_emitted: Mutex<String>,
}

impl TranslationIntegration {
    pub fn new(
        settings: &EngineSettings,
        engine: Arc<dyn SpeechEngine>,
        provider: Option<Arc<dyn TranslationProvider>>,
    ) -> Self {
        Self {
            strategy: settings.translation_strategy,
            target_language: settings.target_language.clone(),
            source_language: settings.source_language.clone(),
            timeout: Duration::from_millis(settings.translation_timeout_ms),
            max_tokens: settings.max_tokens,
            engine,
            provider,
            cache: Mutex::new(HashMap::new()),
            last_emitted: Mutex::new(String::new()),
        }
    }

    /// Translate a newly committed segment. Returns the translation text to
    /// emit, or None when the attempt timed out, failed, or produced
    /// nothing; the caller treats all three the same way.
    pub async fn translate_segment(&self, segment: &str, full_committed: &str) -> Option<String> {
        let result = match self.strategy {
            TranslationStrategy::Provider => self.translate_via_provider(segment).await,
            TranslationStrategy::SpeechEngine => self.translate_via_engine(full_committed).await,
        };

        match result {
            Ok(translation) => translation.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                warn!("Translation failed for segment {:?}: {}", segment, e);
                None
            }
        }
    }

    /// Clear per-session state (cache, diff baseline).
    pub fn reset(&self) {
        self.cache.lock().unwrap().clear();
        self.last_emitted.lock().unwrap().clear();
    }

    /// A new utterance begins: the generation-diff baseline restarts, but
    /// the cache keeps its session lifetime.
    pub fn start_new_utterance(&self) {
        self.last_emitted.lock().unwrap().clear();
    }

    async fn translate_via_provider(&self, segment: &str) -> Result<Option<String>> {
        if let Some(hit) = self.cache.lock().unwrap().get(segment) {
            debug!("Translation cache hit for {:?}", segment);
            return Ok(Some(hit.clone()));
        }

        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| anyhow!("no translation provider configured"))?;

        // Race the provider against the timeout; the loser is cancelled by
        // being dropped.
        let translation = tokio::select! {
            result = provider.translate(
                segment,
                self.source_language.as_deref(),
                &self.target_language,
            ) => result?,
            _ = tokio::time::sleep(self.timeout) => {
                debug!("Translation timed out after {:?}", self.timeout);
                return Ok(None);
            }
        };

        self.cache
            .lock()
            .unwrap()
            .insert(segment.to_string(), translation.clone());
        Ok(Some(translation))
    }

    async fn translate_via_engine(&self, full_committed: &str) -> Result<Option<String>> {
        if full_committed.trim().is_empty() {
            return Ok(None);
        }

        let full_translation = match self.cache.lock().unwrap().get(full_committed) {
            Some(hit) => Some(hit.clone()),
            None => None,
        };

        let full_translation = match full_translation {
            Some(cached) => cached,
            None => {
                let engine = self.engine.clone();
                let prompt = provider::build_translation_prompt(
                    full_committed,
                    self.source_language.as_deref(),
                    &self.target_language,
                );
                let max_tokens = self.max_tokens;

                let generation = tokio::task::spawn_blocking(move || {
                    engine.generate(&prompt, max_tokens)
                });

                let generated = match tokio::time::timeout(self.timeout, generation).await {
                    Ok(joined) => joined.map_err(|e| anyhow!("generation task failed: {}", e))??,
                    Err(_) => {
                        debug!("Generation translation timed out after {:?}", self.timeout);
                        return Ok(None);
                    }
                };

                let Some(full) = generated else {
                    return Ok(None);
                };
                let full = full.trim().to_string();
                self.cache
                    .lock()
                    .unwrap()
                    .insert(full_committed.to_string(), full.clone());
                full
            }
        };

        // Emit only what is new relative to the last emitted translation,
        // using the same suffix-overlap rule as the stabilizer.
        let mut last = self.last_emitted.lock().unwrap();
        let suffix = if let Some(rest) = full_translation.strip_prefix(last.as_str()) {
            rest.to_string()
        } else {
            let overlap = longest_overlap(&last, &full_translation);
            full_translation[overlap..].to_string()
        };
        *last = full_translation;

        Ok((!suffix.trim().is_empty()).then_some(suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoEngine {
        outputs: Mutex<Vec<String>>,
    }

    impl SpeechEngine for EchoEngine {
        fn transcribe(
            &self,
            _audio: &[f32],
            _sample_rate: u32,
            _language_hint: Option<&str>,
            _max_tokens: usize,
        ) -> Result<String> {
            Ok(String::new())
        }

        fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<Option<String>> {
            let mut outputs = self.outputs.lock().unwrap();
            if outputs.is_empty() {
                Ok(None)
            } else {
                Ok(Some(outputs.remove(0)))
            }
        }
    }

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationProvider for CountingProvider {
        async fn translate(
            &self,
            text: &str,
            _source_language: Option<&str>,
            _target_language: &str,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("<{}>", text))
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl TranslationProvider for StalledProvider {
        async fn translate(
            &self,
            _text: &str,
            _source_language: Option<&str>,
            _target_language: &str,
        ) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn settings(strategy: TranslationStrategy, timeout_ms: u64) -> EngineSettings {
        let mut settings = EngineSettings::default();
        settings.enable_translation = true;
        settings.translation_strategy = strategy;
        settings.translation_timeout_ms = timeout_ms;
        settings.target_language = "de".to_string();
        settings
    }

    fn engine() -> Arc<EchoEngine> {
        Arc::new(EchoEngine {
            outputs: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_provider_strategy_caches_identical_segments() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let integration = TranslationIntegration::new(
            &settings(TranslationStrategy::Provider, 5000),
            engine(),
            Some(provider.clone()),
        );

        let first = integration.translate_segment("hello", "hello").await;
        assert_eq!(first.as_deref(), Some("<hello>"));

        let second = integration.translate_segment("hello", "hello").await;
        assert_eq!(second.as_deref(), Some("<hello>"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_timeout_yields_none() {
        let integration = TranslationIntegration::new(
            &settings(TranslationStrategy::Provider, 50),
            engine(),
            Some(Arc::new(StalledProvider)),
        );

        let result = integration.translate_segment("hello", "hello").await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_missing_provider_is_swallowed() {
        let integration = TranslationIntegration::new(
            &settings(TranslationStrategy::Provider, 50),
            engine(),
            None,
        );
        assert_eq!(integration.translate_segment("hello", "hello").await, None);
    }

    #[tokio::test]
    async fn test_generation_strategy_emits_incremental_suffix() {
        let echo = engine();
        echo.outputs
            .lock()
            .unwrap()
            .extend(["Hallo".to_string(), "Hallo Welt".to_string()]);

        let integration = TranslationIntegration::new(
            &settings(TranslationStrategy::SpeechEngine, 5000),
            echo,
            None,
        );

        let first = integration.translate_segment("Hello", "Hello").await;
        assert_eq!(first.as_deref(), Some("Hallo"));

        let second = integration
            .translate_segment(" world", "Hello world")
            .await;
        assert_eq!(second.as_deref(), Some(" Welt"));
    }

    #[tokio::test]
    async fn test_generation_returning_nothing_yields_none() {
        let integration = TranslationIntegration::new(
            &settings(TranslationStrategy::SpeechEngine, 5000),
            engine(),
            None,
        );
        assert_eq!(integration.translate_segment("hi", "hi").await, None);
    }

    #[tokio::test]
    async fn test_reset_clears_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let integration = TranslationIntegration::new(
            &settings(TranslationStrategy::Provider, 5000),
            engine(),
            Some(provider.clone()),
        );

        integration.translate_segment("hello", "hello").await;
        integration.reset();
        integration.translate_segment("hello", "hello").await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
