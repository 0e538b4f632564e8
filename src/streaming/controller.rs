//! Realtime streaming controller.
//!
//! Two schedules run concurrently per session: ingest (frame-arrival-driven)
//! and inference (fixed-tick-driven). The split is the central design
//! decision: ingestion must never queue behind a slow inference pass, so
//! the session task owns all mutable state and inference runs on a blocking
//! thread while frames keep flowing into the ring buffer. The inference side
//! drops its own backlog counter instead of catching up on stale audio.

use crate::audio_toolkit::audio::{rms_level, save_wav_file, RingBuffer};
use crate::audio_toolkit::vad::{EnergyVad, VadEvent};
use crate::error::StartError;
use crate::events::TranscriptionEvent;
use crate::settings::{EngineSettings, TranslationStrategy};
use crate::speech_engine::{parse_engine_output, FrameSource, SpeechEngine};
use crate::stabilizer::TranscriptStabilizer;
use crate::streaming::StreamingSession;
use crate::translation::{TranslationIntegration, TranslationProvider};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Inference scheduling wakes on this fixed short tick.
const INFERENCE_TICK_MS: u64 = 50;

/// No pass runs until at least this much audio is buffered.
const MIN_BUFFERED_SECONDS: f32 = 0.5;

/// Orchestrates ingestion, buffering, VAD gating, inference scheduling,
/// stabilization, and translation for local speech engines.
pub struct RealtimeEngine {
    settings: EngineSettings,
    speech_engine: Arc<dyn SpeechEngine>,
    translation_provider: Option<Arc<dyn TranslationProvider>>,
}

impl RealtimeEngine {
    pub fn new(settings: EngineSettings, speech_engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            settings,
            speech_engine,
            translation_provider: None,
        }
    }

    pub fn with_translation_provider(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.translation_provider = Some(provider);
        self
    }

    /// Start a streaming session over the given frame source.
    ///
    /// Fails fast, before any event is emitted, on configuration errors and
    /// on capture setup failures. Must be called from a tokio runtime.
    pub fn start(&self, mut source: Box<dyn FrameSource>) -> Result<StreamingSession, StartError> {
        self.settings.validate()?;

        if self.settings.enable_translation
            && self.settings.translation_strategy == TranslationStrategy::Provider
            && self.translation_provider.is_none()
        {
            return Err(StartError::InvalidConfig(
                "translation strategy 'provider' requires a translation provider".into(),
            ));
        }

        let frames = source
            .start()
            .map_err(|e| StartError::Capture(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stop_requested = Arc::new(AtomicBool::new(false));

        let translation = self.settings.enable_translation.then(|| {
            Arc::new(TranslationIntegration::new(
                &self.settings,
                self.speech_engine.clone(),
                self.translation_provider.clone(),
            ))
        });

        let runner = EngineRunner {
            buffer: RingBuffer::new(self.settings.window_samples()),
            vad: self
                .settings
                .enable_vad
                .then(|| EnergyVad::new(self.settings.vad, self.settings.sample_rate)),
            stabilizer: TranscriptStabilizer::new(
                self.settings.stability_threshold,
                self.settings.min_prefix_length,
            ),
            translation,
            speech_engine: self.speech_engine.clone(),
            settings: self.settings.clone(),
            events: events_tx,
            stop_requested: stop_requested.clone(),
            samples_since_inference: 0,
            pending_speech_end: false,
            pass_index: 0,
        };

        info!(
            "Streaming session started (window {}s, step {}ms, vad {})",
            self.settings.window_seconds, self.settings.step_ms, self.settings.enable_vad
        );

        let task = tokio::spawn(runner.run(frames));
        Ok(StreamingSession::new(events_rx, source, stop_requested, task))
    }
}

/// Everything one inference pass carries back to the session task.
struct PassOutput {
    result: anyhow::Result<String>,
    forced: bool,
    window_rms: f32,
    window_samples: usize,
    elapsed: Duration,
}

/// Owns all mutable session state. Only this task touches the ring buffer,
/// VAD, stabilizer, and backlog counters.
struct EngineRunner {
    buffer: RingBuffer,
    vad: Option<EnergyVad>,
    stabilizer: TranscriptStabilizer,
    translation: Option<Arc<TranslationIntegration>>,
    speech_engine: Arc<dyn SpeechEngine>,
    settings: EngineSettings,
    events: mpsc::UnboundedSender<TranscriptionEvent>,
    stop_requested: Arc<AtomicBool>,
    samples_since_inference: usize,
    pending_speech_end: bool,
    pass_index: u64,
}

impl EngineRunner {
    async fn run(mut self, mut frames: mpsc::UnboundedReceiver<Vec<f32>>) {
        let mut running: Option<JoinHandle<PassOutput>> = None;
        let mut tick = tokio::time::interval(Duration::from_millis(INFERENCE_TICK_MS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_frame = frames.recv() => {
                    match maybe_frame {
                        Some(frame) => self.ingest(&frame),
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    if self.stop_requested.load(Ordering::SeqCst) {
                        break;
                    }
                    if self.should_run_inference(running.is_some()) {
                        running = Some(self.spawn_pass());
                    }
                }
                output = async { running.as_mut().unwrap().await }, if running.is_some() => {
                    running = None;
                    match output {
                        Ok(output) => self.handle_pass_output(output),
                        Err(e) => error!("Inference task panicked: {}", e),
                    }
                }
            }
        }

        // Drain the in-flight pass so its hypothesis is not lost.
        if let Some(handle) = running.take() {
            match handle.await {
                Ok(output) => self.handle_pass_output(output),
                Err(e) => error!("Inference task panicked during drain: {}", e),
            }
        }

        self.finalize().await;
        debug!("Session task exiting");
    }

    /// Ingest path: append to the ring buffer and feed the VAD. Never waits
    /// on inference.
    fn ingest(&mut self, frame: &[f32]) {
        self.buffer.append_all(frame);
        self.samples_since_inference += frame.len();

        if let Some(vad) = self.vad.as_mut() {
            if let VadEvent::SpeechEnd { duration_ms } = vad.process(frame) {
                debug!("VAD speech end ({}ms), forcing inference", duration_ms);
                self.pending_speech_end = true;
            }
        }
    }

    fn should_run_inference(&self, pass_running: bool) -> bool {
        if pass_running {
            return false;
        }

        let min_samples = (MIN_BUFFERED_SECONDS * self.settings.sample_rate as f32) as usize;
        if self.buffer.len() < min_samples {
            return false;
        }

        if self.pending_speech_end {
            return true;
        }

        let step_reached = self.samples_since_inference >= self.settings.step_samples();
        match &self.vad {
            Some(vad) => vad.is_speech_active() && step_reached,
            None => step_reached,
        }
    }

    fn spawn_pass(&mut self) -> JoinHandle<PassOutput> {
        let mut window = self.buffer.to_vec();
        if let Some(max_seconds) = self.settings.max_window_seconds {
            let max_samples = (max_seconds * self.settings.sample_rate as f32) as usize;
            if window.len() > max_samples {
                window.drain(..window.len() - max_samples);
            }
        }

        if let Some(dir) = &self.settings.debug_dump_dir {
            let path = dir.join(format!("window-{:04}.wav", self.pass_index));
            if let Err(e) = save_wav_file(&path, &window, self.settings.sample_rate) {
                warn!("Failed to dump inference window: {}", e);
            }
        }

        let forced = self.pending_speech_end;
        self.pending_speech_end = false;
        self.samples_since_inference = 0;
        self.pass_index += 1;

        let engine = self.speech_engine.clone();
        let sample_rate = self.settings.sample_rate;
        let language_hint = self.settings.source_language.clone();
        let max_tokens = self.settings.max_tokens;
        let window_rms = rms_level(&window);
        let window_samples = window.len();

        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let result = engine.transcribe(&window, sample_rate, language_hint.as_deref(), max_tokens);
            PassOutput {
                result,
                forced,
                window_rms,
                window_samples,
                elapsed: started.elapsed(),
            }
        })
    }

    fn handle_pass_output(&mut self, output: PassOutput) {
        // Backpressure: if ingestion outran this pass, drop the backlog and
        // wait for a fresh step of new audio instead of catching up.
        if self.samples_since_inference > self.settings.step_samples() {
            debug!(
                "Dropping {} backlogged samples accumulated during inference",
                self.samples_since_inference
            );
            self.samples_since_inference = 0;
        }

        let raw = match output.result {
            Ok(raw) => raw,
            Err(e) => {
                // Transient inference failure: skip this pass, state stays
                // consistent for the next one.
                warn!("Inference pass failed: {}", e);
                return;
            }
        };

        let (detected_language, text) = parse_engine_output(&raw);
        let update = self.stabilizer.update(&text);

        self.emit(TranscriptionEvent::partial(self.stabilizer.current_text()));

        if let Some(segment) = update.newly_committed {
            self.commit_segment(segment);
        }

        if output.forced {
            if let Some(segment) = self.stabilizer.force_commit() {
                self.commit_segment(segment);
            }
            self.start_new_utterance();
        }

        self.emit(TranscriptionEvent::metrics(serde_json::json!({
            "inference_ms": output.elapsed.as_millis() as u64,
            "window_samples": output.window_samples,
            "window_rms": output.window_rms,
            "detected_language": detected_language,
        })));
    }

    /// The utterance the VAD just closed is done: partials must reflect the
    /// next utterance only, and its audio must not leak into the next
    /// window. Buffers are reset, not reallocated.
    fn start_new_utterance(&mut self) {
        debug!("Utterance boundary: resetting window and stabilizer");
        self.buffer.reset();
        self.stabilizer.reset();
        self.samples_since_inference = 0;
        if let Some(integration) = &self.translation {
            integration.start_new_utterance();
        }
    }

    /// Emit the Final for a committed segment and kick off its translation.
    fn commit_segment(&mut self, segment: String) {
        info!("Committed segment: {:?}", segment);
        self.emit(TranscriptionEvent::committed(segment.clone()));

        let Some(integration) = self.translation.clone() else {
            return;
        };
        // Cooperative cancellation: no new translation once stop was asked.
        if self.stop_requested.load(Ordering::SeqCst) {
            return;
        }

        let events = self.events.clone();
        let full_committed = self.stabilizer.committed().to_string();
        tokio::spawn(async move {
            if let Some(translation) = integration
                .translate_segment(&segment, &full_committed)
                .await
            {
                let _ = events.send(TranscriptionEvent::translation(segment, translation));
            }
        });
    }

    /// Final step when the source ends or a stop was requested: promote any
    /// pending text, translate it, and let the event stream close.
    async fn finalize(&mut self) {
        let Some(segment) = self.stabilizer.force_commit() else {
            return;
        };
        info!("Final commit on shutdown: {:?}", segment);
        self.emit(TranscriptionEvent::committed(segment.clone()));

        if let Some(integration) = self.translation.clone() {
            let full_committed = self.stabilizer.committed().to_string();
            if let Some(translation) = integration
                .translate_segment(&segment, &full_committed)
                .await
            {
                self.emit(TranscriptionEvent::translation(segment, translation));
            }
        }
    }

    fn emit(&self, event: TranscriptionEvent) {
        // A dropped receiver is a cancelled consumer, which is a normal
        // termination path, treated like a stop request.
        if self.events.send(event).is_err() {
            self.stop_requested.store(true, Ordering::SeqCst);
        }
    }
}
