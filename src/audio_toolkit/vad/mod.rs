//! Energy-threshold voice activity detection.
//!
//! A deterministic state machine over per-frame RMS energy: silence, active
//! speech, and a one-shot speech-end edge once sustained silence follows a
//! long-enough speech run. Time advances only with the frames fed in, so
//! identical energy/timing sequences always classify identically.

use crate::audio_toolkit::audio::rms_level;
use crate::settings::VadSettings;
use log::debug;

/// Outcome of feeding one frame to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    None,
    /// Energy rose above the threshold while in silence.
    SpeechStart,
    /// A speech run ended. `duration_ms` covers speech start to the onset of
    /// the silence that closed it. One-shot: the next frame is classified
    /// from silence again.
    SpeechEnd { duration_ms: u64 },
}

#[derive(Debug, Clone, Copy)]
enum VadState {
    Silence,
    Speech {
        started_ms: u64,
        silence_started_ms: Option<u64>,
    },
}

pub struct EnergyVad {
    energy_threshold: f32,
    silence_duration_ms: u64,
    min_speech_duration_ms: u64,
    sample_rate: u32,
    clock_ms: u64,
    state: VadState,
}

impl EnergyVad {
    pub fn new(settings: VadSettings, sample_rate: u32) -> Self {
        Self {
            energy_threshold: settings.energy_threshold,
            silence_duration_ms: settings.silence_duration_ms,
            min_speech_duration_ms: settings.min_speech_duration_ms,
            sample_rate: sample_rate.max(1),
            clock_ms: 0,
            state: VadState::Silence,
        }
    }

    /// Feed one frame and advance the detector's clock by its duration.
    pub fn process(&mut self, frame: &[f32]) -> VadEvent {
        let energy = rms_level(frame);
        let frame_start_ms = self.clock_ms;
        self.clock_ms += frame.len() as u64 * 1000 / self.sample_rate as u64;

        match self.state {
            VadState::Silence => {
                if energy > self.energy_threshold {
                    self.state = VadState::Speech {
                        started_ms: frame_start_ms,
                        silence_started_ms: None,
                    };
                    debug!("Speech started at {}ms (energy {:.4})", frame_start_ms, energy);
                    VadEvent::SpeechStart
                } else {
                    VadEvent::None
                }
            }
            VadState::Speech {
                started_ms,
                silence_started_ms,
            } => {
                if energy > self.energy_threshold {
                    // Energy rose again: the silence timer restarts from zero.
                    self.state = VadState::Speech {
                        started_ms,
                        silence_started_ms: None,
                    };
                    return VadEvent::None;
                }

                let silence_started = silence_started_ms.unwrap_or(frame_start_ms);
                self.state = VadState::Speech {
                    started_ms,
                    silence_started_ms: Some(silence_started),
                };

                if self.clock_ms.saturating_sub(silence_started) < self.silence_duration_ms {
                    return VadEvent::None;
                }

                // Sustained silence closes the run.
                self.state = VadState::Silence;
                let duration_ms = silence_started.saturating_sub(started_ms);
                if duration_ms >= self.min_speech_duration_ms {
                    debug!("Speech ended after {}ms", duration_ms);
                    VadEvent::SpeechEnd { duration_ms }
                } else {
                    debug!("Discarding {}ms speech burst (below minimum)", duration_ms);
                    VadEvent::None
                }
            }
        }
    }

    pub fn is_speech_active(&self) -> bool {
        matches!(self.state, VadState::Speech { .. })
    }

    /// Return to silence and restart the clock (new session or utterance).
    pub fn reset(&mut self) {
        self.state = VadState::Silence;
        self.clock_ms = 0;
    }
}
