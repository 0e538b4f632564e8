pub mod audio;
pub mod vad;

pub use audio::{RingBuffer, rms_level, save_wav_file};
pub use vad::{EnergyVad, VadEvent};
