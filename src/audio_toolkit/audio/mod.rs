// Re-export all audio components
pub mod ring_buffer;
pub mod utils;

pub use ring_buffer::RingBuffer;
pub use utils::{rms_level, save_wav_file};
