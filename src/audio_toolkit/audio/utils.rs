use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;
use std::path::Path;

/// Root-mean-square level of a frame. Returns 0.0 for an empty frame.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Save audio samples as a 16-bit mono WAV file
pub fn save_wav_file<P: AsRef<Path>>(file_path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(file_path.as_ref(), spec)?;

    // Convert f32 samples to i16 for WAV
    for sample in samples {
        let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(sample_i16)?;
    }

    writer.finalize()?;
    debug!("Saved WAV file: {:?}", file_path.as_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(rms_level(&[0.0; 160]), 0.0);
        assert_eq!(rms_level(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_constant_amplitude() {
        let frame = vec![0.5f32; 160];
        assert!((rms_level(&frame) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_save_wav_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("window.wav");
        let samples: Vec<f32> = (0..320).map(|i| (i as f32 / 320.0).sin() * 0.4).collect();

        save_wav_file(&path, &samples, 16000).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len() as usize, samples.len());
    }
}
