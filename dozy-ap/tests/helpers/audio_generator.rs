//! WAV fixture generation
//!
//! Deterministic files with known content so decode, resample and mix
//! results can be checked numerically.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Stereo WAV with every sample at `level` (16-bit PCM)
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    level: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
    let sample = (level.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
    for _ in 0..total_frames * 2 {
        writer.write_sample(sample)?;
    }

    writer.finalize()
}

/// Sine wave WAV with the given channel count and sample rate (32-bit float)
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
    channels: u16,
    sample_rate: u32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    for frame in 0..total_frames {
        let t = frame as f32 / sample_rate as f32;
        let value = amplitude * (2.0 * PI * frequency_hz * t).sin();
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }

    writer.finalize()
}
