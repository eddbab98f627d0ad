//! Core audio data types
//!
//! All decoded audio is normalized to the engine format before it reaches a
//! voice: f32 samples in [-1.0, 1.0], interleaved stereo, at the engine
//! sample rate.

use std::path::PathBuf;
use std::sync::Arc;

/// Engine channel count (interleaved stereo)
pub const CHANNELS: usize = 2;

/// Sample rate and channel layout of a block of audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: CHANNELS as u16,
        }
    }
}

/// Decoded, engine-format PCM data shared read-only by voices
///
/// Samples are interleaved stereo: [L, R, L, R, ...].
#[derive(Debug, Clone)]
pub struct SoundBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SoundBuffer {
    /// Wrap interleaved stereo samples
    ///
    /// A trailing half frame is dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32) -> Self {
        let whole = samples.len() - samples.len() % CHANNELS;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Left/right pair at frame `index`
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let base = index * CHANNELS;
        (self.samples[base], self.samples[base + 1])
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

/// A loaded sound: identifier, origin and decoded buffer
///
/// Owned by the asset loader cache; voices hold clones of `buffer`.
#[derive(Debug, Clone)]
pub struct SoundAsset {
    pub identifier: String,
    pub source_path: PathBuf,
    /// Format of the file before normalization
    pub source_format: AudioFormat,
    /// Format of `buffer` (always the engine format)
    pub format: AudioFormat,
    pub buffer: Arc<SoundBuffer>,
}
