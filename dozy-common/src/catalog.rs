//! Sound catalog descriptor
//!
//! The catalog itself (JSON parsing, premium gating) lives outside the
//! engine. The engine only consumes these records.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One playable sound as supplied by the catalog service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundDescriptor {
    /// Stable sound identifier (e.g. "rain")
    pub identifier: String,

    /// Asset path, relative to the asset root unless absolute
    pub asset_path: PathBuf,

    /// Per-sound loudness trim in dB applied before the safety clamp
    #[serde(default)]
    pub default_gain_db: f32,

    /// Whether the sound loops by default
    #[serde(default = "default_looping")]
    pub looping: bool,

    /// Entitlement flag; ignored by the playback engine
    #[serde(default)]
    pub premium: bool,
}

fn default_looping() -> bool {
    true
}

impl SoundDescriptor {
    pub fn new(identifier: impl Into<String>, asset_path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            asset_path: asset_path.into(),
            default_gain_db: 0.0,
            looping: true,
            premium: false,
        }
    }

    /// Linear multiplier for `default_gain_db`
    pub fn default_gain_linear(&self) -> f32 {
        db_to_linear(self.default_gain_db)
    }
}

/// Convert decibels to a linear gain multiplier
pub fn db_to_linear(db: f32) -> f32 {
    if !db.is_finite() {
        return if db == f32::NEG_INFINITY { 0.0 } else { 1.0 };
    }
    10f32.powf(db / 20.0)
}
