//! Error types for dozy-ap
//!
//! Playback failures (`AssetNotFound`, `DecodeFailed`, `TooManyVoices`,
//! `VoiceNotFound`) are per-request: they never disturb voices that are
//! already playing. `EngineNotRunning` and `AudioOutput` describe the audio
//! graph itself.

use thiserror::Error;

/// Main error type for dozy-ap
#[derive(Error, Debug)]
pub enum Error {
    /// No asset file could be resolved for the identifier
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// The asset exists but could not be decoded
    #[error("Failed to decode {identifier}: {reason}")]
    DecodeFailed { identifier: String, reason: String },

    /// Playback requested while the audio graph is stopped
    #[error("Audio engine is not running")]
    EngineNotRunning,

    /// Starting a new voice would exceed the concurrent voice limit
    #[error("Too many voices (maximum {max})")]
    TooManyVoices { max: usize },

    /// No active voice for the identifier
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Low-level audio decoding errors (mapped to DecodeFailed by the loader)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from shared collaborators (settings, config)
    #[error(transparent)]
    Common(#[from] dozy_common::Error),
}

/// Convenience Result type using dozy-ap Error
pub type Result<T> = std::result::Result<T, Error>;
