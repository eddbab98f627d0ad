//! # Dozy Audio Player Library (dozy-ap)
//!
//! Ambient-sound playback engine with hearing-safety enforcement.
//!
//! **Purpose:** Load and decode sound assets, loop them across several
//! concurrent voices, apply gain and fade ramps, and clamp everything audible
//! through the safe volume policy. Controlled over HTTP with an SSE event
//! stream.
//!
//! **Architecture:** symphonia + rubato decode into cached buffers; a
//! lock-free render core on the cpal audio thread mixes the voices; a tokio
//! scheduler drives fades and listening-session tracking.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod safety;
pub mod state;

pub use error::{Error, Result};
pub use playback::MixerEngine;
pub use safety::SafeVolumeService;
pub use state::EventBus;
