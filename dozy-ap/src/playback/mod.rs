//! Playback: voices, the real-time mixer core, fades and the engine
//!
//! - `voice`: one buffer-bound playback unit and its state machine
//! - `mixer`: render core owned by the audio thread, fed by lock-free rings
//! - `fader`: time-based gain ramps advanced by the scheduler tick
//! - `engine`: control side; lifecycle, voice limit, safety clamping

pub mod engine;
pub mod fader;
pub mod mixer;
pub mod voice;

pub use engine::{EngineConfig, MixerEngine, VoiceSnapshot};
pub use fader::{FadeController, FadeJob, FadeStep};
pub use mixer::{MixerCommand, MixerCore, MixerLink, RenderEvent};
pub use voice::{Voice, VoiceState};
