//! # Dozy Common Library
//!
//! Shared code for the Dozy ambient sound services:
//! - Error type shared by the collaborator interfaces
//! - Event types (DozyEvent enum, SafetyLevel)
//! - Fade curve definitions and calculations
//! - Catalog descriptor consumed by the playback engine
//! - Settings store interface (key-value persistence)
//! - Configuration file and root folder resolution

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod settings;

pub use catalog::SoundDescriptor;
pub use error::{Error, Result};
pub use events::{DozyEvent, SafetyLevel};
pub use fade_curves::FadeCurve;
pub use settings::{MemorySettingsStore, SettingsStore, TomlSettingsStore};
