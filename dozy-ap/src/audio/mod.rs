//! Audio I/O: decoding, resampling, asset loading and device output

pub mod decoder;
pub mod loader;
pub mod output;
pub mod resampler;
pub mod types;

pub use loader::AssetLoader;
pub use output::{OutputBackend, OutputHandle, OutputMeter};
pub use types::{SoundAsset, SoundBuffer};
