//! Test helpers for dozy-ap integration tests
//!
//! - `audio_generator`: WAV fixtures written with hound
//! - `TestRig`: an engine over a temporary asset folder with the null
//!   output and a manually driven scheduler

#![allow(dead_code)]

pub mod audio_generator;

use dozy_ap::audio::output::OutputBackend;
use dozy_ap::audio::AssetLoader;
use dozy_ap::playback::EngineConfig;
use dozy_ap::safety::SafetyConfig;
use dozy_ap::{EventBus, MixerEngine, SafeVolumeService};
use dozy_common::{MemorySettingsStore, SettingsStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub use audio_generator::{generate_constant_wav, generate_sine_wav, TEST_SAMPLE_RATE};

/// Sounds written into every rig's asset folder
pub const FIXTURE_SOUNDS: &[&str] = &["rain", "fan", "waves", "birds", "heartbeat"];

pub struct TestRig {
    pub engine: Arc<MixerEngine>,
    pub safety: Arc<SafeVolumeService>,
    pub loader: Arc<AssetLoader>,
    pub events: EventBus,
    pub store: Arc<MemorySettingsStore>,
    pub assets: TempDir,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), SafetyConfig::default())
    }

    pub fn with_max_voices(max_voices: usize) -> Self {
        Self::with_config(
            EngineConfig {
                max_voices,
                ..EngineConfig::default()
            },
            SafetyConfig::default(),
        )
    }

    /// Rig with the given tunables; the output is always the null backend
    /// and the scheduler is driven by `MixerEngine::tick`
    pub fn with_config(engine: EngineConfig, safety: SafetyConfig) -> Self {
        let assets = tempfile::tempdir().expect("temp asset dir");
        for name in FIXTURE_SOUNDS {
            write_fixture(assets.path(), name);
        }

        let store = Arc::new(MemorySettingsStore::new());
        let settings: Arc<dyn SettingsStore> = store.clone();
        let events = EventBus::default();
        let safety = Arc::new(SafeVolumeService::new(safety, settings, events.clone()));
        let loader = Arc::new(AssetLoader::new(assets.path(), TEST_SAMPLE_RATE));

        let config = EngineConfig {
            tick_interval: None,
            output: OutputBackend::Null { block_frames: 256 },
            ..engine
        };
        let engine = Arc::new(MixerEngine::new(
            config,
            Arc::clone(&loader),
            Arc::clone(&safety),
            events.clone(),
        ));

        Self {
            engine,
            safety,
            loader,
            events,
            store,
            assets,
        }
    }

    pub async fn started() -> Self {
        let rig = Self::new();
        rig.engine.start().await.expect("engine starts on null output");
        rig
    }
}

/// 200 ms constant-level stereo WAV named `<name>.wav`
pub fn write_fixture(dir: &Path, name: &str) {
    generate_constant_wav(dir.join(format!("{}.wav", name)), 200, 0.5).expect("write fixture");
}
