//! Asset loader integration tests

mod helpers;

use dozy_ap::audio::decoder::{DecodedAudio, SoundDecoder, SymphoniaDecoder};
use dozy_ap::audio::types::CHANNELS;
use dozy_ap::audio::AssetLoader;
use dozy_ap::Error;
use dozy_common::SoundDescriptor;
use helpers::{generate_constant_wav, generate_sine_wav, write_fixture, TEST_SAMPLE_RATE};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Decoder that counts calls and takes a while, to expose duplicate decodes
struct CountingDecoder {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingDecoder {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SoundDecoder for CountingDecoder {
    fn decode(&self, _path: &Path) -> dozy_ap::Result<DecodedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        if self.fail {
            return Err(Error::Decode("synthetic failure".to_string()));
        }
        Ok(DecodedAudio {
            samples: vec![0.25; 441 * 2],
            sample_rate: TEST_SAMPLE_RATE,
            channels: 2,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_share_one_decode() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "rain");
    let decoder = CountingDecoder::new(false);
    let loader = Arc::new(AssetLoader::with_decoder(dir.path(), TEST_SAMPLE_RATE, decoder.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let loader = Arc::clone(&loader);
        handles.push(tokio::spawn(async move { loader.load("rain").await }));
    }

    let mut assets = Vec::new();
    for handle in handles {
        assets.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(decoder.calls(), 1);
    assert!(assets.windows(2).all(|pair| Arc::ptr_eq(&pair[0].buffer, &pair[1].buffer)));
    assert_eq!(loader.cached_count(), 1);
}

#[tokio::test]
async fn test_failed_decode_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path(), "rain");
    let decoder = CountingDecoder::new(true);
    let loader = AssetLoader::with_decoder(dir.path(), TEST_SAMPLE_RATE, decoder.clone());

    for _ in 0..2 {
        let result = loader.load("rain").await;
        assert!(matches!(
            result,
            Err(Error::DecodeFailed { ref identifier, .. }) if identifier == "rain"
        ));
    }
    assert_eq!(decoder.calls(), 2);
    assert!(!loader.is_cached("rain"));
}

#[tokio::test]
async fn test_wav_is_decoded_to_engine_format() {
    let dir = tempfile::tempdir().unwrap();
    generate_constant_wav(dir.path().join("rain.wav"), 500, 0.5).unwrap();
    let loader = AssetLoader::new(dir.path(), TEST_SAMPLE_RATE);

    let asset = loader.load("rain").await.unwrap();
    assert_eq!(asset.format.sample_rate, TEST_SAMPLE_RATE);
    assert_eq!(asset.format.channels as usize, CHANNELS);
    assert_eq!(asset.buffer.frames(), 22050);
    assert!((asset.buffer.samples()[1000] - 0.5).abs() < 1e-3);
    assert_eq!(asset.source_path, dir.path().join("rain.wav"));
}

#[tokio::test]
async fn test_mono_48k_is_resampled_and_upmixed() {
    let dir = tempfile::tempdir().unwrap();
    generate_sine_wav(dir.path().join("birds.wav"), 1000, 440.0, 0.5, 1, 48000).unwrap();
    let loader = AssetLoader::new(dir.path(), TEST_SAMPLE_RATE);

    let asset = loader.load("birds").await.unwrap();
    assert_eq!(asset.source_format.sample_rate, 48000);
    assert_eq!(asset.source_format.channels, 1);

    // About one second at 44.1 kHz
    let frames = asset.buffer.frames() as i64;
    assert!((frames - 44100).abs() < 2048, "got {} frames", frames);

    let (left, right) = asset.buffer.frame(2000);
    assert_eq!(left, right);
}

#[tokio::test]
async fn test_missing_and_invalid_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    let loader = AssetLoader::new(dir.path(), TEST_SAMPLE_RATE);

    for id in ["missing_sound", "../secret", ""] {
        assert!(matches!(loader.load(id).await, Err(Error::AssetNotFound(_))));
    }
}

#[tokio::test]
async fn test_extension_order_and_descriptor_path() {
    let dir = tempfile::tempdir().unwrap();
    generate_constant_wav(dir.path().join("fan.wav"), 100, 0.2).unwrap();
    std::fs::write(dir.path().join("fan.flac"), b"not flac").unwrap();
    std::fs::create_dir(dir.path().join("nature")).unwrap();
    generate_constant_wav(dir.path().join("nature").join("creek.wav"), 100, 0.2).unwrap();

    let loader = AssetLoader::new(dir.path(), TEST_SAMPLE_RATE);
    // flac precedes wav in the default order
    assert_eq!(loader.resolve("fan").unwrap(), dir.path().join("fan.flac"));

    let loader = loader.with_extensions([".wav", "flac"]);
    assert_eq!(loader.resolve("fan").unwrap(), dir.path().join("fan.wav"));

    loader.register(SoundDescriptor::new("stream", "nature/creek.wav"));
    assert_eq!(
        loader.resolve("stream").unwrap(),
        dir.path().join("nature").join("creek.wav")
    );
    loader.load("stream").await.unwrap();
}

#[tokio::test]
async fn test_evict_preload_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["rain", "fan", "waves"] {
        write_fixture(dir.path(), name);
    }
    let decoder = CountingDecoder::new(false);
    let loader = AssetLoader::with_decoder(dir.path(), TEST_SAMPLE_RATE, decoder.clone());

    assert_eq!(loader.preload(["rain", "fan", "missing_sound"]).await, 2);
    assert_eq!(loader.cached_count(), 2);

    let held = loader.load("rain").await.unwrap();
    assert!(loader.evict("rain"));
    assert!(!loader.is_cached("rain"));
    // Evicted buffers stay alive for whoever still holds them
    assert_eq!(held.buffer.frames(), 441);

    loader.load("rain").await.unwrap();
    assert_eq!(decoder.calls(), 3);

    loader.clear();
    assert_eq!(loader.cached_count(), 0);
}

#[test]
fn test_symphonia_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.wav");
    std::fs::write(&path, b"RIFF????WAVEjunk").unwrap();
    assert!(SymphoniaDecoder.decode(&path).is_err());
}
