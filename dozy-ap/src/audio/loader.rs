//! Asset loader with single-flight decode cache
//!
//! Resolves a sound identifier to a file, decodes it once, normalizes it to
//! the engine format and caches the result. Each identifier owns a
//! `tokio::sync::OnceCell`: concurrent loads of an uncached identifier wait
//! on the same decode, and a failed decode leaves the cell empty so a later
//! request can retry.

use crate::audio::decoder::{to_stereo, SoundDecoder, SymphoniaDecoder};
use crate::audio::resampler::Resampler;
use crate::audio::types::{AudioFormat, SoundAsset, SoundBuffer, CHANNELS};
use crate::error::{Error, Result};
use dozy_common::SoundDescriptor;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Extensions tried, in order, when no catalog descriptor names the file
pub const DEFAULT_EXTENSIONS: &[&str] = &["m4a", "mp3", "ogg", "flac", "wav"];

type AssetSlot = Arc<OnceCell<Arc<SoundAsset>>>;

/// Loads and caches decoded sound assets
pub struct AssetLoader {
    root: PathBuf,
    extensions: Vec<String>,
    sample_rate: u32,
    decoder: Arc<dyn SoundDecoder>,
    catalog: RwLock<HashMap<String, SoundDescriptor>>,
    cache: Mutex<HashMap<String, AssetSlot>>,
}

impl AssetLoader {
    /// Loader backed by symphonia with the default extension list
    pub fn new(root: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self::with_decoder(root, sample_rate, Arc::new(SymphoniaDecoder))
    }

    /// Loader with a custom decoder
    pub fn with_decoder(
        root: impl Into<PathBuf>,
        sample_rate: u32,
        decoder: Arc<dyn SoundDecoder>,
    ) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            sample_rate,
            decoder,
            catalog: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the extension search list
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Register a catalog descriptor so its `asset_path` is used for lookup
    pub fn register(&self, descriptor: SoundDescriptor) {
        if let Ok(mut catalog) = self.catalog.write() {
            debug!(
                "Registered sound {} -> {}",
                descriptor.identifier,
                descriptor.asset_path.display()
            );
            catalog.insert(descriptor.identifier.clone(), descriptor);
        }
    }

    /// Registered descriptor for `identifier`, if any
    pub fn descriptor(&self, identifier: &str) -> Option<SoundDescriptor> {
        self.catalog
            .read()
            .ok()
            .and_then(|catalog| catalog.get(identifier).cloned())
    }

    /// Resolve an identifier to an existing asset file
    pub fn resolve(&self, identifier: &str) -> Result<PathBuf> {
        if !is_valid_identifier(identifier) {
            return Err(Error::AssetNotFound(identifier.to_string()));
        }

        if let Some(descriptor) = self.descriptor(identifier) {
            let path = if descriptor.asset_path.is_absolute() {
                descriptor.asset_path
            } else {
                self.root.join(&descriptor.asset_path)
            };
            return if path.is_file() {
                Ok(path)
            } else {
                warn!("Catalog asset for {} missing: {}", identifier, path.display());
                Err(Error::AssetNotFound(identifier.to_string()))
            };
        }

        self.extensions
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", identifier, ext)))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::AssetNotFound(identifier.to_string()))
    }

    /// Load (or fetch from cache) the decoded asset for `identifier`
    pub async fn load(&self, identifier: &str) -> Result<Arc<SoundAsset>> {
        let slot = {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| Error::Playback("asset cache lock poisoned".to_string()))?;
            Arc::clone(cache.entry(identifier.to_string()).or_default())
        };

        match slot.get_or_try_init(|| self.decode_asset(identifier)).await {
            Ok(asset) => Ok(Arc::clone(asset)),
            Err(e) => {
                self.discard_empty_slot(identifier, &slot);
                Err(e)
            }
        }
    }

    /// Remove a slot left empty by a failed load
    ///
    /// Only the slot this call created or joined is removed, and only while
    /// no other load is waiting on it.
    fn discard_empty_slot(&self, identifier: &str, slot: &AssetSlot) {
        let Ok(mut cache) = self.cache.lock() else {
            return;
        };
        let unused = cache.get(identifier).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
        if unused {
            cache.remove(identifier);
        }
    }

    /// Load several identifiers, returning how many are now cached
    ///
    /// Failures are logged and skipped.
    pub async fn preload<I, S>(&self, identifiers: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut loaded = 0;
        for identifier in identifiers {
            match self.load(identifier.as_ref()).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Preload of {} failed: {}", identifier.as_ref(), e),
            }
        }
        loaded
    }

    /// Whether a decoded buffer is cached for `identifier`
    pub fn is_cached(&self, identifier: &str) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.get(identifier).is_some_and(|slot| slot.initialized()))
            .unwrap_or(false)
    }

    /// Number of decoded buffers currently cached
    pub fn cached_count(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.values().filter(|slot| slot.initialized()).count())
            .unwrap_or(0)
    }

    /// Drop the cached buffer for `identifier`
    ///
    /// Voices already playing it keep their own reference.
    pub fn evict(&self, identifier: &str) -> bool {
        self.cache
            .lock()
            .map(|mut cache| cache.remove(identifier).is_some())
            .unwrap_or(false)
    }

    /// Drop every cached buffer
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    async fn decode_asset(&self, identifier: &str) -> Result<Arc<SoundAsset>> {
        let path = self.resolve(identifier)?;
        let decoder = Arc::clone(&self.decoder);
        let sample_rate = self.sample_rate;
        let id = identifier.to_string();

        let asset = tokio::task::spawn_blocking(move || {
            decode_to_engine_format(decoder.as_ref(), &id, path, sample_rate)
        })
        .await
        .map_err(|e| Error::Playback(format!("Decode task failed: {}", e)))??;

        info!(
            "Loaded {} ({} ms, source {}Hz/{}ch)",
            asset.identifier,
            asset.buffer.duration_ms(),
            asset.source_format.sample_rate,
            asset.source_format.channels
        );

        Ok(Arc::new(asset))
    }
}

/// Identifiers are plain names; anything that could escape the asset root
/// is treated as unknown.
fn is_valid_identifier(identifier: &str) -> bool {
    !identifier.is_empty()
        && !identifier.contains("..")
        && !identifier.contains(['/', '\\'])
        && !identifier.starts_with('.')
}

fn decode_to_engine_format(
    decoder: &dyn SoundDecoder,
    identifier: &str,
    path: PathBuf,
    sample_rate: u32,
) -> Result<SoundAsset> {
    let decode_failed = |reason: String| Error::DecodeFailed {
        identifier: identifier.to_string(),
        reason,
    };

    let decoded = decoder.decode(&path).map_err(|e| match e {
        Error::Decode(reason) => decode_failed(reason),
        other => decode_failed(other.to_string()),
    })?;

    if decoded.samples.is_empty() || decoded.channels == 0 {
        return Err(decode_failed("no audio frames".to_string()));
    }

    let stereo = to_stereo(&decoded.samples, decoded.channels);
    let samples = Resampler::resample(&stereo, decoded.sample_rate, sample_rate, CHANNELS as u16)
        .map_err(|e| decode_failed(e.to_string()))?;

    let buffer = SoundBuffer::new(samples, sample_rate);
    if buffer.is_empty() {
        return Err(decode_failed("no audio frames after resampling".to_string()));
    }

    Ok(SoundAsset {
        identifier: identifier.to_string(),
        source_path: path,
        source_format: AudioFormat {
            sample_rate: decoded.sample_rate,
            channels: decoded.channels,
        },
        format: AudioFormat::stereo(sample_rate),
        buffer: Arc::new(buffer),
    })
}
