//! Settings persistence (key-value store)
//!
//! The engine treats persistence as a synchronous, best-effort collaborator:
//! callers log failures and carry on. Values are stored as strings and parsed
//! on read with [`get_setting`].
//!
//! Two stores are provided:
//! - [`MemorySettingsStore`]: process-local, used in tests and when no
//!   settings file is configured
//! - [`TomlSettingsStore`]: a flat TOML table in a single file

use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key-value settings store
pub trait SettingsStore: Send + Sync {
    /// Load the raw value stored under `key`
    fn load_setting(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn save_setting(&self, key: &str, value: &str) -> Result<()>;
}

/// Read and parse a typed setting
///
/// An unparsable stored value is reported as `Error::Settings`.
pub fn get_setting<T>(store: &dyn SettingsStore, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match store.load_setting(key)? {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Settings(format!("Invalid value for {}: {} ({})", key, raw, e))),
        None => Ok(None),
    }
}

/// Write a typed setting
pub fn set_setting<T: Display>(store: &dyn SettingsStore, key: &str, value: T) -> Result<()> {
    store.save_setting(key, &value.to_string())
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_setting(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::Settings("settings lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Settings("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as a flat TOML table
///
/// The whole table is kept in memory and rewritten on every save through a
/// temporary file, so a crash mid-write never truncates the settings.
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl TomlSettingsStore {
    /// Open (or lazily create) the settings file at `path`
    ///
    /// A missing file starts empty. A corrupt file is an error so it is never
    /// silently overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str::<BTreeMap<String, String>>(&content).map_err(|e| {
                Error::Serialization(format!("Failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!("Settings file {} not found, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let content = toml::to_string(values)
            .map_err(|e| Error::Serialization(format!("Failed to encode settings: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            warn!("Failed to replace {}: {}", self.path.display(), e);
            Error::Io(e)
        })
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load_setting(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| Error::Settings("settings lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Settings("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }
}
