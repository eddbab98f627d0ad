//! Configuration management for dozy-ap
//!
//! Two tiers:
//! 1. **TOML bootstrap**: port, folders, engine/output/safety tunables and
//!    logging. Read once at startup.
//! 2. **Settings store**: values the user changes at runtime (safety ceiling,
//!    enabled flag, lifetime listening total), persisted by the safety
//!    service itself.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments
//! 2. Environment variables (`DOZY_AP_PORT`, `DOZY_ASSET_ROOT`,
//!    `DOZY_SETTINGS_PATH`)
//! 3. TOML configuration file
//! 4. Built-in defaults

use crate::audio::loader::DEFAULT_EXTENSIONS;
use crate::audio::output::OutputBackend;
use crate::audio::resampler::TARGET_SAMPLE_RATE;
use crate::error::{Error, Result};
use crate::playback::EngineConfig;
use crate::safety::policy::{
    SafetyConfig, DEFAULT_BREAK_REMINDER, DEFAULT_CEILING, DEFAULT_MAX_LISTENING,
    DEFAULT_WARNING_COOLDOWN,
};
use dozy_common::config::{default_asset_folder, default_data_folder, resolve_folder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_PORT: u16 = 5740;

pub const ENV_ASSET_ROOT: &str = "DOZY_ASSET_ROOT";
pub const ENV_SETTINGS_PATH: &str = "DOZY_SETTINGS_PATH";

/// Bootstrap configuration loaded from the TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Folder holding sound assets
    #[serde(default)]
    pub asset_root: Option<PathBuf>,

    /// TOML file backing the settings store
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub output: OutputBackend,

    #[serde(default)]
    pub safety: SafetySection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_max_voices")]
    pub max_voices: usize,

    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    #[serde(default = "default_gain_ramp_ms")]
    pub gain_ramp_ms: u64,

    /// Scheduler period for fades and session ticks
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_session_tick_secs")]
    pub session_tick_secs: u64,

    /// Extensions tried when resolving an identifier to a file
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            max_voices: default_max_voices(),
            command_capacity: default_command_capacity(),
            gain_ramp_ms: default_gain_ramp_ms(),
            tick_ms: default_tick_ms(),
            session_tick_secs: default_session_tick_secs(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetySection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ceiling")]
    pub default_ceiling: f32,

    #[serde(default = "default_warning_cooldown_secs")]
    pub warning_cooldown_secs: u64,

    #[serde(default = "default_break_reminder_secs")]
    pub break_reminder_secs: u64,

    #[serde(default = "default_max_listening_secs")]
    pub max_listening_secs: u64,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ceiling: default_ceiling(),
            warning_cooldown_secs: default_warning_cooldown_secs(),
            break_reminder_secs: default_break_reminder_secs(),
            max_listening_secs: default_max_listening_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sample_rate() -> u32 {
    TARGET_SAMPLE_RATE
}

fn default_max_voices() -> usize {
    8
}

fn default_command_capacity() -> usize {
    256
}

fn default_gain_ramp_ms() -> u64 {
    10
}

fn default_tick_ms() -> u64 {
    50
}

fn default_session_tick_secs() -> u64 {
    1
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_ceiling() -> f32 {
    DEFAULT_CEILING
}

fn default_warning_cooldown_secs() -> u64 {
    DEFAULT_WARNING_COOLDOWN.as_secs()
}

fn default_break_reminder_secs() -> u64 {
    DEFAULT_BREAK_REMINDER.as_secs()
}

fn default_max_listening_secs() -> u64 {
    DEFAULT_MAX_LISTENING.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a TOML bootstrap file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }
}

impl EngineSection {
    pub fn to_engine_config(&self, output: OutputBackend) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate,
            max_voices: self.max_voices.max(1),
            command_capacity: self.command_capacity.max(1),
            gain_ramp: Duration::from_millis(self.gain_ramp_ms),
            tick_interval: Some(Duration::from_millis(self.tick_ms.max(1))),
            session_tick_interval: Duration::from_secs(self.session_tick_secs.max(1)),
            output,
        }
    }
}

impl SafetySection {
    pub fn to_safety_config(&self) -> SafetyConfig {
        SafetyConfig {
            enabled: self.enabled,
            default_ceiling: self.default_ceiling,
            warning_cooldown: Duration::from_secs(self.warning_cooldown_secs),
            break_reminder_after: Duration::from_secs(self.break_reminder_secs),
            max_listening: Duration::from_secs(self.max_listening_secs),
        }
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub asset_root: Option<PathBuf>,
    pub settings_path: Option<PathBuf>,
    /// Force the device-less output
    pub null_output: bool,
    pub log_level: Option<String>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub asset_root: PathBuf,
    pub settings_path: PathBuf,
    pub extensions: Vec<String>,
    pub engine: EngineConfig,
    pub safety: SafetyConfig,
    pub log_level: String,
}

impl Config {
    /// Resolve the configuration from an optional TOML file and CLI overrides
    pub fn load(toml_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => {
                let config = TomlConfig::from_file(path)?;
                info!("Loaded TOML configuration from {:?}", path);
                config
            }
            None => TomlConfig::default(),
        };
        Ok(Self::resolve(toml_path, toml_config, overrides))
    }

    fn resolve(toml_path: Option<&Path>, toml_config: TomlConfig, overrides: ConfigOverrides) -> Self {
        let port = overrides.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);

        let asset_root = resolve_folder(
            overrides.asset_root.as_deref(),
            ENV_ASSET_ROOT,
            toml_path,
            "asset_root",
            default_asset_folder(),
        );
        let settings_path = resolve_folder(
            overrides.settings_path.as_deref(),
            ENV_SETTINGS_PATH,
            toml_path,
            "settings_path",
            default_data_folder().join("settings.toml"),
        );

        let output = if overrides.null_output {
            OutputBackend::null()
        } else {
            toml_config.output
        };

        Self {
            port,
            asset_root,
            settings_path,
            extensions: toml_config.engine.extensions.clone(),
            engine: toml_config.engine.to_engine_config(output),
            safety: toml_config.safety.to_safety_config(),
            log_level: overrides.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}
