//! Safe volume service
//!
//! Owns the `SafetyPolicy` behind a std `Mutex` (never held across an
//! await), persists the ceiling, enabled flag and lifetime listening total
//! through the `SettingsStore`, mirrors the effective ceiling into a
//! `SharedCeiling` for the render core, and turns policy notices into
//! `DozyEvent`s.
//!
//! Time is read from `tokio::time::Instant` so paused-clock tests can drive
//! session alerts deterministically.

use super::policy::{SafetyConfig, SafetyNotice, SafetyPolicy};
use super::SharedCeiling;
use crate::state::EventBus;
use chrono::Utc;
use dozy_common::settings::{get_setting, set_setting};
use dozy_common::{DozyEvent, SafetyLevel, SettingsStore};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const KEY_CEILING: &str = "safety.ceiling";
pub const KEY_ENABLED: &str = "safety.enabled";
pub const KEY_LIFETIME_SECS: &str = "safety.lifetime_listening_secs";

/// Point-in-time view of the safety state (served by `GET /safety`)
#[derive(Debug, Clone, Serialize)]
pub struct SafetySnapshot {
    pub enabled: bool,
    pub ceiling: f32,
    pub effective_ceiling: f32,
    pub warning_level: SafetyLevel,
    pub session_active: bool,
    pub session_secs: u64,
    pub lifetime_secs: u64,
}

pub struct SafeVolumeService {
    policy: Mutex<SafetyPolicy>,
    store: Arc<dyn SettingsStore>,
    events: EventBus,
    ceiling: SharedCeiling,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl SafeVolumeService {
    /// Build the service, restoring persisted settings over `config`
    ///
    /// Unreadable or invalid persisted values are logged and ignored.
    pub fn new(config: SafetyConfig, store: Arc<dyn SettingsStore>, events: EventBus) -> Self {
        let mut policy = SafetyPolicy::new(config);

        match get_setting::<f32>(store.as_ref(), KEY_CEILING) {
            Ok(Some(ceiling)) => {
                policy.set_ceiling(ceiling);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to restore {}: {}", KEY_CEILING, e),
        }
        match get_setting::<bool>(store.as_ref(), KEY_ENABLED) {
            Ok(Some(enabled)) => policy.set_enabled(enabled),
            Ok(None) => {}
            Err(e) => warn!("Failed to restore {}: {}", KEY_ENABLED, e),
        }
        match get_setting::<u64>(store.as_ref(), KEY_LIFETIME_SECS) {
            Ok(Some(secs)) => policy.set_lifetime(Duration::from_secs(secs)),
            Ok(None) => {}
            Err(e) => warn!("Failed to restore {}: {}", KEY_LIFETIME_SECS, e),
        }

        info!(
            "Safety policy: enabled={}, ceiling={:.2}, lifetime={}s",
            policy.is_enabled(),
            policy.ceiling(),
            policy.lifetime().as_secs()
        );

        let ceiling = SharedCeiling::new(policy.effective_ceiling());

        Self {
            policy: Mutex::new(policy),
            store,
            events,
            ceiling,
        }
    }

    fn policy(&self) -> MutexGuard<'_, SafetyPolicy> {
        // A panic while holding the lock cannot leave the policy half-updated
        self.policy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle for the render core
    pub fn shared_ceiling(&self) -> SharedCeiling {
        self.ceiling.clone()
    }

    /// Clamp a requested gain, raising a volume warning if due
    pub fn clamp(&self, gain: f32) -> f32 {
        let (clamped, notice) = self.policy().clamp(gain, now());
        if let Some(notice) = notice {
            self.emit_notice(notice);
        }
        clamped
    }

    /// Clamp without touching warning state
    pub fn limit(&self, gain: f32) -> f32 {
        self.policy().limit(gain)
    }

    /// Store a new ceiling and return the value actually stored
    pub fn set_ceiling(&self, value: f32) -> f32 {
        let (stored, enabled, effective) = {
            let mut policy = self.policy();
            let stored = policy.set_ceiling(value);
            (stored, policy.is_enabled(), policy.effective_ceiling())
        };
        self.ceiling.set(effective);

        if (stored - value).abs() > f32::EPSILON {
            debug!("Requested ceiling {} stored as {}", value, stored);
        }
        self.persist(KEY_CEILING, stored);
        self.events.emit(DozyEvent::SafetySettingsChanged {
            enabled,
            ceiling: stored,
            timestamp: Utc::now(),
        });
        stored
    }

    pub fn set_enabled(&self, enabled: bool) {
        let (ceiling, effective) = {
            let mut policy = self.policy();
            policy.set_enabled(enabled);
            (policy.ceiling(), policy.effective_ceiling())
        };
        self.ceiling.set(effective);

        info!("Safety policy {}", if enabled { "enabled" } else { "disabled" });
        self.persist(KEY_ENABLED, enabled);
        self.events.emit(DozyEvent::SafetySettingsChanged {
            enabled,
            ceiling,
            timestamp: Utc::now(),
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.policy().is_enabled()
    }

    pub fn ceiling(&self) -> f32 {
        self.policy().ceiling()
    }

    pub fn current_warning_level(&self) -> SafetyLevel {
        self.policy().current_warning_level()
    }

    pub fn is_session_active(&self) -> bool {
        self.policy().is_session_active()
    }

    /// Start a listening session; an active session is ended first
    pub fn start_session(&self) {
        if self.is_session_active() {
            self.end_session();
        }
        self.policy().start_session(now());
        debug!("Listening session started");
        self.events.emit(DozyEvent::SessionStarted { timestamp: Utc::now() });
    }

    /// End the listening session; a no-op when none is active
    pub fn end_session(&self) {
        let (ended, lifetime) = {
            let mut policy = self.policy();
            let ended = policy.end_session(now());
            (ended, policy.lifetime())
        };
        let Some(session) = ended else {
            return;
        };

        debug!("Listening session ended after {}s", session.as_secs());
        self.persist(KEY_LIFETIME_SECS, lifetime.as_secs());
        self.events.emit(DozyEvent::SessionEnded {
            session_secs: session.as_secs(),
            lifetime_secs: lifetime.as_secs(),
            timestamp: Utc::now(),
        });
    }

    /// Live length of the current session
    pub fn session_duration(&self) -> Duration {
        self.policy().session_duration(now())
    }

    /// Lifetime listening total, excluding the running session
    pub fn lifetime(&self) -> Duration {
        self.policy().lifetime()
    }

    /// Advance session tracking, raising break / max-listening events
    pub fn tick(&self) {
        let notices = self.policy().tick(now());
        for notice in notices {
            self.emit_notice(notice);
        }
    }

    pub fn snapshot(&self) -> SafetySnapshot {
        let policy = self.policy();
        SafetySnapshot {
            enabled: policy.is_enabled(),
            ceiling: policy.ceiling(),
            effective_ceiling: policy.effective_ceiling(),
            warning_level: policy.current_warning_level(),
            session_active: policy.is_session_active(),
            session_secs: policy.session_duration(now()).as_secs(),
            lifetime_secs: policy.lifetime().as_secs(),
        }
    }

    fn emit_notice(&self, notice: SafetyNotice) {
        let timestamp = Utc::now();
        let event = match notice {
            SafetyNotice::VolumeWarning { level, gain } => {
                warn!("Volume warning: {} at gain {:.2}", level.as_str(), gain);
                DozyEvent::VolumeWarning { level, gain, timestamp }
            }
            SafetyNotice::BreakReminder { session } => {
                info!("Break reminder after {}s of listening", session.as_secs());
                DozyEvent::BreakReminder {
                    session_secs: session.as_secs(),
                    timestamp,
                }
            }
            SafetyNotice::MaxListeningReached { session } => {
                warn!("Maximum listening time reached ({}s)", session.as_secs());
                DozyEvent::MaxListeningReached {
                    session_secs: session.as_secs(),
                    timestamp,
                }
            }
        };
        self.events.emit(event);
    }

    fn persist<T: std::fmt::Display>(&self, key: &str, value: T) {
        if let Err(e) = set_setting(self.store.as_ref(), key, value) {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}
