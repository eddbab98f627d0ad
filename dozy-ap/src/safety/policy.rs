//! Hearing-safety policy
//!
//! Pure state machine: every operation takes the current time explicitly, so
//! the policy itself never reads a clock. `SafeVolumeService` wraps it with
//! persistence, events and the lock.

use dozy_common::SafetyLevel;
use std::time::{Duration, Instant};

/// Lowest ceiling a caller may configure
pub const MIN_CEILING: f32 = 0.1;
/// Highest ceiling a caller may configure
pub const MAX_CEILING: f32 = 0.7;
pub const DEFAULT_CEILING: f32 = 0.6;

pub const DEFAULT_WARNING_COOLDOWN: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_BREAK_REMINDER: Duration = Duration::from_secs(45 * 60);
pub const DEFAULT_MAX_LISTENING: Duration = Duration::from_secs(60 * 60);

/// Tunables for the policy
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyConfig {
    /// Initial enabled flag (a persisted value overrides it)
    pub enabled: bool,
    /// Initial ceiling (a persisted value overrides it)
    pub default_ceiling: f32,
    /// Minimum gap between two volume warnings
    pub warning_cooldown: Duration,
    pub break_reminder_after: Duration,
    pub max_listening: Duration,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ceiling: DEFAULT_CEILING,
            warning_cooldown: DEFAULT_WARNING_COOLDOWN,
            break_reminder_after: DEFAULT_BREAK_REMINDER,
            max_listening: DEFAULT_MAX_LISTENING,
        }
    }
}

/// Something the policy wants surfaced to the user
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyNotice {
    VolumeWarning { level: SafetyLevel, gain: f32 },
    BreakReminder { session: Duration },
    MaxListeningReached { session: Duration },
}

/// Clamp a ceiling into the configurable range
pub fn clamp_ceiling(value: f32) -> f32 {
    if value.is_nan() {
        return DEFAULT_CEILING;
    }
    value.clamp(MIN_CEILING, MAX_CEILING)
}

#[derive(Debug)]
pub struct SafetyPolicy {
    config: SafetyConfig,
    enabled: bool,
    ceiling: f32,

    level: SafetyLevel,
    last_warning: Option<Instant>,

    session_start: Option<Instant>,
    session_duration: Duration,
    break_raised: bool,
    max_raised: bool,

    lifetime: Duration,
}

impl SafetyPolicy {
    pub fn new(config: SafetyConfig) -> Self {
        let ceiling = clamp_ceiling(config.default_ceiling);
        Self {
            enabled: config.enabled,
            ceiling,
            config,
            level: SafetyLevel::Safe,
            last_warning: None,
            session_start: None,
            session_duration: Duration::ZERO,
            break_raised: false,
            max_raised: false,
            lifetime: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stored ceiling, regardless of the enabled flag
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Ceiling the render path must apply: the stored one, or 1.0 when disabled
    pub fn effective_ceiling(&self) -> f32 {
        if self.enabled {
            self.ceiling
        } else {
            1.0
        }
    }

    /// Clamp a gain without touching warning state
    pub fn limit(&self, gain: f32) -> f32 {
        if gain.is_nan() || gain <= 0.0 {
            return 0.0;
        }
        gain.min(self.effective_ceiling())
    }

    /// Clamp a requested gain and recompute the warning level
    ///
    /// Returns a `VolumeWarning` notice on an upward crossing into Warning or
    /// Danger once the cooldown since the previous warning has elapsed.
    pub fn clamp(&mut self, gain: f32, now: Instant) -> (f32, Option<SafetyNotice>) {
        let clamped = self.limit(gain);
        let level = SafetyLevel::for_gain(clamped);
        let previous = std::mem::replace(&mut self.level, level);

        let cooled_down = self
            .last_warning
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.warning_cooldown);

        let notice = if level > previous && level.is_alarming() && cooled_down {
            self.last_warning = Some(now);
            Some(SafetyNotice::VolumeWarning { level, gain: clamped })
        } else {
            None
        };

        (clamped, notice)
    }

    /// Store a new ceiling, returning the value actually stored
    pub fn set_ceiling(&mut self, value: f32) -> f32 {
        self.ceiling = clamp_ceiling(value);
        self.ceiling
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn current_warning_level(&self) -> SafetyLevel {
        self.level
    }

    pub fn is_session_active(&self) -> bool {
        self.session_start.is_some()
    }

    /// Begin a listening session, resetting duration and one-shot alerts
    pub fn start_session(&mut self, now: Instant) {
        self.session_start = Some(now);
        self.session_duration = Duration::ZERO;
        self.break_raised = false;
        self.max_raised = false;
    }

    /// End the session and fold its duration into the lifetime total
    ///
    /// Returns the ended session's length, or `None` when no session was
    /// active.
    pub fn end_session(&mut self, now: Instant) -> Option<Duration> {
        let start = self.session_start.take()?;
        let duration = now.saturating_duration_since(start);
        self.lifetime += duration;
        self.session_duration = Duration::ZERO;
        self.break_raised = false;
        self.max_raised = false;
        Some(duration)
    }

    /// Live session length (zero when no session is active)
    pub fn session_duration(&self, now: Instant) -> Duration {
        match self.session_start {
            Some(start) => now.saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    /// Lifetime listening total, excluding the running session
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Restore a persisted lifetime total
    pub fn set_lifetime(&mut self, lifetime: Duration) {
        self.lifetime = lifetime;
    }

    /// Update session duration and raise break / max-listening alerts once
    pub fn tick(&mut self, now: Instant) -> Vec<SafetyNotice> {
        let mut notices = Vec::new();
        if self.session_start.is_none() {
            return notices;
        }

        self.session_duration = self.session_duration(now);
        let session = self.session_duration;

        if !self.break_raised && session >= self.config.break_reminder_after {
            self.break_raised = true;
            notices.push(SafetyNotice::BreakReminder { session });
        }
        if !self.max_raised && session >= self.config.max_listening {
            self.max_raised = true;
            notices.push(SafetyNotice::MaxListeningReached { session });
        }

        notices
    }
}
