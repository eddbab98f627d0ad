//! Event types for the Dozy event system
//!
//! Every event carries a UTC timestamp. Events are serialized with a `type`
//! tag so SSE clients can dispatch on it directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound (exclusive) of the Safe band, in linear gain
pub const CAUTION_THRESHOLD: f32 = 0.4;
/// Upper bound (exclusive) of the Caution band
pub const WARNING_THRESHOLD: f32 = 0.6;
/// Upper bound (exclusive) of the Warning band; anything above is Danger
pub const DANGER_THRESHOLD: f32 = 0.8;

/// Hearing-safety warning level derived from a (clamped) playback gain
///
/// Ordered from quietest to loudest so upward crossings can be detected
/// with a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Warning,
    Danger,
}

impl SafetyLevel {
    /// Classify a linear gain into one of the four bands
    pub fn for_gain(gain: f32) -> Self {
        if gain >= DANGER_THRESHOLD {
            SafetyLevel::Danger
        } else if gain >= WARNING_THRESHOLD {
            SafetyLevel::Warning
        } else if gain >= CAUTION_THRESHOLD {
            SafetyLevel::Caution
        } else {
            SafetyLevel::Safe
        }
    }

    /// True for the levels that may raise a volume warning
    pub fn is_alarming(&self) -> bool {
        matches!(self, SafetyLevel::Warning | SafetyLevel::Danger)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Caution => "caution",
            SafetyLevel::Warning => "warning",
            SafetyLevel::Danger => "danger",
        }
    }
}

/// Dozy event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DozyEvent {
    /// Audio graph started or stopped
    EngineStateChanged {
        running: bool,
        timestamp: DateTime<Utc>,
    },

    /// A voice started (or was replaced in place)
    VoiceStarted {
        sound_id: String,
        instance_id: Uuid,
        gain: f32,
        looping: bool,
        timestamp: DateTime<Utc>,
    },

    /// A voice was stopped by request
    VoiceStopped {
        sound_id: String,
        instance_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A one-shot voice reached the end of its buffer
    VoiceFinished {
        sound_id: String,
        instance_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Voice paused or resumed
    VoicePauseChanged {
        sound_id: String,
        paused: bool,
        timestamp: DateTime<Utc>,
    },

    /// Per-voice gain changed by request (not emitted for each fade step)
    VoiceGainChanged {
        sound_id: String,
        gain: f32,
        timestamp: DateTime<Utc>,
    },

    /// A fade reached its target gain
    FadeCompleted {
        sound_id: String,
        gain: f32,
        timestamp: DateTime<Utc>,
    },

    /// Master gain changed
    MasterGainChanged {
        gain: f32,
        timestamp: DateTime<Utc>,
    },

    /// Volume crossed upward into Warning or Danger (rate-limited)
    VolumeWarning {
        level: SafetyLevel,
        gain: f32,
        timestamp: DateTime<Utc>,
    },

    /// Listening session crossed the break-reminder threshold
    BreakReminder {
        session_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// Listening session crossed the maximum listening time
    MaxListeningReached {
        session_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// Safety ceiling or enabled flag changed
    SafetySettingsChanged {
        enabled: bool,
        ceiling: f32,
        timestamp: DateTime<Utc>,
    },

    /// Listening session started
    SessionStarted {
        timestamp: DateTime<Utc>,
    },

    /// Listening session ended
    SessionEnded {
        session_secs: u64,
        lifetime_secs: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DozyEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            DozyEvent::EngineStateChanged { .. } => "EngineStateChanged",
            DozyEvent::VoiceStarted { .. } => "VoiceStarted",
            DozyEvent::VoiceStopped { .. } => "VoiceStopped",
            DozyEvent::VoiceFinished { .. } => "VoiceFinished",
            DozyEvent::VoicePauseChanged { .. } => "VoicePauseChanged",
            DozyEvent::VoiceGainChanged { .. } => "VoiceGainChanged",
            DozyEvent::FadeCompleted { .. } => "FadeCompleted",
            DozyEvent::MasterGainChanged { .. } => "MasterGainChanged",
            DozyEvent::VolumeWarning { .. } => "VolumeWarning",
            DozyEvent::BreakReminder { .. } => "BreakReminder",
            DozyEvent::MaxListeningReached { .. } => "MaxListeningReached",
            DozyEvent::SafetySettingsChanged { .. } => "SafetySettingsChanged",
            DozyEvent::SessionStarted { .. } => "SessionStarted",
            DozyEvent::SessionEnded { .. } => "SessionEnded",
        }
    }

    /// True for hearing-safety notifications the UI should surface
    pub fn is_safety_alert(&self) -> bool {
        matches!(
            self,
            DozyEvent::VolumeWarning { .. }
                | DozyEvent::BreakReminder { .. }
                | DozyEvent::MaxListeningReached { .. }
        )
    }
}
