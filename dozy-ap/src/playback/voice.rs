//! Voice: one independently schedulable playback of a decoded buffer
//!
//! State machine:
//!
//! ```text
//! Idle ──schedule──▶ Scheduled ──play──▶ Playing ◀──resume── Paused
//!                        │                  │ └────pause─────▶ │
//!                        └──────stop────────┴───────stop───────┘
//!                                           ▼
//!                                       Stopping ──release──▶ Idle
//! ```
//!
//! Gain changes are latched at the next block boundary and ramped linearly
//! over `ramp_frames` so they never click. Voices mix additively into the
//! output block; they never allocate or lock while rendering.

use crate::audio::types::{SoundBuffer, CHANNELS};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Playback state of a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Scheduled,
    Playing,
    Paused,
    Stopping,
}

/// Result of rendering one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Voice still has audio to play (or is paused/scheduled)
    Continue,
    /// One-shot voice reached the end of its buffer and is now Idle
    Finished,
    /// Voice is Idle or Stopping and contributed nothing
    Silent,
}

/// One playback unit bound to a single buffer
#[derive(Debug)]
pub struct Voice {
    sound_id: String,
    instance_id: Uuid,
    buffer: Option<Arc<SoundBuffer>>,
    state: VoiceState,
    looping: bool,
    cursor: usize,
    created_at: Instant,

    /// Gain applied to the current frame
    gain: f32,
    /// Gain the ramp is heading towards
    target_gain: f32,
    /// Gain requested since the last block boundary
    pending_gain: Option<f32>,
    ramp_step: f32,
    ramp_remaining: usize,
    ramp_frames: usize,
}

impl Voice {
    /// Idle voice with no buffer
    ///
    /// `ramp_frames` is the de-click window for gain changes (0 = instant).
    pub fn new(
        sound_id: impl Into<String>,
        instance_id: Uuid,
        ramp_frames: usize,
        created_at: Instant,
    ) -> Self {
        Self {
            sound_id: sound_id.into(),
            instance_id,
            buffer: None,
            state: VoiceState::Idle,
            looping: false,
            cursor: 0,
            created_at,
            gain: 0.0,
            target_gain: 0.0,
            pending_gain: None,
            ramp_step: 0.0,
            ramp_remaining: 0,
            ramp_frames,
        }
    }

    pub fn sound_id(&self) -> &str {
        &self.sound_id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Current frame position in the buffer
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Requested gain (the value the voice is at or ramping towards)
    pub fn gain(&self) -> f32 {
        self.pending_gain.unwrap_or(self.target_gain)
    }

    /// Gain applied to the most recently rendered frame
    pub fn current_gain(&self) -> f32 {
        self.gain
    }

    /// Bind a buffer. Only valid while Idle.
    pub fn schedule(&mut self, buffer: Arc<SoundBuffer>, looping: bool) -> bool {
        if self.state != VoiceState::Idle {
            return false;
        }
        self.buffer = Some(buffer);
        self.looping = looping;
        self.cursor = 0;
        self.state = VoiceState::Scheduled;
        true
    }

    /// Swap in a new buffer and identity in place, from any state
    ///
    /// The voice ends up Scheduled at frame 0. Returns the previous buffer so
    /// the caller can release it off the audio thread.
    pub fn reschedule(
        &mut self,
        instance_id: Uuid,
        buffer: Arc<SoundBuffer>,
        looping: bool,
    ) -> Option<Arc<SoundBuffer>> {
        let previous = self.buffer.replace(buffer);
        self.instance_id = instance_id;
        self.looping = looping;
        self.cursor = 0;
        self.state = VoiceState::Scheduled;
        previous
    }

    /// Scheduled → Playing; ramps in from silence
    pub fn play(&mut self) -> bool {
        if self.state != VoiceState::Scheduled {
            return false;
        }
        self.state = VoiceState::Playing;
        self.ramp_from_silence();
        true
    }

    /// Playing → Paused
    pub fn pause(&mut self) -> bool {
        if self.state != VoiceState::Playing {
            return false;
        }
        self.state = VoiceState::Paused;
        true
    }

    /// Paused → Playing; ramps back in from silence
    pub fn resume(&mut self) -> bool {
        if self.state != VoiceState::Paused {
            return false;
        }
        self.state = VoiceState::Playing;
        self.ramp_from_silence();
        true
    }

    /// Scheduled/Playing/Paused → Stopping
    ///
    /// A stopping voice renders nothing from the next block on.
    pub fn stop(&mut self) -> bool {
        match self.state {
            VoiceState::Scheduled | VoiceState::Playing | VoiceState::Paused => {
                self.state = VoiceState::Stopping;
                true
            }
            VoiceState::Idle | VoiceState::Stopping => false,
        }
    }

    /// Stopping (or finished) → Idle, handing back the buffer reference
    pub fn release(&mut self) -> Option<Arc<SoundBuffer>> {
        if matches!(self.state, VoiceState::Stopping | VoiceState::Idle) {
            self.state = VoiceState::Idle;
            self.cursor = 0;
            return self.buffer.take();
        }
        None
    }

    /// Consume the voice, keeping only its identity
    pub fn into_identity(self) -> (String, Uuid) {
        (self.sound_id, self.instance_id)
    }

    /// Request a new gain, effective from the next block boundary
    pub fn set_gain(&mut self, gain: f32) {
        self.pending_gain = Some(sanitize_gain(gain));
    }

    /// Mix this voice into `out` (interleaved stereo)
    ///
    /// Every frame is scaled by `min(voice_gain * master, ceiling)`.
    pub fn render(&mut self, out: &mut [f32], master: f32, ceiling: f32) -> RenderOutcome {
        self.latch_pending_gain();

        match self.state {
            VoiceState::Playing => {}
            VoiceState::Scheduled | VoiceState::Paused => return RenderOutcome::Continue,
            VoiceState::Idle | VoiceState::Stopping => return RenderOutcome::Silent,
        }

        let buffer = match self.buffer.as_ref() {
            Some(buffer) if !buffer.is_empty() => buffer,
            _ => {
                self.state = VoiceState::Idle;
                return RenderOutcome::Finished;
            }
        };

        let total = buffer.frames();
        for frame in out.chunks_exact_mut(CHANNELS) {
            if self.ramp_remaining > 0 {
                self.ramp_remaining -= 1;
                self.gain = if self.ramp_remaining == 0 {
                    self.target_gain
                } else {
                    self.gain + self.ramp_step
                };
            }

            let g = (self.gain * master).min(ceiling).max(0.0);
            let (left, right) = buffer.frame(self.cursor);
            frame[0] += left * g;
            frame[1] += right * g;

            self.cursor += 1;
            if self.cursor >= total {
                if self.looping {
                    // Seamless loop: next frame is buffer start
                    self.cursor = 0;
                } else {
                    self.state = VoiceState::Idle;
                    return RenderOutcome::Finished;
                }
            }
        }

        RenderOutcome::Continue
    }

    fn latch_pending_gain(&mut self) {
        let Some(target) = self.pending_gain.take() else {
            return;
        };
        self.target_gain = target;

        if self.state != VoiceState::Playing || self.ramp_frames == 0 {
            // Nothing audible to smooth
            self.gain = target;
            self.ramp_remaining = 0;
            return;
        }

        self.ramp_remaining = self.ramp_frames;
        self.ramp_step = (target - self.gain) / self.ramp_frames as f32;
    }

    fn ramp_from_silence(&mut self) {
        if let Some(target) = self.pending_gain.take() {
            self.target_gain = target;
        }
        if self.ramp_frames == 0 {
            self.gain = self.target_gain;
            self.ramp_remaining = 0;
            return;
        }
        self.gain = 0.0;
        self.ramp_remaining = self.ramp_frames;
        self.ramp_step = self.target_gain / self.ramp_frames as f32;
    }
}

/// Clamp to [0, 1], mapping NaN to silence
pub fn sanitize_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        0.0
    } else {
        gain.clamp(0.0, 1.0)
    }
}
