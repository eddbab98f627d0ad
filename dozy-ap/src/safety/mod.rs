//! Hearing-safety enforcement
//!
//! - `policy`: pure clamp / warning / session state machine
//! - `service`: thread-safe wrapper with persistence and events
//!
//! The ceiling the render core applies is published through `SharedCeiling`,
//! a lock-free f32 so the audio thread never waits on the policy lock.

pub mod policy;
pub mod service;

pub use policy::{SafetyConfig, SafetyNotice, SafetyPolicy, MAX_CEILING, MIN_CEILING};
pub use service::{SafeVolumeService, SafetySnapshot};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Ceiling readable from the audio thread without locking
#[derive(Debug, Clone)]
pub struct SharedCeiling(Arc<AtomicU32>);

impl SharedCeiling {
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}
