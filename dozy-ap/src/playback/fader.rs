//! Time-based gain ramps
//!
//! `FadeController` holds at most one `FadeJob` per sound identifier and is
//! advanced by the engine's scheduler tick. It never touches voices itself:
//! each `advance` returns the gains to apply, and the engine pushes them to
//! the mixer as ordinary gain commands. This keeps fades off the audio thread
//! and lets them be tested with plain durations.

use dozy_common::FadeCurve;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// An in-flight ramp on one voice
#[derive(Debug, Clone)]
pub struct FadeJob {
    pub sound_id: String,
    /// Voice instance the ramp belongs to; a replaced voice drops the job
    pub instance_id: Uuid,
    pub from: f32,
    pub to: f32,
    pub duration: Duration,
    pub elapsed: Duration,
    pub curve: FadeCurve,
    /// Stop the voice once the target is reached
    pub stop_on_complete: bool,
}

impl FadeJob {
    /// Gain at the current elapsed time
    pub fn current_gain(&self) -> f32 {
        if self.duration.is_zero() {
            return self.to;
        }
        let t = self.elapsed.as_secs_f32() / self.duration.as_secs_f32();
        self.curve.interpolate(self.from, self.to, t)
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// One gain update produced by a tick
#[derive(Debug, Clone, PartialEq)]
pub struct FadeStep {
    pub sound_id: String,
    pub instance_id: Uuid,
    pub gain: f32,
    /// Final step of the job; `gain` is exactly the target
    pub completed: bool,
    pub stop_on_complete: bool,
}

/// Active fades keyed by sound identifier
#[derive(Debug, Default)]
pub struct FadeController {
    jobs: HashMap<String, FadeJob>,
}

impl FadeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a linear fade, superseding any fade on the same sound
    pub fn fade(&mut self, sound_id: &str, instance_id: Uuid, from: f32, to: f32, duration: Duration) {
        self.fade_with_curve(sound_id, instance_id, from, to, duration, FadeCurve::Linear, false);
    }

    /// Start a fade with an explicit curve and completion action
    #[allow(clippy::too_many_arguments)]
    pub fn fade_with_curve(
        &mut self,
        sound_id: &str,
        instance_id: Uuid,
        from: f32,
        to: f32,
        duration: Duration,
        curve: FadeCurve,
        stop_on_complete: bool,
    ) {
        let job = FadeJob {
            sound_id: sound_id.to_string(),
            instance_id,
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
            curve,
            stop_on_complete,
        };

        if self.jobs.insert(sound_id.to_string(), job).is_some() {
            debug!("Fade on {} superseded", sound_id);
        }
    }

    /// Drop the fade on a sound, if any
    pub fn cancel(&mut self, sound_id: &str) -> Option<FadeJob> {
        self.jobs.remove(sound_id)
    }

    pub fn cancel_all(&mut self) {
        self.jobs.clear();
    }

    pub fn is_fading(&self, sound_id: &str) -> bool {
        self.jobs.contains_key(sound_id)
    }

    pub fn job(&self, sound_id: &str) -> Option<&FadeJob> {
        self.jobs.get(sound_id)
    }

    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    /// Advance every job by `dt`
    ///
    /// `voice_alive(sound_id, instance_id)` reports whether the voice a job
    /// targets still exists; jobs whose voice is gone or replaced are dropped
    /// without producing a step. Completed jobs yield exactly their target
    /// and are removed.
    pub fn advance<F>(&mut self, dt: Duration, voice_alive: F) -> Vec<FadeStep>
    where
        F: Fn(&str, Uuid) -> bool,
    {
        let mut steps = Vec::with_capacity(self.jobs.len());

        self.jobs.retain(|sound_id, job| {
            if !voice_alive(sound_id, job.instance_id) {
                debug!("Fade on {} cancelled: voice gone", sound_id);
                return false;
            }

            job.elapsed = (job.elapsed + dt).min(job.duration);
            let completed = job.is_complete();
            let gain = if completed { job.to } else { job.current_gain() };

            steps.push(FadeStep {
                sound_id: sound_id.clone(),
                instance_id: job.instance_id,
                gain,
                completed,
                stop_on_complete: job.stop_on_complete,
            });

            !completed
        });

        steps
    }
}
