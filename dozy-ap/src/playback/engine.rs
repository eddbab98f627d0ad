//! Mixer engine: control side of the audio graph
//!
//! **Responsibilities:**
//! - Lifecycle of the audio graph (output thread + render core)
//! - One voice per sound identifier, bounded by `max_voices`
//! - Every requested gain passes through the safety service before it
//!   reaches a voice
//! - The scheduler tick: render-event draining, fade steps and safety
//!   session ticks
//!
//! The engine keeps a mirror of the voice set (`VoiceEntry`) so queries and
//! limit checks never touch the audio thread. Each change is pushed to the
//! render core as a `MixerCommand` first and only then recorded in the
//! mirror, so a full command queue leaves the mirror untouched.
//!
//! Lock order: `voices` → `link` → `fader`. None of these std mutexes is held
//! across an await.

use crate::audio::loader::AssetLoader;
use crate::audio::output::{OutputBackend, OutputHandle, OutputMeter, RenderFn};
use crate::audio::resampler::TARGET_SAMPLE_RATE;
use crate::error::{Error, Result};
use crate::playback::fader::{FadeController, FadeStep};
use crate::playback::mixer::{MixerCommand, MixerCore, MixerLink, RenderEvent};
use crate::playback::voice::sanitize_gain;
use crate::safety::SafeVolumeService;
use crate::state::EventBus;
use chrono::Utc;
use dozy_common::{DozyEvent, FadeCurve, SoundDescriptor};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub max_voices: usize,
    /// Capacity of the control → render command ring
    pub command_capacity: usize,
    /// De-click window for gain changes
    pub gain_ramp: Duration,
    /// Scheduler period; `None` disables the background scheduler and leaves
    /// ticking to the caller (`MixerEngine::tick`)
    pub tick_interval: Option<Duration>,
    /// How often the safety session is ticked
    pub session_tick_interval: Duration,
    pub output: OutputBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            max_voices: 8,
            command_capacity: 256,
            gain_ramp: Duration::from_millis(10),
            tick_interval: Some(Duration::from_millis(50)),
            session_tick_interval: Duration::from_secs(1),
            output: OutputBackend::default(),
        }
    }
}

impl EngineConfig {
    /// Ramp window in frames at the engine rate
    pub fn ramp_frames(&self) -> usize {
        (self.sample_rate as f64 * self.gain_ramp.as_secs_f64()).round() as usize
    }
}

/// Query view of one active voice
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSnapshot {
    pub sound_id: String,
    pub instance_id: Uuid,
    /// Gain after the safety clamp (what the voice is at or fading through)
    pub gain: f32,
    pub looping: bool,
    pub paused: bool,
    pub fading: bool,
    pub playing_secs: f64,
}

#[derive(Debug, Clone)]
struct VoiceEntry {
    instance_id: Uuid,
    /// Gain clamped when it was set; reads go through `SafeVolumeService::limit`
    /// so a ceiling lowered later is reflected
    gain: f32,
    looping: bool,
    paused: bool,
    started_at: Instant,
}

struct RunningGraph {
    output: OutputHandle,
    scheduler: Option<JoinHandle<()>>,
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn send(link: &mut Option<MixerLink>, command: MixerCommand) -> Result<()> {
    let link = link.as_mut().ok_or(Error::EngineNotRunning)?;
    link.send(command)
        .map_err(|_| Error::Playback("Mixer command queue full".to_string()))
}

pub struct MixerEngine {
    config: EngineConfig,
    loader: Arc<AssetLoader>,
    safety: Arc<SafeVolumeService>,
    events: EventBus,

    /// Serializes start/stop
    graph: tokio::sync::Mutex<Option<RunningGraph>>,
    running: AtomicBool,
    meter: Mutex<Option<Arc<OutputMeter>>>,

    voices: Mutex<HashMap<String, VoiceEntry>>,
    link: Mutex<Option<MixerLink>>,
    fader: Mutex<FadeController>,
    master_gain: Mutex<f32>,
    session_clock: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MixerEngine {
    pub fn new(
        config: EngineConfig,
        loader: Arc<AssetLoader>,
        safety: Arc<SafeVolumeService>,
        events: EventBus,
    ) -> Self {
        let mut config = config;
        config.max_voices = config.max_voices.max(1);

        if loader.sample_rate() != config.sample_rate {
            warn!(
                "Asset loader rate {} Hz differs from engine rate {} Hz",
                loader.sample_rate(),
                config.sample_rate
            );
        }

        Self {
            config,
            loader,
            safety,
            events,
            graph: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            meter: Mutex::new(None),
            voices: Mutex::new(HashMap::new()),
            link: Mutex::new(None),
            fader: Mutex::new(FadeController::new()),
            master_gain: Mutex::new(1.0),
            session_clock: Mutex::new(Duration::ZERO),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<AssetLoader> {
        &self.loader
    }

    pub fn safety(&self) -> &Arc<SafeVolumeService> {
        &self.safety
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Statistics of the running output, if any
    pub fn output_meter(&self) -> Option<Arc<OutputMeter>> {
        lock(&self.meter).clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the audio graph (idempotent)
    ///
    /// An output failure is returned as `AudioOutput`; the engine stays
    /// stopped and does not retry.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut graph = self.graph.lock().await;
        if graph.is_some() {
            debug!("Engine already running");
            return Ok(());
        }

        let master = *lock(&self.master_gain);
        let (mut core, link) = MixerCore::new(
            self.config.max_voices,
            self.config.command_capacity,
            self.config.ramp_frames(),
            master,
            self.safety.shared_ceiling(),
        );
        let render: RenderFn = Box::new(move |block: &mut [f32]| core.render(block));

        let backend = self.config.output.clone();
        let sample_rate = self.config.sample_rate;
        let output = tokio::task::spawn_blocking(move || {
            OutputHandle::start(&backend, sample_rate, render)
        })
        .await
        .map_err(|e| Error::AudioOutput(format!("Audio start task failed: {}", e)))?
        .map_err(|e| {
            error!("Failed to start audio graph: {}", e);
            e
        })?;

        *lock(&self.link) = Some(link);
        *lock(&self.meter) = Some(output.meter());
        *lock(&self.session_clock) = Duration::ZERO;
        self.running.store(true, Ordering::Release);

        let scheduler = self.config.tick_interval.map(|period| self.spawn_scheduler(period));
        *graph = Some(RunningGraph { output, scheduler });

        info!(
            "Audio engine started ({} Hz, max {} voices)",
            self.config.sample_rate, self.config.max_voices
        );
        self.events.emit(DozyEvent::EngineStateChanged {
            running: true,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Stop every voice, cancel fades, end the session and shut the graph
    /// down. Repeated calls are no-ops.
    pub async fn stop(&self) -> Result<()> {
        let mut graph = self.graph.lock().await;
        let Some(running) = graph.take() else {
            return Ok(());
        };

        if let Some(scheduler) = running.scheduler {
            scheduler.abort();
        }
        self.running.store(false, Ordering::Release);

        let (stopped, link) = {
            let mut voices = lock(&self.voices);
            let mut link = lock(&self.link);
            if let Err(e) = send(&mut link, MixerCommand::StopAll) {
                debug!("StopAll not delivered: {}", e);
            }
            let stopped: Vec<(String, Uuid)> = voices
                .drain()
                .map(|(sound_id, entry)| (sound_id, entry.instance_id))
                .collect();
            (stopped, link.take())
        };
        lock(&self.fader).cancel_all();
        *lock(&self.meter) = None;

        tokio::task::spawn_blocking(move || running.output.stop())
            .await
            .map_err(|e| Error::AudioOutput(format!("Audio stop task failed: {}", e)))?;

        // Retired buffers are released here, after the render thread is gone
        drop(link);

        for (sound_id, instance_id) in stopped {
            self.events.emit(DozyEvent::VoiceStopped {
                sound_id,
                instance_id,
                timestamp: Utc::now(),
            });
        }
        self.safety.end_session();

        info!("Audio engine stopped");
        self.events.emit(DozyEvent::EngineStateChanged {
            running: false,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn spawn_scheduler(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = tokio::time::Instant::now();

            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let now = tokio::time::Instant::now();
                engine.tick(now - last);
                last = now;
            }
        })
    }

    // ========================================================================
    // Voices
    // ========================================================================

    /// Play `sound_id` at `requested_gain`
    ///
    /// The gain is clamped by the safety policy. An active voice for the same
    /// identifier is replaced in place (new instance id, any fade on it
    /// cancelled); otherwise a new voice is started if the voice limit
    /// allows it. Returns the new voice's instance id.
    pub async fn play_sound(&self, sound_id: &str, requested_gain: f32, looping: bool) -> Result<Uuid> {
        if !self.is_running() {
            return Err(Error::EngineNotRunning);
        }
        // One-shots that ran out since the last tick must not hold a slot
        self.reap_finished();
        // Fail fast before decoding an asset that cannot be played
        self.check_capacity(&lock(&self.voices), sound_id)?;

        let asset = self.loader.load(sound_id).await?;
        let gain = self.safety.clamp(requested_gain);
        let instance_id = Uuid::new_v4();

        let started_session = {
            let mut voices = lock(&self.voices);
            self.check_capacity(&voices, sound_id)?;

            let mut link = lock(&self.link);
            send(
                &mut link,
                MixerCommand::Play {
                    sound_id: sound_id.to_string(),
                    instance_id,
                    buffer: Arc::clone(&asset.buffer),
                    gain,
                    looping,
                    created_at: Instant::now(),
                },
            )?;
            drop(link);

            lock(&self.fader).cancel(sound_id);
            let was_empty = voices.is_empty();
            let replaced = voices.insert(
                sound_id.to_string(),
                VoiceEntry {
                    instance_id,
                    gain,
                    looping,
                    paused: false,
                    started_at: now(),
                },
            );
            if let Some(previous) = replaced {
                debug!("Replaced voice {} ({} → {})", sound_id, previous.instance_id, instance_id);
            }
            was_empty
        };

        info!(
            "Playing {} at gain {:.2} (requested {:.2}, looping={})",
            sound_id, gain, requested_gain, looping
        );
        if started_session {
            self.safety.start_session();
        }
        self.events.emit(DozyEvent::VoiceStarted {
            sound_id: sound_id.to_string(),
            instance_id,
            gain,
            looping,
            timestamp: Utc::now(),
        });
        Ok(instance_id)
    }

    /// Play a catalog entry, applying its default gain before the policy
    pub async fn play_descriptor(&self, descriptor: &SoundDescriptor, requested_gain: f32) -> Result<Uuid> {
        self.loader.register(descriptor.clone());
        let gain = requested_gain * descriptor.default_gain_linear();
        self.play_sound(&descriptor.identifier, gain, descriptor.looping)
            .await
    }

    fn check_capacity(&self, voices: &HashMap<String, VoiceEntry>, sound_id: &str) -> Result<()> {
        if !voices.contains_key(sound_id) && voices.len() >= self.config.max_voices {
            warn!(
                "Rejecting {}: {} voices already active",
                sound_id,
                voices.len()
            );
            return Err(Error::TooManyVoices {
                max: self.config.max_voices,
            });
        }
        Ok(())
    }

    /// Stop the voice for `sound_id`; unknown identifiers are a no-op
    pub fn stop_sound(&self, sound_id: &str) -> Result<()> {
        let (instance_id, emptied) = {
            let mut voices = lock(&self.voices);
            let Some(entry) = voices.get(sound_id) else {
                return Ok(());
            };
            let instance_id = entry.instance_id;

            let mut link = lock(&self.link);
            send(&mut link, MixerCommand::Stop { instance_id })?;
            drop(link);

            voices.remove(sound_id);
            lock(&self.fader).cancel(sound_id);
            (instance_id, voices.is_empty())
        };

        debug!("Stopped {}", sound_id);
        self.events.emit(DozyEvent::VoiceStopped {
            sound_id: sound_id.to_string(),
            instance_id,
            timestamp: Utc::now(),
        });
        if emptied {
            self.safety.end_session();
        }
        Ok(())
    }

    /// Change a voice's gain (clamped); cancels any fade on it
    pub fn set_volume(&self, sound_id: &str, requested_gain: f32) -> Result<f32> {
        if !lock(&self.voices).contains_key(sound_id) {
            return Err(Error::VoiceNotFound(sound_id.to_string()));
        }
        let gain = self.safety.clamp(requested_gain);

        {
            let mut voices = lock(&self.voices);
            let entry = voices
                .get_mut(sound_id)
                .ok_or_else(|| Error::VoiceNotFound(sound_id.to_string()))?;

            let mut link = lock(&self.link);
            send(
                &mut link,
                MixerCommand::SetGain {
                    instance_id: entry.instance_id,
                    gain,
                },
            )?;
            drop(link);

            entry.gain = gain;
            if lock(&self.fader).cancel(sound_id).is_some() {
                debug!("Volume change on {} cancelled its fade", sound_id);
            }
        }

        self.events.emit(DozyEvent::VoiceGainChanged {
            sound_id: sound_id.to_string(),
            gain,
            timestamp: Utc::now(),
        });
        Ok(gain)
    }

    pub fn pause_sound(&self, sound_id: &str) -> Result<()> {
        self.set_paused(sound_id, true)
    }

    pub fn resume_sound(&self, sound_id: &str) -> Result<()> {
        self.set_paused(sound_id, false)
    }

    fn set_paused(&self, sound_id: &str, paused: bool) -> Result<()> {
        {
            let mut voices = lock(&self.voices);
            let entry = voices
                .get_mut(sound_id)
                .ok_or_else(|| Error::VoiceNotFound(sound_id.to_string()))?;
            if entry.paused == paused {
                return Ok(());
            }

            let instance_id = entry.instance_id;
            let command = if paused {
                MixerCommand::Pause { instance_id }
            } else {
                MixerCommand::Resume { instance_id }
            };
            send(&mut lock(&self.link), command)?;
            entry.paused = paused;
        }

        self.events.emit(DozyEvent::VoicePauseChanged {
            sound_id: sound_id.to_string(),
            paused,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Set the master gain (0.0-1.0); kept across engine restarts
    pub fn set_master_gain(&self, gain: f32) -> Result<f32> {
        let gain = sanitize_gain(gain);
        {
            let mut link = lock(&self.link);
            if link.is_some() {
                send(&mut link, MixerCommand::SetMasterGain(gain))?;
            }
        }
        *lock(&self.master_gain) = gain;

        self.events.emit(DozyEvent::MasterGainChanged {
            gain,
            timestamp: Utc::now(),
        });
        Ok(gain)
    }

    pub fn master_gain(&self) -> f32 {
        *lock(&self.master_gain)
    }

    // ========================================================================
    // Fades
    // ========================================================================

    /// Linear fade of a voice from its current gain to `to`
    pub fn fade(&self, sound_id: &str, to: f32, duration: Duration) -> Result<()> {
        self.fade_with_curve(sound_id, to, duration, FadeCurve::Linear, false)
    }

    /// Fade with an explicit curve; with `stop_on_complete` the voice is
    /// stopped once the target is reached
    pub fn fade_with_curve(
        &self,
        sound_id: &str,
        to: f32,
        duration: Duration,
        curve: FadeCurve,
        stop_on_complete: bool,
    ) -> Result<()> {
        if !lock(&self.voices).contains_key(sound_id) {
            return Err(Error::VoiceNotFound(sound_id.to_string()));
        }
        let target = self.safety.clamp(to);

        let voices = lock(&self.voices);
        let entry = voices
            .get(sound_id)
            .ok_or_else(|| Error::VoiceNotFound(sound_id.to_string()))?;
        let from = self.safety.limit(entry.gain);
        lock(&self.fader).fade_with_curve(
            sound_id,
            entry.instance_id,
            from,
            target,
            duration,
            curve,
            stop_on_complete,
        );

        debug!(
            "Fading {} {:.2} → {:.2} over {:?} ({})",
            sound_id,
            from,
            target,
            duration,
            curve.as_str()
        );
        Ok(())
    }

    /// Fade a voice to silence, then stop it
    pub fn fade_out_and_stop(&self, sound_id: &str, duration: Duration) -> Result<()> {
        self.fade_with_curve(sound_id, 0.0, duration, FadeCurve::Linear, true)
    }

    /// Fade every active voice to silence and stop it (sleep timer)
    ///
    /// Returns the number of voices fading out.
    pub fn fade_out_all(&self, duration: Duration) -> usize {
        let voices = lock(&self.voices);
        let mut fader = lock(&self.fader);
        for (sound_id, entry) in voices.iter() {
            fader.fade_with_curve(
                sound_id,
                entry.instance_id,
                self.safety.limit(entry.gain),
                0.0,
                duration,
                FadeCurve::Linear,
                true,
            );
        }

        info!("Fading out {} voices over {:?}", voices.len(), duration);
        voices.len()
    }

    pub fn is_fading(&self, sound_id: &str) -> bool {
        lock(&self.fader).is_fading(sound_id)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn voice_count(&self) -> usize {
        lock(&self.voices).len()
    }

    /// Current gain of the voice for `sound_id`, limited by the live ceiling
    pub fn voice_gain(&self, sound_id: &str) -> Option<f32> {
        let gain = lock(&self.voices).get(sound_id).map(|entry| entry.gain)?;
        Some(self.safety.limit(gain))
    }

    pub fn instance_id(&self, sound_id: &str) -> Option<Uuid> {
        lock(&self.voices).get(sound_id).map(|entry| entry.instance_id)
    }

    /// Snapshot of all active voices, ordered by identifier
    pub fn active_voices(&self) -> Vec<VoiceSnapshot> {
        let voices = lock(&self.voices);
        let fader = lock(&self.fader);
        let now = now();

        let mut snapshots: Vec<VoiceSnapshot> = voices
            .iter()
            .map(|(sound_id, entry)| VoiceSnapshot {
                sound_id: sound_id.clone(),
                instance_id: entry.instance_id,
                gain: self.safety.limit(entry.gain),
                looping: entry.looping,
                paused: entry.paused,
                fading: fader.is_fading(sound_id),
                playing_secs: now.saturating_duration_since(entry.started_at).as_secs_f64(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.sound_id.cmp(&b.sound_id));
        snapshots
    }

    // ========================================================================
    // Scheduler
    // ========================================================================

    /// One scheduler step: drain render events, advance fades by `dt`, and
    /// tick the safety session when its interval has elapsed
    ///
    /// Called by the background scheduler; with `tick_interval: None` the
    /// caller drives it directly.
    pub fn tick(&self, dt: Duration) {
        let mut events = Vec::new();

        let emptied = {
            let mut voices = lock(&self.voices);
            let was_empty = voices.is_empty();
            let mut link = lock(&self.link);

            self.drain_render_events(&mut voices, &mut link, &mut events);

            let steps = lock(&self.fader).advance(dt, |sound_id, instance_id| {
                voices
                    .get(sound_id)
                    .map_or(false, |entry| entry.instance_id == instance_id)
            });
            for step in steps {
                self.apply_fade_step(step, &mut voices, &mut link, &mut events);
            }

            !was_empty && voices.is_empty()
        };

        for event in events {
            self.events.emit(event);
        }
        if emptied {
            self.safety.end_session();
        }

        let session_due = {
            let mut clock = lock(&self.session_clock);
            *clock += dt;
            if *clock >= self.config.session_tick_interval {
                *clock = Duration::ZERO;
                true
            } else {
                false
            }
        };
        if session_due {
            self.safety.tick();
        }
    }

    /// Drop voices the render core reported finished, outside the scheduler
    fn reap_finished(&self) {
        let mut events = Vec::new();
        let emptied = {
            let mut voices = lock(&self.voices);
            let was_empty = voices.is_empty();
            let mut link = lock(&self.link);
            self.drain_render_events(&mut voices, &mut link, &mut events);
            !was_empty && voices.is_empty()
        };

        for event in events {
            self.events.emit(event);
        }
        if emptied {
            self.safety.end_session();
        }
    }

    fn drain_render_events(
        &self,
        voices: &mut HashMap<String, VoiceEntry>,
        link: &mut Option<MixerLink>,
        events: &mut Vec<DozyEvent>,
    ) {
        let Some(link) = link.as_mut() else {
            return;
        };

        while let Some(event) = link.next_event() {
            match event {
                RenderEvent::VoiceRetired {
                    sound_id,
                    instance_id,
                    finished: true,
                    ..
                } => {
                    let current = voices
                        .get(&sound_id)
                        .map_or(false, |entry| entry.instance_id == instance_id);
                    if current {
                        voices.remove(&sound_id);
                        debug!("{} finished", sound_id);
                        events.push(DozyEvent::VoiceFinished {
                            sound_id,
                            instance_id,
                            timestamp: Utc::now(),
                        });
                    }
                }
                // Stopped voices were already removed from the mirror; the
                // retired buffer is dropped here
                RenderEvent::VoiceRetired { .. } | RenderEvent::BufferRetired(_) => {}
            }
        }
    }

    fn apply_fade_step(
        &self,
        step: FadeStep,
        voices: &mut HashMap<String, VoiceEntry>,
        link: &mut Option<MixerLink>,
        events: &mut Vec<DozyEvent>,
    ) {
        let stop = step.completed && step.stop_on_complete;
        let command = if stop {
            MixerCommand::Stop {
                instance_id: step.instance_id,
            }
        } else {
            MixerCommand::SetGain {
                instance_id: step.instance_id,
                gain: step.gain,
            }
        };

        if let Err(e) = send(link, command) {
            warn!("Dropped fade step for {}: {}", step.sound_id, e);
            return;
        }

        if stop {
            voices.remove(&step.sound_id);
        } else if let Some(entry) = voices.get_mut(&step.sound_id) {
            entry.gain = step.gain;
        }

        if step.completed {
            debug!("Fade on {} completed at {:.2}", step.sound_id, step.gain);
            events.push(DozyEvent::FadeCompleted {
                sound_id: step.sound_id.clone(),
                gain: step.gain,
                timestamp: Utc::now(),
            });
        }
        if stop {
            events.push(DozyEvent::VoiceStopped {
                sound_id: step.sound_id,
                instance_id: step.instance_id,
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::{DecodedAudio, SoundDecoder};
    use crate::safety::SafetyConfig;
    use dozy_common::MemorySettingsStore;
    use std::path::Path;

    struct ToneDecoder;

    impl SoundDecoder for ToneDecoder {
        fn decode(&self, _path: &Path) -> Result<DecodedAudio> {
            Ok(DecodedAudio {
                samples: vec![0.5; 4410 * 2],
                sample_rate: TARGET_SAMPLE_RATE,
                channels: 2,
            })
        }
    }

    fn engine(max_voices: usize) -> (Arc<MixerEngine>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for name in ["rain", "fan", "waves", "chime"] {
            std::fs::write(dir.path().join(format!("{}.wav", name)), b"stub").unwrap();
        }
        let loader = Arc::new(AssetLoader::with_decoder(
            dir.path(),
            TARGET_SAMPLE_RATE,
            Arc::new(ToneDecoder),
        ));
        let events = EventBus::default();
        let safety = Arc::new(SafeVolumeService::new(
            SafetyConfig::default(),
            Arc::new(MemorySettingsStore::new()),
            events.clone(),
        ));
        let config = EngineConfig {
            max_voices,
            tick_interval: None,
            output: OutputBackend::null(),
            ..EngineConfig::default()
        };
        (Arc::new(MixerEngine::new(config, loader, safety, events)), dir)
    }

    #[test]
    fn test_ramp_frames_at_default_rate() {
        assert_eq!(EngineConfig::default().ramp_frames(), 441);
    }

    #[tokio::test]
    async fn test_play_requires_running_engine() {
        let (engine, _dir) = engine(4);
        let result = engine.play_sound("rain", 0.3, true).await;
        assert!(matches!(result, Err(Error::EngineNotRunning)));
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let (engine, _dir) = engine(4);
        engine.start().await.unwrap();
        engine.start().await.unwrap();
        assert!(engine.is_running());

        engine.play_sound("rain", 0.3, true).await.unwrap();
        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
        assert!(!engine.is_running());
        assert_eq!(engine.voice_count(), 0);
    }

    #[tokio::test]
    async fn test_set_volume_cancels_fade() {
        let (engine, _dir) = engine(4);
        engine.start().await.unwrap();
        engine.play_sound("rain", 0.2, true).await.unwrap();

        engine.fade("rain", 0.5, Duration::from_secs(1)).unwrap();
        engine.tick(Duration::from_millis(100));
        assert!(engine.is_fading("rain"));

        assert_eq!(engine.set_volume("rain", 0.4).unwrap(), 0.4);
        assert!(!engine.is_fading("rain"));
        engine.tick(Duration::from_millis(900));
        assert_eq!(engine.voice_gain("rain"), Some(0.4));

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_fade_out_and_stop_removes_voice() {
        let (engine, _dir) = engine(4);
        engine.start().await.unwrap();
        engine.play_sound("rain", 0.5, true).await.unwrap();
        engine.play_sound("fan", 0.5, true).await.unwrap();

        assert_eq!(engine.fade_out_all(Duration::from_millis(200)), 2);
        for _ in 0..4 {
            engine.tick(Duration::from_millis(50));
        }
        assert_eq!(engine.voice_count(), 0);
        assert!(!engine.safety().is_session_active());

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (engine, _dir) = engine(4);
        engine.start().await.unwrap();
        engine.play_sound("rain", 0.3, true).await.unwrap();

        engine.pause_sound("rain").unwrap();
        assert!(engine.active_voices()[0].paused);
        engine.resume_sound("rain").unwrap();
        assert!(!engine.active_voices()[0].paused);
        assert!(matches!(
            engine.pause_sound("fan"),
            Err(Error::VoiceNotFound(_))
        ));

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_lowered_ceiling_limits_reported_gain_and_fade_start() {
        let (engine, _dir) = engine(4);
        engine.start().await.unwrap();
        engine.play_sound("rain", 0.6, true).await.unwrap();
        assert_eq!(engine.voice_gain("rain"), Some(0.6));

        assert_eq!(engine.safety().set_ceiling(0.2), 0.2);
        assert_eq!(engine.voice_gain("rain"), Some(0.2));
        assert_eq!(engine.active_voices()[0].gain, 0.2);

        // Ramp starts at the ceiling, not at the gain requested before it
        engine.fade("rain", 0.1, Duration::from_secs(1)).unwrap();
        engine.tick(Duration::from_millis(100));
        let mut previous = engine.voice_gain("rain").unwrap();
        assert!((previous - 0.19).abs() < 1e-4, "first step {}", previous);

        for _ in 0..9 {
            engine.tick(Duration::from_millis(100));
            let gain = engine.voice_gain("rain").unwrap();
            assert!(gain < previous, "{} not below {}", gain, previous);
            previous = gain;
        }
        assert_eq!(previous, 0.1);

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_finished_one_shot_frees_its_slot_without_tick() {
        let (engine, _dir) = engine(1);
        let mut rx = engine.events().subscribe();
        engine.start().await.unwrap();

        // 100 ms one-shot; the scheduler is not running
        engine.play_sound("chime", 0.3, false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        engine.play_sound("fan", 0.3, true).await.unwrap();
        assert_eq!(engine.voice_count(), 1);
        assert!(engine.instance_id("chime").is_none());

        let mut finished = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, DozyEvent::VoiceFinished { ref sound_id, .. } if sound_id == "chime") {
                finished = true;
            }
        }
        assert!(finished);

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_master_gain_is_sanitized_and_kept() {
        let (engine, _dir) = engine(4);
        assert_eq!(engine.set_master_gain(1.5).unwrap(), 1.0);
        assert_eq!(engine.set_master_gain(0.4).unwrap(), 0.4);
        engine.start().await.unwrap();
        assert_eq!(engine.master_gain(), 0.4);
        engine.stop().await.unwrap();
    }
}
