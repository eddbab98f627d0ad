//! Real-time mixer core
//!
//! `MixerCore` lives on the audio thread and is the only owner of the voice
//! list. The control side talks to it exclusively through two lock-free SPSC
//! rings (ringbuf):
//!
//! - `MixerCommand`s flow in and are all applied at the top of each block,
//!   so a stop issued before a block is pulled is audible in that block.
//! - `RenderEvent`s flow out: finished voices and retired buffers. Buffers
//!   are handed back so their memory is freed on the control side.
//!
//! Output per voice is `min(voice_gain * master_gain, ceiling)`; the ceiling
//! is read from the safety policy's atomic on every block.

use crate::audio::types::SoundBuffer;
use crate::playback::voice::{sanitize_gain, RenderOutcome, Voice};
use crate::safety::SharedCeiling;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Control → audio thread requests
#[derive(Debug)]
pub enum MixerCommand {
    /// Start a voice, or replace the voice already playing `sound_id`
    Play {
        sound_id: String,
        instance_id: Uuid,
        buffer: Arc<SoundBuffer>,
        gain: f32,
        looping: bool,
        created_at: Instant,
    },
    SetGain { instance_id: Uuid, gain: f32 },
    Pause { instance_id: Uuid },
    Resume { instance_id: Uuid },
    Stop { instance_id: Uuid },
    StopAll,
    SetMasterGain(f32),
}

/// Audio thread → control notifications
#[derive(Debug)]
pub enum RenderEvent {
    /// A voice left the mix; `finished` is true when a one-shot ran out
    VoiceRetired {
        sound_id: String,
        instance_id: Uuid,
        buffer: Option<Arc<SoundBuffer>>,
        finished: bool,
    },

    /// Buffer replaced by an in-place voice swap
    BufferRetired(Arc<SoundBuffer>),
}

/// Control-side ends of the mixer rings
pub struct MixerLink {
    pub commands: HeapProd<MixerCommand>,
    pub events: HeapCons<RenderEvent>,
}

impl MixerLink {
    /// Queue a command; returns it back when the ring is full
    pub fn send(&mut self, command: MixerCommand) -> Result<(), MixerCommand> {
        self.commands.try_push(command)
    }

    /// Pop the next render event, if any
    pub fn next_event(&mut self) -> Option<RenderEvent> {
        self.events.try_pop()
    }
}

/// Audio-thread mixer
pub struct MixerCore {
    voices: Vec<Voice>,
    commands: HeapCons<MixerCommand>,
    events: HeapProd<RenderEvent>,
    master_gain: f32,
    ceiling: SharedCeiling,
    ramp_frames: usize,
}

impl MixerCore {
    /// Create a core and the matching control link
    ///
    /// `max_voices` is reserved up front so the audio thread never grows the
    /// voice list.
    pub fn new(
        max_voices: usize,
        command_capacity: usize,
        ramp_frames: usize,
        master_gain: f32,
        ceiling: SharedCeiling,
    ) -> (Self, MixerLink) {
        let (command_tx, command_rx) = HeapRb::<MixerCommand>::new(command_capacity.max(1)).split();
        // A voice yields at most one retired buffer and one retirement, and
        // the engine drains finished voices before every play
        let (event_tx, event_rx) =
            HeapRb::<RenderEvent>::new((command_capacity.max(1) + max_voices) * 2).split();

        let core = Self {
            voices: Vec::with_capacity(max_voices.max(1)),
            commands: command_rx,
            events: event_tx,
            master_gain: sanitize_gain(master_gain),
            ceiling,
            ramp_frames,
        };

        let link = MixerLink {
            commands: command_tx,
            events: event_rx,
        };

        (core, link)
    }

    /// Voices currently in the mix
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Render one interleaved stereo block
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        self.apply_commands();

        let ceiling = self.ceiling.get();
        let master = self.master_gain;

        let mut index = 0;
        while index < self.voices.len() {
            match self.voices[index].render(out, master, ceiling) {
                RenderOutcome::Finished => self.retire(index, true),
                RenderOutcome::Continue | RenderOutcome::Silent => index += 1,
            }
        }
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                MixerCommand::Play {
                    sound_id,
                    instance_id,
                    buffer,
                    gain,
                    looping,
                    created_at,
                } => self.play(sound_id, instance_id, buffer, gain, looping, created_at),
                MixerCommand::SetGain { instance_id, gain } => {
                    if let Some(voice) = self.find_mut(instance_id) {
                        voice.set_gain(gain);
                    }
                }
                MixerCommand::Pause { instance_id } => {
                    if let Some(voice) = self.find_mut(instance_id) {
                        voice.pause();
                    }
                }
                MixerCommand::Resume { instance_id } => {
                    if let Some(voice) = self.find_mut(instance_id) {
                        voice.resume();
                    }
                }
                MixerCommand::Stop { instance_id } => {
                    if let Some(index) = self.voices.iter().position(|v| v.instance_id() == instance_id) {
                        self.voices[index].stop();
                        self.retire(index, false);
                    }
                }
                MixerCommand::StopAll => {
                    while !self.voices.is_empty() {
                        let last = self.voices.len() - 1;
                        self.voices[last].stop();
                        self.retire(last, false);
                    }
                }
                MixerCommand::SetMasterGain(gain) => {
                    self.master_gain = sanitize_gain(gain);
                }
            }
        }
    }

    fn play(
        &mut self,
        sound_id: String,
        instance_id: Uuid,
        buffer: Arc<SoundBuffer>,
        gain: f32,
        looping: bool,
        created_at: Instant,
    ) {
        if let Some(voice) = self.voices.iter_mut().find(|v| v.sound_id() == sound_id) {
            // Same sound: replace in place, never duplicate
            let previous = voice.reschedule(instance_id, buffer, looping);
            voice.set_gain(gain);
            voice.play();
            if let Some(previous) = previous {
                let _ = self.events.try_push(RenderEvent::BufferRetired(previous));
            }
            return;
        }

        if self.voices.len() == self.voices.capacity() {
            // The control side enforces the limit; never allocate here
            return;
        }

        let mut voice = Voice::new(sound_id, instance_id, self.ramp_frames, created_at);
        voice.schedule(buffer, looping);
        voice.set_gain(gain);
        voice.play();
        self.voices.push(voice);
    }

    fn find_mut(&mut self, instance_id: Uuid) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.instance_id() == instance_id)
    }

    fn retire(&mut self, index: usize, finished: bool) {
        let mut voice = self.voices.swap_remove(index);
        let buffer = voice.release();
        let (sound_id, instance_id) = voice.into_identity();
        let _ = self.events.try_push(RenderEvent::VoiceRetired {
            sound_id,
            instance_id,
            buffer,
            finished,
        });
    }
}
