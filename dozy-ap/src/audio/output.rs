//! Audio output using cpal, plus a device-less render thread
//!
//! Both backends own the render callback on a dedicated thread:
//! - `Device`: a cpal output stream. `cpal::Stream` is not `Send`, so the
//!   stream is created, run and dropped on its own "dozy-audio" thread.
//! - `Null`: a paced thread that pulls blocks at real-time rate and discards
//!   them. Used for headless operation and tests.
//!
//! The render callback fills interleaved stereo f32 blocks. It must not
//! block; the callback never takes a lock in this module.

use crate::audio::types::CHANNELS;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Render callback: fill an interleaved stereo block
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Output backend selection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum OutputBackend {
    /// Real audio device via cpal
    Device {
        /// Device name (None = system default)
        #[serde(default)]
        device_name: Option<String>,
        /// Fixed buffer size in frames (None = device default)
        #[serde(default)]
        buffer_size: Option<u32>,
    },

    /// No device; blocks are rendered on a paced thread and discarded
    Null {
        #[serde(default = "default_null_block_frames")]
        block_frames: usize,
    },
}

fn default_null_block_frames() -> usize {
    512
}

impl Default for OutputBackend {
    fn default() -> Self {
        OutputBackend::Device {
            device_name: None,
            buffer_size: None,
        }
    }
}

impl OutputBackend {
    pub fn null() -> Self {
        OutputBackend::Null {
            block_frames: default_null_block_frames(),
        }
    }
}

/// Lock-free statistics published by the render thread
#[derive(Debug, Default)]
pub struct OutputMeter {
    blocks: AtomicU64,
    peak_bits: AtomicU32,
    errors: AtomicU32,
    failed: AtomicBool,
}

impl OutputMeter {
    /// Record one rendered block
    pub fn record_block(&self, block: &[f32]) {
        let peak = block.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of blocks rendered since the output started
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Absolute peak of the most recent block
    pub fn last_peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    /// Stream errors reported by the device since start
    pub fn error_count(&self) -> u32 {
        self.errors.load(Ordering::Relaxed)
    }

    /// True once the device reported a stream error
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn record_error(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Running output; stopping joins the render thread
pub struct OutputHandle {
    shutdown_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    meter: Arc<OutputMeter>,
}

impl OutputHandle {
    /// Open the backend and start pulling blocks from `render`
    ///
    /// Returns once the output is actually running, or with the error that
    /// prevented it from starting.
    pub fn start(backend: &OutputBackend, sample_rate: u32, render: RenderFn) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let meter = Arc::new(OutputMeter::default());
        let thread_meter = Arc::clone(&meter);
        let backend = backend.clone();

        let thread = std::thread::Builder::new()
            .name("dozy-audio".to_string())
            .spawn(move || match backend {
                OutputBackend::Device {
                    device_name,
                    buffer_size,
                } => run_device(
                    device_name,
                    buffer_size,
                    sample_rate,
                    render,
                    thread_meter,
                    ready_tx,
                    shutdown_rx,
                ),
                OutputBackend::Null { block_frames } => run_null(
                    block_frames,
                    sample_rate,
                    render,
                    thread_meter,
                    ready_tx,
                    shutdown_rx,
                ),
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shutdown_tx,
                thread: Some(thread),
                meter,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::AudioOutput(
                    "Audio thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    pub fn meter(&self) -> Arc<OutputMeter> {
        Arc::clone(&self.meter)
    }

    /// Stop the output and wait for the render thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio thread panicked during shutdown");
            }
        }
    }
}

impl Drop for OutputHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_null(
    block_frames: usize,
    sample_rate: u32,
    mut render: RenderFn,
    meter: Arc<OutputMeter>,
    ready_tx: mpsc::Sender<Result<()>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let block_frames = block_frames.max(1);
    let period = Duration::from_secs_f64(block_frames as f64 / sample_rate.max(1) as f64);
    let mut block = vec![0.0f32; block_frames * CHANNELS];
    let mut deadline = Instant::now();

    info!(
        "Null output running ({} frames per block, {:?} period)",
        block_frames, period
    );
    let _ = ready_tx.send(Ok(()));

    loop {
        render(&mut block);
        meter.record_block(&block);

        deadline += period;
        let now = Instant::now();
        let wait = deadline.saturating_duration_since(now);
        if wait.is_zero() {
            // Fell behind; resynchronize instead of bursting
            deadline = now;
        }
        match shutdown_rx.recv_timeout(wait) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    debug!("Null output stopped");
}

fn run_device(
    device_name: Option<String>,
    buffer_size: Option<u32>,
    sample_rate: u32,
    render: RenderFn,
    meter: Arc<OutputMeter>,
    ready_tx: mpsc::Sender<Result<()>>,
    shutdown_rx: mpsc::Receiver<()>,
) {
    let started = AudioOutput::open(device_name, sample_rate, buffer_size)
        .and_then(|mut output| output.start(render, meter).map(|_| output));

    let mut output = match started {
        Ok(output) => {
            let _ = ready_tx.send(Ok(()));
            output
        }
        Err(e) => {
            error!("Audio output failed to start: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = shutdown_rx.recv();

    if let Err(e) = output.stop() {
        warn!("Error while stopping audio stream: {}", e);
    }
}

/// Audio device output using cpal
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device at the engine sample rate
    ///
    /// A named device that cannot be found falls back to the default device.
    pub fn open(
        device_name: Option<String>,
        sample_rate: u32,
        buffer_size: Option<u32>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name.as_ref() {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;

                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (mut config, sample_format) = Self::get_config(&device, sample_rate)?;

        if let Some(size) = buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Pick a configuration running at exactly `sample_rate`
    ///
    /// Prefers stereo f32. The engine never resamples at render time, so a
    /// device that cannot run at the engine rate is an error.
    fn get_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
            .filter(|c| {
                c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate
            })
            .collect();

        let rank = |c: &cpal::SupportedStreamConfigRange| {
            let format_rank = match c.sample_format() {
                SampleFormat::F32 => 0,
                SampleFormat::I16 => 1,
                SampleFormat::U16 => 2,
                _ => 3,
            };
            let channel_rank = if c.channels() == 2 { 0 } else { 1 };
            (format_rank, channel_rank)
        };

        let best = supported
            .into_iter()
            .filter(|c| {
                matches!(
                    c.sample_format(),
                    SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
                )
            })
            .min_by_key(rank)
            .ok_or_else(|| {
                Error::AudioOutput(format!("Device does not support {}Hz output", sample_rate))
            })?;

        let sample_format = best.sample_format();
        let config = best.with_sample_rate(cpal::SampleRate(sample_rate)).config();
        Ok((config, sample_format))
    }

    /// Build and start the stream
    pub fn start(&mut self, render: RenderFn, meter: Arc<OutputMeter>) -> Result<()> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(render, meter, |s| s)?,
            SampleFormat::I16 => {
                self.build_stream::<i16>(render, meter, |s| (s * i16::MAX as f32) as i16)?
            }
            SampleFormat::U16 => {
                self.build_stream::<u16>(render, meter, |s| ((s + 1.0) * 32767.5) as u16)?
            }
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        info!("Audio stream started successfully");
        Ok(())
    }

    /// Stream whose callback renders stereo f32 and maps it onto the device
    /// layout and sample type
    fn build_stream<T>(
        &self,
        mut render: RenderFn,
        meter: Arc<OutputMeter>,
        convert: fn(f32) -> T,
    ) -> Result<Stream>
    where
        T: cpal::SizedSample + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let error_meter = Arc::clone(&meter);

        // Sized generously up front; only grows if the device asks for a
        // larger block than expected.
        let mut scratch = vec![0.0f32; 8192 * CHANNELS];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    let needed = frames * CHANNELS;
                    if scratch.len() < needed {
                        scratch.resize(needed, 0.0);
                    }
                    let block = &mut scratch[..needed];
                    render(block);
                    meter.record_block(block);

                    for (out, stereo) in data.chunks_mut(channels).zip(block.chunks_exact(CHANNELS)) {
                        let (left, right) = (stereo[0].clamp(-1.0, 1.0), stereo[1].clamp(-1.0, 1.0));
                        match out.len() {
                            1 => out[0] = convert((left + right) * 0.5),
                            _ => {
                                out[0] = convert(left);
                                out[1] = convert(right);
                                for extra in out.iter_mut().skip(2) {
                                    *extra = convert(0.0);
                                }
                            }
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_meter.record_error();
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Pause and drop the stream
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            info!("Audio stream stopped");
        }
        Ok(())
    }
}
