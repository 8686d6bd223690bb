//! Audio output using cpal
//!
//! `AudioSink` owns one cpal output stream fed from a `ringbuf` ring. The
//! decode side holds the producer and pushes interleaved stereo f32 with
//! `push`; the cpal callback owns the consumer, pops frames, applies the
//! per-channel gains from `OutputGain`, and counts the frames it actually
//! played so position can be derived from what was heard rather than what
//! was decoded. Neither side ever blocks the other.
//!
//! `cpal::Stream` is not `Send`: an `AudioSink` must be created, used and
//! dropped on the same thread (the backend worker thread).

use crate::backend::OutputParams;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ring buffer length; the PCM worker keeps far less than this queued
const RING_SECONDS: usize = 2;

/// Volume, balance and mute shared with the audio callback
#[derive(Debug)]
pub struct OutputGain {
    volume: AtomicU32,
    balance: AtomicU32,
    muted: AtomicBool,
}

impl OutputGain {
    pub fn new(params: OutputParams) -> Self {
        let gain = Self {
            volume: AtomicU32::new(0),
            balance: AtomicU32::new(0),
            muted: AtomicBool::new(false),
        };
        gain.set(params);
        gain
    }

    pub fn set(&self, params: OutputParams) {
        self.volume
            .store(params.volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        self.balance
            .store(params.balance.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
        self.muted.store(params.mute, Ordering::Relaxed);
    }

    /// Left and right multipliers
    ///
    /// Balance attenuates the opposite channel linearly: at +1 the left
    /// channel is silent, at -1 the right one is.
    pub fn channel_gains(&self) -> (f32, f32) {
        if self.muted.load(Ordering::Relaxed) {
            return (0.0, 0.0);
        }
        let volume = f32::from_bits(self.volume.load(Ordering::Relaxed));
        let balance = f32::from_bits(self.balance.load(Ordering::Relaxed));
        let left = volume * (1.0 - balance.max(0.0));
        let right = volume * (1.0 + balance.min(0.0));
        (left, right)
    }
}

impl Default for OutputGain {
    fn default() -> Self {
        Self::new(OutputParams::default())
    }
}

/// Sample positions shared by both ends of the ring
///
/// Positions count interleaved samples since the ring was created. `clear`
/// marks everything pushed so far as stale; the consumer skips stale samples
/// before playing, so the producer never touches the consumer.
#[derive(Debug, Default)]
struct QueueCursor {
    /// Samples written by the producer
    pushed: AtomicU64,
    /// Samples taken by the consumer, played or skipped
    popped: AtomicU64,
    /// Samples before this position are skipped
    discard_until: AtomicU64,
    /// Frames heard since the last clear
    frames_played: AtomicU64,
}

/// Producer end of the output ring (decode side)
pub struct SampleQueue {
    producer: HeapProd<f32>,
    cursor: Arc<QueueCursor>,
}

/// Consumer end of the output ring (audio callback)
pub struct SampleTap {
    consumer: HeapCons<f32>,
    cursor: Arc<QueueCursor>,
    popped: u64,
    played: u64,
}

/// Ring of `capacity_frames` stereo frames split into its two ends
pub fn sample_queue(capacity_frames: usize) -> (SampleQueue, SampleTap) {
    let (producer, consumer) = HeapRb::<f32>::new(capacity_frames.max(1) * 2).split();
    let cursor = Arc::new(QueueCursor::default());
    (
        SampleQueue {
            producer,
            cursor: Arc::clone(&cursor),
        },
        SampleTap {
            consumer,
            cursor,
            popped: 0,
            played: 0,
        },
    )
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleQueue")
            .field("buffered_frames", &self.buffered_frames())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl SampleQueue {
    /// Append interleaved stereo samples; returns how many were queued
    ///
    /// Only whole frames are written. The caller keeps the ring short of
    /// full, so a partial write means audio was dropped.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let room = self.producer.vacant_len() & !1;
        let take = samples.len().min(room) & !1;
        let written = self.producer.push_slice(&samples[..take]);
        self.cursor.pushed.fetch_add(written as u64, Ordering::Release);
        if written < samples.len() {
            warn!(
                "Output ring full, dropped {} samples",
                samples.len() - written
            );
        }
        written
    }

    /// Frames waiting to be played
    pub fn buffered_frames(&self) -> usize {
        let popped = self.cursor.popped.load(Ordering::Acquire);
        let discard_until = self.cursor.discard_until.load(Ordering::Acquire);
        let stale = discard_until.saturating_sub(popped);
        let occupied = self.producer.occupied_len() as u64;
        (occupied.saturating_sub(stale) / 2) as usize
    }

    /// Mark queued audio stale and restart the played-frame count
    pub fn clear(&self) {
        let pushed = self.cursor.pushed.load(Ordering::Acquire);
        self.cursor.discard_until.store(pushed, Ordering::Release);
        self.cursor.frames_played.store(0, Ordering::Release);
    }

    /// Frames played since the last `clear`
    pub fn frames_played(&self) -> u64 {
        self.cursor.frames_played.load(Ordering::Acquire)
    }
}

impl SampleTap {
    /// Start a callback period: drop audio queued before the last clear
    pub fn begin(&mut self) {
        let discard_until = self.cursor.discard_until.load(Ordering::Acquire);
        while self.popped < discard_until && self.consumer.try_pop().is_some() {
            self.popped += 1;
        }
        self.played = 0;
    }

    /// Next stereo frame, or `None` on underrun
    pub fn next_frame(&mut self) -> Option<(f32, f32)> {
        if self.consumer.occupied_len() < 2 {
            return None;
        }
        let left = self.consumer.try_pop()?;
        let right = self.consumer.try_pop().unwrap_or(0.0);
        self.popped += 2;
        self.played += 1;
        Some((left, right))
    }

    /// End a callback period: publish what was consumed and heard
    pub fn finish(&mut self) {
        self.cursor.popped.store(self.popped, Ordering::Release);
        if self.played > 0 {
            self.cursor
                .frames_played
                .fetch_add(self.played, Ordering::AcqRel);
        }
    }
}

/// Cpal output stream fed through a lock-free ring buffer
pub struct AudioSink {
    stream: Stream,
    queue: SampleQueue,
    sample_rate: u32,
    device_name: String,
}

impl std::fmt::Debug for AudioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSink")
            .field("device", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("buffered_frames", &self.buffered_frames())
            .finish()
    }
}

impl AudioSink {
    /// List available output device names
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        Ok(devices)
    }

    /// Open the output device and build a paused stream
    ///
    /// A named device that cannot be found falls back to the default device.
    /// `preferred_rate` is used when the device supports it, so most tracks
    /// need no resampling.
    pub fn open(
        device_name: Option<&str>,
        preferred_rate: u32,
        gain: Arc<OutputGain>,
    ) -> Result<Self> {
        let device = select_device(device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = best_config(&device, preferred_rate)?;

        debug!(
            "Audio config: device={}, sample_rate={}, channels={}, format={:?}",
            device_name, config.sample_rate.0, config.channels, sample_format
        );

        let (queue, tap) = sample_queue(config.sample_rate.0 as usize * RING_SECONDS);

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, tap, gain)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, tap, gain)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, tap, gain)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };
        stream
            .pause()
            .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;

        Ok(Self {
            stream,
            queue,
            sample_rate: config.sample_rate.0,
            device_name,
        })
    }

    /// Device sample rate; pushed audio must be at this rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn play(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))
    }

    /// Append interleaved stereo samples at the device rate
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.queue.push(samples)
    }

    /// Frames waiting to be played
    pub fn buffered_frames(&self) -> usize {
        self.queue.buffered_frames()
    }

    /// Discard queued audio and restart the played-frame count
    pub fn clear(&self) {
        self.queue.clear();
    }

    /// Audio heard since the last `clear`
    pub fn played(&self) -> Duration {
        let frames = self.queue.frames_played();
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using audio device: {}", name);
            return Ok(device);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    host.default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))
}

/// Prefer stereo f32 at `preferred_rate`, then the device default
fn best_config(device: &Device, preferred_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= preferred_rate
            && config.max_sample_rate().0 >= preferred_rate
            && config.sample_format() == SampleFormat::F32
    });
    if let Some(config) = preferred {
        let sample_format = config.sample_format();
        return Ok((
            config.with_sample_rate(cpal::SampleRate(preferred_rate)).config(),
            sample_format,
        ));
    }

    let config = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    Ok((config.config(), config.sample_format()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut tap: SampleTap,
    gain: Arc<OutputGain>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let (left_gain, right_gain) = gain.channel_gains();
                tap.begin();
                for frame in data.chunks_mut(channels) {
                    let (left, right) = tap.next_frame().unwrap_or((0.0, 0.0));
                    let left = (left * left_gain).clamp(-1.0, 1.0);
                    let right = (right * right_gain).clamp(-1.0, 1.0);

                    if channels == 1 {
                        frame[0] = T::from_sample((left + right) * 0.5);
                        continue;
                    }
                    for (index, sample) in frame.iter_mut().enumerate() {
                        *sample = T::from_sample(match index {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        });
                    }
                }
                tap.finish();
            },
            move |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
