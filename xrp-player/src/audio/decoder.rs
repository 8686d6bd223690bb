//! Track decoder using symphonia
//!
//! Wraps a symphonia format reader and codec for one track. Output is always
//! interleaved stereo f32 (`[L, R, L, R, ...]`):
//! - Mono sources are duplicated to both channels
//! - Sources with more than two channels are downmixed (even channels left,
//!   odd channels right)
//!
//! The decoder is fed either from a local file or from any `MediaSource`
//! (the streaming backend hands in an HTTP body).

use crate::error::{Error, Result};
use crate::track::AudioFormat;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Decoded stereo chunk
#[derive(Debug)]
pub struct DecodedChunk {
    /// Interleaved stereo f32 samples
    pub samples: Vec<f32>,

    /// Stream position of the first frame in this chunk, when known
    pub timestamp: Option<Duration>,
}

impl DecodedChunk {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Decoder for a single audio track
pub struct TrackDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    time_base: Option<TimeBase>,
    duration: Option<Duration>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl std::fmt::Debug for TrackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackDecoder")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration", &self.duration)
            .finish()
    }
}

impl TrackDecoder {
    /// Open a local file
    pub fn open_file(path: &Path, format: AudioFormat) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        Self::open(mss, format)
    }

    /// Probe and open an arbitrary media stream
    pub fn open(mss: MediaSourceStream, format: AudioFormat) -> Result<Self> {
        let mut hint = Hint::new();
        if let Some(ext) = format.extension() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("probe failed: {}", e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("no audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("unknown sample rate".to_string()))?;
        let channels = params.channels.map(|c| c.count()).unwrap_or(2);
        let time_base = params.time_base;
        let duration = match (params.n_frames, time_base) {
            (Some(frames), Some(tb)) => Some(time_to_duration(tb.calc_time(frames))),
            (Some(frames), None) => {
                Some(Duration::from_secs_f64(frames as f64 / sample_rate as f64))
            }
            _ => None,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("no decoder for {}: {}", format, e)))?;

        debug!(
            sample_rate,
            channels,
            duration_ms = duration.map(|d| d.as_millis() as u64),
            "Opened track decoder"
        );

        Ok(Self {
            format: reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            time_base,
            duration,
            sample_buf: None,
        })
    }

    /// Native sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Native channel count (output is always stereo)
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Media duration, if the container declares it
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Decode the next chunk; `Ok(None)` at end of stream
    ///
    /// Corrupt packets are skipped with a warning.
    pub fn next_chunk(&mut self) -> Result<Option<DecodedChunk>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp = self
                .time_base
                .map(|tb| time_to_duration(tb.calc_time(packet.ts())));

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!("Skipping corrupt packet: {}", msg);
                    continue;
                }
                Err(SymphoniaError::IoError(e)) => {
                    warn!("Skipping unreadable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let too_small = self.sample_buf.as_ref().map_or(true, |buf| {
                (buf.capacity() as u64) < capacity * spec.channels.count() as u64
            });
            if too_small {
                self.sample_buf = Some(SampleBuffer::<f32>::new(capacity, spec));
            }
            let Some(buf) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            let samples = to_stereo(buf.samples(), spec.channels.count());
            return Ok(Some(DecodedChunk { samples, timestamp }));
        }
    }

    /// Seek to `position`; returns the position actually reached
    pub fn seek(&mut self, position: Duration) -> Result<Duration> {
        let target = match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        let time = Time::new(target.as_secs(), target.subsec_nanos() as f64 / 1_000_000_000.0);

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("seek failed: {}", e)))?;
        self.decoder.reset();

        let reached = self
            .time_base
            .map(|tb| time_to_duration(tb.calc_time(seeked.actual_ts)))
            .unwrap_or(target);
        Ok(reached)
    }
}

fn time_to_duration(time: Time) -> Duration {
    Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac.clamp(0.0, 1.0))
}

/// Convert interleaved samples with `channels` channels to interleaved stereo
pub fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.iter().flat_map(|&s| [s, s]).collect(),
        2 => interleaved.to_vec(),
        _ => {
            let frames = interleaved.len() / channels;
            let scale = channels as f32 / 2.0;
            let mut stereo = Vec::with_capacity(frames * 2);
            for frame in interleaved.chunks_exact(channels) {
                let (mut left, mut right) = (0.0f32, 0.0f32);
                for (ch, &sample) in frame.iter().enumerate() {
                    if ch % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                stereo.push(left / scale);
                stereo.push(right / scale);
            }
            stereo
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, channels: u16, rate: u32, frames: u32) -> PathBuf {
        let path = dir.path().join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_nonexistent_file() {
        let result = TrackDecoder::open_file(Path::new("/nonexistent/file.mp3"), AudioFormat::Mp3);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noise.flac");
        std::fs::write(&path, b"definitely not audio data at all").unwrap();
        let result = TrackDecoder::open_file(&path, AudioFormat::Flac);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_decodes_whole_wav() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "tone.wav", 2, 8000, 8000);

        let mut decoder = TrackDecoder::open_file(&path, AudioFormat::Wav).unwrap();
        assert_eq!(decoder.sample_rate(), 8000);
        assert_eq!(decoder.channels(), 2);
        assert_eq!(decoder.duration(), Some(Duration::from_secs(1)));

        let mut frames = 0;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            frames += chunk.frames();
        }
        assert_eq!(frames, 8000);
    }

    #[test]
    fn test_mono_becomes_stereo() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "mono.wav", 1, 8000, 800);

        let mut decoder = TrackDecoder::open_file(&path, AudioFormat::Wav).unwrap();
        let chunk = decoder.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.samples.len() % 2, 0);
        for frame in chunk.samples.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_seek_moves_position() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "seek.wav", 2, 8000, 16000);

        let mut decoder = TrackDecoder::open_file(&path, AudioFormat::Wav).unwrap();
        let reached = decoder.seek(Duration::from_millis(1500)).unwrap();
        assert!(reached <= Duration::from_millis(1500));
        assert!(reached >= Duration::from_millis(1400));

        let mut frames = 0;
        while let Some(chunk) = decoder.next_chunk().unwrap() {
            frames += chunk.frames();
        }
        assert!(frames <= 4800, "decoded {} frames after seek", frames);
    }

    #[test]
    fn test_to_stereo_downmix() {
        let quad = [1.0, 0.5, 1.0, 0.5];
        assert_eq!(to_stereo(&quad, 4), vec![1.0, 0.5]);
        assert_eq!(to_stereo(&[0.25], 1), vec![0.25, 0.25]);
        assert!(to_stereo(&[0.1, 0.2], 0).is_empty());
    }
}
