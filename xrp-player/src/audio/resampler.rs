//! Streaming sample rate conversion using rubato
//!
//! Decoded packets arrive in arbitrary sizes while rubato's fixed-input
//! resamplers want exact chunks, so input frames are collected per channel
//! until a full chunk is available.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Input frames processed per rubato call
const CHUNK_FRAMES: usize = 1024;

/// Converts interleaved audio from one sample rate to another across calls
pub struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<Vec<f32>>,
    channels: usize,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("channels", &self.channels)
            .field("pending_frames", &self.pending_frames())
            .finish()
    }
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(Error::Decode(format!(
                "invalid resampler parameters: {} Hz -> {} Hz, {} channels",
                input_rate, output_rate, channels
            )));
        }

        let inner = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        debug!("Resampling {}Hz -> {}Hz ({} channels)", input_rate, output_rate, channels);

        Ok(Self {
            inner,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
            channels,
        })
    }

    /// Feed interleaved input; returns whatever interleaved output is ready
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        for frame in interleaved.chunks_exact(self.channels) {
            for (channel, &sample) in self.pending.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending_frames() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();
            let planar = self
                .inner
                .process(&chunk, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            output.extend(interleave(&planar));
        }
        Ok(output)
    }

    /// Drop buffered input and filter state (after a seek)
    pub fn reset(&mut self) {
        self.inner.reset();
        self.pending.iter_mut().for_each(Vec::clear);
    }

    fn pending_frames(&self) -> usize {
        self.pending.first().map(Vec::len).unwrap_or(0)
    }
}

/// Convert planar samples to interleaved format
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            interleaved.push(channel[frame]);
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let t = i as f32 / rate as f32;
                let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_interleave() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        assert_eq!(interleave(&planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(interleave(&[]).is_empty());
    }

    #[test]
    fn test_small_input_is_buffered() {
        let mut resampler = StreamResampler::new(48000, 44100, 2).unwrap();
        let out = resampler.process(&sine(100, 48000)).unwrap();
        assert!(out.is_empty());
        assert_eq!(resampler.pending_frames(), 100);

        resampler.reset();
        assert_eq!(resampler.pending_frames(), 0);
    }

    #[test]
    fn test_output_length_tracks_ratio() {
        let mut resampler = StreamResampler::new(48000, 44100, 2).unwrap();
        let mut produced = 0;
        // Feed in awkward packet sizes
        for _ in 0..20 {
            produced += resampler.process(&sine(1152, 48000)).unwrap().len() / 2;
        }
        let consumed = 20 * 1152 - resampler.pending_frames();
        let expected = consumed as f64 * 44100.0 / 48000.0;
        assert!(
            (produced as f64 - expected).abs() < 64.0,
            "expected ~{} frames, got {}",
            expected,
            produced
        );
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(StreamResampler::new(0, 44100, 2).is_err());
    }
}
