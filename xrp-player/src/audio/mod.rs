//! Audio pipeline building blocks for the PCM backends
//!
//! - `decoder`: symphonia demux and decode to interleaved stereo f32
//! - `resampler`: rubato conversion to the device rate
//! - `output`: cpal device stream with gain and played-frame accounting

pub mod decoder;
pub mod output;
pub mod resampler;

pub use decoder::{DecodedChunk, TrackDecoder};
pub use output::{AudioSink, OutputGain};
pub use resampler::StreamResampler;
