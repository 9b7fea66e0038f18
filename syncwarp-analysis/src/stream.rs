//! Sample stream abstraction consumed by the frame extractor

use thiserror::Error;

/// Errors raised by an underlying sample stream
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Format description of a sample stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProperties {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample of the delivered samples
    pub bits_per_sample: u16,
}

impl StreamProperties {
    /// Mono 32-bit float samples at the given rate
    pub fn mono_f32(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 32,
        }
    }
}

/// A forward-only source of interleaved f32 samples.
///
/// Resampling, channel mixing and format conversion happen before samples
/// reach this trait; the alignment engine only accepts mono streams at its
/// configured rate.
pub trait AudioStream {
    /// Format of the delivered samples
    fn properties(&self) -> StreamProperties;

    /// Number of samples read so far
    fn position(&self) -> u64;

    /// Total number of samples, when known up front
    fn length(&self) -> Option<u64> {
        None
    }

    /// Read up to `buffer.len()` samples, returning how many were written.
    /// A return value of zero marks the end of the stream.
    fn read(&mut self, buffer: &mut [f32]) -> Result<usize, StreamError>;
}

impl<S: AudioStream + ?Sized> AudioStream for Box<S> {
    fn properties(&self) -> StreamProperties {
        (**self).properties()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn length(&self) -> Option<u64> {
        (**self).length()
    }

    fn read(&mut self, buffer: &mut [f32]) -> Result<usize, StreamError> {
        (**self).read(buffer)
    }
}

/// Stream over samples held in memory
#[derive(Debug, Clone)]
pub struct MemoryStream {
    samples: Vec<f32>,
    position: usize,
    properties: StreamProperties,
}

impl MemoryStream {
    /// Create a mono f32 stream at the given sample rate
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::with_properties(samples, StreamProperties::mono_f32(sample_rate))
    }

    /// Create a stream with explicit format properties
    pub fn with_properties(samples: Vec<f32>, properties: StreamProperties) -> Self {
        Self {
            samples,
            position: 0,
            properties,
        }
    }

    /// Samples not yet read
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioStream for MemoryStream {
    fn properties(&self) -> StreamProperties {
        self.properties
    }

    fn position(&self) -> u64 {
        self.position as u64
    }

    fn length(&self) -> Option<u64> {
        Some(self.samples.len() as u64)
    }

    fn read(&mut self, buffer: &mut [f32]) -> Result<usize, StreamError> {
        let count = buffer.len().min(self.remaining());
        buffer[..count].copy_from_slice(&self.samples[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}
