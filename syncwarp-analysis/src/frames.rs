//! Spectral flux feature frames
//!
//! Each frame compacts the magnitude spectrum of one analysis window into
//! semitone-spaced bands, keeps only the increases against the previous
//! window and normalizes the result to sum to one. Differently-leveled
//! recordings of the same material therefore produce comparable frames.

use crate::stream::{AudioStream, StreamError};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;
use thiserror::Error;

/// Sample rate the alignment engine expects by default
pub const REFERENCE_SAMPLE_RATE: u32 = 44100;

/// Highest MIDI note with its own band (~12.5 kHz); everything above is summed into it
const TOP_MIDI_NOTE: f64 = 127.0;

/// Errors that can occur while extracting frames
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Invalid frame configuration: {0}")]
    InvalidConfig(String),
    #[error("Stream format mismatch: {0}")]
    FormatMismatch(String),
    #[error("No more frames available")]
    EndOfStream,
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Analysis parameters shared by both streams of an alignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameConfig {
    /// Required input sample rate in Hz
    pub sample_rate: u32,
    /// Analysis window length in samples (power of two)
    pub window_size: usize,
    /// Distance between consecutive frames in samples
    pub hop_size: usize,
    /// Windows with an RMS below this level produce all-zero frames
    pub silence_threshold: f32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            sample_rate: REFERENCE_SAMPLE_RATE,
            window_size: 2048,
            hop_size: 882, // 20ms at 44.1kHz
            silence_threshold: 0.0004,
        }
    }
}

impl FrameConfig {
    /// Check the parameters before any audio is touched
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.sample_rate == 0 {
            return Err(FeatureError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if !self.window_size.is_power_of_two() {
            return Err(FeatureError::InvalidConfig(format!(
                "window size {} is not a power of two",
                self.window_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(FeatureError::InvalidConfig(format!(
                "hop size {} must be within 1..={}",
                self.hop_size, self.window_size
            )));
        }
        Ok(())
    }

    /// Frames per second
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_size as f64
    }

    /// Duration of one hop in seconds
    pub fn hop_duration(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Time offset of a frame in seconds, `index * hop / sample_rate`
    pub fn frame_time(&self, index: usize) -> f64 {
        index as f64 * self.hop_size as f64 / self.sample_rate as f64
    }

    /// Number of bands in every frame produced with this configuration
    pub fn band_count(&self) -> usize {
        band_map(self).last().map(|&band| band + 1).unwrap_or(0)
    }
}

/// Bin-to-band assignment for the magnitude spectrum.
///
/// Bins up to the crossover (the first bin narrower than a semitone) keep
/// their own band; above it bins are grouped per MIDI note.
fn band_map(config: &FrameConfig) -> Vec<usize> {
    let bin_width = config.sample_rate as f64 / config.window_size as f64;
    let crossover_bin = (2.0 / (2f64.powf(1.0 / 12.0) - 1.0)) as usize;
    let crossover_midi = midi_note(crossover_bin as f64 * bin_width).round() as isize;

    (0..=config.window_size / 2)
        .map(|bin| {
            if bin <= crossover_bin {
                bin
            } else {
                let midi = midi_note(bin as f64 * bin_width).min(TOP_MIDI_NOTE);
                (crossover_bin as isize + midi.round() as isize - crossover_midi) as usize
            }
        })
        .collect()
}

fn midi_note(frequency: f64) -> f64 {
    69.0 + 12.0 * (frequency / 440.0).log2()
}

/// One hop's worth of spectral flux
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    values: Box<[f32]>,
}

impl Frame {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values: values.into_boxed_slice(),
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True if every band is zero (the window was below the silence threshold)
    pub fn is_silent(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Euclidean distance between two frames
    pub fn distance(&self, other: &Frame) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// Lazily turns a mono sample stream into spectral flux frames
pub struct FeatureFrameSource<S> {
    stream: S,
    config: FrameConfig,
    band_map: Vec<usize>,
    band_count: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    /// Most recent `window_size` samples
    history: Vec<f32>,
    /// Samples collected for the next hop
    pending: Vec<f32>,
    pending_len: usize,
    exhausted: bool,
    previous_bands: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    frames_read: usize,
}

impl<S: AudioStream> FeatureFrameSource<S> {
    /// Create a frame source, rejecting streams that are not mono at the configured rate
    pub fn new(stream: S, config: FrameConfig) -> Result<Self, FeatureError> {
        config.validate()?;

        let properties = stream.properties();
        if properties.channels != 1 {
            return Err(FeatureError::FormatMismatch(format!(
                "expected a mono stream, got {} channels",
                properties.channels
            )));
        }
        if properties.sample_rate != config.sample_rate {
            return Err(FeatureError::FormatMismatch(format!(
                "expected {} Hz, got {} Hz",
                config.sample_rate, properties.sample_rate
            )));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.window_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..config.window_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / config.window_size as f32).cos()))
            .collect();

        let band_map = band_map(&config);
        let band_count = band_map.last().map(|&band| band + 1).unwrap_or(0);

        Ok(Self {
            stream,
            config,
            band_map,
            band_count,
            fft,
            window,
            history: vec![0.0; config.window_size],
            pending: vec![0.0; config.hop_size],
            pending_len: 0,
            exhausted: false,
            previous_bands: vec![0.0; band_count],
            fft_buffer: vec![Complex::new(0.0, 0.0); config.window_size],
            frames_read: 0,
        })
    }

    /// Number of frames produced so far
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Frame count implied by the stream length, if the stream knows it
    pub fn expected_frames(&self) -> Option<usize> {
        self.stream
            .length()
            .map(|samples| samples as usize / self.config.hop_size)
    }

    /// Whether a full hop of samples is available for another frame
    pub fn has_next(&mut self) -> Result<bool, FeatureError> {
        let hop = self.config.hop_size;
        while self.pending_len < hop && !self.exhausted {
            let read = self.stream.read(&mut self.pending[self.pending_len..])?;
            if read == 0 {
                self.exhausted = true;
            } else {
                self.pending_len += read;
            }
        }
        Ok(self.pending_len == hop)
    }

    /// Produce the next frame; fails with `EndOfStream` once `has_next` is false
    pub fn read_frame(&mut self) -> Result<Frame, FeatureError> {
        if !self.has_next()? {
            return Err(FeatureError::EndOfStream);
        }

        let hop = self.config.hop_size;
        self.history.copy_within(hop.., 0);
        let tail = self.history.len() - hop;
        self.history[tail..].copy_from_slice(&self.pending);
        self.pending_len = 0;
        self.frames_read += 1;

        Ok(self.compute_frame())
    }

    /// Read every remaining frame
    pub fn read_all(&mut self) -> Result<Vec<Frame>, FeatureError> {
        let mut frames = Vec::with_capacity(self.expected_frames().unwrap_or(0));
        while self.has_next()? {
            frames.push(self.read_frame()?);
        }
        Ok(frames)
    }

    fn compute_frame(&mut self) -> Frame {
        for ((slot, &sample), &w) in self
            .fft_buffer
            .iter_mut()
            .zip(self.history.iter())
            .zip(self.window.iter())
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.fft_buffer);

        let mut bands = vec![0.0f32; self.band_count];
        for (bin, &band) in self.band_map.iter().enumerate() {
            bands[band] += self.fft_buffer[bin].norm();
        }

        // Half-wave rectified difference: only energy increases count
        let mut flux: Vec<f32> = bands
            .iter()
            .zip(self.previous_bands.iter())
            .map(|(current, previous)| (current - previous).max(0.0))
            .collect();
        self.previous_bands = bands;

        let rms = (self.history.iter().map(|s| s * s).sum::<f32>() / self.history.len() as f32).sqrt();
        if rms < self.config.silence_threshold {
            flux.fill(0.0);
        } else {
            let total: f32 = flux.iter().sum();
            if total > 0.0 {
                for value in &mut flux {
                    *value /= total;
                }
            }
        }

        Frame::new(flux)
    }
}
