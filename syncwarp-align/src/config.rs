//! Alignment run configuration

use crate::error::AlignError;
use crate::matrix::MatrixKind;
use std::f64::consts::FRAC_1_SQRT_2;
use std::str::FromStr;
use syncwarp_analysis::FrameConfig;

/// Alignment strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignMode {
    /// Banded DTW over fully loaded sequences
    #[default]
    Offline,
    /// Online time warping fed by concurrent frame producers
    Streaming,
    /// Online time warping over pre-loaded frames with path-length normalization
    Buffered,
}

impl AlignMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignMode::Offline => "offline",
            AlignMode::Streaming => "streaming",
            AlignMode::Buffered => "buffered",
        }
    }
}

impl FromStr for AlignMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offline" | "dtw" => Ok(AlignMode::Offline),
            "streaming" | "oltw" => Ok(AlignMode::Streaming),
            "buffered" => Ok(AlignMode::Buffered),
            other => Err(format!("unknown alignment mode '{}'", other)),
        }
    }
}

/// Parameters of one alignment run
#[derive(Debug, Clone, PartialEq)]
pub struct AlignConfig {
    /// Frame extraction parameters shared by both streams
    pub frames: FrameConfig,
    /// Largest time offset the offline band must cover, in seconds
    pub max_offset_secs: f64,
    /// Lookback width of the online aligners, in frames
    pub search_width: usize,
    /// Multiplier applied to the diagonal predecessor
    pub diagonal_weight: f32,
    /// Cost matrix backend of the offline aligner
    pub matrix: MatrixKind,
    /// Capacity of each producer queue, in frames
    pub queue_capacity: usize,
    /// Frames per second each producer may emit (unlimited when None)
    pub producer_rate: Option<f64>,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            frames: FrameConfig::default(),
            max_offset_secs: 10.0,
            search_width: 500, // 10s at 50 frames/s
            diagonal_weight: 1.0,
            matrix: MatrixKind::Auto,
            queue_capacity: 256,
            producer_rate: None,
        }
    }
}

impl AlignConfig {
    /// Reject parameters no run can work with
    pub fn validate(&self) -> Result<(), AlignError> {
        self.frames.validate()?;
        if !(self.max_offset_secs.is_finite() && self.max_offset_secs > 0.0) {
            return Err(AlignError::InvalidConfig(format!(
                "max offset must be positive, got {}",
                self.max_offset_secs
            )));
        }
        if !(self.diagonal_weight.is_finite() && self.diagonal_weight > 0.0) {
            return Err(AlignError::InvalidConfig(format!(
                "diagonal weight must be positive, got {}",
                self.diagonal_weight
            )));
        }
        if self.search_width == 0 {
            return Err(AlignError::InvalidConfig("search width must be non-zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(AlignError::InvalidConfig("queue capacity must be non-zero".into()));
        }
        if let Some(rate) = self.producer_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(AlignError::InvalidConfig(format!(
                    "producer rate must be positive, got {}",
                    rate
                )));
            }
        }
        Ok(())
    }

    /// Offline band width in frames.
    ///
    /// The offset is converted to frames and scaled by sqrt(2)/2, turning a
    /// Sakoe-Chiba band width into the leg length of the diagonal window.
    pub fn band_width(&self) -> usize {
        let frames = self.max_offset_secs * self.frames.frame_rate() * FRAC_1_SQRT_2;
        (frames.ceil() as usize).max(1)
    }
}

/// Reject a band or search width wider than the longer of two sequences.
///
/// Nothing is checked while either sequence is empty; such runs produce an
/// empty path.
pub(crate) fn check_width(
    name: &str,
    width: usize,
    len_a: usize,
    len_b: usize,
) -> Result<(), AlignError> {
    if len_a == 0 || len_b == 0 {
        return Ok(());
    }
    let frames = len_a.max(len_b);
    if width > frames {
        return Err(AlignError::InvalidConfig(format!(
            "{} of {} frames exceeds the data ({} frames)",
            name, width, frames
        )));
    }
    Ok(())
}
