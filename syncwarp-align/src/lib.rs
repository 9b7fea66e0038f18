//! Alignment engine for syncwarp
//!
//! Computes a warping path between the feature frame sequences of two
//! recordings of the same event. Three strategies are available:
//! - offline banded DTW over fully loaded sequences
//! - streaming online time warping fed by two producer threads
//! - buffered online time warping with path-length normalized costs

mod config;
mod dtw;
mod error;
mod matrix;
mod oltw;
mod path;
mod progress;
mod ring;

#[cfg(test)]
mod testing;

pub use config::{AlignConfig, AlignMode};
pub use error::{AlignError, Sequence};
pub use matrix::{
    CostMatrix, DenseMatrix, DiagonalMatrix, MatrixKind, PatchMatrix, DEFAULT_TILE_SIZE,
    DENSE_CELL_LIMIT, UNSET,
};
pub use oltw::{Step, MAX_RUN_LENGTH};
pub use path::{TimePair, WarpPath};
pub use progress::{CancelToken, NoProgress, ProgressRecorder, ProgressSink};
pub use ring::{RingBuffer, RingBufferError};

use progress::RunControl;
use std::sync::Arc;
use syncwarp_analysis::AudioStream;
use tracing::debug;

/// Runs alignments with a fixed configuration, progress sink and cancel token
#[derive(Clone)]
pub struct Aligner {
    config: AlignConfig,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> Self {
        Self {
            config,
            progress: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops runs of this aligner when cancelled
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Banded DTW over both streams read to the end
    pub fn align_offline<A, B>(&self, a: A, b: B) -> Result<WarpPath, AlignError>
    where
        A: AudioStream + Send,
        B: AudioStream + Send,
    {
        self.align(AlignMode::Offline, a, b)
    }

    /// Online time warping while both streams are still being read
    pub fn align_streaming<A, B>(&self, a: A, b: B) -> Result<WarpPath, AlignError>
    where
        A: AudioStream + Send,
        B: AudioStream + Send,
    {
        self.align(AlignMode::Streaming, a, b)
    }

    /// Online time warping over fully loaded streams
    pub fn align_buffered<A, B>(&self, a: A, b: B) -> Result<WarpPath, AlignError>
    where
        A: AudioStream + Send,
        B: AudioStream + Send,
    {
        self.align(AlignMode::Buffered, a, b)
    }

    /// Align `a` against `b` with the given strategy
    pub fn align<A, B>(&self, mode: AlignMode, a: A, b: B) -> Result<WarpPath, AlignError>
    where
        A: AudioStream + Send,
        B: AudioStream + Send,
    {
        let control = RunControl {
            progress: self.progress.as_ref(),
            cancel: &self.cancel,
        };
        debug!(mode = mode.as_str(), "alignment started");

        let path = match mode {
            AlignMode::Offline => dtw::run_offline(a, b, &self.config, control)?,
            AlignMode::Streaming => oltw::run_streaming(a, b, &self.config, control)?,
            AlignMode::Buffered => oltw::run_buffered(a, b, &self.config, control)?,
        };

        debug!(mode = mode.as_str(), steps = path.len(), "alignment finished");
        self.progress.finished();
        Ok(path)
    }
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(AlignConfig::default())
    }
}

/// Offline DTW allowing offsets up to `max_offset_secs`
pub fn align_offline<A, B>(a: A, b: B, max_offset_secs: f64) -> Result<WarpPath, AlignError>
where
    A: AudioStream + Send,
    B: AudioStream + Send,
{
    Aligner::new(AlignConfig {
        max_offset_secs,
        ..Default::default()
    })
    .align_offline(a, b)
}

/// Streaming online time warping with a lookback of `search_width` frames
pub fn align_streaming<A, B>(a: A, b: B, search_width: usize) -> Result<WarpPath, AlignError>
where
    A: AudioStream + Send,
    B: AudioStream + Send,
{
    Aligner::new(AlignConfig {
        search_width,
        ..Default::default()
    })
    .align_streaming(a, b)
}

/// Buffered online time warping with a lookback of `search_width` frames
pub fn align_buffered<A, B>(a: A, b: B, search_width: usize) -> Result<WarpPath, AlignError>
where
    A: AudioStream + Send,
    B: AudioStream + Send,
{
    Aligner::new(AlignConfig {
        search_width,
        ..Default::default()
    })
    .align_buffered(a, b)
}
