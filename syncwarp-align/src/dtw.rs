//! Offline banded dynamic time warping
//!
//! Both sequences are loaded completely, then a diagonal band is swept from
//! the origin to the final corner. The sweep advances each index in
//! proportion to its sequence length, so the band follows the main diagonal
//! even when the recordings differ in length. At every position the column
//! segment below and the row segment left of the current cell are filled.

use crate::config::{check_width, AlignConfig};
use crate::error::{AlignError, Sequence};
use crate::matrix::{
    cheapest_predecessor, CostMatrix, DenseMatrix, DiagonalMatrix, MatrixKind, PatchMatrix, UNSET,
};
use crate::path::{backtrack, WarpPath};
use crate::progress::RunControl;
use std::thread;
use syncwarp_analysis::{AudioStream, FeatureFrameSource, Frame, FrameConfig};
use tracing::debug;

/// Read both streams to exhaustion, one on a scoped helper thread
pub(crate) fn load_frames<A, B>(
    a: A,
    b: B,
    config: &FrameConfig,
) -> Result<(Vec<Frame>, Vec<Frame>), AlignError>
where
    A: AudioStream + Send,
    B: AudioStream + Send,
{
    let mut source_a = FeatureFrameSource::new(a, *config)?;
    let mut source_b = FeatureFrameSource::new(b, *config)?;

    thread::scope(|scope| {
        let handle = scope.spawn(move || source_b.read_all());
        let frames_a = source_a.read_all().map_err(|source| AlignError::ProducerFailed {
            sequence: Sequence::A,
            source,
        });
        let frames_b = handle
            .join()
            .map_err(|_| AlignError::ProducerDisconnected {
                sequence: Sequence::B,
            })?
            .map_err(|source| AlignError::ProducerFailed {
                sequence: Sequence::B,
                source,
            })?;
        Ok((frames_a?, frames_b))
    })
}

/// Offline alignment of two streams
pub(crate) fn run_offline<A, B>(
    a: A,
    b: B,
    config: &AlignConfig,
    control: RunControl<'_>,
) -> Result<WarpPath, AlignError>
where
    A: AudioStream + Send,
    B: AudioStream + Send,
{
    config.validate()?;
    let (frames_a, frames_b) = load_frames(a, b, &config.frames)?;
    control.checkpoint()?;
    align_frames(&frames_a, &frames_b, config, control)
}

/// Offline alignment of two frame sequences
pub(crate) fn align_frames(
    a: &[Frame],
    b: &[Frame],
    config: &AlignConfig,
    control: RunControl<'_>,
) -> Result<WarpPath, AlignError> {
    let (len_a, len_b) = (a.len(), b.len());
    if len_a == 0 || len_b == 0 {
        debug!(len_a, len_b, "nothing to align");
        return Ok(WarpPath::empty(config.frames));
    }

    let band = config.band_width();
    check_width("offline band", band, len_a, len_b)?;

    let kind = config.matrix.resolve(len_a, len_b);
    debug!(len_a, len_b, band, matrix = kind.as_str(), "offline alignment");

    let steps = match kind {
        MatrixKind::Dense => {
            BandFill::new(a, b, DenseMatrix::new(len_a, len_b, UNSET), band, config.diagonal_weight)
                .run(control)?
        }
        MatrixKind::Diagonal => {
            let height = column_height(band, len_a, len_b);
            BandFill::new(a, b, DiagonalMatrix::new(height, UNSET), band, config.diagonal_weight)
                .run(control)?
        }
        MatrixKind::Patch | MatrixKind::Auto => {
            BandFill::new(a, b, PatchMatrix::new(UNSET), band, config.diagonal_weight)
                .run(control)?
        }
    };

    Ok(WarpPath::new(steps, config.frames))
}

/// Column height a diagonal matrix needs to hold the band.
///
/// A column receives writes from the step its row becomes the frontier until
/// it leaves the band, during which B advances by about `(band + 1) * len_b / len_a`.
fn column_height(band: usize, len_a: usize, len_b: usize) -> usize {
    let ratio = (len_b as f64 / len_a as f64).max(1.0);
    band + ((band + 1) as f64 * ratio).ceil() as usize + 2
}

/// Diagonal position of sweep step `step` along a sequence of `len` frames
fn sweep_position(step: usize, steps: usize, len: usize) -> usize {
    if steps <= 1 {
        0
    } else {
        (step * (len - 1) + (steps - 1) / 2) / (steps - 1)
    }
}

/// Run context owning the matrix for one offline fill and backtrack
struct BandFill<'a, M> {
    a: &'a [Frame],
    b: &'a [Frame],
    matrix: M,
    band: usize,
    diagonal_weight: f32,
}

impl<'a, M: CostMatrix<f32>> BandFill<'a, M> {
    fn new(a: &'a [Frame], b: &'a [Frame], matrix: M, band: usize, diagonal_weight: f32) -> Self {
        Self {
            a,
            b,
            matrix,
            band,
            diagonal_weight,
        }
    }

    fn run(mut self, control: RunControl<'_>) -> Result<Vec<(usize, usize)>, AlignError> {
        self.fill(control)?;
        let end = (self.a.len() - 1, self.b.len() - 1);
        Ok(backtrack(&self.matrix, end, self.diagonal_weight))
    }

    fn fill(&mut self, control: RunControl<'_>) -> Result<(), AlignError> {
        let (len_a, len_b) = (self.a.len(), self.b.len());
        let steps = len_a.max(len_b);
        let reach = self.band - 1;
        let mut tracker = control.tracker(Some(steps));

        self.matrix.set(0, 0, 0.0);

        for step in 0..steps {
            control.checkpoint()?;

            let ti = sweep_position(step, steps, len_a);
            let tj = sweep_position(step, steps, len_b);

            // Column segment first so the row can rely on (ti - 1, tj)
            for i in ti.saturating_sub(reach)..ti {
                self.fill_cell(i, tj);
            }
            for j in tj.saturating_sub(reach)..=tj {
                self.fill_cell(ti, j);
            }

            tracker.update(step + 1);
        }
        Ok(())
    }

    fn fill_cell(&mut self, i: usize, j: usize) {
        if self.matrix.get(i, j) != UNSET {
            return;
        }
        let best = cheapest_predecessor(&self.matrix, i, j, self.diagonal_weight)
            .map(|(_, cost)| cost)
            .unwrap_or(0.0);
        self.matrix.set(i, j, self.a[i].distance(&self.b[j]) + best);
    }
}
