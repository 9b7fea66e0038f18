//! Warping paths and backtracking

use crate::matrix::{cheapest_predecessor, CostMatrix, UNSET};
use syncwarp_analysis::FrameConfig;

/// Corresponding instants in the two streams, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePair {
    pub time_a: f64,
    pub time_b: f64,
}

impl TimePair {
    /// `time_a - time_b`
    pub fn offset(&self) -> f64 {
        self.time_a - self.time_b
    }
}

/// Monotonic sequence of (A frame, B frame) correspondences
#[derive(Debug, Clone, PartialEq)]
pub struct WarpPath {
    steps: Vec<(usize, usize)>,
    timing: FrameConfig,
}

impl WarpPath {
    pub fn new(steps: Vec<(usize, usize)>, timing: FrameConfig) -> Self {
        Self { steps, timing }
    }

    /// Path with no steps (one of the streams produced no frames)
    pub fn empty(timing: FrameConfig) -> Self {
        Self::new(Vec::new(), timing)
    }

    pub fn steps(&self) -> &[(usize, usize)] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> Option<(usize, usize)> {
        self.steps.first().copied()
    }

    pub fn last(&self) -> Option<(usize, usize)> {
        self.steps.last().copied()
    }

    /// Frame configuration the indices refer to
    pub fn timing(&self) -> &FrameConfig {
        &self.timing
    }

    /// True if every step advances A, B or both by exactly one
    pub fn is_monotonic(&self) -> bool {
        self.steps.windows(2).all(|w| {
            let (di, dj) = (w[1].0.wrapping_sub(w[0].0), w[1].1.wrapping_sub(w[0].1));
            matches!((di, dj), (1, 0) | (0, 1) | (1, 1))
        })
    }

    /// Path as time pairs, dropping pairs before the start of either stream
    pub fn time_pairs(&self) -> Vec<TimePair> {
        self.steps
            .iter()
            .map(|&(i, j)| TimePair {
                time_a: self.timing.frame_time(i),
                time_b: self.timing.frame_time(j),
            })
            .filter(|pair| pair.time_a >= 0.0 && pair.time_b >= 0.0)
            .collect()
    }
}

/// Walk back from `end` to the origin through the cheapest predecessors.
///
/// `diagonal_weight` must be the one the matrix was filled with. On the
/// i = 0 or j = 0 border the walk follows the remaining axis. The returned
/// steps are in forward order.
pub(crate) fn backtrack<M: CostMatrix<f32>>(
    matrix: &M,
    end: (usize, usize),
    diagonal_weight: f32,
) -> Vec<(usize, usize)> {
    let (mut i, mut j) = end;
    let mut steps = Vec::with_capacity(i + j + 1);
    steps.push((i, j));

    while i > 0 || j > 0 {
        if i == 0 {
            j -= 1;
        } else if j == 0 {
            i -= 1;
        } else {
            let ((pi, pj), _) =
                cheapest_predecessor(matrix, i, j, diagonal_weight).unwrap_or(((i - 1, j - 1), UNSET));
            i = pi;
            j = pj;
        }
        steps.push((i, j));
    }

    steps.reverse();
    steps
}
