//! Online time warping
//!
//! The accumulated cost matrix grows one row (next frame of A) or one column
//! (next frame of B) at a time, and only cells within `width` frames of the
//! frontier are ever computed. After each extension the frontier row and
//! column are compared to decide which sequence is lagging.
//!
//! Where frames come from is behind `FrameStore`: concurrent producers for
//! the streaming aligner, fully loaded arrays for the buffered one.

mod buffered;
mod producer;

pub(crate) use buffered::run_buffered;
pub(crate) use producer::run_streaming;

use crate::error::{AlignError, Sequence};
use crate::matrix::{cheapest_predecessor, CostMatrix, PatchMatrix, UNSET};
use crate::path::backtrack;
use crate::progress::RunControl;
use tracing::{debug, trace};

/// Consecutive single-axis steps after which the other axis is forced
pub const MAX_RUN_LENGTH: usize = 3;

/// Direction chosen by one iteration of the online aligner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Add a row: the next frame of A
    AdvanceA,
    /// Add a column: the next frame of B
    AdvanceB,
    AdvanceBoth,
}

/// Counts how often the same step was taken in a row
#[derive(Debug, Default, Clone, Copy)]
struct RunState {
    previous: Option<Step>,
    run_length: usize,
}

impl RunState {
    fn record(&mut self, step: Step) {
        if self.previous == Some(step) {
            self.run_length += 1;
        } else {
            self.previous = Some(step);
            self.run_length = 1;
        }
    }

    /// The opposite single-axis step once a run reaches `MAX_RUN_LENGTH`
    fn forced(&self) -> Option<Step> {
        if self.run_length < MAX_RUN_LENGTH {
            return None;
        }
        match self.previous {
            Some(Step::AdvanceA) => Some(Step::AdvanceB),
            Some(Step::AdvanceB) => Some(Step::AdvanceA),
            _ => None,
        }
    }
}

/// Frame supply of an online alignment run
pub(crate) trait FrameStore {
    /// Whether `sequence` has a frame beyond the frontier. May block.
    fn has_more(&mut self, sequence: Sequence) -> Result<bool, AlignError>;

    /// Move the next frame of `sequence` into the retained window
    fn advance(&mut self, sequence: Sequence) -> Result<(), AlignError>;

    /// Distance between frame `i` of A and frame `j` of B
    fn local_cost(&self, i: usize, j: usize) -> Result<f32, AlignError>;

    /// Combined frame count of both sequences, if known up front
    fn expected_total(&self) -> Option<usize> {
        None
    }
}

/// Run context of one online alignment
pub(crate) struct OnlineWarp<S> {
    store: S,
    acc: PatchMatrix<f32>,
    /// Path edges leading to each cell; only kept when scores are normalized
    lengths: Option<PatchMatrix<u32>>,
    width: usize,
    diagonal_weight: f32,
    runs: RunState,
    t: usize,
    j: usize,
}

impl<S: FrameStore> OnlineWarp<S> {
    pub fn new(store: S, width: usize, diagonal_weight: f32) -> Self {
        Self {
            store,
            acc: PatchMatrix::new(UNSET),
            lengths: None,
            width,
            diagonal_weight,
            runs: RunState::default(),
            t: 0,
            j: 0,
        }
    }

    /// Compare cells by accumulated cost divided by path length
    pub fn normalized(mut self) -> Self {
        self.lengths = Some(PatchMatrix::new(0));
        self
    }

    /// Align to the end of both sequences and return the warping path
    pub fn run(mut self, control: RunControl<'_>) -> Result<Vec<(usize, usize)>, AlignError> {
        if !self.fill(control)? {
            debug!("a sequence produced no frames");
            return Ok(Vec::new());
        }
        debug!(end_a = self.t, end_b = self.j, "online alignment reached both ends");
        Ok(backtrack(&self.acc, (self.t, self.j), self.diagonal_weight))
    }

    /// Grow the matrix until both sequences are exhausted.
    /// Returns false if either sequence is empty.
    fn fill(&mut self, control: RunControl<'_>) -> Result<bool, AlignError> {
        if !self.store.has_more(Sequence::A)? || !self.store.has_more(Sequence::B)? {
            return Ok(false);
        }
        self.store.advance(Sequence::A)?;
        self.store.advance(Sequence::B)?;
        self.acc.set(0, 0, 0.0);

        let mut tracker = control.tracker(self.store.expected_total());
        debug!(width = self.width, normalized = self.lengths.is_some(), "online alignment");

        loop {
            control.checkpoint()?;

            let more_a = self.store.has_more(Sequence::A)?;
            let more_b = self.store.has_more(Sequence::B)?;
            let step = match (more_a, more_b) {
                (false, false) => break,
                (true, false) => Step::AdvanceA,
                (false, true) => Step::AdvanceB,
                (true, true) => self.get_inc(),
            };
            self.runs.record(step);

            if matches!(step, Step::AdvanceA | Step::AdvanceBoth) {
                self.advance_a()?;
            }
            if matches!(step, Step::AdvanceB | Step::AdvanceBoth) {
                self.advance_b()?;
            }

            tracker.update(self.t + self.j + 2);
        }
        Ok(true)
    }

    /// Choose which sequence to advance from the frontier row and column
    fn get_inc(&self) -> Step {
        if self.t < self.width {
            return Step::AdvanceBoth;
        }
        if let Some(step) = self.runs.forced() {
            trace!(?step, "run length reached, forcing the other axis");
            return step;
        }

        let (best_col, row_min) = argmin(self.window(self.j).map(|col| (col, self.score(self.t, col))));
        let (best_row, col_min) = argmin(self.window(self.t).map(|row| (row, self.score(row, self.j))));

        if row_min < col_min && best_col < self.j {
            // Best cell of row t lies behind the newest column: B is ahead
            Step::AdvanceA
        } else if col_min < row_min && best_row < self.t {
            Step::AdvanceB
        } else {
            Step::AdvanceBoth
        }
    }

    /// Trailing window of `width` indices ending at `end`
    fn window(&self, end: usize) -> std::ops::RangeInclusive<usize> {
        (end + 1).saturating_sub(self.width)..=end
    }

    fn score(&self, i: usize, j: usize) -> f32 {
        let cost = self.acc.get(i, j);
        match &self.lengths {
            Some(lengths) => cost / (lengths.get(i, j) + 1) as f32,
            None => cost,
        }
    }

    fn advance_a(&mut self) -> Result<(), AlignError> {
        self.store.advance(Sequence::A)?;
        self.t += 1;
        for col in self.window(self.j) {
            self.fill_cell(self.t, col)?;
        }
        Ok(())
    }

    fn advance_b(&mut self) -> Result<(), AlignError> {
        self.store.advance(Sequence::B)?;
        self.j += 1;
        for row in self.window(self.t) {
            self.fill_cell(row, self.j)?;
        }
        Ok(())
    }

    fn fill_cell(&mut self, i: usize, j: usize) -> Result<(), AlignError> {
        let local = self.store.local_cost(i, j)?;
        let Some(((pi, pj), cost)) = cheapest_predecessor(&self.acc, i, j, self.diagonal_weight)
        else {
            return Ok(());
        };
        self.acc.set(i, j, local + cost);
        if let Some(lengths) = self.lengths.as_mut() {
            let length = lengths.get(pi, pj) + 1;
            lengths.set(i, j, length);
        }
        Ok(())
    }
}

/// Index and value of the smallest score, the first one on ties
fn argmin(scores: impl Iterator<Item = (usize, f32)>) -> (usize, f32) {
    scores.fold((0, UNSET), |best, (index, score)| {
        if score < best.1 {
            (index, score)
        } else {
            best
        }
    })
}
