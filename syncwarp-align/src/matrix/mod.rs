//! Accumulated cost matrices
//!
//! Three backends share the `CostMatrix` contract and trade memory for
//! access pattern:
//! - `DenseMatrix`: full rectangle, for fully known extents
//! - `DiagonalMatrix`: fixed-height columns at per-column offsets, for tight bands
//! - `PatchMatrix`: lazily allocated tiles, for bands of unknown shape

mod dense;
mod diagonal;
mod patch;

pub use dense::DenseMatrix;
pub use diagonal::DiagonalMatrix;
pub use patch::{PatchMatrix, DEFAULT_TILE_SIZE};

/// Value of a cost cell that was never written
pub const UNSET: f32 = f32::INFINITY;

/// Largest cell count `MatrixKind::Auto` will allocate densely
pub const DENSE_CELL_LIMIT: usize = 16 * 1024 * 1024;

/// 2-D accumulator addressed by (sequence A index, sequence B index)
pub trait CostMatrix<T: Copy> {
    /// Stored value, or the default for coordinates never written
    fn get(&self, i: usize, j: usize) -> T;

    /// Store a value
    fn set(&mut self, i: usize, j: usize, value: T);

    /// Highest written A index plus one
    fn extent_i(&self) -> usize;

    /// Highest written B index plus one
    fn extent_j(&self) -> usize;
}

/// Backend selection for the offline aligner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixKind {
    /// Dense when the full matrix fits `DENSE_CELL_LIMIT`, patch otherwise
    #[default]
    Auto,
    Dense,
    Diagonal,
    Patch,
}

impl MatrixKind {
    /// Resolve `Auto` for the given sequence lengths
    pub fn resolve(self, len_a: usize, len_b: usize) -> MatrixKind {
        match self {
            MatrixKind::Auto => {
                if len_a.saturating_mul(len_b) <= DENSE_CELL_LIMIT {
                    MatrixKind::Dense
                } else {
                    MatrixKind::Patch
                }
            }
            kind => kind,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixKind::Auto => "auto",
            MatrixKind::Dense => "dense",
            MatrixKind::Diagonal => "diagonal",
            MatrixKind::Patch => "patch",
        }
    }
}

impl std::str::FromStr for MatrixKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(MatrixKind::Auto),
            "dense" => Ok(MatrixKind::Dense),
            "diagonal" => Ok(MatrixKind::Diagonal),
            "patch" => Ok(MatrixKind::Patch),
            other => Err(format!("unknown matrix kind '{}'", other)),
        }
    }
}

/// Cheapest predecessor of (i, j) under the warping recurrence.
///
/// Returns the predecessor coordinates and its (diagonal-weighted) cost, or
/// `None` at the origin. Ties prefer (i, j-1), then the diagonal, then (i-1, j).
pub(crate) fn cheapest_predecessor<M: CostMatrix<f32>>(
    matrix: &M,
    i: usize,
    j: usize,
    diagonal_weight: f32,
) -> Option<((usize, usize), f32)> {
    let mut best: Option<((usize, usize), f32)> = None;
    let mut consider = |cell: (usize, usize), cost: f32| match best {
        Some((_, current)) if current <= cost => {}
        _ => best = Some((cell, cost)),
    };

    if j > 0 {
        consider((i, j - 1), matrix.get(i, j - 1));
    }
    if i > 0 && j > 0 {
        consider((i - 1, j - 1), diagonal_weight * matrix.get(i - 1, j - 1));
    }
    if i > 0 {
        consider((i - 1, j), matrix.get(i - 1, j));
    }
    best
}
