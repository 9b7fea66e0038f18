//! Full rectangular cost matrix

use super::CostMatrix;

/// Row-major matrix sized at construction
#[derive(Debug, Clone)]
pub struct DenseMatrix<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
    default: T,
    extent_i: usize,
    extent_j: usize,
}

impl<T: Copy> DenseMatrix<T> {
    pub fn new(rows: usize, cols: usize, default: T) -> Self {
        Self {
            rows,
            cols,
            cells: vec![default; rows * cols],
            default,
            extent_i: 0,
            extent_j: 0,
        }
    }
}

impl<T: Copy> CostMatrix<T> for DenseMatrix<T> {
    fn get(&self, i: usize, j: usize) -> T {
        if i < self.rows && j < self.cols {
            self.cells[i * self.cols + j]
        } else {
            self.default
        }
    }

    /// # Panics
    ///
    /// Panics if (i, j) lies outside the dimensions given at construction.
    fn set(&mut self, i: usize, j: usize, value: T) {
        assert!(
            i < self.rows && j < self.cols,
            "cell ({}, {}) outside {}x{} matrix",
            i,
            j,
            self.rows,
            self.cols
        );
        self.cells[i * self.cols + j] = value;
        self.extent_i = self.extent_i.max(i + 1);
        self.extent_j = self.extent_j.max(j + 1);
    }

    fn extent_i(&self) -> usize {
        self.extent_i
    }

    fn extent_j(&self) -> usize {
        self.extent_j
    }
}
