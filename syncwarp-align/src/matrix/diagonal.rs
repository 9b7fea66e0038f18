//! Offset-column cost matrix for tightly banded access

use super::CostMatrix;
use tracing::trace;

#[derive(Debug, Clone)]
struct OffsetColumn<T> {
    offset: usize,
    cells: Box<[T]>,
}

/// One fixed-height column per A index, positioned at a per-column B offset.
///
/// The first write into a column fixes its offset permanently, so writers
/// must supply the lowest B index of a new column first. Writes that fall
/// outside a column's window are discarded.
#[derive(Debug, Clone)]
pub struct DiagonalMatrix<T> {
    height: usize,
    columns: Vec<Option<OffsetColumn<T>>>,
    default: T,
    extent_i: usize,
    extent_j: usize,
}

impl<T: Copy> DiagonalMatrix<T> {
    pub fn new(height: usize, default: T) -> Self {
        Self {
            height,
            columns: Vec::new(),
            default,
            extent_i: 0,
            extent_j: 0,
        }
    }

    /// B offset of column `i`, if it has been written
    pub fn offset(&self, i: usize) -> Option<usize> {
        self.columns
            .get(i)
            .and_then(Option::as_ref)
            .map(|column| column.offset)
    }
}

impl<T: Copy> CostMatrix<T> for DiagonalMatrix<T> {
    fn get(&self, i: usize, j: usize) -> T {
        self.columns
            .get(i)
            .and_then(Option::as_ref)
            .and_then(|column| {
                j.checked_sub(column.offset)
                    .and_then(|k| column.cells.get(k).copied())
            })
            .unwrap_or(self.default)
    }

    fn set(&mut self, i: usize, j: usize, value: T) {
        if i >= self.columns.len() {
            self.columns.resize_with(i + 1, || None);
        }
        let (height, default) = (self.height, self.default);
        let column = self.columns[i].get_or_insert_with(|| OffsetColumn {
            offset: j,
            cells: vec![default; height].into_boxed_slice(),
        });

        match j.checked_sub(column.offset).filter(|&k| k < height) {
            Some(k) => {
                column.cells[k] = value;
                self.extent_i = self.extent_i.max(i + 1);
                self.extent_j = self.extent_j.max(j + 1);
            }
            None => trace!(
                i,
                j,
                offset = column.offset,
                height,
                "discarding write outside column window"
            ),
        }
    }

    fn extent_i(&self) -> usize {
        self.extent_i
    }

    fn extent_j(&self) -> usize {
        self.extent_j
    }
}
