//! Fixed-capacity ring buffer with a sliding index window

use std::collections::VecDeque;
use thiserror::Error;

/// Errors raised when addressing outside the retained window
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("index {index} out of range for {count} retained items")]
    OutOfRange { index: usize, count: usize },
    #[error("item {index} was evicted; oldest retained is {oldest}")]
    Evicted { index: usize, oldest: usize },
}

/// Circular buffer that keeps the most recent `capacity` items.
///
/// Items are addressed either by logical index (0 = oldest retained) or by
/// absolute append ordinal. Evicted items cannot be recovered.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    appended: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            appended: 0,
        }
    }

    /// Append an item, evicting the oldest one when full
    pub fn append(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
        self.appended += 1;
    }

    /// Item at a logical position counted from the oldest retained item
    pub fn get(&self, index: usize) -> Result<&T, RingBufferError> {
        self.items.get(index).ok_or(RingBufferError::OutOfRange {
            index,
            count: self.items.len(),
        })
    }

    /// Item by the ordinal it was appended with
    pub fn get_absolute(&self, ordinal: usize) -> Result<&T, RingBufferError> {
        let oldest = self.oldest_index();
        if ordinal < oldest {
            return Err(RingBufferError::Evicted {
                index: ordinal,
                oldest,
            });
        }
        self.get(ordinal - oldest)
    }

    /// Number of retained items
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of items ever appended
    pub fn total_appended(&self) -> usize {
        self.appended
    }

    /// Append ordinal of the oldest retained item
    pub fn oldest_index(&self) -> usize {
        self.appended - self.items.len()
    }
}
