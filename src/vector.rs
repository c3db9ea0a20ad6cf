//! Row-partitioned distributed vectors
//!
//! Minimal vector counterpart of the distributed matrix: each rank owns a
//! contiguous range of globally numbered entries. It is the destination of
//! diagonal extraction and reports its owned range so the matrix can check
//! partition compatibility.

use crate::error::{Error, Result};
use crate::scalar::Scalar;
use std::ops::Range;

/// Distributed vector with a contiguous locally owned range
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedVector<T: Scalar> {
    global_len: usize,
    range: Range<usize>,
    values: Vec<T>,
}

impl<T: Scalar> DistributedVector<T> {
    /// Create a zeroed vector owning `range` out of `global_len` entries
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if the range exceeds the global length.
    pub fn new(global_len: usize, range: Range<usize>) -> Result<Self> {
        if range.end > global_len || range.start > range.end {
            return Err(Error::IndexOutOfBounds {
                index: range.end,
                size: global_len,
            });
        }
        let local = range.len();
        Ok(Self {
            global_len,
            range,
            values: vec![T::zero(); local],
        })
    }

    /// Global length of the vector
    pub fn len(&self) -> usize {
        self.global_len
    }

    /// True if the global length is zero
    pub fn is_empty(&self) -> bool {
        self.global_len == 0
    }

    /// Index of the first locally owned entry
    pub fn first_local_index(&self) -> usize {
        self.range.start
    }

    /// Index one past the last locally owned entry
    pub fn last_local_index(&self) -> usize {
        self.range.end
    }

    /// Locally owned half-open range
    pub fn local_range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Locally owned values, in global index order
    pub fn local_values(&self) -> &[T] {
        &self.values
    }

    /// Read the globally indexed entry `i`, which must be locally owned
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if `i` is outside the owned range.
    pub fn get(&self, i: usize) -> Result<T> {
        if !self.range.contains(&i) {
            return Err(Error::IndexOutOfBounds {
                index: i,
                size: self.global_len,
            });
        }
        Ok(self.values[i - self.range.start])
    }

    /// Write the globally indexed entry `i`, which must be locally owned
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` if `i` is outside the owned range.
    pub fn set(&mut self, i: usize, value: T) -> Result<()> {
        if !self.range.contains(&i) {
            return Err(Error::IndexOutOfBounds {
                index: i,
                size: self.global_len,
            });
        }
        self.values[i - self.range.start] = value;
        Ok(())
    }

    /// Set every locally owned entry to zero
    pub fn zero(&mut self) {
        self.values.iter_mut().for_each(|v| *v = T::zero());
    }
}
