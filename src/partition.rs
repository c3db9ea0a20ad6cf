//! Contiguous index partitions across a process group
//!
//! Every global row (or column) index belongs to exactly one rank; the
//! per-rank ranges are contiguous, half-open, and cover `[0, total)` with no
//! gaps or overlaps.

use crate::error::{Error, Result};
use std::ops::Range;

/// Ownership map for a contiguously partitioned index space
///
/// Stored as an offsets table of length `size + 1`: rank `p` owns
/// `[offsets[p], offsets[p + 1])`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    offsets: Vec<usize>,
}

impl Partition {
    /// Build a partition from per-rank local counts
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimension` if the counts do not sum to `total`.
    pub fn from_counts(counts: &[u64], total: usize) -> Result<Self> {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut acc = 0usize;
        offsets.push(0);
        for &c in counts {
            acc += c as usize;
            offsets.push(acc);
        }
        if acc != total {
            return Err(Error::InvalidDimension {
                what: "partition local counts",
                expected: total,
                got: acc,
            });
        }
        Ok(Self { offsets })
    }

    /// Total number of indices covered
    pub fn total(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }

    /// Number of ranks in the partition
    pub fn size(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Half-open index range owned by `rank`
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.offsets[rank]..self.offsets[rank + 1]
    }

    /// Rank owning the given global index
    ///
    /// # Panics
    ///
    /// Panics if `index >= total()` (only in debug mode).
    pub fn owner(&self, index: usize) -> usize {
        debug_assert!(index < self.total());
        // offsets is sorted; find the last offset <= index
        match self.offsets.binary_search(&index) {
            Ok(mut p) => {
                // lands on a boundary shared by an empty range: skip forward
                while self.offsets[p + 1] == index {
                    p += 1;
                }
                p
            }
            Err(p) => p - 1,
        }
    }

    /// True if `rank` owns `index`
    pub fn owns(&self, rank: usize, index: usize) -> bool {
        self.range(rank).contains(&index)
    }
}
