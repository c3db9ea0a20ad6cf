//! Preallocated sparse row storage

use super::FillPolicy;
use crate::comm::RowShard;
use crate::error::{Error, Result};
use crate::scalar::Scalar;
use crate::sparsity::RowBudgets;
use std::ops::Range;

/// One locally owned row: sorted columns, parallel values, split budgets
#[derive(Debug, Clone, PartialEq)]
struct AijRow<T> {
    cols: Vec<usize>,
    vals: Vec<T>,
    diag_cap: usize,
    offdiag_cap: usize,
    diag_used: usize,
    offdiag_used: usize,
}

impl<T: Scalar> AijRow<T> {
    fn with_budget(diag_cap: usize, offdiag_cap: usize) -> Self {
        let cap = diag_cap + offdiag_cap;
        Self {
            cols: Vec::with_capacity(cap),
            vals: Vec::with_capacity(cap),
            diag_cap,
            offdiag_cap,
            diag_used: 0,
            offdiag_used: 0,
        }
    }
}

/// Sparse row store with per-row preallocated nonzero budgets
///
/// Holds the locally owned rows `[row_start, row_start + local_rows)` of a
/// row-partitioned matrix, every row complete (all of its columns live
/// here, including ones owned by other ranks). Columns inside `col_range`
/// count against the row's diagonal budget, the rest against the
/// off-diagonal budget.
///
/// Entries written with an explicit zero are structural: they occupy a
/// reserved slot and survive [`zero`](AijStorage::zero).
#[derive(Debug, Clone, PartialEq)]
pub struct AijStorage<T: Scalar> {
    row_start: usize,
    global_cols: usize,
    col_range: Range<usize>,
    fill: FillPolicy,
    rows: Vec<AijRow<T>>,
}

impl<T: Scalar> AijStorage<T> {
    /// Create an empty store for the given row block
    ///
    /// `budgets` supplies one `(diag, offdiag)` pair per local row.
    pub fn new(
        row_start: usize,
        global_cols: usize,
        col_range: Range<usize>,
        budgets: &RowBudgets,
        fill: FillPolicy,
    ) -> Self {
        Self {
            row_start,
            global_cols,
            col_range,
            fill,
            rows: budgets
                .iter()
                .map(|(d, o)| AijRow::with_budget(d, o))
                .collect(),
        }
    }

    /// Number of locally owned rows
    pub fn local_rows(&self) -> usize {
        self.rows.len()
    }

    /// Global index of the first locally owned row
    pub fn row_start(&self) -> usize {
        self.row_start
    }

    /// Global column extent
    pub fn global_cols(&self) -> usize {
        self.global_cols
    }

    /// Columns counted against the diagonal budget
    pub fn col_range(&self) -> Range<usize> {
        self.col_range.clone()
    }

    /// The store's fill-in policy
    pub fn fill_policy(&self) -> FillPolicy {
        self.fill
    }

    /// Number of structural nonzeros currently held
    pub fn local_nnz(&self) -> usize {
        self.rows.iter().map(|r| r.cols.len()).sum()
    }

    fn insert(&mut self, local_row: usize, col: usize, value: T, accumulate: bool) -> Result<()> {
        debug_assert!(local_row < self.rows.len());
        debug_assert!(col < self.global_cols);
        let row = &mut self.rows[local_row];
        match row.cols.binary_search(&col) {
            Ok(pos) => {
                row.vals[pos] = if accumulate {
                    row.vals[pos] + value
                } else {
                    value
                };
                Ok(())
            }
            Err(pos) => {
                let on_diag = self.col_range.contains(&col);
                let (used, cap) = if on_diag {
                    (&mut row.diag_used, row.diag_cap)
                } else {
                    (&mut row.offdiag_used, row.offdiag_cap)
                };
                if *used == cap && self.fill == FillPolicy::Reject {
                    return Err(Error::NonexistentEntry {
                        row: self.row_start + local_row,
                        col,
                    });
                }
                *used += 1;
                row.cols.insert(pos, col);
                row.vals.insert(pos, value);
                Ok(())
            }
        }
    }

    /// Overwrite the entry at `(local_row, col)`
    ///
    /// # Errors
    ///
    /// Returns `NonexistentEntry` when the row's budget is exhausted and
    /// the policy is `Reject`.
    pub fn set(&mut self, local_row: usize, col: usize, value: T) -> Result<()> {
        self.insert(local_row, col, value, false)
    }

    /// Accumulate into the entry at `(local_row, col)`
    ///
    /// # Errors
    ///
    /// Returns `NonexistentEntry` when the row's budget is exhausted and
    /// the policy is `Reject`.
    pub fn add(&mut self, local_row: usize, col: usize, value: T) -> Result<()> {
        self.insert(local_row, col, value, true)
    }

    /// Value at `(local_row, col)`, `None` for non-structural positions
    pub fn get(&self, local_row: usize, col: usize) -> Option<T> {
        let row = &self.rows[local_row];
        row.cols
            .binary_search(&col)
            .ok()
            .map(|pos| row.vals[pos])
    }

    /// Sorted columns and values of one local row
    pub fn row(&self, local_row: usize) -> (&[usize], &[T]) {
        let row = &self.rows[local_row];
        (&row.cols, &row.vals)
    }

    /// Set every stored value to zero, keeping the structure
    pub fn zero(&mut self) {
        for row in &mut self.rows {
            row.vals.iter_mut().for_each(|v| *v = T::zero());
        }
    }

    /// Set every stored value of one local row to zero, keeping the structure
    pub fn zero_row(&mut self, local_row: usize) {
        self.rows[local_row].vals.iter_mut().for_each(|v| *v = T::zero());
    }

    /// Diagonal value of a local row (zero when not structural)
    pub fn diagonal_value(&self, local_row: usize) -> T {
        self.get(local_row, self.row_start + local_row)
            .unwrap_or_else(T::zero)
    }

    /// True if `other` holds exactly the same structural positions
    pub fn same_structure(&self, other: &Self) -> bool {
        self.row_start == other.row_start
            && self.global_cols == other.global_cols
            && self.rows.len() == other.rows.len()
            && self
                .rows
                .iter()
                .zip(&other.rows)
                .all(|(a, b)| a.cols == b.cols)
    }

    /// Compute `self += a * other` entrywise
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleStructure` unless `other` has exactly the same
    /// structural positions.
    pub fn axpy(&mut self, a: T, other: &Self) -> Result<()> {
        if !self.same_structure(other) {
            return Err(Error::incompatible(
                "axpy requires matrices with identical nonzero structure",
            ));
        }
        for (dst, src) in self.rows.iter_mut().zip(&other.rows) {
            for (d, s) in dst.vals.iter_mut().zip(&src.vals) {
                *d = *d + a * *s;
            }
        }
        Ok(())
    }

    /// Accumulate `|value|` into `out[col]` for every stored entry
    ///
    /// `out` must span the full global column extent.
    pub fn abs_col_sums(&self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.global_cols);
        for row in &self.rows {
            for (&c, &v) in row.cols.iter().zip(&row.vals) {
                out[c] += v.abs().to_f64();
            }
        }
    }

    /// Sum of `|value|` over one local row
    pub fn abs_row_sum(&self, local_row: usize) -> f64 {
        self.rows[local_row]
            .vals
            .iter()
            .map(|v| v.abs().to_f64())
            .sum()
    }

    /// Snapshot the local rows for one-sided exposure
    pub fn shard(&self) -> RowShard {
        RowShard {
            row_start: self.row_start,
            rows: self
                .rows
                .iter()
                .map(|r| {
                    r.cols
                        .iter()
                        .zip(&r.vals)
                        .map(|(&c, &v)| (c, v.to_f64()))
                        .collect()
                })
                .collect(),
        }
    }
}
