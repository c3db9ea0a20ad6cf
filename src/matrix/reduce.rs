//! Reductions and structural queries: point reads, norms, diagonal,
//! transpose, submatrix extraction

use super::{Backing, DistributedMatrix};
use crate::comm::{InsertMode, StagedEntry};
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::scalar::Scalar;
use crate::sparsity::RowBudgets;
use crate::storage::{AijStorage, FillPolicy};
use crate::vector::DistributedVector;
use std::collections::HashMap;
use std::sync::Arc;

impl<T: Scalar> DistributedMatrix<T> {
    /// Read the entry at global coordinates `(i, j)`
    ///
    /// Locally owned rows read the merged store directly; zero is returned
    /// for positions outside the reserved structure, as for any sparse
    /// matrix. Rows owned by another rank are fetched from that rank's
    /// read window, which reflects its last [`close`](Self::close) - an
    /// expensive path intended for debugging and testing, not hot loops.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `IndexOutOfBounds`, or a protocol error when the
    /// owner never exposed its window.
    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        self.ensure_init("get")?;
        if i >= self.m() {
            return Err(Error::IndexOutOfBounds {
                index: i,
                size: self.m(),
            });
        }
        if j >= self.n() {
            return Err(Error::IndexOutOfBounds {
                index: j,
                size: self.n(),
            });
        }

        let range = self.local_row_range();
        if range.contains(&i) {
            return Ok(self
                .store(|s| s.get(i - range.start, j))
                .unwrap_or_else(T::zero));
        }

        let window = self
            .window
            .ok_or_else(|| Error::protocol("matrix has no read window".to_string()))?;
        let shard = self.comm.fetch(window, self.rows.owner(i))?;
        Ok(T::from_f64(shard.get(i, j)))
    }

    /// The l1 norm: maximum absolute column sum
    ///
    /// Collective: columns of a row-partitioned matrix mix contributions
    /// from every rank, so the per-column sums are reduced across the
    /// group before taking the maximum. On an open matrix the result
    /// covers merged storage only and may be stale until `close`.
    ///
    /// # Errors
    ///
    /// `NotInitialized`; `CollectiveProtocolViolation` on divergence.
    pub fn l1_norm(&self) -> Result<f64> {
        self.ensure_init("l1_norm")?;
        let mut sums = vec![0.0f64; self.n()];
        self.store(|s| s.abs_col_sums(&mut sums));
        self.comm
            .all_reduce_sum("DistributedMatrix::l1_norm", &mut sums)?;
        Ok(sums.iter().fold(0.0, |m, &v| m.max(v)))
    }

    /// The l-infinity norm: maximum absolute row sum
    ///
    /// Collective. Rows are never split across ranks, so each rank only
    /// sums its own rows; one max-reduction finds the global maximum.
    ///
    /// # Errors
    ///
    /// As [`l1_norm`](Self::l1_norm).
    pub fn linfty_norm(&self) -> Result<f64> {
        self.ensure_init("linfty_norm")?;
        let local_max = self.store(|s| {
            (0..s.local_rows()).fold(0.0f64, |m, r| m.max(s.abs_row_sum(r)))
        });
        self.comm
            .all_reduce_max("DistributedMatrix::linfty_norm", local_max)
    }

    /// Copy the diagonal into `dest`
    ///
    /// `dest` must share the matrix's row partitioning. Rows past the
    /// column extent of a rectangular matrix contribute zero.
    ///
    /// # Errors
    ///
    /// `NotInitialized`; `IncompatibleStructure` when the partitionings
    /// disagree.
    pub fn get_diagonal(&self, dest: &mut DistributedVector<T>) -> Result<()> {
        self.ensure_init("get_diagonal")?;
        let range = self.local_row_range();
        if dest.len() != self.m() || dest.local_range() != range {
            return Err(Error::incompatible(
                "destination vector partitioning does not match the matrix rows",
            ));
        }
        let n = self.n();
        for i in range.clone() {
            let value = if i < n {
                self.store(|s| s.diagonal_value(i - range.start))
            } else {
                T::zero()
            };
            dest.set(i, value)?;
        }
        Ok(())
    }

    /// Materialize the transpose into `dest`
    ///
    /// Collective. `dest`'s row partition becomes this matrix's column
    /// partition (and vice versa); its previous contents are discarded and
    /// it ends `Closed`. Only merged storage is transposed: close the
    /// matrix first so staged cross-rank contributions are included. For
    /// the aliasing case `dest == self`, use
    /// [`transpose_in_place`](Self::transpose_in_place).
    ///
    /// # Errors
    ///
    /// `NotInitialized`; `InvalidArgument` if `dest` belongs to another
    /// group; `CollectiveProtocolViolation` on divergence.
    pub fn get_transpose(&self, dest: &mut Self) -> Result<()> {
        self.ensure_init("get_transpose")?;
        self.check_same_group(dest, "dest")?;

        // route every local (i, j, v) to the rank owning column j
        let size = self.comm.size();
        let range = self.local_row_range();
        let mut outgoing: Vec<Vec<StagedEntry>> = vec![Vec::new(); size];
        self.store(|s| {
            for r in 0..s.local_rows() {
                let (cols, vals) = s.row(r);
                for (&c, &v) in cols.iter().zip(vals) {
                    outgoing[self.cols.owner(c)].push(StagedEntry {
                        row: c,
                        col: range.start + r,
                        value: v.to_f64(),
                        mode: InsertMode::Set,
                    });
                }
            }
        });
        let received = self
            .comm
            .exchange("DistributedMatrix::get_transpose", outgoing)?;

        // the transposed entries received here are exactly this rank's
        // rows of the transpose, so the budgets are exact
        let t_rows = self.cols.clone();
        let t_cols = self.rows.clone();
        let rank = self.comm.rank();
        let t_row_range = t_rows.range(rank);
        let t_col_range = t_cols.range(rank);
        let mut pairs = vec![(0usize, 0usize); t_row_range.len()];
        for entry in &received {
            let local = entry.row - t_row_range.start;
            if t_col_range.contains(&entry.col) {
                pairs[local].0 += 1;
            } else {
                pairs[local].1 += 1;
            }
        }
        let budgets = RowBudgets::from_pairs(pairs);
        let mut storage = AijStorage::new(
            t_row_range.start,
            self.m(),
            t_col_range,
            &budgets,
            FillPolicy::Reject,
        );
        for entry in received {
            storage.set(
                entry.row - t_row_range.start,
                entry.col,
                T::from_f64(entry.value),
            )?;
        }

        dest.rows = t_rows;
        dest.cols = t_cols;
        dest.block_size = self.block_size;
        dest.backing = Some(Backing::Owned(Box::new(storage)));
        dest.stage.clear();
        dest.finish_collective_rebuild("DistributedMatrix::get_transpose.publish")
    }

    /// Transpose this matrix in place
    ///
    /// Collective. The aliasing counterpart of
    /// [`get_transpose`](Self::get_transpose): the transpose is
    /// materialized into temporary storage and swapped in, so the matrix
    /// is never observable in a half-transposed state.
    ///
    /// # Errors
    ///
    /// As [`get_transpose`](Self::get_transpose).
    pub fn transpose_in_place(&mut self) -> Result<()> {
        self.ensure_init("transpose_in_place")?;
        self.close()?;
        let mut tmp = Self::new(Arc::clone(&self.comm));
        self.get_transpose(&mut tmp)?;
        self.swap(&mut tmp)
    }

    /// Extract the sub-block at the given global row/column index sets
    ///
    /// Collective; every rank must pass identical, strictly increasing
    /// index sets so the extracted partition stays contiguous. Rows are
    /// stored whole per rank, so the extraction itself needs no value
    /// communication; only merged storage is read, so close the matrix
    /// first. With `reuse = true`, `dest` is expected to hold a
    /// structurally compatible extraction from a previous call and is
    /// refreshed in place; a detectable incompatibility fails fast.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unsorted index sets, `IndexOutOfBounds` for
    /// out-of-range indices, `IncompatibleStructure` when `reuse` finds an
    /// incompatible destination.
    pub fn get_submatrix(
        &self,
        dest: &mut Self,
        rows: &[usize],
        cols: &[usize],
        reuse: bool,
    ) -> Result<()> {
        self.ensure_init("get_submatrix")?;
        self.check_same_group(dest, "dest")?;
        Self::check_index_set(rows, "rows", self.m())?;
        Self::check_index_set(cols, "cols", self.n())?;

        // positions of the requested rows/cols owned by this rank
        let range = self.local_row_range();
        let kr = rows.partition_point(|&i| i < range.start)
            ..rows.partition_point(|&i| i < range.end);
        let col_range = self.local_col_range();
        let kc = cols.partition_point(|&j| j < col_range.start)
            ..cols.partition_point(|&j| j < col_range.end);

        let col_pos: HashMap<usize, usize> =
            cols.iter().enumerate().map(|(l, &c)| (c, l)).collect();

        // per-extracted-row (position, value) entries, positions increasing
        let sub_rows: Vec<Vec<(usize, T)>> = self.store(|s| {
            kr.clone()
                .map(|k| {
                    let (row_cols, row_vals) = s.row(rows[k] - range.start);
                    let mut entries: Vec<(usize, T)> = row_cols
                        .iter()
                        .zip(row_vals)
                        .filter_map(|(&c, &v)| col_pos.get(&c).map(|&l| (l, v)))
                        .collect();
                    entries.sort_unstable_by_key(|&(l, _)| l);
                    entries
                })
                .collect()
        });

        if reuse {
            if dest.backing.is_none()
                || dest.m() != rows.len()
                || dest.n() != cols.len()
                || dest.local_row_range() != kr
            {
                return Err(Error::incompatible(
                    "reuse requested but the destination does not match the extraction",
                ));
            }
            dest.store_mut(|s| s.zero());
        } else {
            let pairs = sub_rows
                .iter()
                .map(|entries| {
                    let diag = entries.iter().filter(|(l, _)| kc.contains(l)).count();
                    (diag, entries.len() - diag)
                })
                .collect();
            let storage = AijStorage::new(
                kr.start,
                cols.len(),
                kc.clone(),
                &RowBudgets::from_pairs(pairs),
                FillPolicy::Reject,
            );
            dest.rows = Partition::from_counts(
                &Self::extracted_counts(&self.rows, rows),
                rows.len(),
            )?;
            dest.cols = Partition::from_counts(
                &Self::extracted_counts(&self.cols, cols),
                cols.len(),
            )?;
            dest.block_size = 1;
            dest.backing = Some(Backing::Owned(Box::new(storage)));
            dest.stage.clear();
        }

        for (k, entries) in kr.clone().zip(&sub_rows) {
            let local = k - kr.start;
            for &(l, v) in entries {
                dest.store_mut(|s| s.set(local, l, v))?;
            }
        }
        dest.finish_collective_rebuild("DistributedMatrix::get_submatrix.publish")
    }

    fn check_index_set(indices: &[usize], arg: &'static str, extent: usize) -> Result<()> {
        for pair in indices.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::InvalidArgument {
                    arg,
                    reason: "index set must be strictly increasing".into(),
                });
            }
        }
        if let Some(&last) = indices.last() {
            if last >= extent {
                return Err(Error::IndexOutOfBounds {
                    index: last,
                    size: extent,
                });
            }
        }
        Ok(())
    }

    /// Per-rank counts of `indices` falling into each range of `partition`
    fn extracted_counts(partition: &Partition, indices: &[usize]) -> Vec<u64> {
        (0..partition.size())
            .map(|p| {
                let r = partition.range(p);
                (indices.partition_point(|&i| i < r.end)
                    - indices.partition_point(|&i| i < r.start)) as u64
            })
            .collect()
    }
}
