//! Lifecycle and preallocation: init variants, clear, zero, zero_rows

use super::{AssemblyState, Backing, DistributedMatrix};
use crate::comm::Communicator;
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::scalar::Scalar;
use crate::sparsity::{RowBudgets, SparsityPredictor};
use crate::storage::{AijStorage, FillPolicy};
use parking_lot::RwLock;
use std::sync::Arc;

impl<T: Scalar> DistributedMatrix<T> {
    /// Initialize with the same nonzero budget on every local row
    ///
    /// Collective. Every local row reserves `diag_nnz` slots for columns
    /// owned by this rank and `offdiag_nnz` for columns owned elsewhere.
    /// Convenient for regular meshes; for irregular connectivity prefer
    /// [`init_with_budgets`](Self::init_with_budgets) or the predictor path.
    ///
    /// # Errors
    ///
    /// `InvalidDimension` if the local extents summed across the group do
    /// not reconcile with the global ones; `InvalidArgument` on re-init
    /// without an intervening [`clear`](Self::clear) or on a zero block
    /// size.
    #[allow(clippy::too_many_arguments)]
    pub fn init_uniform(
        &mut self,
        global_rows: usize,
        global_cols: usize,
        local_rows: usize,
        local_cols: usize,
        diag_nnz: usize,
        offdiag_nnz: usize,
        block_size: usize,
    ) -> Result<()> {
        let budgets = RowBudgets::uniform(local_rows, diag_nnz, offdiag_nnz);
        self.init_with_budgets(
            global_rows,
            global_cols,
            local_rows,
            local_cols,
            &budgets,
            block_size,
        )
    }

    /// Initialize with one `(diag, offdiag)` nonzero budget pair per local row
    ///
    /// Collective. This is the exact-preallocation variant: `budgets` must
    /// cover precisely the `local_rows` rows this rank owns, typically
    /// produced by a sparsity predictor from the degree-of-freedom graph.
    ///
    /// # Errors
    ///
    /// As [`init_uniform`](Self::init_uniform), plus `InvalidDimension` if
    /// `budgets.len() != local_rows` or a block size fails to divide the
    /// extents.
    pub fn init_with_budgets(
        &mut self,
        global_rows: usize,
        global_cols: usize,
        local_rows: usize,
        local_cols: usize,
        budgets: &RowBudgets,
        block_size: usize,
    ) -> Result<()> {
        if self.backing.is_some() {
            return Err(Error::InvalidArgument {
                arg: "self",
                reason: "matrix is already initialized; call clear() first".into(),
            });
        }
        if block_size == 0 {
            return Err(Error::InvalidArgument {
                arg: "block_size",
                reason: "block size must be at least 1".into(),
            });
        }
        if budgets.len() != local_rows {
            return Err(Error::InvalidDimension {
                what: "row budgets",
                expected: local_rows,
                got: budgets.len(),
            });
        }
        if block_size > 1 {
            for (what, extent) in [
                ("global rows", global_rows),
                ("global cols", global_cols),
                ("local rows", local_rows),
                ("local cols", local_cols),
            ] {
                if extent % block_size != 0 {
                    return Err(Error::InvalidDimension {
                        what,
                        expected: (extent / block_size) * block_size,
                        got: extent,
                    });
                }
            }
        }

        let row_counts = self
            .comm
            .all_gather_u64("DistributedMatrix::init.rows", local_rows as u64)?;
        let col_counts = self
            .comm
            .all_gather_u64("DistributedMatrix::init.cols", local_cols as u64)?;
        let rows = Partition::from_counts(&row_counts, global_rows)?;
        let cols = Partition::from_counts(&col_counts, global_cols)?;

        let rank = self.comm.rank();
        let storage = AijStorage::new(
            rows.range(rank).start,
            global_cols,
            cols.range(rank),
            budgets,
            FillPolicy::Reject,
        );

        self.rows = rows;
        self.cols = cols;
        self.block_size = block_size;
        self.backing = Some(Backing::Owned(Box::new(storage)));
        self.stage.clear();
        self.finish_collective_rebuild("DistributedMatrix::init.publish")
    }

    /// Initialize from a sparsity predictor
    ///
    /// Collective; the production path of the assembly pipeline. Pulls
    /// global/local dimensions and per-row budgets from the predictor built
    /// over the degree-of-freedom graph.
    ///
    /// # Errors
    ///
    /// `NoSparsityAvailable` if the predictor's dof graph has not been
    /// prepared, plus everything [`init_with_budgets`](Self::init_with_budgets)
    /// can return.
    pub fn init_from_predictor(&mut self, predictor: &dyn SparsityPredictor) -> Result<()> {
        let (global_rows, global_cols) = predictor.global_dims();
        let (local_rows, local_cols) = predictor.local_dims();
        let budgets = predictor.row_budgets()?;
        self.init_with_budgets(global_rows, global_cols, local_rows, local_cols, &budgets, 1)
    }

    /// Wrap externally owned storage without taking ownership
    ///
    /// Collective. The returned matrix reads and writes through the shared
    /// handle but never frees it; the creation site keeps its `Arc` and the
    /// storage outlives every wrapper by construction.
    ///
    /// # Errors
    ///
    /// `InvalidDimension` if the per-rank stores do not line up into a
    /// consistent global partition.
    pub fn wrap_shared(
        comm: Arc<dyn Communicator>,
        store: Arc<RwLock<AijStorage<T>>>,
    ) -> Result<Self> {
        let (local_rows, local_cols, row_start, global_cols) = {
            let s = store.read();
            (
                s.local_rows(),
                s.col_range().len(),
                s.row_start(),
                s.global_cols(),
            )
        };

        let row_counts = comm.all_gather_u64("DistributedMatrix::wrap.rows", local_rows as u64)?;
        let col_counts = comm.all_gather_u64("DistributedMatrix::wrap.cols", local_cols as u64)?;
        let global_rows: usize = row_counts.iter().sum::<u64>() as usize;
        let rows = Partition::from_counts(&row_counts, global_rows)?;
        let cols = Partition::from_counts(&col_counts, global_cols)?;

        let rank = comm.rank();
        if rows.range(rank).start != row_start {
            return Err(Error::InvalidDimension {
                what: "wrapped store row offset",
                expected: rows.range(rank).start,
                got: row_start,
            });
        }

        let mut matrix = Self::new(comm);
        matrix.rows = rows;
        matrix.cols = cols;
        matrix.backing = Some(Backing::Shared(store));
        matrix.finish_collective_rebuild("DistributedMatrix::wrap.publish")?;
        Ok(matrix)
    }

    /// Re-derive the nonzero structure from the predictor and zero all values
    ///
    /// Collective. Keeps the matrix identity (dimensions and partition) but
    /// widens the reserved structure to the predictor's current pattern,
    /// for workflows where the sparsity legitimately changes between solves
    /// (adaptive refinement).
    ///
    /// # Errors
    ///
    /// `InvalidDimension` if the predictor's dimensions drifted from the
    /// matrix's; `NoSparsityAvailable` from an unprepared predictor.
    pub fn update_preallocation_and_zero(
        &mut self,
        predictor: &dyn SparsityPredictor,
    ) -> Result<()> {
        self.ensure_init("update_preallocation_and_zero")?;

        let (global_rows, global_cols) = predictor.global_dims();
        if global_rows != self.m() {
            return Err(Error::InvalidDimension {
                what: "predictor global rows",
                expected: self.m(),
                got: global_rows,
            });
        }
        if global_cols != self.n() {
            return Err(Error::InvalidDimension {
                what: "predictor global cols",
                expected: self.n(),
                got: global_cols,
            });
        }
        let (local_rows, _) = predictor.local_dims();
        if local_rows != self.local_row_range().len() {
            return Err(Error::InvalidDimension {
                what: "predictor local rows",
                expected: self.local_row_range().len(),
                got: local_rows,
            });
        }

        let budgets = predictor.row_budgets()?;
        let fresh = AijStorage::new(
            self.local_row_range().start,
            global_cols,
            self.local_col_range(),
            &budgets,
            FillPolicy::Reject,
        );
        self.store_mut(|s| *s = fresh);
        self.stage.clear();
        self.finish_collective_rebuild("DistributedMatrix::update_preallocation.publish")
    }

    /// Release all resources and return to the default-constructed state
    ///
    /// Owned storage is freed; shared storage stays with its creator. The
    /// matrix can be re-initialized afterwards.
    pub fn clear(&mut self) {
        self.backing = None;
        self.rows = Partition::default();
        self.cols = Partition::default();
        self.block_size = 1;
        self.stage.clear();
        self.window = None;
        self.state = AssemblyState::Empty;
    }

    /// Set every stored entry to zero, retaining the reserved structure
    ///
    /// Local; much cheaper than reallocation-based clearing. Contributions
    /// staged for other ranks are discarded too, so the matrix reads as
    /// zero after the next `close()` as well. Does not change the
    /// lifecycle state.
    ///
    /// # Errors
    ///
    /// `NotInitialized` on an empty matrix.
    pub fn zero(&mut self) -> Result<()> {
        self.ensure_init("zero")?;
        self.store_mut(|s| s.zero());
        self.stage.clear();
        self.publish()
    }

    /// Zero every entry of the given rows, then put `diag_value` on the diagonal
    ///
    /// The workhorse of essential (Dirichlet) boundary condition
    /// imposition. Only locally owned rows from `rows` are touched; every
    /// rank calls with its own subset and the cross-rank consistency of the
    /// full set is the caller's obligation.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` for any globally invalid row index (owned or
    /// not); `NonexistentEntry` if a touched row has no budget left for its
    /// diagonal slot.
    pub fn zero_rows(&mut self, rows: &[usize], diag_value: T) -> Result<()> {
        self.ensure_init("zero_rows")?;
        let m = self.m();
        let n = self.n();
        for &i in rows {
            if i >= m {
                return Err(Error::IndexOutOfBounds { index: i, size: m });
            }
        }
        let range = self.local_row_range();
        for &i in rows {
            if !range.contains(&i) {
                continue;
            }
            let local = i - range.start;
            self.store_mut(|s| -> Result<()> {
                s.zero_row(local);
                if i < n {
                    s.set(local, i, diag_value)?;
                }
                Ok(())
            })?;
        }
        self.publish()
    }

    /// Common tail of every collective (re)initialization: expose the read
    /// window, synchronize so remote reads see it, land in `Closed`.
    pub(super) fn finish_collective_rebuild(&mut self, tag: &'static str) -> Result<()> {
        if self.window.is_none() {
            self.window = Some(self.comm.alloc_window(tag)?);
        }
        self.publish()?;
        self.comm.barrier(tag)?;
        self.state = AssemblyState::Closed;
        Ok(())
    }
}
