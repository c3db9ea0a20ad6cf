//! Insertion and assembly: set/add, element scatter, close

use super::{AssemblyState, DistributedMatrix};
use crate::comm::{InsertMode, StagedEntry};
use crate::dense::DenseBlock;
use crate::error::{Error, Result};
use crate::scalar::Scalar;
use smallvec::SmallVec;

/// Scatter indices expanded from block indices rarely exceed a few dozen
type IndexBuf = SmallVec<[usize; 32]>;

impl<T: Scalar> DistributedMatrix<T> {
    /// Set the entry `(i, j)` to `value`
    ///
    /// Local; reopens the matrix. Writes to rows owned by other ranks are
    /// staged and merged at the next [`close`](Self::close). Note that
    /// concurrent `set` calls to one entry from several ranks have no
    /// defined winner; use [`add`](Self::add) for concurrent contributions.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `IndexOutOfBounds`, or `NonexistentEntry` when the
    /// owning row's preallocated budget is exhausted.
    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.insert_scalar(i, j, value, InsertMode::Set, "set")
    }

    /// Add `value` to the entry `(i, j)`
    ///
    /// Local; reopens the matrix. Contributions to one entry from several
    /// ranks are summed at the owner, never interleaved.
    ///
    /// # Errors
    ///
    /// As [`set`](Self::set).
    pub fn add(&mut self, i: usize, j: usize, value: T) -> Result<()> {
        self.insert_scalar(i, j, value, InsertMode::Add, "add")
    }

    fn insert_scalar(
        &mut self,
        i: usize,
        j: usize,
        value: T,
        mode: InsertMode,
        op: &'static str,
    ) -> Result<()> {
        self.ensure_init(op)?;
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
            let local = i - range.start;
            self.store_mut(|s| match mode {
                InsertMode::Set => s.set(local, j, value),
                InsertMode::Add => s.add(local, j, value),
            })?;
        } else {
            self.stage.push(StagedEntry {
                row: i,
                col: j,
                value: value.to_f64(),
                mode,
            });
        }
        // reopen only once the write landed: a rejected write leaves the
        // lifecycle state untouched
        self.reopen();
        Ok(())
    }

    /// Scatter-add a dense element block at `rows x cols`
    ///
    /// The primary entry point of element-local assembly: `block[(p, q)]`
    /// is accumulated into global entry `(rows[p], cols[q])`. Local; rows
    /// owned elsewhere are staged for the next [`close`](Self::close).
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` unless `block` is exactly
    /// `(rows.len(), cols.len())`, plus everything [`add`](Self::add) can
    /// return.
    pub fn add_matrix(&mut self, block: &DenseBlock<T>, rows: &[usize], cols: &[usize]) -> Result<()> {
        if block.rows() != rows.len() || block.cols() != cols.len() {
            return Err(Error::DimensionMismatch {
                expected: (rows.len(), cols.len()),
                got: (block.rows(), block.cols()),
            });
        }
        for (p, &i) in rows.iter().enumerate() {
            for (q, &j) in cols.iter().enumerate() {
                self.add(i, j, block.get(p, q))?;
            }
        }
        Ok(())
    }

    /// Scatter-add a square dense block with one shared dof index set
    ///
    /// # Errors
    ///
    /// As [`add_matrix`](Self::add_matrix); the block must be
    /// `dofs.len() x dofs.len()`.
    pub fn add_matrix_square(&mut self, block: &DenseBlock<T>, dofs: &[usize]) -> Result<()> {
        self.add_matrix(block, dofs, dofs)
    }

    /// Scatter-add a dense block addressed by *block* row/column indices
    ///
    /// Each index in `brows`/`bcols` addresses a contiguous run of
    /// [`block_size`](Self::block_size) scalar rows/columns, for systems
    /// with multiple co-located field variables sharing one sparsity.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` unless `block` is exactly
    /// `(brows.len() * block_size, bcols.len() * block_size)`.
    pub fn add_block_matrix(
        &mut self,
        block: &DenseBlock<T>,
        brows: &[usize],
        bcols: &[usize],
    ) -> Result<()> {
        let bs = self.block_size;
        if block.rows() != brows.len() * bs || block.cols() != bcols.len() * bs {
            return Err(Error::DimensionMismatch {
                expected: (brows.len() * bs, bcols.len() * bs),
                got: (block.rows(), block.cols()),
            });
        }
        let rows: IndexBuf = brows
            .iter()
            .flat_map(|&b| (0..bs).map(move |k| b * bs + k))
            .collect();
        let cols: IndexBuf = bcols
            .iter()
            .flat_map(|&b| (0..bs).map(move |k| b * bs + k))
            .collect();
        self.add_matrix(block, &rows, &cols)
    }

    /// Block-indexed scatter-add with one shared block dof index set
    ///
    /// # Errors
    ///
    /// As [`add_block_matrix`](Self::add_block_matrix).
    pub fn add_block_matrix_square(&mut self, block: &DenseBlock<T>, bdofs: &[usize]) -> Result<()> {
        self.add_block_matrix(block, bdofs, bdofs)
    }

    /// Compute `self += a * other` entrywise
    ///
    /// Collective (both matrices are flushed first). The two matrices must
    /// have identical nonzero structure; unlike backends that corrupt
    /// silently, the in-crate store checks this cheaply and refuses.
    ///
    /// # Errors
    ///
    /// `IncompatibleStructure` on mismatched sparsity, plus anything
    /// [`close`](Self::close) can return.
    pub fn add_scaled(&mut self, a: T, other: &mut Self) -> Result<()> {
        self.ensure_init("add_scaled")?;
        other.ensure_init("add_scaled")?;
        self.check_same_group(other, "other")?;

        other.close()?;
        self.close()?;

        let other_backing = other
            .backing
            .as_ref()
            .expect("ensure_init() checked before store access");
        other_backing.with(|o| self.store_mut(|s| s.axpy(a, o)))?;
        self.publish()
    }

    /// Flush the assembly: merge every staged cross-rank contribution
    ///
    /// Collective. Staged entries are exchanged all-to-all, applied at
    /// their owning ranks (`add`s accumulate exactly, `set`s apply in
    /// arrival order), and the read window is republished. Calling on an
    /// already-closed matrix leaves the observable state unchanged but
    /// still participates in the exchange, so *every* rank must call
    /// `close` the same number of times; a missing call deadlocks the
    /// group.
    ///
    /// # Errors
    ///
    /// `NonexistentEntry` if a received contribution lands outside the
    /// owner's preallocated budget (reported on the owning rank only, and
    /// only after the group has synchronized, so the other ranks complete
    /// their `close` instead of deadlocking); `CollectiveProtocolViolation`
    /// from the communicator on call-sequence divergence.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_init("close")?;

        let size = self.comm.size();
        let mut outgoing: Vec<Vec<StagedEntry>> = vec![Vec::new(); size];
        for entry in self.stage.drain(..) {
            outgoing[self.rows.owner(entry.row)].push(entry);
        }
        let received = self
            .comm
            .exchange("DistributedMatrix::close", outgoing)?;

        let range = self.local_row_range();
        let mut applied = Ok(());
        for entry in received {
            debug_assert!(range.contains(&entry.row));
            let local = entry.row - range.start;
            let value = T::from_f64(entry.value);
            applied = self.store_mut(|s| match entry.mode {
                InsertMode::Set => s.set(local, entry.col, value),
                InsertMode::Add => s.add(local, entry.col, value),
            });
            if applied.is_err() {
                break;
            }
        }

        self.publish()?;
        self.comm.barrier("DistributedMatrix::close.publish")?;
        applied?;
        self.state = AssemblyState::Closed;
        Ok(())
    }
}
