//! Row-partitioned distributed sparse matrices
//!
//! [`DistributedMatrix`] is the algebraic backbone of the assembly
//! pipeline: every rank owns a contiguous block of globally numbered rows,
//! fills the matrix with small dense element contributions (including rows
//! owned by other ranks), and a collective [`close`](DistributedMatrix::close)
//! merges everything into a globally consistent, reduction-ready state.
//!
//! # Lifecycle
//!
//! ```text
//! Empty --init*--> Closed --set/add/add_matrix--> Open --close--> Closed
//!   ^                                                               |
//!   +------------------------------ clear --------------------------+
//! ```
//!
//! `init*`, `close`, `update_preallocation_and_zero`, the norms, and the
//! structural extractions are collective: every rank of the group must call
//! them in the same relative order or the group deadlocks. Insertions are
//! purely local and stage cross-rank contributions until the next `close`.

mod assembly;
mod lifecycle;
mod reduce;

use crate::comm::{Communicator, StagedEntry, WindowId};
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::scalar::Scalar;
use crate::storage::AijStorage;
use parking_lot::RwLock;
use std::ops::Range;
use std::sync::Arc;

/// Assembly lifecycle state of a distributed matrix
///
/// Every mutating insertion goes through an explicit reopen transition;
/// there is no hidden flag flipped as a side effect of setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// Default-constructed: no dimensions, no storage; only init works
    Empty,
    /// Initialized and accepting insertions; reductions may be stale until
    /// pending cross-rank contributions are flushed by `close`
    Open,
    /// All contributions merged; reductions are globally consistent
    Closed,
}

/// Owned or borrowed sparse storage behind a matrix
///
/// Dropping an `Owned` backing frees the store; dropping a `Shared` backing
/// only releases this matrix's handle, so a wrapper around externally
/// created storage structurally cannot free it.
pub(crate) enum Backing<T: Scalar> {
    Owned(Box<AijStorage<T>>),
    Shared(Arc<RwLock<AijStorage<T>>>),
}

impl<T: Scalar> Backing<T> {
    pub(crate) fn with<R>(&self, f: impl FnOnce(&AijStorage<T>) -> R) -> R {
        match self {
            Backing::Owned(s) => f(s),
            Backing::Shared(s) => f(&s.read()),
        }
    }

    pub(crate) fn with_mut<R>(&mut self, f: impl FnOnce(&mut AijStorage<T>) -> R) -> R {
        match self {
            Backing::Owned(s) => f(s),
            Backing::Shared(s) => f(&mut s.write()),
        }
    }
}

impl<T: Scalar> std::fmt::Debug for Backing<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backing::Owned(_) => f.write_str("Backing::Owned"),
            Backing::Shared(_) => f.write_str("Backing::Shared"),
        }
    }
}

/// Row-partitioned distributed sparse matrix
///
/// Generic over the entry scalar (`f32` or `f64`) and built over a
/// [`Communicator`] naming the process group. See the module docs for the
/// lifecycle and collectivity rules.
#[derive(Debug)]
pub struct DistributedMatrix<T: Scalar> {
    comm: Arc<dyn Communicator>,
    state: AssemblyState,
    backing: Option<Backing<T>>,
    rows: Partition,
    cols: Partition,
    block_size: usize,
    /// Contributions to rows owned by other ranks, held until `close`
    stage: Vec<StagedEntry>,
    window: Option<WindowId>,
}

impl<T: Scalar> DistributedMatrix<T> {
    /// Create an empty matrix over the given process group
    ///
    /// The matrix is unusable until one of the `init*` methods establishes
    /// dimensions, partition, and preallocated structure.
    pub fn new(comm: Arc<dyn Communicator>) -> Self {
        Self {
            comm,
            state: AssemblyState::Empty,
            backing: None,
            rows: Partition::default(),
            cols: Partition::default(),
            block_size: 1,
            stage: Vec::new(),
            window: None,
        }
    }

    /// The process group this matrix lives on
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// Current lifecycle state
    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Global number of rows (0 before init)
    pub fn m(&self) -> usize {
        self.rows.total()
    }

    /// Global number of columns (0 before init)
    pub fn n(&self) -> usize {
        self.cols.total()
    }

    /// First globally numbered row owned by this rank (0 before init)
    pub fn row_start(&self) -> usize {
        self.local_row_range().start
    }

    /// One past the last globally numbered row owned by this rank
    pub fn row_stop(&self) -> usize {
        self.local_row_range().end
    }

    /// Uniform coupling-block size used by block-indexed insertion
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of structural nonzeros stored on this rank
    pub fn local_nnz(&self) -> usize {
        match &self.backing {
            Some(b) => b.with(|s| s.local_nnz()),
            None => 0,
        }
    }

    /// True iff no insertion has occurred since the last `close`
    pub fn closed(&self) -> bool {
        self.state == AssemblyState::Closed
    }

    /// Exchange storage handles and metadata with `other` in constant time
    ///
    /// No values are copied; the swap itself is a local operation.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the matrices belong to different process
    /// groups.
    pub fn swap(&mut self, other: &mut Self) -> Result<()> {
        self.check_same_group(other, "other")?;
        std::mem::swap(self, other);
        Ok(())
    }

    // ------------------------------------------------------------------
    // crate-internal helpers shared by the lifecycle/assembly/reduce impls
    // ------------------------------------------------------------------

    pub(crate) fn ensure_init(&self, op: &'static str) -> Result<()> {
        if self.backing.is_none() {
            return Err(Error::NotInitialized { op });
        }
        Ok(())
    }

    /// Explicit `Closed -> Open` transition taken by every mutating insertion
    pub(crate) fn reopen(&mut self) {
        self.state = AssemblyState::Open;
    }

    pub(crate) fn local_row_range(&self) -> Range<usize> {
        if self.backing.is_some() {
            self.rows.range(self.comm.rank())
        } else {
            0..0
        }
    }

    pub(crate) fn local_col_range(&self) -> Range<usize> {
        if self.backing.is_some() {
            self.cols.range(self.comm.rank())
        } else {
            0..0
        }
    }

    pub(crate) fn store<R>(&self, f: impl FnOnce(&AijStorage<T>) -> R) -> R {
        self.backing
            .as_ref()
            .expect("ensure_init() checked before store access")
            .with(f)
    }

    pub(crate) fn store_mut<R>(&mut self, f: impl FnOnce(&mut AijStorage<T>) -> R) -> R {
        self.backing
            .as_mut()
            .expect("ensure_init() checked before store access")
            .with_mut(f)
    }

    /// Re-expose this rank's row snapshot for one-sided remote reads
    pub(crate) fn publish(&mut self) -> Result<()> {
        if let Some(window) = self.window {
            let shard = Arc::new(self.store(|s| s.shard()));
            self.comm.expose(window, shard)?;
        }
        Ok(())
    }

    pub(crate) fn check_same_group(&self, other: &Self, arg: &'static str) -> Result<()> {
        let a = Arc::as_ptr(&self.comm) as *const ();
        let b = Arc::as_ptr(&other.comm) as *const ();
        if !std::ptr::eq(a, b) {
            return Err(Error::InvalidArgument {
                arg,
                reason: "matrix belongs to a different communicator".into(),
            });
        }
        Ok(())
    }
}
