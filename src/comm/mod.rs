//! Process-group communication seam
//!
//! The matrix container never talks to a transport directly; everything
//! cross-rank goes through the [`Communicator`] trait. Two implementations
//! ship with the crate:
//!
//! - [`SerialComm`]: the degenerate single-rank group. Every collective is a
//!   local no-op; this is the path a serial solve takes.
//! - [`ShmemComm`]: an in-process multi-rank group where each rank is a
//!   thread. Collectives rendezvous through shared state, which also lets
//!   the group validate that all ranks arrived at the *same* collective -
//!   call-site divergence surfaces as `CollectiveProtocolViolation` instead
//!   of a silent deadlock.
//!
//! # Collective tags
//!
//! Every collective operation carries a `&'static str` tag naming its call
//! site. Tags are free to pass and let a group implementation cross-check
//! the collective-call sequence across ranks. A rank that never calls a
//! collective at all still deadlocks the group; that is a hard protocol
//! violation by contract, not a recoverable error.

mod serial;
mod shmem;

pub use serial::SerialComm;
pub use shmem::ShmemComm;

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Static call-site tag carried by every collective operation
pub type Tag = &'static str;

/// Identifier of a one-sided read window
///
/// Window ids are allocated collectively ([`Communicator::alloc_window`]) so
/// that all ranks agree on which id names which matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(
    /// Raw window number, unique within a group
    pub u64,
);

/// How a staged entry is applied at its owning rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Overwrite the entry
    Set,
    /// Accumulate into the entry
    Add,
}

/// A single matrix contribution destined for a row owned by another rank
///
/// Values travel as `f64` regardless of the matrix scalar type; the
/// round-trip is exact for both `f32` and `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedEntry {
    /// Global row index
    pub row: usize,
    /// Global column index
    pub col: usize,
    /// Contribution value
    pub value: f64,
    /// Application mode at the owner
    pub mode: InsertMode,
}

/// Read-only snapshot of a rank's locally owned rows
///
/// Owners publish one of these into their read window at `close()` (and
/// after value mutations in the closed state); remote point reads fetch it.
#[derive(Debug, Clone, Default)]
pub struct RowShard {
    /// Global index of the first row in the shard
    pub row_start: usize,
    /// Per-row `(column, value)` pairs, columns strictly increasing
    pub rows: Vec<Vec<(usize, f64)>>,
}

impl RowShard {
    /// Value at `(global_row, col)`, or 0.0 for rows/columns not present
    pub fn get(&self, global_row: usize, col: usize) -> f64 {
        let Some(local) = global_row.checked_sub(self.row_start) else {
            return 0.0;
        };
        let Some(row) = self.rows.get(local) else {
            return 0.0;
        };
        match row.binary_search_by_key(&col, |&(c, _)| c) {
            Ok(pos) => row[pos].1,
            Err(_) => 0.0,
        }
    }
}

/// Process-group abstraction for the distributed matrix
///
/// Collective methods must be invoked by every rank of the group in the
/// same relative order. Window methods (`expose`/`fetch`) are one-sided.
pub trait Communicator: Send + Sync + fmt::Debug {
    /// This rank's index within the group
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Collective: block until every rank has arrived
    fn barrier(&self, tag: Tag) -> Result<()>;

    /// Collective: gather one `u64` from every rank, in rank order
    fn all_gather_u64(&self, tag: Tag, value: u64) -> Result<Vec<u64>>;

    /// Collective: element-wise sum of `buf` across ranks, result on all
    ///
    /// All ranks must pass buffers of identical length.
    fn all_reduce_sum(&self, tag: Tag, buf: &mut [f64]) -> Result<()>;

    /// Collective: maximum of `value` across ranks, result on all
    fn all_reduce_max(&self, tag: Tag, value: f64) -> Result<f64>;

    /// Collective: all-to-all exchange of staged entries
    ///
    /// `outgoing[p]` is the list destined for rank `p` (`outgoing.len()`
    /// must equal `size()`); the return value concatenates everything the
    /// other ranks staged for this one, in rank order.
    fn exchange(&self, tag: Tag, outgoing: Vec<Vec<StagedEntry>>) -> Result<Vec<StagedEntry>>;

    /// Collective: allocate a fresh window id agreed on by all ranks
    fn alloc_window(&self, tag: Tag) -> Result<WindowId>;

    /// One-sided: publish this rank's row snapshot under `window`
    fn expose(&self, window: WindowId, shard: Arc<RowShard>) -> Result<()>;

    /// One-sided: fetch the snapshot rank `owner` last exposed under `window`
    ///
    /// # Errors
    ///
    /// `CollectiveProtocolViolation` if the owner has never exposed the
    /// window (reading a matrix that was never closed).
    fn fetch(&self, window: WindowId, owner: usize) -> Result<Arc<RowShard>>;
}
