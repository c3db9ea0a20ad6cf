//! Single-rank communicator

use super::{Communicator, RowShard, StagedEntry, Tag, WindowId};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The degenerate process group: one rank, no transport
///
/// Collectives return immediately with this rank's own contribution;
/// windows are a local map. A matrix built over a `SerialComm` behaves
/// exactly like a serial sparse matrix.
#[derive(Debug, Default)]
pub struct SerialComm {
    windows: Mutex<HashMap<WindowId, Arc<RowShard>>>,
    next_window: AtomicU64,
}

impl SerialComm {
    /// Create a single-rank communicator
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self, _tag: Tag) -> Result<()> {
        Ok(())
    }

    fn all_gather_u64(&self, _tag: Tag, value: u64) -> Result<Vec<u64>> {
        Ok(vec![value])
    }

    fn all_reduce_sum(&self, _tag: Tag, _buf: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn all_reduce_max(&self, _tag: Tag, value: f64) -> Result<f64> {
        Ok(value)
    }

    fn exchange(&self, _tag: Tag, mut outgoing: Vec<Vec<StagedEntry>>) -> Result<Vec<StagedEntry>> {
        debug_assert_eq!(outgoing.len(), 1);
        Ok(outgoing.pop().unwrap_or_default())
    }

    fn alloc_window(&self, _tag: Tag) -> Result<WindowId> {
        Ok(WindowId(self.next_window.fetch_add(1, Ordering::Relaxed)))
    }

    fn expose(&self, window: WindowId, shard: Arc<RowShard>) -> Result<()> {
        self.windows.lock().insert(window, shard);
        Ok(())
    }

    fn fetch(&self, window: WindowId, owner: usize) -> Result<Arc<RowShard>> {
        if owner != 0 {
            return Err(Error::IndexOutOfBounds {
                index: owner,
                size: 1,
            });
        }
        self.windows
            .lock()
            .get(&window)
            .cloned()
            .ok_or_else(|| Error::protocol(format!("window {:?} was never exposed", window)))
    }
}
