//! # femr
//!
//! **Distributed sparse matrix assembly for finite-element codes in Rust.**
//!
//! femr provides a row-partitioned sparse matrix container built for the
//! element-by-element assembly pattern: many small dense contributions
//! scattered into a global matrix, including into rows owned by other
//! ranks, merged by an explicit collective flush.
//!
//! ## Why femr?
//!
//! - **Assembly-first**: `add_matrix` scatters dense element blocks,
//!   staging off-rank rows automatically
//! - **Exact preallocation**: per-row diagonal/off-diagonal nonzero
//!   budgets, with fill-in rejected or allowed by policy
//! - **Explicit lifecycle**: an `Empty -> Open -> Closed` state machine
//!   with no hidden flag flips
//! - **Pluggable process groups**: a `Communicator` trait with a serial
//!   implementation and an in-process multi-rank one for testing
//! - **Protocol checking**: diverging collective call sequences are
//!   reported as errors instead of silent deadlocks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use femr::prelude::*;
//! use std::sync::Arc;
//!
//! let comm: Arc<dyn Communicator> = Arc::new(SerialComm::new());
//! let mut a = DistributedMatrix::<f64>::new(comm);
//! a.init_uniform(4, 4, 4, 4, 3, 0, 1)?;
//!
//! let block = DenseBlock::filled(2, 2, 1.0);
//! a.add_matrix_square(&block, &[0, 1])?;
//! a.add_matrix_square(&block, &[1, 2])?;
//! a.close()?;
//!
//! assert_eq!(a.get(1, 1)?, 2.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comm;
pub mod dense;
pub mod error;
pub mod matrix;
pub mod partition;
pub mod scalar;
pub mod sparsity;
pub mod storage;
pub mod vector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::comm::{Communicator, InsertMode, SerialComm, ShmemComm};
    pub use crate::dense::DenseBlock;
    pub use crate::error::{Error, Result};
    pub use crate::matrix::{AssemblyState, DistributedMatrix};
    pub use crate::partition::Partition;
    pub use crate::scalar::Scalar;
    pub use crate::sparsity::{DofGraph, RowBudgets, SparsityPredictor};
    pub use crate::storage::{AijStorage, FillPolicy};
    pub use crate::vector::DistributedVector;
}
