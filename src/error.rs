//! Error types for femr

use thiserror::Error;

/// Result type alias using femr's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in femr operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operation requires an initialized matrix
    #[error("Matrix not initialized: '{op}' requires init() first")]
    NotInitialized {
        /// The operation that was attempted
        op: &'static str,
    },

    /// Global/local dimension mismatch at init
    #[error("Invalid dimension for {what}: expected {expected}, got {got}")]
    InvalidDimension {
        /// What was being sized
        what: &'static str,
        /// Expected extent
        expected: usize,
        /// Actual extent
        got: usize,
    },

    /// Dense block shape does not match the index arrays
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Expected (rows, cols)
        expected: (usize, usize),
        /// Actual (rows, cols)
        got: (usize, usize),
    },

    /// Index out of bounds
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index
        index: usize,
        /// Size of the dimension
        size: usize,
    },

    /// Write to a position outside the preallocated structure
    #[error("Nonexistent entry ({row}, {col}): fill-in beyond the preallocated structure")]
    NonexistentEntry {
        /// Global row index
        row: usize,
        /// Global column index
        col: usize,
    },

    /// Operation requires matrices with identical nonzero structure
    #[error("Incompatible structure: {0}")]
    IncompatibleStructure(String),

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// The sparsity predictor has no pattern to offer yet
    #[error("No sparsity available: the degree-of-freedom graph has not been prepared")]
    NoSparsityAvailable,

    /// Detected divergence in the collective-call sequence across ranks
    ///
    /// This is a fatal programming error at the protocol level; there is no
    /// user-visible recovery path.
    #[error("Collective protocol violation: {0}")]
    CollectiveProtocolViolation(String),
}

impl Error {
    /// Create an incompatible-structure error
    pub fn incompatible(reason: impl Into<String>) -> Self {
        Self::IncompatibleStructure(reason.into())
    }

    /// Create a collective-protocol-violation error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::CollectiveProtocolViolation(reason.into())
    }
}
