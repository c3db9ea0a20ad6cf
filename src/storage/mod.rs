//! Underlying sparse storage backends
//!
//! The distributed matrix owns (or borrows) an [`AijStorage`], a
//! preallocated sparse row store playing the role the numerical library's
//! matrix handle plays in the assembly pipeline. Its capacity contract is
//! the load-bearing part: every local row reserves a fixed nonzero budget,
//! split between columns owned by this rank and columns owned elsewhere,
//! and writing past a row's budget is governed by [`FillPolicy`].

mod aij;

pub use aij::AijStorage;

/// What the backend does when a write lands outside the preallocated budget
///
/// Real backends differ: some reject fill-in outright, others silently
/// allocate at high cost. The matrix surfaces whichever behavior occurs; it
/// never masks a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPolicy {
    /// Reject writes beyond a row's budget with `NonexistentEntry`
    #[default]
    Reject,
    /// Grow the row to accept the write (expensive, never fails)
    Allow,
}
