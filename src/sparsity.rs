//! Sparsity prediction for preallocation
//!
//! The nonzero structure of an assembled matrix must be reserved before any
//! values are known; getting the per-row budgets wrong costs either wasted
//! memory or reallocation during assembly. Budgets are split per row into a
//! "diagonal" part (columns owned by this rank) and an "off-diagonal" part
//! (columns owned elsewhere), the split the storage backend preallocates by.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::ops::Range;

/// Per-row nonzero budgets for the locally owned rows
///
/// One `(diagonal, offdiagonal)` count pair per local row, kept in a single
/// container so the two related counts cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowBudgets {
    pairs: Vec<(usize, usize)>,
}

impl RowBudgets {
    /// The same fixed budget for every local row
    pub fn uniform(local_rows: usize, diag_nnz: usize, offdiag_nnz: usize) -> Self {
        Self {
            pairs: vec![(diag_nnz, offdiag_nnz); local_rows],
        }
    }

    /// One explicit `(diag, offdiag)` pair per local row
    pub fn from_pairs(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    /// Build from two parallel count arrays
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimension` if the arrays differ in length.
    pub fn from_split(diag: &[usize], offdiag: &[usize]) -> Result<Self> {
        if diag.len() != offdiag.len() {
            return Err(Error::InvalidDimension {
                what: "off-diagonal count array",
                expected: diag.len(),
                got: offdiag.len(),
            });
        }
        Ok(Self {
            pairs: diag.iter().copied().zip(offdiag.iter().copied()).collect(),
        })
    }

    /// Number of local rows covered
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if no rows are covered
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Budget pair for local row `r`
    pub fn get(&self, r: usize) -> (usize, usize) {
        self.pairs[r]
    }

    /// Iterate over `(diag, offdiag)` pairs in local row order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs.iter().copied()
    }
}

/// Supplier of matrix dimensions and per-row nonzero budgets
///
/// The production init path pulls everything it needs from a predictor
/// built over the degree-of-freedom graph of the mesh.
pub trait SparsityPredictor {
    /// Global `(rows, cols)` of the matrix to be allocated
    fn global_dims(&self) -> (usize, usize);

    /// This rank's local `(rows, cols)` counts
    fn local_dims(&self) -> (usize, usize);

    /// Per-row budgets for the locally owned rows
    ///
    /// # Errors
    ///
    /// Returns `NoSparsityAvailable` if the underlying dof graph has not
    /// been prepared yet.
    fn row_budgets(&self) -> Result<RowBudgets>;
}

/// Sparsity predictor backed by an explicit degree-of-freedom graph
///
/// Couplings are registered per locally owned row as global column indices;
/// [`prepare`](DofGraph::prepare) freezes the graph, after which budgets can
/// be derived. Asking for budgets before preparing is the "dof map not built
/// yet" error case.
#[derive(Debug, Clone)]
pub struct DofGraph {
    global_rows: usize,
    global_cols: usize,
    row_range: Range<usize>,
    col_range: Range<usize>,
    couplings: Vec<BTreeSet<usize>>,
    prepared: bool,
}

impl DofGraph {
    /// Create an empty graph for the given global dims and owned ranges
    pub fn new(
        global_rows: usize,
        global_cols: usize,
        row_range: Range<usize>,
        col_range: Range<usize>,
    ) -> Self {
        let local_rows = row_range.len();
        Self {
            global_rows,
            global_cols,
            row_range,
            col_range,
            couplings: vec![BTreeSet::new(); local_rows],
            prepared: false,
        }
    }

    /// Register that global row `i` couples with global column `j`
    ///
    /// Rows not owned by this rank are ignored (their owners register them);
    /// duplicate registrations are collapsed.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` for columns outside the global extent.
    pub fn couple(&mut self, i: usize, j: usize) -> Result<()> {
        if j >= self.global_cols {
            return Err(Error::IndexOutOfBounds {
                index: j,
                size: self.global_cols,
            });
        }
        if self.row_range.contains(&i) {
            self.couplings[i - self.row_range.start].insert(j);
        }
        self.prepared = false;
        Ok(())
    }

    /// Register the full coupling clique of one element's dof set
    ///
    /// Every dof in `dofs` couples with every other (including itself),
    /// which is exactly the fill an element matrix scatter produces.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfBounds` for dofs outside the global extent.
    pub fn couple_element(&mut self, dofs: &[usize]) -> Result<()> {
        for &i in dofs {
            if i >= self.global_rows {
                return Err(Error::IndexOutOfBounds {
                    index: i,
                    size: self.global_rows,
                });
            }
            for &j in dofs {
                self.couple(i, j)?;
            }
        }
        Ok(())
    }

    /// Freeze the graph so budgets can be derived
    pub fn prepare(&mut self) {
        self.prepared = true;
    }
}

impl SparsityPredictor for DofGraph {
    fn global_dims(&self) -> (usize, usize) {
        (self.global_rows, self.global_cols)
    }

    fn local_dims(&self) -> (usize, usize) {
        (self.row_range.len(), self.col_range.len())
    }

    fn row_budgets(&self) -> Result<RowBudgets> {
        if !self.prepared {
            return Err(Error::NoSparsityAvailable);
        }
        let pairs = self
            .couplings
            .iter()
            .map(|cols| {
                let diag = cols.iter().filter(|c| self.col_range.contains(c)).count();
                (diag, cols.len() - diag)
            })
            .collect();
        Ok(RowBudgets::from_pairs(pairs))
    }
}
