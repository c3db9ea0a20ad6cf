//! Single-rank matrix lifecycle, assembly, and reduction tests

mod common;

use common::{assert_allclose_f64, serial_comm};
use femr::prelude::*;
use parking_lot::RwLock;
use std::sync::Arc;

fn assembled_4x4() -> DistributedMatrix<f64> {
    assembled_4x4_on(serial_comm())
}

fn assembled_4x4_on(comm: Arc<dyn femr::comm::Communicator>) -> DistributedMatrix<f64> {
    // overlapping 2x2 element blocks on a 1D chain of 4 dofs
    let mut a = DistributedMatrix::<f64>::new(comm);
    a.init_uniform(4, 4, 4, 4, 3, 0, 1).unwrap();
    let block = DenseBlock::filled(2, 2, 1.0);
    for e in 0..3 {
        a.add_matrix_square(&block, &[e, e + 1]).unwrap();
    }
    a.close().unwrap();
    a
}

#[test]
fn test_init_establishes_closed_state() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    assert_eq!(a.state(), AssemblyState::Empty);
    assert_eq!(a.m(), 0);

    a.init_uniform(4, 6, 4, 6, 2, 0, 1).unwrap();
    assert_eq!(a.state(), AssemblyState::Closed);
    assert!(a.closed());
    assert_eq!(a.m(), 4);
    assert_eq!(a.n(), 6);
    assert_eq!(a.row_start(), 0);
    assert_eq!(a.row_stop(), 4);
    assert_eq!(a.local_nnz(), 0);
}

#[test]
fn test_uninitialized_operations_fail() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    assert!(matches!(
        a.set(0, 0, 1.0),
        Err(Error::NotInitialized { op: "set" })
    ));
    assert!(a.close().is_err());
    assert!(a.l1_norm().is_err());
    assert!(a.zero().is_err());
}

#[test]
fn test_reinit_requires_clear() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(2, 2, 2, 2, 2, 0, 1).unwrap();
    assert!(matches!(
        a.init_uniform(2, 2, 2, 2, 2, 0, 1),
        Err(Error::InvalidArgument { arg: "self", .. })
    ));

    a.clear();
    assert_eq!(a.state(), AssemblyState::Empty);
    a.init_uniform(3, 3, 3, 3, 3, 0, 1).unwrap();
    assert_eq!(a.m(), 3);
}

#[test]
fn test_init_rejects_indivisible_block_size() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    assert!(matches!(
        a.init_uniform(5, 5, 5, 5, 2, 0, 2),
        Err(Error::InvalidDimension { .. })
    ));
    assert!(matches!(
        a.init_uniform(4, 4, 4, 4, 2, 0, 0),
        Err(Error::InvalidArgument { .. })
    ));
}

#[test]
fn test_set_add_reopens_and_close_merges() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(3, 3, 3, 3, 3, 0, 1).unwrap();

    a.set(0, 0, 2.0).unwrap();
    assert_eq!(a.state(), AssemblyState::Open);
    a.add(0, 0, 0.5).unwrap();
    a.add(2, 1, -1.0).unwrap();

    a.close().unwrap();
    assert!(a.closed());
    assert_eq!(a.get(0, 0).unwrap(), 2.5);
    assert_eq!(a.get(2, 1).unwrap(), -1.0);
    // never-written structural position reads as zero
    assert_eq!(a.get(1, 1).unwrap(), 0.0);
}

#[test]
fn test_insert_out_of_bounds() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(3, 3, 3, 3, 3, 0, 1).unwrap();
    assert!(matches!(
        a.set(3, 0, 1.0),
        Err(Error::IndexOutOfBounds { index: 3, size: 3 })
    ));
    assert!(a.add(0, 7, 1.0).is_err());
    assert!(a.get(0, 7).is_err());
}

#[test]
fn test_fill_beyond_budget_rejected() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(2, 2, 2, 2, 1, 0, 1).unwrap();
    a.set(0, 0, 1.0).unwrap();
    assert_eq!(
        a.set(0, 1, 1.0).unwrap_err(),
        Error::NonexistentEntry { row: 0, col: 1 }
    );
    // rewriting the existing entry needs no budget
    a.add(0, 0, 1.0).unwrap();
}

#[test]
fn test_rejected_write_keeps_closed_state() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(2, 2, 2, 2, 1, 0, 1).unwrap();
    a.set(0, 0, 1.0).unwrap();
    a.close().unwrap();

    // a rejected write must not reopen the matrix
    assert!(a.set(0, 1, 1.0).is_err());
    assert!(a.closed());
    assert!(a.add(0, 1, 1.0).is_err());
    assert!(a.closed());

    // an accepted write still reopens it
    a.add(0, 0, 1.0).unwrap();
    assert_eq!(a.state(), AssemblyState::Open);
}

#[test]
fn test_element_assembly_values() {
    let a = assembled_4x4();
    // chain assembly: interior diagonal dofs see two elements
    let expected = [
        [1.0, 1.0, 0.0, 0.0],
        [1.0, 2.0, 1.0, 0.0],
        [0.0, 1.0, 2.0, 1.0],
        [0.0, 0.0, 1.0, 1.0],
    ];
    for (i, row) in expected.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            assert_eq!(a.get(i, j).unwrap(), v, "entry ({i}, {j})");
        }
    }
    assert_eq!(a.local_nnz(), 10);
}

#[test]
fn test_add_matrix_shape_checked() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(4, 4, 4, 4, 4, 0, 1).unwrap();
    let block = DenseBlock::filled(2, 3, 1.0);
    assert_eq!(
        a.add_matrix(&block, &[0, 1], &[0, 1]).unwrap_err(),
        Error::DimensionMismatch {
            expected: (2, 2),
            got: (2, 3),
        }
    );
    a.add_matrix(&block, &[0, 1], &[0, 1, 2]).unwrap();
}

#[test]
fn test_block_indexed_assembly() {
    // 2 block-dofs of size 2 -> 4 scalar dofs
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(4, 4, 4, 4, 4, 0, 2).unwrap();
    assert_eq!(a.block_size(), 2);

    let block = DenseBlock::filled(4, 4, 1.0);
    a.add_block_matrix_square(&block, &[0, 1]).unwrap();
    a.close().unwrap();
    assert_eq!(a.get(0, 3).unwrap(), 1.0);
    assert_eq!(a.get(3, 0).unwrap(), 1.0);

    let wrong = DenseBlock::filled(2, 2, 1.0);
    assert!(a.add_block_matrix_square(&wrong, &[0, 1]).is_err());
}

#[test]
fn test_predictor_driven_init() {
    let mut graph = DofGraph::new(4, 4, 0..4, 0..4);
    for e in 0..3 {
        graph.couple_element(&[e, e + 1]).unwrap();
    }

    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    assert_eq!(
        a.init_from_predictor(&graph).unwrap_err(),
        Error::NoSparsityAvailable
    );

    graph.prepare();
    a.init_from_predictor(&graph).unwrap();

    let block = DenseBlock::filled(2, 2, 1.0);
    for e in 0..3 {
        a.add_matrix_square(&block, &[e, e + 1]).unwrap();
    }
    a.close().unwrap();

    // exact budgets: anything outside the predicted pattern is fill-in
    assert_eq!(
        a.set(0, 3, 1.0).unwrap_err(),
        Error::NonexistentEntry { row: 0, col: 3 }
    );
}

#[test]
fn test_update_preallocation_widens_pattern() {
    let mut graph = DofGraph::new(3, 3, 0..3, 0..3);
    graph.couple_element(&[0, 1]).unwrap();
    graph.prepare();

    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_from_predictor(&graph).unwrap();
    a.set(0, 1, 5.0).unwrap();
    a.close().unwrap();
    assert!(a.set(1, 2, 1.0).is_err());

    // refinement couples dof 2 in; values reset to zero
    graph.couple_element(&[1, 2]).unwrap();
    graph.prepare();
    a.update_preallocation_and_zero(&graph).unwrap();
    assert!(a.closed());
    assert_eq!(a.get(0, 1).unwrap(), 0.0);
    a.set(1, 2, 1.0).unwrap();
    a.close().unwrap();
    assert_eq!(a.get(1, 2).unwrap(), 1.0);
}

#[test]
fn test_update_preallocation_checks_dims() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(3, 3, 3, 3, 3, 0, 1).unwrap();

    let mut graph = DofGraph::new(4, 4, 0..4, 0..4);
    graph.prepare();
    assert!(matches!(
        a.update_preallocation_and_zero(&graph),
        Err(Error::InvalidDimension { .. })
    ));
}

#[test]
fn test_zero_keeps_structure() {
    let mut a = assembled_4x4();
    let nnz = a.local_nnz();
    a.zero().unwrap();
    assert_eq!(a.local_nnz(), nnz);
    assert_eq!(a.get(1, 1).unwrap(), 0.0);
    assert_eq!(a.l1_norm().unwrap(), 0.0);
}

#[test]
fn test_norms() {
    let a = assembled_4x4();
    assert_eq!(a.l1_norm().unwrap(), 4.0);
    assert_eq!(a.linfty_norm().unwrap(), 4.0);

    let mut b = DistributedMatrix::<f64>::new(serial_comm());
    b.init_uniform(2, 3, 2, 3, 3, 0, 1).unwrap();
    b.set(0, 0, -3.0).unwrap();
    b.set(1, 0, 2.0).unwrap();
    b.set(1, 2, -4.0).unwrap();
    b.close().unwrap();
    assert_eq!(b.l1_norm().unwrap(), 5.0);
    assert_eq!(b.linfty_norm().unwrap(), 6.0);
}

#[test]
fn test_get_diagonal() {
    let a = assembled_4x4();
    let mut d = DistributedVector::<f64>::new(4, 0..4).unwrap();
    a.get_diagonal(&mut d).unwrap();
    assert_eq!(d.local_values(), &[1.0, 2.0, 2.0, 1.0]);

    let mut wrong = DistributedVector::<f64>::new(5, 0..5).unwrap();
    assert!(matches!(
        a.get_diagonal(&mut wrong),
        Err(Error::IncompatibleStructure(_))
    ));
}

#[test]
fn test_zero_rows_sets_dirichlet_diagonal() {
    let mut a = assembled_4x4();
    a.zero_rows(&[0, 3], 10.0).unwrap();
    assert_eq!(a.get(0, 0).unwrap(), 10.0);
    assert_eq!(a.get(0, 1).unwrap(), 0.0);
    assert_eq!(a.get(3, 3).unwrap(), 10.0);
    assert_eq!(a.get(3, 2).unwrap(), 0.0);
    // untouched rows keep their values
    assert_eq!(a.get(1, 1).unwrap(), 2.0);

    assert!(matches!(
        a.zero_rows(&[9], 1.0),
        Err(Error::IndexOutOfBounds { index: 9, .. })
    ));
}

#[test]
fn test_add_scaled() {
    let mut a = assembled_4x4();
    let mut b = assembled_4x4_on(a.comm().clone());
    a.add_scaled(2.0, &mut b).unwrap();
    assert_eq!(a.get(1, 1).unwrap(), 6.0);
    assert_eq!(a.get(0, 1).unwrap(), 3.0);

    // mismatched structure refuses
    let mut c = DistributedMatrix::<f64>::new(a.comm().clone());
    c.init_uniform(4, 4, 4, 4, 4, 0, 1).unwrap();
    c.set(0, 3, 1.0).unwrap();
    c.close().unwrap();
    assert!(matches!(
        a.add_scaled(1.0, &mut c),
        Err(Error::IncompatibleStructure(_))
    ));

    // matrices on different groups never mix
    let mut d = assembled_4x4();
    assert!(matches!(
        a.add_scaled(1.0, &mut d),
        Err(Error::InvalidArgument { arg: "other", .. })
    ));
}

#[test]
fn test_transpose() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(3, 3, 3, 3, 3, 0, 1).unwrap();
    a.set(0, 2, 5.0).unwrap();
    a.set(1, 0, -1.0).unwrap();
    a.set(2, 2, 3.0).unwrap();
    a.close().unwrap();

    let mut t = DistributedMatrix::<f64>::new(a.comm().clone());
    a.get_transpose(&mut t).unwrap();
    assert!(t.closed());
    assert_eq!(t.get(2, 0).unwrap(), 5.0);
    assert_eq!(t.get(0, 1).unwrap(), -1.0);
    assert_eq!(t.get(2, 2).unwrap(), 3.0);
    assert_eq!(t.get(0, 2).unwrap(), 0.0);

    // transposing twice returns the original values
    a.transpose_in_place().unwrap();
    a.transpose_in_place().unwrap();
    assert_eq!(a.get(0, 2).unwrap(), 5.0);
    assert_eq!(a.get(1, 0).unwrap(), -1.0);
}

#[test]
fn test_transpose_rectangular() {
    let mut a = DistributedMatrix::<f64>::new(serial_comm());
    a.init_uniform(2, 4, 2, 4, 4, 0, 1).unwrap();
    a.set(0, 3, 7.0).unwrap();
    a.set(1, 1, 2.0).unwrap();
    a.close().unwrap();

    let mut t = DistributedMatrix::<f64>::new(a.comm().clone());
    a.get_transpose(&mut t).unwrap();
    assert_eq!(t.m(), 4);
    assert_eq!(t.n(), 2);
    assert_eq!(t.get(3, 0).unwrap(), 7.0);
    assert_eq!(t.get(1, 1).unwrap(), 2.0);
}

#[test]
fn test_submatrix_extraction() {
    let a = assembled_4x4();
    let mut sub = DistributedMatrix::<f64>::new(a.comm().clone());
    a.get_submatrix(&mut sub, &[1, 2], &[1, 2], false).unwrap();
    assert_eq!(sub.m(), 2);
    assert_eq!(sub.n(), 2);
    assert_eq!(sub.get(0, 0).unwrap(), 2.0);
    assert_eq!(sub.get(0, 1).unwrap(), 1.0);
    assert_eq!(sub.get(1, 0).unwrap(), 1.0);
    assert_eq!(sub.get(1, 1).unwrap(), 2.0);
}

#[test]
fn test_submatrix_reuse_and_validation() {
    let mut a = assembled_4x4();
    let mut sub = DistributedMatrix::<f64>::new(a.comm().clone());
    a.get_submatrix(&mut sub, &[0, 1], &[0, 1], false).unwrap();
    assert_eq!(sub.get(1, 1).unwrap(), 2.0);

    // refresh in place after the source changes
    a.add(1, 1, 1.0).unwrap();
    a.close().unwrap();
    a.get_submatrix(&mut sub, &[0, 1], &[0, 1], true).unwrap();
    assert_eq!(sub.get(1, 1).unwrap(), 3.0);

    // reuse with a different extraction shape refuses
    assert!(matches!(
        a.get_submatrix(&mut sub, &[0, 1, 2], &[0, 1], true),
        Err(Error::IncompatibleStructure(_))
    ));

    // unsorted and out-of-range index sets
    assert!(matches!(
        a.get_submatrix(&mut sub, &[1, 0], &[0, 1], false),
        Err(Error::InvalidArgument { arg: "rows", .. })
    ));
    assert!(a.get_submatrix(&mut sub, &[0, 9], &[0, 1], false).is_err());
}

#[test]
fn test_swap() {
    let mut a = assembled_4x4();
    let mut b = DistributedMatrix::<f64>::new(a.comm().clone());
    b.init_uniform(2, 2, 2, 2, 2, 0, 1).unwrap();
    b.set(0, 0, 9.0).unwrap();
    b.close().unwrap();

    a.swap(&mut b).unwrap();
    assert_eq!(a.m(), 2);
    assert_eq!(a.get(0, 0).unwrap(), 9.0);
    assert_eq!(b.m(), 4);
    assert_eq!(b.get(1, 1).unwrap(), 2.0);

    // matrices on different groups refuse to swap
    let mut c = assembled_4x4();
    assert!(matches!(
        a.swap(&mut c),
        Err(Error::InvalidArgument { arg: "other", .. })
    ));
}

#[test]
fn test_wrap_shared_storage_outlives_wrapper() {
    let store = Arc::new(RwLock::new(AijStorage::<f64>::new(
        0,
        3,
        0..3,
        &RowBudgets::uniform(3, 3, 0),
        FillPolicy::Reject,
    )));

    {
        let mut a =
            DistributedMatrix::<f64>::wrap_shared(serial_comm(), Arc::clone(&store)).unwrap();
        assert_eq!(a.m(), 3);
        assert_eq!(a.n(), 3);
        a.set(1, 2, 4.0).unwrap();
        a.close().unwrap();
        assert_eq!(a.get(1, 2).unwrap(), 4.0);
    }

    // dropping the wrapper must not free the shared store
    assert_eq!(store.read().get(1, 2), Some(4.0));
}

#[test]
fn test_f32_matrix() {
    let mut a = DistributedMatrix::<f32>::new(serial_comm());
    a.init_uniform(2, 2, 2, 2, 2, 0, 1).unwrap();
    a.add(0, 0, 1.5f32).unwrap();
    a.add(0, 0, 0.25f32).unwrap();
    a.close().unwrap();
    assert_eq!(a.get(0, 0).unwrap(), 1.75f32);
    assert_eq!(a.linfty_norm().unwrap(), 1.75);

    // accumulating tenths is only close to 1.0 in single precision
    for _ in 0..10 {
        a.add(1, 1, 0.1f32).unwrap();
    }
    a.close().unwrap();
    assert_allclose_f64(
        &[f64::from(a.get(1, 1).unwrap())],
        &[1.0],
        1e-5,
        1e-6,
        "sum of tenths",
    );
}
