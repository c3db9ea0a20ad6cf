//! Common test utilities
#![allow(dead_code)]

use femr::comm::{Communicator, SerialComm, ShmemComm};
use std::sync::Arc;

/// Create a single-rank communicator for serial tests
pub fn serial_comm() -> Arc<dyn Communicator> {
    Arc::new(SerialComm::new())
}

/// Run `f` once per rank of an in-process group, one thread per rank
///
/// Every rank runs the same closure; branch on `comm.rank()` inside for
/// rank-specific behavior. Panics in any rank fail the test.
pub fn run_ranks<F>(size: usize, f: F)
where
    F: Fn(Arc<dyn Communicator>) + Send + Sync,
{
    let comms = ShmemComm::group(size);
    std::thread::scope(|s| {
        for comm in comms {
            let comm: Arc<dyn Communicator> = Arc::new(comm);
            s.spawn(|| f(comm));
        }
    });
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}
