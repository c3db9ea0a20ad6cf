//! In-process multi-rank communicator
//!
//! Each rank of the group is a thread in the same process; collectives
//! rendezvous through shared state guarded by a mutex and condvar. Because
//! every rank's contribution passes through one place, the group can check
//! that all ranks arrived carrying the same collective tag and turn
//! call-sequence divergence into a [`CollectiveProtocolViolation`] on every
//! rank, instead of the silent deadlock an out-of-process transport gives.
//!
//! [`CollectiveProtocolViolation`]: crate::error::Error::CollectiveProtocolViolation

use super::{Communicator, RowShard, StagedEntry, Tag, WindowId};
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One rank's contribution to a rendezvous round
#[derive(Debug, Clone)]
enum Payload {
    Unit,
    U64(u64),
    F64(f64),
    F64Vec(Vec<f64>),
    Entries(Vec<Vec<StagedEntry>>),
}

/// State of the current rendezvous round
#[derive(Debug, Default)]
struct Round {
    tag: Option<Tag>,
    mismatch: Option<(Tag, Tag)>,
    payloads: Vec<Option<Payload>>,
    arrived: usize,
    result: Option<Arc<Vec<Payload>>>,
    leaving: usize,
}

#[derive(Debug)]
struct GroupState {
    size: usize,
    round: Mutex<Round>,
    cv: Condvar,
    windows: Mutex<HashMap<(usize, WindowId), Arc<RowShard>>>,
}

/// One rank of an in-process shared-memory group
///
/// Create a whole group with [`ShmemComm::group`] and hand one communicator
/// to each rank thread:
///
/// ```
/// use femr::comm::{Communicator, ShmemComm};
///
/// let comms = ShmemComm::group(2);
/// std::thread::scope(|s| {
///     for comm in comms {
///         s.spawn(move || {
///             let total: u64 = comm.all_gather_u64("example", 1).unwrap().iter().sum();
///             assert_eq!(total, 2);
///         });
///     }
/// });
/// ```
#[derive(Debug)]
pub struct ShmemComm {
    rank: usize,
    group: Arc<GroupState>,
    next_window: AtomicU64,
}

impl ShmemComm {
    /// Create a group of `size` communicators, one per rank
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn group(size: usize) -> Vec<ShmemComm> {
        assert!(size > 0, "a process group needs at least one rank");
        let state = Arc::new(GroupState {
            size,
            round: Mutex::new(Round {
                payloads: vec![None; size],
                ..Round::default()
            }),
            cv: Condvar::new(),
            windows: Mutex::new(HashMap::new()),
        });
        (0..size)
            .map(|rank| ShmemComm {
                rank,
                group: Arc::clone(&state),
                next_window: AtomicU64::new(0),
            })
            .collect()
    }

    /// Block until every rank has contributed, then hand the full set of
    /// contributions (rank order) to every rank.
    fn rendezvous(&self, tag: Tag, payload: Payload) -> Result<Arc<Vec<Payload>>> {
        let g = &self.group;
        let mut round = g.round.lock();

        // let the previous round drain before joining a new one
        while round.result.is_some() {
            g.cv.wait(&mut round);
        }

        match round.tag {
            None => round.tag = Some(tag),
            Some(t) if t != tag && round.mismatch.is_none() => {
                round.mismatch = Some((t, tag));
            }
            _ => {}
        }
        round.payloads[self.rank] = Some(payload);
        round.arrived += 1;

        if round.arrived == g.size {
            let collected: Vec<Payload> = round
                .payloads
                .iter_mut()
                .map(|p| p.take().expect("every arrived rank deposited a payload"))
                .collect();
            round.result = Some(Arc::new(collected));
            round.leaving = g.size;
            g.cv.notify_all();
        } else {
            while round.result.is_none() {
                g.cv.wait(&mut round);
            }
        }

        let result = round.result.clone().expect("round result present");
        let mismatch = round.mismatch;
        round.leaving -= 1;
        if round.leaving == 0 {
            round.result = None;
            round.tag = None;
            round.mismatch = None;
            round.arrived = 0;
            g.cv.notify_all();
        }
        drop(round);

        match mismatch {
            Some((first, second)) => Err(Error::protocol(format!(
                "ranks diverged in the collective sequence: '{first}' vs '{second}'"
            ))),
            None => Ok(result),
        }
    }
}

impl Communicator for ShmemComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn barrier(&self, tag: Tag) -> Result<()> {
        self.rendezvous(tag, Payload::Unit).map(|_| ())
    }

    fn all_gather_u64(&self, tag: Tag, value: u64) -> Result<Vec<u64>> {
        let all = self.rendezvous(tag, Payload::U64(value))?;
        Ok(all
            .iter()
            .map(|p| match p {
                Payload::U64(v) => *v,
                _ => unreachable!("tag-matched round carries uniform payloads"),
            })
            .collect())
    }

    fn all_reduce_sum(&self, tag: Tag, buf: &mut [f64]) -> Result<()> {
        let all = self.rendezvous(tag, Payload::F64Vec(buf.to_vec()))?;
        buf.iter_mut().for_each(|v| *v = 0.0);
        for p in all.iter() {
            let Payload::F64Vec(contrib) = p else {
                unreachable!("tag-matched round carries uniform payloads");
            };
            if contrib.len() != buf.len() {
                return Err(Error::protocol(format!(
                    "all_reduce_sum '{tag}': buffer lengths differ across ranks ({} vs {})",
                    contrib.len(),
                    buf.len()
                )));
            }
            for (acc, v) in buf.iter_mut().zip(contrib) {
                *acc += v;
            }
        }
        Ok(())
    }

    fn all_reduce_max(&self, tag: Tag, value: f64) -> Result<f64> {
        let all = self.rendezvous(tag, Payload::F64(value))?;
        Ok(all.iter().fold(f64::NEG_INFINITY, |m, p| match p {
            Payload::F64(v) => m.max(*v),
            _ => unreachable!("tag-matched round carries uniform payloads"),
        }))
    }

    fn exchange(&self, tag: Tag, outgoing: Vec<Vec<StagedEntry>>) -> Result<Vec<StagedEntry>> {
        if outgoing.len() != self.group.size {
            return Err(Error::InvalidArgument {
                arg: "outgoing",
                reason: format!(
                    "expected one bucket per rank ({}), got {}",
                    self.group.size,
                    outgoing.len()
                ),
            });
        }
        let all = self.rendezvous(tag, Payload::Entries(outgoing))?;
        let mut received = Vec::new();
        for p in all.iter() {
            let Payload::Entries(buckets) = p else {
                unreachable!("tag-matched round carries uniform payloads");
            };
            received.extend_from_slice(&buckets[self.rank]);
        }
        Ok(received)
    }

    fn alloc_window(&self, tag: Tag) -> Result<WindowId> {
        let id = self.next_window.fetch_add(1, Ordering::Relaxed);
        let all = self.rendezvous(tag, Payload::U64(id))?;
        for p in all.iter() {
            let Payload::U64(other) = p else {
                unreachable!("tag-matched round carries uniform payloads");
            };
            if *other != id {
                return Err(Error::protocol(format!(
                    "window allocation diverged across ranks ({other} vs {id})"
                )));
            }
        }
        Ok(WindowId(id))
    }

    fn expose(&self, window: WindowId, shard: Arc<RowShard>) -> Result<()> {
        self.group.windows.lock().insert((self.rank, window), shard);
        Ok(())
    }

    fn fetch(&self, window: WindowId, owner: usize) -> Result<Arc<RowShard>> {
        if owner >= self.group.size {
            return Err(Error::IndexOutOfBounds {
                index: owner,
                size: self.group.size,
            });
        }
        self.group
            .windows
            .lock()
            .get(&(owner, window))
            .cloned()
            .ok_or_else(|| {
                Error::protocol(format!("rank {owner} never exposed window {:?}", window))
            })
    }
}
