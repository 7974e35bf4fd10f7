//! Thin façade over intra-process (thread) or inter-process (MPI) ranks.
//!
//! Owner-range layouts and constant unpacking need three collectives:
//! element-wise sums, an exclusive prefix scan, and a rank-ordered gather.
//! [`NoComm`] serves the serial case, [`RayonComm`] runs several ranks as
//! threads of one process for tests, and `MpiComm` (feature `mpi-support`)
//! maps the same surface onto real MPI collectives.
//!
//! # Determinism
//! Ranks must execute the same sequence of collective calls in lockstep;
//! [`RayonComm`] matches messages by a per-rank call counter.

pub mod wire;

use crate::tape_error::TapeError;
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering::Relaxed};
use std::thread::JoinHandle;

/// Collective communication between the ranks of one run.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Element-wise sum of `locals` over all ranks. Every rank must pass a
    /// slice of the same length.
    fn all_sum_u64(&self, locals: &[u64]) -> Result<Vec<u64>, TapeError>;

    /// Sum of `local` over all ranks strictly below this one; 0 on rank 0.
    fn exclusive_scan_u64(&self, local: u64) -> Result<u64, TapeError>;

    /// Concatenation of every rank's `local` in rank order. Per-rank lengths
    /// may differ.
    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, TapeError>;

    /// Global sum of a single value.
    fn all_sum_scalar_u64(&self, local: u64) -> Result<u64, TapeError> {
        self.all_sum_u64(&[local])?
            .first()
            .copied()
            .ok_or_else(|| TapeError::Comm("empty reduction result".into()))
    }

    /// Global minimum of a single value.
    fn all_min_f64(&self, local: f64) -> Result<f64, TapeError> {
        Ok(self
            .all_gather_f64(&[local])?
            .into_iter()
            .fold(f64::INFINITY, f64::min))
    }

    /// Global maximum of a single value.
    fn all_max_f64(&self, local: f64) -> Result<f64, TapeError> {
        Ok(self
            .all_gather_f64(&[local])?
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max))
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    #[inline]
    fn rank(&self) -> usize {
        0
    }

    #[inline]
    fn size(&self) -> usize {
        1
    }

    fn all_sum_u64(&self, locals: &[u64]) -> Result<Vec<u64>, TapeError> {
        Ok(locals.to_vec())
    }

    fn exclusive_scan_u64(&self, _local: u64) -> Result<u64, TapeError> {
        Ok(0)
    }

    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, TapeError> {
        Ok(local.to_vec())
    }
}

// --- RayonComm: intra-process / multi-thread ---

// (group, call, src, dst)
type Key = (u16, u32, usize, usize);

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);
static GROUP_COUNTER: AtomicU16 = AtomicU16::new(1);

/// Receive handle backed by a spin thread on the shared mailbox.
pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.buf.lock().take()
    }
}

/// In-process communicator: every rank is a thread, messages go through a
/// process-wide mailbox.
///
/// Build all ranks of a run at once with [`RayonComm::group`]; each group
/// gets its own tag space, so consecutive runs in one process (or one test
/// binary) cannot see each other's messages.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    group: u16,
    calls: Arc<AtomicU32>,
}

impl RayonComm {
    /// Create the communicators for `size` in-process ranks.
    pub fn group(size: usize) -> Vec<RayonComm> {
        let group = GROUP_COUNTER.fetch_add(1, Relaxed);
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                group,
                calls: Arc::new(AtomicU32::new(0)),
            })
            .collect()
    }

    /// Single-rank communicator, handy for serial tests of the threaded path.
    pub fn solo() -> RayonComm {
        let mut group = Self::group(1);
        group.remove(0)
    }

    fn isend(&self, peer: usize, call: u32, buf: &[u8]) {
        let key = (self.group, call, self.rank, peer);
        MAILBOX.insert(key, Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, call: u32) -> LocalHandle {
        let key = (self.group, call, peer, self.rank);
        let buf = Arc::new(Mutex::new(None));
        let buf_clone = Arc::clone(&buf);
        let handle = std::thread::spawn(move || {
            loop {
                if let Some((_, bytes)) = MAILBOX.remove(&key) {
                    *buf_clone.lock() = Some(bytes.to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf,
            handle: Some(handle),
        }
    }

    /// All-to-all exchange of one payload per rank, returning every rank's
    /// payload indexed by rank. Matches by this rank's collective-call count,
    /// so all ranks must call collectives in the same order.
    fn exchange(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>, TapeError> {
        let mut out = vec![Vec::new(); self.size];
        out[self.rank] = payload.to_vec();
        if self.size == 1 {
            return Ok(out);
        }
        let call = self.calls.fetch_add(1, Relaxed);
        for peer in 0..self.size {
            if peer != self.rank {
                self.isend(peer, call, payload);
            }
        }
        let handles: Vec<(usize, LocalHandle)> = (0..self.size)
            .filter(|&p| p != self.rank)
            .map(|p| (p, self.irecv(p, call)))
            .collect();
        for (peer, handle) in handles {
            let data = handle.wait().ok_or_else(|| {
                TapeError::Comm(format!(
                    "rank {} received nothing from rank {peer}",
                    self.rank
                ))
            })?;
            out[peer] = data;
        }
        Ok(out)
    }
}

impl Communicator for RayonComm {
    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn all_sum_u64(&self, locals: &[u64]) -> Result<Vec<u64>, TapeError> {
        let parts = self.exchange(wire::cast_to_bytes(locals))?;
        let mut sums = vec![0u64; locals.len()];
        for (peer, bytes) in parts.iter().enumerate() {
            let vals: Vec<u64> = wire::cast_from_bytes(bytes)?;
            if vals.len() != sums.len() {
                return Err(TapeError::Comm(format!(
                    "rank {peer} contributed {} values to a reduction of {}",
                    vals.len(),
                    sums.len()
                )));
            }
            for (s, v) in sums.iter_mut().zip(vals) {
                *s += v;
            }
        }
        Ok(sums)
    }

    fn exclusive_scan_u64(&self, local: u64) -> Result<u64, TapeError> {
        let parts = self.exchange(wire::cast_to_bytes(&[local]))?;
        let mut acc = 0u64;
        for bytes in parts.iter().take(self.rank) {
            let vals: Vec<u64> = wire::cast_from_bytes(bytes)?;
            acc += vals.first().copied().unwrap_or(0);
        }
        Ok(acc)
    }

    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, TapeError> {
        let parts = self.exchange(wire::cast_to_bytes(local))?;
        let mut out = Vec::new();
        for bytes in &parts {
            out.extend(wire::cast_from_bytes::<f64>(bytes)?);
        }
        Ok(out)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::Communicator;
    use crate::tape_error::TapeError;
    use mpi::collective::SystemOperation;
    use mpi::datatype::PartitionMut;
    use mpi::environment::Universe;
    use mpi::topology::SystemCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives};

    /// Inter-process communicator over MPI's world communicator.
    pub struct MpiComm {
        universe: Universe,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator.
        ///
        /// # Errors
        /// Fails when MPI was already initialized in this process.
        pub fn new() -> Result<Self, TapeError> {
            let universe = mpi::initialize()
                .ok_or_else(|| TapeError::Comm("MPI is already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(MpiComm {
                universe,
                rank,
                size,
            })
        }

        fn world(&self) -> SystemCommunicator {
            self.universe.world()
        }
    }

    // MPI communicators are process-global handles; collective calls must
    // stay on the thread that owns the run.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn all_sum_u64(&self, locals: &[u64]) -> Result<Vec<u64>, TapeError> {
            let mut out = vec![0u64; locals.len()];
            self.world()
                .all_reduce_into(locals, &mut out[..], SystemOperation::sum());
            Ok(out)
        }

        fn exclusive_scan_u64(&self, local: u64) -> Result<u64, TapeError> {
            let mut out = 0u64;
            self.world()
                .exclusive_scan_into(&local, &mut out, SystemOperation::sum());
            // MPI leaves rank 0's exscan output undefined
            Ok(if self.rank == 0 { 0 } else { out })
        }

        fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, TapeError> {
            let mut counts_u64 = vec![0u64; self.size];
            self.world()
                .all_gather_into(&(local.len() as u64), &mut counts_u64[..]);
            let counts: Vec<i32> = counts_u64.iter().map(|&c| c as i32).collect();
            let displs: Vec<i32> = counts
                .iter()
                .scan(0i32, |acc, &c| {
                    let d = *acc;
                    *acc += c;
                    Some(d)
                })
                .collect();
            let total = counts_u64.iter().sum::<u64>() as usize;
            let mut out = vec![0f64; total];
            {
                let mut partition = PartitionMut::new(&mut out[..], counts, &displs[..]);
                self.world().all_gather_varcount_into(local, &mut partition);
            }
            Ok(out)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn nocomm_collectives_are_identity() {
        let c = NoComm;
        assert_eq!(c.all_sum_u64(&[3, 4]).unwrap(), vec![3, 4]);
        assert_eq!(c.exclusive_scan_u64(9).unwrap(), 0);
        assert_eq!(c.all_gather_f64(&[1.5]).unwrap(), vec![1.5]);
        assert_eq!(c.all_min_f64(2.0).unwrap(), 2.0);
    }

    #[test]
    fn solo_rayon_matches_nocomm() {
        let c = RayonComm::solo();
        assert_eq!(c.all_sum_u64(&[5]).unwrap(), vec![5]);
        assert_eq!(c.exclusive_scan_u64(5).unwrap(), 0);
    }

    #[test]
    #[serial]
    fn rayon_two_ranks_sum_scan_gather() {
        let mut comms = RayonComm::group(2);
        let c1 = comms.remove(1);
        let c0 = comms.remove(0);
        let t1 = std::thread::spawn(move || {
            let s = c1.all_sum_u64(&[10, 1]).unwrap();
            let x = c1.exclusive_scan_u64(7).unwrap();
            let g = c1.all_gather_f64(&[2.5]).unwrap();
            (s, x, g)
        });
        let s0 = c0.all_sum_u64(&[4, 2]).unwrap();
        let x0 = c0.exclusive_scan_u64(3).unwrap();
        let g0 = c0.all_gather_f64(&[1.0, -1.0]).unwrap();
        let (s1, x1, g1) = t1.join().unwrap();
        assert_eq!(s0, vec![14, 3]);
        assert_eq!(s1, vec![14, 3]);
        assert_eq!(x0, 0);
        assert_eq!(x1, 3);
        assert_eq!(g0, vec![1.0, -1.0, 2.5]);
        assert_eq!(g1, vec![1.0, -1.0, 2.5]);
    }

    #[test]
    #[serial]
    fn rayon_three_rank_scan_orders_by_rank() {
        let comms = RayonComm::group(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|c| {
                std::thread::spawn(move || {
                    let rank = c.rank();
                    (rank, c.exclusive_scan_u64((rank as u64 + 1) * 10).unwrap())
                })
            })
            .collect();
        let mut results = [0u64; 3];
        for h in handles {
            let (rank, scan) = h.join().unwrap();
            results[rank] = scan;
        }
        assert_eq!(results, [0, 10, 30]);
    }

    #[test]
    #[serial]
    fn groups_do_not_interfere() {
        // two groups running the same call sequence concurrently
        let a = RayonComm::group(2);
        let b = RayonComm::group(2);
        let mut handles = Vec::new();
        for (i, c) in a.into_iter().enumerate() {
            handles.push(std::thread::spawn(move || {
                assert_eq!(c.all_sum_scalar_u64(i as u64).unwrap(), 1);
            }));
        }
        for (i, c) in b.into_iter().enumerate() {
            handles.push(std::thread::spawn(move || {
                assert_eq!(c.all_sum_scalar_u64(100 + i as u64).unwrap(), 201);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
