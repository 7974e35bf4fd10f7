//! Distributed layout of the packed control vector.
//!
//! Controls are flattened rank-major: each rank owns the concatenation of its
//! local parts of every control, and ranks are laid out in order. The owner
//! range of a rank is therefore one contiguous block, and offsets into it are
//! plain cursor arithmetic.

use crate::backend::value::AdjointValue;
use crate::comm::Communicator;
use crate::optimize::control::Control;
use crate::tape_error::TapeError;

/// Split `global` entries over `size` ranks the way PETSc decides local
/// sizes: the first `global % size` ranks get one extra entry.
///
/// Returns `(start, len)` for `rank`.
pub fn decide_partition(global: usize, rank: usize, size: usize) -> (usize, usize) {
    debug_assert!(rank < size);
    let base = global / size;
    let rem = global % size;
    let len = base + usize::from(rank < rem);
    let start = rank * base + rank.min(rem);
    (start, len)
}

/// Placement of one control inside the packed vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    /// Offset of this control's local part within the rank's owner range.
    pub local_offset: usize,
    /// Local length on this rank.
    pub len: usize,
    /// Global length of the control across all ranks.
    pub global_len: usize,
}

/// Layout of all controls in the packed vector, as seen from one rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLayout {
    entries: Vec<LayoutEntry>,
    local_len: usize,
    owner_start: u64,
    global_len: u64,
}

impl PackLayout {
    /// Compute the layout for `controls` over `comm`.
    ///
    /// Collective: every rank must call this with controls of the same
    /// names and shapes, in the same order.
    ///
    /// # Errors
    /// [`TapeError::ZeroLengthControl`] when a control has no entries on any
    /// rank; collective failures surface as [`TapeError::Comm`].
    pub fn build<V: AdjointValue, C: Communicator>(
        controls: &[Control<V>],
        comm: &C,
    ) -> Result<Self, TapeError> {
        let rank = comm.rank();
        let size = comm.size();
        let mut entries = Vec::with_capacity(controls.len());
        let mut cursor = 0usize;
        for (i, control) in controls.iter().enumerate() {
            let len = control.local_len(rank, size);
            let global_len = match control {
                Control::Field(_) => comm.all_sum_scalar_u64(len as u64)? as usize,
                Control::Constant { value, .. } => value.flat_len(),
            };
            if global_len == 0 {
                return Err(TapeError::ZeroLengthControl(i));
            }
            entries.push(LayoutEntry {
                local_offset: cursor,
                len,
                global_len,
            });
            cursor += len;
        }
        let owner_start = comm.exclusive_scan_u64(cursor as u64)?;
        let global_len = comm.all_sum_scalar_u64(cursor as u64)?;
        Ok(PackLayout {
            entries,
            local_len: cursor,
            owner_start,
            global_len,
        })
    }

    #[inline]
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    #[inline]
    pub fn entry(&self, i: usize) -> Option<&LayoutEntry> {
        self.entries.get(i)
    }

    /// Total local length on this rank.
    #[inline]
    pub fn local_len(&self) -> usize {
        self.local_len
    }

    /// First global index owned by this rank.
    #[inline]
    pub fn owner_start(&self) -> u64 {
        self.owner_start
    }

    /// Total packed length across all ranks.
    #[inline]
    pub fn global_len(&self) -> u64 {
        self.global_len
    }
}
