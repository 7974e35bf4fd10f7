//! Distributed flat vectors over contiguous owner ranges.
//!
//! [`GlobalVec`] keeps the access discipline of a PETSc vector: every write
//! invalidates reads until [`GlobalVec::assemble`] is called again. All
//! writes are owner-local under the rank-major layout, so assembly flips a
//! flag instead of flushing messages; keeping the discipline means a missing
//! assemble surfaces as an error rather than a stale read.

use crate::backend::value::AdjointValue;
use crate::comm::Communicator;
use crate::optimize::control::Control;
use crate::optimize::layout::{PackLayout, decide_partition};
use crate::tape_error::TapeError;
use itertools::Itertools;
use num_traits::Float;
use std::fmt::Debug;
use std::ops::Range;

/// One rank's owned slice of a distributed flat vector.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVec<T> {
    data: Vec<T>,
    owner_start: u64,
    global_len: u64,
    assembled: bool,
}

impl<T: Float + Debug> GlobalVec<T> {
    /// Zero vector with the given local extent. Starts assembled.
    pub fn new(local_len: usize, owner_start: u64, global_len: u64) -> Self {
        GlobalVec {
            data: vec![T::zero(); local_len],
            owner_start,
            global_len,
            assembled: true,
        }
    }

    /// Zero vector shaped by a control layout.
    pub fn from_layout(layout: &PackLayout) -> Self {
        Self::new(layout.local_len(), layout.owner_start(), layout.global_len())
    }

    #[inline]
    pub fn local_len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn owner_start(&self) -> u64 {
        self.owner_start
    }

    /// Global indices owned by this rank.
    #[inline]
    pub fn owner_range(&self) -> Range<u64> {
        self.owner_start..self.owner_start + self.data.len() as u64
    }

    #[inline]
    pub fn global_len(&self) -> u64 {
        self.global_len
    }

    #[inline]
    pub fn is_assembled(&self) -> bool {
        self.assembled
    }

    fn local_index(&self, index: u64) -> Result<usize, TapeError> {
        let range = self.owner_range();
        if !range.contains(&index) {
            return Err(TapeError::IndexOutsideOwnerRange {
                index,
                start: range.start,
                end: range.end,
            });
        }
        Ok((index - self.owner_start) as usize)
    }

    /// Write one entry by global index.
    ///
    /// # Errors
    /// [`TapeError::IndexOutsideOwnerRange`] when this rank does not own
    /// `index`.
    pub fn set(&mut self, index: u64, value: T) -> Result<(), TapeError> {
        let local = self.local_index(index)?;
        self.data[local] = value;
        self.assembled = false;
        Ok(())
    }

    /// Write a run of entries starting at a local offset.
    pub fn write_local(&mut self, offset: usize, values: &[T]) -> Result<(), TapeError> {
        let end = offset + values.len();
        if end > self.data.len() {
            return Err(TapeError::DimensionMismatch {
                expected: self.data.len(),
                found: end,
            });
        }
        self.data[offset..end].copy_from_slice(values);
        self.assembled = false;
        Ok(())
    }

    /// Set every owned entry to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
        self.assembled = false;
    }

    /// Set every owned entry to zero.
    pub fn zero_out(&mut self) {
        self.fill(T::zero());
    }

    /// Mutable access to the owned entries; invalidates reads until the next
    /// [`GlobalVec::assemble`].
    pub fn local_slice_mut(&mut self) -> &mut [T] {
        self.assembled = false;
        &mut self.data
    }

    /// Close the write phase and re-enable reads.
    pub fn assemble(&mut self) {
        self.assembled = true;
    }

    /// Owned entries, in global-index order.
    ///
    /// # Errors
    /// [`TapeError::UnassembledVector`] between a write and `assemble()`.
    pub fn local_slice(&self) -> Result<&[T], TapeError> {
        if !self.assembled {
            return Err(TapeError::UnassembledVector);
        }
        Ok(&self.data)
    }

    /// Read one entry by global index.
    pub fn try_get(&self, index: u64) -> Result<T, TapeError> {
        if !self.assembled {
            return Err(TapeError::UnassembledVector);
        }
        let local = self.local_index(index)?;
        Ok(self.data[local])
    }

    fn check_same_layout(&self, other: &Self) -> Result<(), TapeError> {
        if self.owner_start != other.owner_start
            || self.global_len != other.global_len
            || self.data.len() != other.data.len()
        {
            return Err(TapeError::LayoutMismatch {
                expected: self.data.len(),
                found: other.data.len(),
            });
        }
        Ok(())
    }

    /// `self += alpha * x`. Both vectors must be assembled and share a layout.
    pub fn axpy(&mut self, alpha: T, x: &Self) -> Result<(), TapeError> {
        self.check_same_layout(x)?;
        if !self.assembled || !x.assembled {
            return Err(TapeError::UnassembledVector);
        }
        for (s, v) in self.data.iter_mut().zip(&x.data) {
            *s = *s + alpha * *v;
        }
        Ok(())
    }

    /// `self *= alpha`.
    pub fn scale(&mut self, alpha: T) -> Result<(), TapeError> {
        if !self.assembled {
            return Err(TapeError::UnassembledVector);
        }
        for s in &mut self.data {
            *s = *s * alpha;
        }
        Ok(())
    }

    /// Overwrite `self` with `other`'s entries.
    pub fn copy_from(&mut self, other: &Self) -> Result<(), TapeError> {
        self.check_same_layout(other)?;
        if !other.assembled {
            return Err(TapeError::UnassembledVector);
        }
        self.data.copy_from_slice(&other.data);
        self.assembled = true;
        Ok(())
    }

    /// A zero vector with the same layout.
    pub fn duplicate(&self) -> Self {
        Self::new(self.data.len(), self.owner_start, self.global_len)
    }

    /// Smallest and largest owned entries; `None` when this rank owns none.
    pub fn local_minmax(&self) -> Result<Option<(T, T)>, TapeError> {
        if !self.assembled {
            return Err(TapeError::UnassembledVector);
        }
        Ok(self.data.iter().copied().minmax().into_option())
    }
}

impl GlobalVec<f64> {
    /// Global (min, max) over all ranks. Collective.
    pub fn global_minmax<C: Communicator>(&self, comm: &C) -> Result<(f64, f64), TapeError> {
        let (lo, hi) = self
            .local_minmax()?
            .unwrap_or((f64::INFINITY, f64::NEG_INFINITY));
        Ok((comm.all_min_f64(lo)?, comm.all_max_f64(hi)?))
    }

    /// Global Euclidean norm. Collective.
    pub fn global_norm2<C: Communicator>(&self, comm: &C) -> Result<f64, TapeError> {
        let local: f64 = self.local_slice()?.iter().map(|v| v * v).sum();
        let parts = comm.all_gather_f64(&[local])?;
        Ok(parts.iter().sum::<f64>().sqrt())
    }
}

/// Flatten `controls` into a packed vector under `layout`.
///
/// Field controls contribute their rank-local values; constants contribute
/// this rank's share of their flattened entries.
pub fn pack_controls<V: AdjointValue, C: Communicator>(
    controls: &[Control<V>],
    layout: &PackLayout,
    comm: &C,
) -> Result<GlobalVec<f64>, TapeError> {
    if controls.len() != layout.entries().len() {
        return Err(TapeError::LayoutMismatch {
            expected: layout.entries().len(),
            found: controls.len(),
        });
    }
    let mut vec = GlobalVec::from_layout(layout);
    let (rank, size) = (comm.rank(), comm.size());
    for (control, entry) in controls.iter().zip(layout.entries()) {
        match control {
            Control::Field(v) => {
                let values = v.local_values();
                if values.len() != entry.len {
                    return Err(TapeError::DimensionMismatch {
                        expected: entry.len,
                        found: values.len(),
                    });
                }
                vec.write_local(entry.local_offset, &values)?;
            }
            Control::Constant { value, .. } => {
                let flat = value.to_flat();
                let (start, len) = decide_partition(flat.len(), rank, size);
                vec.write_local(entry.local_offset, &flat[start..start + len])?;
            }
        }
    }
    vec.assemble();
    Ok(vec)
}

/// Copy a packed vector back into `controls`.
///
/// Collective: constants are replicated, so their shares are re-gathered
/// from every rank.
pub fn unpack_controls<V: AdjointValue, C: Communicator>(
    vec: &GlobalVec<f64>,
    controls: &mut [Control<V>],
    layout: &PackLayout,
    comm: &C,
) -> Result<(), TapeError> {
    if controls.len() != layout.entries().len() {
        return Err(TapeError::LayoutMismatch {
            expected: layout.entries().len(),
            found: controls.len(),
        });
    }
    if vec.local_len() != layout.local_len() {
        return Err(TapeError::LayoutMismatch {
            expected: layout.local_len(),
            found: vec.local_len(),
        });
    }
    let local = vec.local_slice()?;
    for (control, entry) in controls.iter_mut().zip(layout.entries()) {
        let part = &local[entry.local_offset..entry.local_offset + entry.len];
        match control {
            Control::Field(v) => v.set_local_values(part)?,
            Control::Constant { value, .. } => {
                let flat = comm.all_gather_f64(part)?;
                *value = value.from_flat_like(&flat)?;
            }
        }
    }
    Ok(())
}
