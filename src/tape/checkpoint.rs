//! Checkpoint policy and recorded values.
//!
//! The tape decides per registered equation whether to snapshot the
//! equation's dependency values, and whether the snapshot lives in memory or
//! on disk. Disk payloads are bincode-encoded.

use crate::backend::value::AdjointValue;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the tape stores dependency snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStrategy {
    /// Keep nothing; replay recomputes everything from equation zero.
    #[default]
    Disabled,
    /// Snapshot dependencies in memory.
    Memory,
    /// Snapshot dependencies as bincode files under `dir`.
    Disk { dir: PathBuf },
}

impl CheckpointStrategy {
    /// Decide what to do for the equation about to be registered.
    pub fn action_for(&self, _equation_index: usize) -> CheckpointAction {
        match self {
            CheckpointStrategy::Disabled => CheckpointAction::Nothing,
            CheckpointStrategy::Memory => CheckpointAction::Memory,
            CheckpointStrategy::Disk { .. } => CheckpointAction::Disk,
        }
    }

    /// Path for a disk snapshot of `var`, creating the checkpoint directory
    /// on first use.
    ///
    /// # Errors
    /// Fails when the strategy is not [`CheckpointStrategy::Disk`] or the
    /// directory cannot be created.
    pub fn disk_path(&self, var: &Variable) -> Result<PathBuf, TapeError> {
        match self {
            CheckpointStrategy::Disk { dir } => {
                std::fs::create_dir_all(dir)
                    .map_err(|e| TapeError::CheckpointIo(e.to_string()))?;
                Ok(dir.join(format!("{}.ckpt", var.file_stem())))
            }
            _ => Err(TapeError::CheckpointIo(
                "disk checkpoint requested without a checkpoint directory".into(),
            )),
        }
    }
}

/// Per-equation checkpoint decision handed back by equation registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointAction {
    Nothing,
    Memory,
    Disk,
}

/// A value the tape has recorded, either held in memory or parked on disk.
#[derive(Debug, Clone)]
pub enum RecordedValue<V> {
    Memory(V),
    Disk(PathBuf),
}

impl<V: AdjointValue> RecordedValue<V> {
    /// Materialize the value, reading it back from disk when necessary.
    pub fn load(&self) -> Result<V, TapeError> {
        match self {
            RecordedValue::Memory(v) => Ok(v.clone()),
            RecordedValue::Disk(path) => read_snapshot(path),
        }
    }
}

/// Write a bincode snapshot of `value` to `path`.
pub fn write_snapshot<V: AdjointValue>(path: &Path, value: &V) -> Result<(), TapeError> {
    let bytes =
        bincode::serialize(value).map_err(|e| TapeError::CheckpointIo(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| TapeError::CheckpointIo(e.to_string()))
}

/// Read a bincode snapshot back.
pub fn read_snapshot<V: AdjointValue>(path: &Path) -> Result<V, TapeError> {
    let bytes = std::fs::read(path).map_err(|e| TapeError::CheckpointIo(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| TapeError::CheckpointIo(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dense::{DenseField, DenseSpace};

    #[test]
    fn strategy_maps_to_action() {
        assert_eq!(
            CheckpointStrategy::Disabled.action_for(0),
            CheckpointAction::Nothing
        );
        assert_eq!(
            CheckpointStrategy::Memory.action_for(7),
            CheckpointAction::Memory
        );
        let disk = CheckpointStrategy::Disk {
            dir: PathBuf::from("/tmp/ckpt"),
        };
        assert_eq!(disk.action_for(3), CheckpointAction::Disk);
    }

    #[test]
    fn disk_path_requires_disk_strategy() {
        let var = Variable::new("u", 0, 0);
        assert!(CheckpointStrategy::Memory.disk_path(&var).is_err());
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = std::env::temp_dir().join(format!("adjoint-tape-ckpt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("u_0_0.ckpt");
        let v = DenseField::from_values("u", &DenseSpace::new("V", 3), vec![1.5, -2.0, 0.25])
            .unwrap();
        write_snapshot(&path, &v).unwrap();
        let back: DenseField = read_snapshot(&path).unwrap();
        assert_eq!(back, v);
        let _ = std::fs::remove_file(&path);
    }
}
