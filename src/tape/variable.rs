//! Variable identity on the tape.
//!
//! A [`Variable`] names one snapshot of a forward quantity: the field name,
//! the timestep it was produced in, and the iteration within that timestep.
//! Re-solving for the same field at the same timestep bumps the iteration,
//! so every solve on the tape has a distinct identity and nothing is ever
//! overwritten.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one recorded quantity: `(name, timestep, iteration)`.
///
/// Ordering is lexicographic over `(timestep, iteration, name)`, which
/// matches the order variables are superseded in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    timestep: usize,
    iteration: usize,
}

impl Variable {
    /// Create a new variable identity.
    pub fn new(name: impl Into<String>, timestep: usize, iteration: usize) -> Self {
        Variable {
            name: name.into(),
            timestep,
            iteration,
        }
    }

    /// The field name this variable snapshots.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Timestep the snapshot was produced in.
    #[inline]
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    /// Iteration within the timestep.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Filesystem-safe stem for this variable, used for disk checkpoints.
    pub fn file_stem(&self) -> String {
        let safe: String = self
            .name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}_{}_{}", safe, self.timestep, self.iteration)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.timestep, self.iteration)
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestep, self.iteration, &self.name).cmp(&(
            other.timestep,
            other.iteration,
            &other.name,
        ))
    }
}

/// Allocates variable identities as a forward run progresses.
///
/// The registry tracks one `(timestep, iteration)` slot per field name plus
/// a global timestep counter. [`VariableRegistry::current`] names the latest
/// snapshot of a field without allocating a new one;
/// [`VariableRegistry::next`] allocates the identity of the snapshot a solve
/// is about to produce.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableRegistry {
    counters: hashbrown::HashMap<String, (usize, usize)>,
    timestep: usize,
}

impl VariableRegistry {
    /// Fresh registry at timestep 0 with no variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current global timestep.
    #[inline]
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    /// Latest variable for `name`, allocating `(name, timestep, 0)` for a
    /// field the registry has never seen.
    pub fn current(&mut self, name: &str) -> Variable {
        match self.counters.get(name) {
            Some(&(ts, it)) => Variable::new(name, ts, it),
            None => {
                self.counters.insert(name.to_string(), (self.timestep, 0));
                Variable::new(name, self.timestep, 0)
            }
        }
    }

    /// Latest variable for `name` without allocating.
    pub fn peek(&self, name: &str) -> Option<Variable> {
        self.counters
            .get(name)
            .map(|&(ts, it)| Variable::new(name, ts, it))
    }

    /// Allocate the identity for the next snapshot of `name`.
    ///
    /// Within a timestep the iteration advances; after
    /// [`VariableRegistry::advance_timestep`] the count restarts at 0.
    pub fn next(&mut self, name: &str) -> Variable {
        let slot = match self.counters.get(name) {
            None => (self.timestep, 0),
            Some(&(ts, it)) if ts == self.timestep => (self.timestep, it + 1),
            Some(_) => (self.timestep, 0),
        };
        self.counters.insert(name.to_string(), slot);
        Variable::new(name, slot.0, slot.1)
    }

    /// Advance the global timestep. Existing variables keep their identities.
    pub fn advance_timestep(&mut self) {
        self.timestep += 1;
    }

    /// Forget all variables and counters.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.timestep = 0;
    }
}
