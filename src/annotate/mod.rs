//! Annotation: recording forward operations onto the tape.
//!
//! Each interceptor here mirrors one backend operation. It performs the
//! operation, and, when annotation is on, registers the equation that
//! recomputes it together with initial-condition equations for any
//! dependency the tape has not seen before.

pub mod assign;
pub mod interpolate;
pub mod point_integral;

pub use assign::assign;
pub use interpolate::interpolate;
pub use point_integral::PointIntegralSolver;

use crate::backend::value::AdjointValue;
use crate::tape::adjointer::Adjointer;
use crate::tape::block::{BlockName, IdentityBlock};
use crate::tape::checkpoint::RecordedValue;
use crate::tape::equation::Equation;
use crate::tape::rhs::InitialValueRhs;
use crate::tape::variable::Variable;
use crate::tape_error::TapeError;
use log::debug;

/// Resolve a per-call annotation flag against the tape's global switch.
///
/// An explicit `Some(false)` always wins; `Some(true)` and `None` both defer
/// to [`Adjointer::annotation_enabled`].
pub fn to_annotate<V: AdjointValue>(flag: Option<bool>, adjointer: &Adjointer<V>) -> bool {
    flag.unwrap_or(true) && adjointer.annotation_enabled()
}

/// Identity block labelled after a function space, shared by all
/// interceptors. The label is truncated by [`BlockName`] rules.
pub fn identity_block<V: AdjointValue>(space_name: &str, zero: V) -> IdentityBlock<V> {
    IdentityBlock::new(BlockName::new(format!("Identity: {space_name}")), zero)
}

/// Register initial-condition equations for every pair whose variable the
/// tape does not know yet, and return how many were newly registered.
///
/// Each new variable gets an identity equation whose right-hand side is the
/// captured `value`. Under record-all the value is also recorded.
pub fn register_initial_conditions<V: AdjointValue>(
    adjointer: &mut Adjointer<V>,
    pairs: impl IntoIterator<Item = (Variable, V)>,
) -> Result<usize, TapeError> {
    let mut newly_registered = 0;
    for (var, value) in pairs {
        if adjointer.variable_known(&var) {
            continue;
        }
        debug!("registering initial condition for `{var}`");
        let block = IdentityBlock::new(
            BlockName::new(format!("Initial condition: {var}")),
            value.zero_like(),
        );
        let rhs = InitialValueRhs::new(value.clone());
        let equation = Equation::new(var.clone(), vec![Box::new(block)], Box::new(rhs))?;
        adjointer.register_equation(equation)?;
        if adjointer.record_all() {
            adjointer.record_variable(var, RecordedValue::Memory(value));
        }
        newly_registered += 1;
    }
    Ok(newly_registered)
}
