//! Assignment interceptor.

use crate::annotate::{identity_block, register_initial_conditions, to_annotate};
use crate::backend::value::AdjointValue;
use crate::tape::adjointer::Adjointer;
use crate::tape::checkpoint::RecordedValue;
use crate::tape::equation::Equation;
use crate::tape::rhs::IdentityRhs;
use crate::tape_error::TapeError;
use log::debug;

/// Assign `source`'s data to `target`, recording the copy.
///
/// The copy itself always runs, and runs first; nothing lands on the tape
/// when it fails. When annotation is on this then registers an identity
/// equation for the next snapshot of `target`, depending on the current
/// snapshot of `source`. An unseen source is first registered as an initial
/// condition, which is the path that can trigger the one-time first-solve
/// timestep advance.
pub fn assign<V: AdjointValue>(
    adjointer: &mut Adjointer<V>,
    target: &mut V,
    source: &V,
    annotate: Option<bool>,
) -> Result<(), TapeError> {
    target.assign(source)?;

    if to_annotate(annotate, adjointer) {
        let source_var = adjointer.registry_mut().current(source.name());
        let block = identity_block(source.name(), target.zero_like());
        let rhs = IdentityRhs::new(source_var.clone(), source.clone());

        let newly_registered =
            register_initial_conditions(adjointer, [(source_var, source.clone())])?;
        adjointer.complete_first_solve(newly_registered);

        let target_var = adjointer.registry_mut().next(target.name());
        debug!("annotating assignment as `{target_var}`");

        if adjointer.record_all() {
            adjointer.record_variable(target_var.clone(), RecordedValue::Memory(source.clone()));
        }

        let equation = Equation::new(target_var.clone(), vec![Box::new(block)], Box::new(rhs))?;
        let action = adjointer.register_equation(equation)?;
        adjointer.do_checkpoint(action, &target_var)?;
    }

    Ok(())
}
