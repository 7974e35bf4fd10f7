//! Interpolation interceptor.

use crate::annotate::{identity_block, register_initial_conditions, to_annotate};
use crate::backend::space::FunctionSpace;
use crate::backend::value::{AdjointValue, Interpolate};
use crate::tape::adjointer::Adjointer;
use crate::tape::checkpoint::RecordedValue;
use crate::tape::equation::Equation;
use crate::tape::rhs::InterpolateRhs;
use crate::tape_error::TapeError;
use log::debug;

/// Interpolate `source` into `target_space`, recording the operation.
///
/// The interpolation itself always runs. It is annotated only when the flag
/// resolves to true *and* the tape already knows the current snapshot of
/// `source`; interpolating an untracked field stays off the tape, matching
/// the rule that only tracked quantities have adjoints.
///
/// The recorded equation pairs an identity block over `target_space` with an
/// [`InterpolateRhs`] so replay re-runs the interpolation. Its hermitian
/// derivative action is unavailable, so adjoint sweeps cannot differentiate
/// *through* it; see [`InterpolateRhs::derivative_action`].
pub fn interpolate<V, I>(
    adjointer: &mut Adjointer<V>,
    interpolator: &I,
    source: &V,
    target_space: &I::Space,
    annotate: Option<bool>,
) -> Result<V, TapeError>
where
    V: AdjointValue,
    I: Interpolate<V>,
{
    let out = interpolator.interpolate(source, target_space)?;
    let source_var = adjointer.registry_mut().current(source.name());

    if to_annotate(annotate, adjointer) && adjointer.variable_known(&source_var) {
        let block = identity_block(target_space.name(), out.zero_like());
        let rhs = InterpolateRhs::new(
            interpolator.clone(),
            source_var.clone(),
            source.clone(),
            target_space.clone(),
        );

        let newly_registered =
            register_initial_conditions(adjointer, [(source_var, source.clone())])?;
        adjointer.complete_first_solve(newly_registered);

        let target = adjointer.registry_mut().next(out.name());
        debug!("annotating interpolation into `{}` as `{target}`", target_space.name());

        if adjointer.record_all() {
            adjointer.record_variable(target.clone(), RecordedValue::Memory(out.clone()));
        }

        let equation = Equation::new(target.clone(), vec![Box::new(block)], Box::new(rhs))?;
        let action = adjointer.register_equation(equation)?;
        adjointer.do_checkpoint(action, &target)?;
    }

    Ok(out)
}
