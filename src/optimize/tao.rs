//! TAO-style optimizer adapter.
//!
//! The adapter owns the bridge between a [`ReducedFunctional`] over typed
//! controls and an optimizer that only understands flat distributed vectors:
//! controls are packed into a [`GlobalVec`] under a [`PackLayout`], and the
//! optimizer calls back into the reduced functional through
//! [`TaoCallbacks`]. The optimizer itself sits behind [`TaoDriver`], so the
//! same adapter serves a linked TAO build, a hand-rolled test driver, or
//! nothing at all.

use crate::backend::value::AdjointValue;
use crate::comm::Communicator;
use crate::optimize::control::{BoundValue, Bounds, Control};
use crate::optimize::layout::PackLayout;
use crate::optimize::reduced::ReducedFunctional;
use crate::optimize::vec::{GlobalVec, pack_controls, unpack_controls};
use crate::tape_error::TapeError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix under which options reach the optimizer's option database.
pub const TAO_OPTION_PREFIX: &str = "tao_";

/// String-keyed optimizer options.
///
/// Keys are normalized on insertion: `method` becomes `type`, and
/// `maximum_iterations` / `max_iter` become `max_it`. [`TaoOptions::iter_prefixed`]
/// yields the keys the way an option database expects them, with
/// [`TAO_OPTION_PREFIX`] prepended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaoOptions {
    entries: BTreeMap<String, String>,
}

impl TaoOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(key: &str) -> &str {
        match key {
            "method" => "type",
            "maximum_iterations" | "max_iter" => "max_it",
            other => other,
        }
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.entries
            .insert(Self::normalize(key).to_owned(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(Self::normalize(key)).map(String::as_str)
    }

    /// Options in key order, each key carrying the database prefix.
    pub fn iter_prefixed(&self) -> impl Iterator<Item = (String, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (format!("{TAO_OPTION_PREFIX}{k}"), v.as_str()))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps a derivative from the dual space back to a primal field before it is
/// handed to the optimizer.
pub trait RieszMap<V>: Send + Sync {
    fn apply(&self, gradient: &V) -> Result<V, TapeError>;
}

impl<V, F> RieszMap<V> for F
where
    F: Fn(&V) -> Result<V, TapeError> + Send + Sync,
{
    fn apply(&self, gradient: &V) -> Result<V, TapeError> {
        self(gradient)
    }
}

/// Marker for general (non-box) constraints attached to a problem.
///
/// The TAO adapter has no constraint support; a problem carrying one is
/// rejected when the solver is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSpec {
    description: String,
}

impl ConstraintSpec {
    pub fn new(description: impl Into<String>) -> Self {
        ConstraintSpec {
            description: description.into(),
        }
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A reduced functional together with optional bounds and constraints.
#[derive(Debug)]
pub struct OptimizationProblem<V, R> {
    reduced_functional: R,
    bounds: Option<Vec<Bounds<V>>>,
    constraints: Option<ConstraintSpec>,
}

impl<V: AdjointValue, R: ReducedFunctional<V>> OptimizationProblem<V, R> {
    pub fn new(reduced_functional: R) -> Self {
        OptimizationProblem {
            reduced_functional,
            bounds: None,
            constraints: None,
        }
    }

    /// Attach box constraints, one pair per control.
    pub fn with_bounds(mut self, bounds: Vec<Bounds<V>>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_constraints(mut self, constraints: ConstraintSpec) -> Self {
        self.constraints = Some(constraints);
        self
    }

    #[inline]
    pub fn reduced_functional(&self) -> &R {
        &self.reduced_functional
    }

    #[inline]
    pub fn bounds(&self) -> Option<&[Bounds<V>]> {
        self.bounds.as_deref()
    }

    #[inline]
    pub fn constraints(&self) -> Option<&ConstraintSpec> {
        self.constraints.as_ref()
    }
}

/// Everything a driver needs to start a solve.
pub struct TaoSetup<'a> {
    /// Packed initial control values.
    pub initial: &'a GlobalVec<f64>,
    /// Packed (lower, upper) box constraints, when the problem has them.
    pub bounds: Option<(&'a GlobalVec<f64>, &'a GlobalVec<f64>)>,
    /// Options for the driver's option database.
    pub options: &'a TaoOptions,
}

/// Outcome of a driver run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaoSolution {
    /// Packed control values at the final iterate.
    pub solution: GlobalVec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Callbacks the optimizer invokes during a solve.
///
/// `x`, `g`, `direction` and `out` all live in the packed control layout.
pub trait TaoCallbacks {
    /// Objective value at `x`.
    fn objective(&mut self, x: &GlobalVec<f64>) -> Result<f64, TapeError>;

    /// Objective value at `x`, writing the gradient into `g`.
    fn objective_and_gradient(
        &mut self,
        x: &GlobalVec<f64>,
        g: &mut GlobalVec<f64>,
    ) -> Result<f64, TapeError>;

    /// Hessian at `x` applied to `direction`, written into `out`.
    fn hessian_action(
        &mut self,
        x: &GlobalVec<f64>,
        direction: &GlobalVec<f64>,
        out: &mut GlobalVec<f64>,
    ) -> Result<(), TapeError>;
}

/// An optimizer backend operating on the packed problem.
pub trait TaoDriver: Send {
    fn name(&self) -> &str;

    /// Run the optimization, calling back into `callbacks` for values,
    /// gradients and Hessian actions.
    fn solve(
        &mut self,
        setup: TaoSetup<'_>,
        callbacks: &mut dyn TaoCallbacks,
    ) -> Result<TaoSolution, TapeError>;
}

impl TaoDriver for Box<dyn TaoDriver> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(
        &mut self,
        setup: TaoSetup<'_>,
        callbacks: &mut dyn TaoCallbacks,
    ) -> Result<TaoSolution, TapeError> {
        (**self).solve(setup, callbacks)
    }
}

// The application context handed to the driver: working controls, their
// layout, and the reduced functional they are fed into.
struct AppContext<V: AdjointValue, R, C> {
    rf: R,
    controls: Vec<Control<V>>,
    layout: PackLayout,
    comm: C,
    riesz: Option<Box<dyn RieszMap<V>>>,
    // packed point of the last objective evaluation
    last_x: Option<GlobalVec<f64>>,
}

impl<V, R, C> AppContext<V, R, C>
where
    V: AdjointValue,
    R: ReducedFunctional<V>,
    C: Communicator,
{
    /// Copy a packed iterate back into the typed working controls.
    fn update(&mut self, x: &GlobalVec<f64>) -> Result<(), TapeError> {
        unpack_controls(x, &mut self.controls, &self.layout, &self.comm)
    }

    fn apply_riesz(&self, gradients: Vec<Control<V>>) -> Result<Vec<Control<V>>, TapeError> {
        let Some(riesz) = &self.riesz else {
            return Ok(gradients);
        };
        gradients
            .into_iter()
            .map(|g| match g {
                Control::Field(v) => Ok(Control::Field(riesz.apply(&v)?)),
                constant @ Control::Constant { .. } => Ok(constant),
            })
            .collect()
    }
}

impl<V, R, C> TaoCallbacks for AppContext<V, R, C>
where
    V: AdjointValue,
    R: ReducedFunctional<V>,
    C: Communicator,
{
    fn objective(&mut self, x: &GlobalVec<f64>) -> Result<f64, TapeError> {
        self.update(x)?;
        let value = self.rf.evaluate(&self.controls)?;
        self.last_x = Some(x.clone());
        Ok(value)
    }

    fn objective_and_gradient(
        &mut self,
        x: &GlobalVec<f64>,
        g: &mut GlobalVec<f64>,
    ) -> Result<f64, TapeError> {
        let value = self.objective(x)?;
        let gradients = self.rf.derivative()?;
        let gradients = self.apply_riesz(gradients)?;
        let packed = pack_controls(&gradients, &self.layout, &self.comm)?;
        g.zero_out();
        g.assemble();
        g.axpy(1.0, &packed)?;
        let (gmin, gmax) = g.global_minmax(&self.comm)?;
        debug!("gradient (min, max): ({gmin}, {gmax})");
        Ok(value)
    }

    fn hessian_action(
        &mut self,
        x: &GlobalVec<f64>,
        direction: &GlobalVec<f64>,
        out: &mut GlobalVec<f64>,
    ) -> Result<(), TapeError> {
        let stale = match &self.last_x {
            Some(last) => {
                let mut diff = x.clone();
                diff.axpy(-1.0, last)?;
                diff.global_norm2(&self.comm)? > 0.0
            }
            None => true,
        };
        if stale {
            warn!("hessian requested away from the last evaluation point; re-running the reduced functional");
            self.objective(x)?;
        }
        let mut directions = self.controls.clone();
        unpack_controls(direction, &mut directions, &self.layout, &self.comm)?;
        let actions = self.rf.hessian_action(&directions)?;
        let packed = pack_controls(&actions, &self.layout, &self.comm)?;
        out.zero_out();
        out.assemble();
        out.axpy(1.0, &packed)?;
        let (hmin, hmax) = out.global_minmax(&self.comm)?;
        debug!("hessian action (min, max): ({hmin}, {hmax})");
        Ok(())
    }
}

fn pack_bounds<V: AdjointValue>(
    controls: &[Control<V>],
    bounds: &[Bounds<V>],
    layout: &PackLayout,
) -> Result<(GlobalVec<f64>, GlobalVec<f64>), TapeError> {
    if bounds.len() != controls.len() {
        return Err(TapeError::LayoutMismatch {
            expected: controls.len(),
            found: bounds.len(),
        });
    }
    let mut lower = GlobalVec::from_layout(layout);
    let mut upper = GlobalVec::from_layout(layout);
    for ((control, bound), entry) in controls.iter().zip(bounds).zip(layout.entries()) {
        for (side, vec) in [(&bound.lower, &mut lower), (&bound.upper, &mut upper)] {
            match side {
                BoundValue::Const(c) => {
                    vec.write_local(entry.local_offset, &vec![*c; entry.len])?;
                }
                BoundValue::Field(f) => match control {
                    Control::Field(_) => {
                        let values = f.local_values();
                        if values.len() != entry.len {
                            return Err(TapeError::DimensionMismatch {
                                expected: entry.len,
                                found: values.len(),
                            });
                        }
                        vec.write_local(entry.local_offset, &values)?;
                    }
                    Control::Constant { name, .. } => {
                        return Err(TapeError::UnsupportedBound {
                            name: name.clone(),
                            reason: "a field bound cannot constrain a constant control",
                        });
                    }
                },
            }
        }
    }
    lower.assemble();
    upper.assemble();
    Ok((lower, upper))
}

/// Optimize a reduced functional through a TAO-style driver.
///
/// Construction packs the controls and bounds; [`TaoSolver::solve`] hands
/// the packed problem to the driver and copies the final iterate back into
/// the typed controls.
pub struct TaoSolver<V: AdjointValue, R, C, D> {
    ctx: AppContext<V, R, C>,
    driver: D,
    options: TaoOptions,
    initial: GlobalVec<f64>,
    bounds: Option<(GlobalVec<f64>, GlobalVec<f64>)>,
}

impl<V, R, C, D> TaoSolver<V, R, C, D>
where
    V: AdjointValue,
    R: ReducedFunctional<V>,
    C: Communicator,
    D: TaoDriver,
{
    /// Build a solver for `problem` over `comm`.
    ///
    /// # Errors
    /// [`TapeError::EmptyControls`] when the reduced functional carries no
    /// controls, [`TapeError::ConstraintsUnsupported`] when the problem has
    /// general constraints, and bound packing errors when the bounds do not
    /// fit the controls.
    pub fn new(
        problem: OptimizationProblem<V, R>,
        comm: C,
        driver: D,
        options: TaoOptions,
    ) -> Result<Self, TapeError> {
        if problem.constraints.is_some() {
            return Err(TapeError::ConstraintsUnsupported);
        }
        let controls = problem.reduced_functional.controls().to_vec();
        if controls.is_empty() {
            return Err(TapeError::EmptyControls);
        }
        let layout = PackLayout::build(&controls, &comm)?;
        let initial = pack_controls(&controls, &layout, &comm)?;
        let bounds = match &problem.bounds {
            Some(bounds) => Some(pack_bounds(&controls, bounds, &layout)?),
            None => None,
        };
        Ok(TaoSolver {
            ctx: AppContext {
                rf: problem.reduced_functional,
                controls,
                layout,
                comm,
                riesz: None,
                last_x: None,
            },
            driver,
            options,
            initial,
            bounds,
        })
    }

    /// Use `riesz` to map gradients back to the primal space before packing.
    pub fn with_riesz_map(mut self, riesz: impl RieszMap<V> + 'static) -> Self {
        self.ctx.riesz = Some(Box::new(riesz));
        self
    }

    #[inline]
    pub fn options(&self) -> &TaoOptions {
        &self.options
    }

    #[inline]
    pub fn options_mut(&mut self) -> &mut TaoOptions {
        &mut self.options
    }

    #[inline]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    #[inline]
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Packed initial iterate.
    #[inline]
    pub fn initial(&self) -> &GlobalVec<f64> {
        &self.initial
    }

    /// Packed bounds, when the problem has them.
    #[inline]
    pub fn packed_bounds(&self) -> Option<(&GlobalVec<f64>, &GlobalVec<f64>)> {
        self.bounds.as_ref().map(|(l, u)| (l, u))
    }

    /// Controls at the current iterate.
    #[inline]
    pub fn controls(&self) -> &[Control<V>] {
        &self.ctx.controls
    }

    #[inline]
    pub fn reduced_functional(&self) -> &R {
        &self.ctx.rf
    }

    /// Run the driver and return the first control at the final iterate.
    pub fn solve(&mut self) -> Result<Control<V>, TapeError> {
        let setup = TaoSetup {
            initial: &self.initial,
            bounds: self.bounds.as_ref().map(|(l, u)| (l, u)),
            options: &self.options,
        };
        let solution = self.driver.solve(setup, &mut self.ctx)?;
        debug!(
            "driver `{}` finished after {} iterations (converged: {})",
            self.driver.name(),
            solution.iterations,
            solution.converged
        );
        self.ctx.update(&solution.solution)?;
        Ok(self.ctx.controls[0].clone())
    }
}

impl<V, R, C> TaoSolver<V, R, C, Box<dyn TaoDriver>>
where
    V: AdjointValue,
    R: ReducedFunctional<V>,
    C: Communicator,
{
    /// Bind the system's TAO installation as the driver.
    ///
    /// # Errors
    /// Always [`TapeError::MissingSolver`]: no TAO library is linked into
    /// this build. Supply a [`TaoDriver`] through [`TaoSolver::new`] instead.
    pub fn with_system_driver(
        _problem: OptimizationProblem<V, R>,
        _comm: C,
        _options: TaoOptions,
    ) -> Result<Self, TapeError> {
        Err(TapeError::MissingSolver(
            "no TAO library is linked into this build",
        ))
    }
}
