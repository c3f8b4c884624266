//! Quasi-Newton direction providers
//!
//! The accelerated driver interpolates between the projected gradient step
//! `p` and a direction `q` supplied by one of these providers. The driver
//! only depends on this interface, so the acceleration scheme can be swapped
//! without touching the iteration logic.

mod lbfgs;
pub use lbfgs::*;

use crate::constraints::Constraint;
use ndarray::prelude::*;

/// Supplier of the direction `q ≈ H·p` used by the accelerated driver.
pub trait DirectionProvider {
    /// Called once before the first iteration with the initial iterate.
    fn initialize(
        &mut self,
        x: ArrayView1<f64>,
        xhat: ArrayView1<f64>,
        p: ArrayView1<f64>,
        grad_psi: ArrayView1<f64>,
    );

    /// Write the direction for the current iterate into `q`.
    ///
    /// Returns `false` when no direction is available (e.g. empty memory),
    /// in which case `q` is zeroed and the driver falls back to the
    /// projected gradient step for this iteration.
    fn apply(
        &mut self,
        x: ArrayView1<f64>,
        xhat: ArrayView1<f64>,
        p: ArrayView1<f64>,
        grad_psi: ArrayView1<f64>,
        q: &mut Array1<f64>,
    ) -> bool;

    /// Offer the transition `xₖ → xₖ₊₁` (with residuals `pₖ, pₖ₊₁`) as new
    /// curvature information. Returns `false` if the pair was rejected.
    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        x: ArrayView1<f64>,
        x_next: ArrayView1<f64>,
        p: ArrayView1<f64>,
        p_next: ArrayView1<f64>,
        grad_psi_next: ArrayView1<f64>,
        set: &dyn Constraint,
        gamma: f64,
    ) -> bool;

    /// Rescale internal memory after the step size changed mid-iteration.
    fn changed_gamma(&mut self, gamma_new: f64, gamma_old: f64);

    /// Drop all stored curvature information.
    fn reset(&mut self);
}

/// Provider that never produces a direction; the driver degenerates to a
/// plain forward-backward iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirection;

impl DirectionProvider for NoDirection {
    fn initialize(
        &mut self,
        _x: ArrayView1<f64>,
        _xhat: ArrayView1<f64>,
        _p: ArrayView1<f64>,
        _grad_psi: ArrayView1<f64>,
    ) {
    }

    fn apply(
        &mut self,
        _x: ArrayView1<f64>,
        _xhat: ArrayView1<f64>,
        _p: ArrayView1<f64>,
        _grad_psi: ArrayView1<f64>,
        q: &mut Array1<f64>,
    ) -> bool {
        q.fill(0.0);
        false
    }

    fn update(
        &mut self,
        _x: ArrayView1<f64>,
        _x_next: ArrayView1<f64>,
        _p: ArrayView1<f64>,
        _p_next: ArrayView1<f64>,
        _grad_psi_next: ArrayView1<f64>,
        _set: &dyn Constraint,
        _gamma: f64,
    ) -> bool {
        true
    }

    fn changed_gamma(&mut self, _gamma_new: f64, _gamma_old: f64) {}

    fn reset(&mut self) {}
}
