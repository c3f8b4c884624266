//! Augmented-Lagrangian helper layer
//!
//! The inner solvers minimize
//! ```math
//! \psi(x) = f(x) + \tfrac12 \sum_i \big(\hat y_i^2 - y_i^2\big) / \Sigma_i
//! ```
//! where $`\hat y = \Sigma (\zeta - \hat z)`$, $`\zeta = g(x) + \Sigma^{-1} y`$
//! and $`\hat z = \Pi_D(\zeta)`$, with gradient
//! $`\nabla\psi(x) = \nabla f(x) + \nabla g(x)^T \hat y`$.
//!
//! All helpers are pure: they read the problem and the outer-loop state
//! `(y, Σ)` and write into caller-owned buffers. The shared pattern is that a
//! `ψ` evaluation leaves `ŷ` behind, which a later gradient evaluation can
//! reuse to save one constraint evaluation.

use crate::constraints::Constraint;
use crate::problem::Problem;
use ndarray::azip;
use ndarray::prelude::*;

/// Parameters of the initial finite-difference Lipschitz estimate and the
/// step-size factor `γ = l_gamma_factor / L`.
#[derive(Debug, Clone)]
pub struct LipschitzParams {
    /// Relative perturbation used for the finite difference.
    pub epsilon: f64,
    /// Minimum absolute perturbation.
    pub delta: f64,
    /// Factor relating the step size `γ` to the Lipschitz estimate `L`.
    pub l_gamma_factor: f64,
}

impl Default for LipschitzParams {
    fn default() -> Self {
        LipschitzParams { epsilon: 1e-6, delta: 1e-12, l_gamma_factor: 0.95 }
    }
}

/// `ŷ(x) = Σ (ζ − Π_D(ζ))` with `ζ = g(x) + Σ⁻¹ y`, written into `yhat`.
fn calc_yhat<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    sigma: ArrayView1<f64>,
    mut yhat: ArrayViewMut1<f64>,
    mut zhat: ArrayViewMut1<f64>,
) {
    problem.eval_g(x, yhat.view_mut());
    azip!((z in &mut yhat, &yi in &y, &s in &sigma) *z += yi / s);
    zhat.assign(&yhat);
    problem.d.project(zhat.view_mut());
    azip!((z in &mut yhat, &zh in &zhat, &s in &sigma) *z = s * (*z - zh));
}

/// Evaluate `ψ(x)`, leaving `ŷ(x)` in `yhat` for later reuse.
pub fn calc_psi_yhat<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    sigma: ArrayView1<f64>,
    mut yhat: ArrayViewMut1<f64>,
    work_m: ArrayViewMut1<f64>,
) -> f64 {
    if problem.m == 0 {
        return problem.eval_f(x);
    }
    calc_yhat(problem, x, y, sigma, yhat.view_mut(), work_m);
    let mut penalty = 0.0;
    for ((&yh, &yi), &s) in yhat.iter().zip(y.iter()).zip(sigma.iter()) {
        penalty += (yh * yh - yi * yi) / s;
    }
    problem.eval_f(x) + 0.5 * penalty
}

/// `∇ψ(x) = ∇f(x) + ∇g(x)ᵀ ŷ`, reusing a previously computed `ŷ`.
pub fn calc_grad_psi_from_yhat<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    x: ArrayView1<f64>,
    yhat: ArrayView1<f64>,
    mut grad: ArrayViewMut1<f64>,
    mut work_n: ArrayViewMut1<f64>,
) {
    problem.eval_grad_f(x, grad.view_mut());
    if problem.m != 0 {
        problem.eval_grad_g_prod(x, yhat, work_n.view_mut());
        azip!((gi in &mut grad, &wi in &work_n) *gi += wi);
    }
}

/// Evaluate `ψ(x)` and `∇ψ(x)` together, sharing the constraint evaluation.
#[allow(clippy::too_many_arguments)]
pub fn calc_psi_grad_psi<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    sigma: ArrayView1<f64>,
    mut grad: ArrayViewMut1<f64>,
    work_n: ArrayViewMut1<f64>,
    mut work_m: ArrayViewMut1<f64>,
    work_m2: ArrayViewMut1<f64>,
) -> f64 {
    let psi = calc_psi_yhat(problem, x, y, sigma, work_m.view_mut(), work_m2);
    calc_grad_psi_from_yhat(problem, x, work_m.view(), grad.view_mut(), work_n);
    psi
}

/// Evaluate `∇ψ(x)` alone (skips the cost function).
#[allow(clippy::too_many_arguments)]
pub fn calc_grad_psi<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    sigma: ArrayView1<f64>,
    grad: ArrayViewMut1<f64>,
    work_n: ArrayViewMut1<f64>,
    mut work_m: ArrayViewMut1<f64>,
    work_m2: ArrayViewMut1<f64>,
) {
    if problem.m != 0 {
        calc_yhat(problem, x, y, sigma, work_m.view_mut(), work_m2);
    }
    calc_grad_psi_from_yhat(problem, x, work_m.view(), grad, work_n);
}

/// Projected gradient step `x̂ = Π_C(x − γ ∇ψ(x))` and residual `p = x̂ − x`.
///
/// `xhat` and `p` must be distinct buffers, neither aliasing `x` or `grad`.
pub fn calc_xhat<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    gamma: f64,
    x: ArrayView1<f64>,
    grad_psi: ArrayView1<f64>,
    mut xhat: ArrayViewMut1<f64>,
    mut p: ArrayViewMut1<f64>,
) {
    azip!((xh in &mut xhat, &xi in &x, &gi in &grad_psi) *xh = xi - gamma * gi);
    problem.c.project(xhat.view_mut());
    azip!((pi in &mut p, &xh in &xhat, &xi in &x) *pi = xh - xi);
}

/// Constraint violation `err_z = g(x̂) − ẑ(x̂)` reported to the outer loop.
pub fn calc_err_z<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    xhat: ArrayView1<f64>,
    y: ArrayView1<f64>,
    sigma: ArrayView1<f64>,
    mut err_z: ArrayViewMut1<f64>,
    mut work_m: ArrayViewMut1<f64>,
) {
    if problem.m == 0 {
        return;
    }
    problem.eval_g(xhat, err_z.view_mut());
    azip!((w in &mut work_m, &gi in &err_z, &yi in &y, &s in &sigma) *w = gi + yi / s);
    problem.d.project(work_m.view_mut());
    azip!((e in &mut err_z, &zh in &work_m) *e -= zh);
}

/// Fixed-point residual norm `‖p/γ + ∇ψ(x̂) − ∇ψ(x)‖_∞` used as the
/// stopping criterion. NaN components propagate so the driver can detect a
/// non-finite iterate.
pub fn calc_error_stop_crit(
    gamma: f64,
    p: ArrayView1<f64>,
    grad_psi_xhat: ArrayView1<f64>,
    grad_psi_x: ArrayView1<f64>,
) -> f64 {
    let mut norm = 0.0f64;
    for ((&pi, &gh), &gx) in p.iter().zip(grad_psi_xhat.iter()).zip(grad_psi_x.iter()) {
        let e = pi / gamma + gh - gx;
        if e.is_nan() {
            return f64::NAN;
        }
        norm = norm.max(e.abs());
    }
    norm
}

/// Finite-difference estimate of `‖∇²ψ‖` at `x`.
///
/// Perturbs each component by `max(δ, ε·|xᵢ|)`, evaluates `∇ψ` at both
/// points and returns `(ψ(x), ‖Δ∇ψ‖/‖h‖)`. `grad_psi` receives `∇ψ(x)`;
/// the remaining buffers are scratch. The caller floors a vanishing
/// estimate to machine epsilon and aborts on a non-finite one.
#[allow(clippy::too_many_arguments)]
pub fn estimate_lipschitz<C: Constraint, D: Constraint>(
    problem: &Problem<'_, C, D>,
    x: ArrayView1<f64>,
    y: ArrayView1<f64>,
    sigma: ArrayView1<f64>,
    lip: &LipschitzParams,
    mut grad_psi: ArrayViewMut1<f64>,
    mut x_plus_h: ArrayViewMut1<f64>,
    mut grad_plus: ArrayViewMut1<f64>,
    mut work_n: ArrayViewMut1<f64>,
    mut work_m: ArrayViewMut1<f64>,
    mut work_m2: ArrayViewMut1<f64>,
) -> (f64, f64) {
    azip!((xh in &mut x_plus_h, &xi in &x) *xh = xi + (lip.epsilon * xi).abs().max(lip.delta));
    calc_grad_psi(
        problem,
        x_plus_h.view(),
        y,
        sigma,
        grad_plus.view_mut(),
        work_n.view_mut(),
        work_m.view_mut(),
        work_m2.view_mut(),
    );
    let psi = calc_psi_grad_psi(
        problem,
        x,
        y,
        sigma,
        grad_psi.view_mut(),
        work_n.view_mut(),
        work_m.view_mut(),
        work_m2.view_mut(),
    );
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&gp, &gx), &xi) in grad_plus.iter().zip(grad_psi.iter()).zip(x.iter()) {
        let d = gp - gx;
        num += d * d;
        let h = (lip.epsilon * xi).abs().max(lip.delta);
        den += h * h;
    }
    (psi, num.sqrt() / den.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{NoConstraints, Rectangle};
    use approx::assert_abs_diff_eq;

    // f = 0, g(x) = x, D = (-inf, 0], y = 0.5, Σ = 2
    fn penalty_problem<'a>() -> Problem<'a, NoConstraints, Rectangle> {
        Problem::new(
            1,
            1,
            NoConstraints,
            Rectangle::new(None, Some(array![0.0])),
            |_x| 0.0,
            |_x, mut out| out[0] = 0.0,
            |x, mut out| out[0] = x[0],
            |_x, v, mut out| out[0] = v[0],
        )
    }

    #[test]
    fn psi_and_yhat_by_hand() {
        let problem = penalty_problem();
        let x = array![1.0];
        let y = array![0.5];
        let sigma = array![2.0];
        let mut yhat = Array1::zeros(1);
        let mut work = Array1::zeros(1);
        let psi = calc_psi_yhat(&problem, x.view(), y.view(), sigma.view(), yhat.view_mut(), work.view_mut());
        // ζ = 1.25, ẑ = 0, ŷ = 2.5, ψ = ½(2.5² − 0.5²)/2
        assert_abs_diff_eq!(yhat[0], 2.5, epsilon = 1e-15);
        assert_abs_diff_eq!(psi, 1.5, epsilon = 1e-15);
    }

    #[test]
    fn psi_agrees_between_helpers() {
        let problem = penalty_problem();
        let x = array![0.7];
        let y = array![0.5];
        let sigma = array![2.0];
        let mut yhat = Array1::zeros(1);
        let mut grad = Array1::zeros(1);
        let (mut wn, mut wm, mut wm2) = (Array1::zeros(1), Array1::zeros(1), Array1::zeros(1));
        let psi_a = calc_psi_yhat(&problem, x.view(), y.view(), sigma.view(), yhat.view_mut(), wm.view_mut());
        let psi_b = calc_psi_grad_psi(
            &problem,
            x.view(),
            y.view(),
            sigma.view(),
            grad.view_mut(),
            wn.view_mut(),
            wm.view_mut(),
            wm2.view_mut(),
        );
        assert_abs_diff_eq!(psi_a, psi_b, epsilon = 1e-15);
        // ∇ψ = ∇f + ∇gᵀŷ = ŷ
        assert_abs_diff_eq!(grad[0], yhat[0], epsilon = 1e-15);
    }

    #[test]
    fn grad_from_reused_yhat_matches() {
        let problem = penalty_problem();
        let x = array![-0.3];
        let y = array![0.5];
        let sigma = array![2.0];
        let mut yhat = Array1::zeros(1);
        let (mut wn, mut wm, mut wm2) = (Array1::zeros(1), Array1::zeros(1), Array1::zeros(1));
        calc_psi_yhat(&problem, x.view(), y.view(), sigma.view(), yhat.view_mut(), wm.view_mut());

        let mut grad_a = Array1::zeros(1);
        calc_grad_psi_from_yhat(&problem, x.view(), yhat.view(), grad_a.view_mut(), wn.view_mut());

        let mut grad_b = Array1::zeros(1);
        calc_grad_psi(
            &problem,
            x.view(),
            y.view(),
            sigma.view(),
            grad_b.view_mut(),
            wn.view_mut(),
            wm.view_mut(),
            wm2.view_mut(),
        );
        assert_abs_diff_eq!(grad_a[0], grad_b[0], epsilon = 1e-15);
    }

    #[test]
    fn xhat_is_the_exact_projection() {
        let problem = Problem::unconstrained(
            3,
            Rectangle::new(Some(array![0.0, 0.0, 0.0]), Some(array![1.0, 1.0, 1.0])),
            |_x| 0.0,
            |_x, mut out| out.fill(0.0),
        );
        let x = array![-0.5, 0.5, 1.5];
        let grad = array![0.0, 0.0, 0.0];
        let mut xhat = Array1::zeros(3);
        let mut p = Array1::zeros(3);
        calc_xhat(&problem, 0.5, x.view(), grad.view(), xhat.view_mut(), p.view_mut());
        assert_eq!(xhat, array![0.0, 0.5, 1.0]);
        assert_eq!(p, array![0.5, 0.0, -0.5]);
    }

    #[test]
    fn err_z_by_hand() {
        let problem = penalty_problem();
        let y = array![0.5];
        let sigma = array![2.0];
        let xhat = array![1.0];
        let mut err_z = Array1::zeros(1);
        let mut work = Array1::zeros(1);
        calc_err_z(&problem, xhat.view(), y.view(), sigma.view(), err_z.view_mut(), work.view_mut());
        // g(x̂) = 1, ẑ = min(1.25, 0) = 0
        assert_abs_diff_eq!(err_z[0], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn stop_criterion_is_the_infinity_norm() {
        let p = array![0.2, -0.4];
        let gh = array![1.0, 1.0];
        let gx = array![1.0, 2.0];
        // components: 0.2/0.1 + 0 = 2, −0.4/0.1 − 1 = −5
        let eps = calc_error_stop_crit(0.1, p.view(), gh.view(), gx.view());
        assert_abs_diff_eq!(eps, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn stop_criterion_propagates_nan() {
        let p = array![f64::NAN];
        let g = array![0.0];
        let eps = calc_error_stop_crit(1.0, p.view(), g.view(), g.view());
        assert!(eps.is_nan());
    }

    #[test]
    fn lipschitz_estimate_on_a_quadratic() {
        // f = ½ K x², exact curvature K
        let k = 1e4;
        let problem = Problem::unconstrained(
            1,
            NoConstraints,
            move |x| 0.5 * k * x[0] * x[0],
            move |x, mut out| out[0] = k * x[0],
        );
        let y = Array1::zeros(0);
        let sigma = Array1::zeros(0);
        let mut grad = Array1::zeros(1);
        let mut xh = Array1::zeros(1);
        let mut gp = Array1::zeros(1);
        let (mut wn, mut wm, mut wm2) = (Array1::zeros(1), Array1::zeros(0), Array1::zeros(0));
        let (psi, l) = estimate_lipschitz(
            &problem,
            array![1.0].view(),
            y.view(),
            sigma.view(),
            &LipschitzParams::default(),
            grad.view_mut(),
            xh.view_mut(),
            gp.view_mut(),
            wn.view_mut(),
            wm.view_mut(),
            wm2.view_mut(),
        );
        assert_abs_diff_eq!(psi, 0.5 * k, epsilon = 1e-9);
        assert_abs_diff_eq!(l, k, epsilon = 1e-2);
        assert_abs_diff_eq!(grad[0], k, epsilon = 1e-9);
    }
}
