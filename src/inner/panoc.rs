#![allow(non_snake_case)]
//! Accelerated forward-backward driver
//!
//! Each iteration takes a projected gradient step, asks the direction
//! provider for a quasi-Newton candidate, optionally tries an
//! Anderson-accelerated point, and then backtracks on the forward-backward
//! envelope
//! ```math
//! \varphi_k = \psi_k + \tfrac{1}{2\gamma_k}\|p_k\|^2 + \nabla\psi_k^T p_k
//! ```
//! between the two. The Lipschitz estimate can grow mid-iteration whenever
//! the quadratic upper bound on `ψ(x̂)` is violated, shrinking the step size
//! `γ` and notifying the direction provider and the Anderson window so their
//! stored quantities stay consistent.
//!
//! All iteration state lives in a fixed set of buffers allocated at entry;
//! advancing an iteration swaps buffer roles instead of copying.

use crate::anderson::Anderson;
use crate::augmented::{
    calc_err_z, calc_error_stop_crit, calc_grad_psi_from_yhat, calc_psi_grad_psi, calc_psi_yhat,
    calc_xhat, estimate_lipschitz, LipschitzParams,
};
use crate::constraints::Constraint;
use crate::direction::{DirectionProvider, Lbfgs};
use crate::inner::{check_dims, SolverError, SolverStatus, Stats, StopSignal};
use crate::problem::Problem;
use ndarray::azip;
use ndarray::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PanocParams {
    pub lipschitz: LipschitzParams,
    /// Maximum number of inner iterations.
    pub max_iter: usize,
    /// Maximum wall-clock duration of one solve.
    pub max_time: Duration,
    /// Smallest line-search fraction before falling back to the projected
    /// gradient step.
    pub tau_min: f64,
    /// Curvature history length; also the grace window of the stall check.
    pub lbfgs_mem: usize,
    /// Relative magnitude of `∇ψᵀp / ψ` below which the quadratic upper
    /// bound is considered numerically unreliable and no longer enforced.
    pub quadratic_upperbound_threshold: f64,
    /// Re-run the upper-bound adjustment at every line-search candidate.
    pub update_lipschitz_in_linesearch: bool,
    /// Compensate the line-search condition for a step-size change at the
    /// candidate.
    pub alternative_linesearch_cond: bool,
    /// Anderson window size; 0 disables acceleration.
    pub anderson_acceleration: usize,
    /// Emit a progress event every this many iterations; 0 is silent.
    pub print_interval: usize,
}

impl Default for PanocParams {
    fn default() -> Self {
        PanocParams {
            lipschitz: LipschitzParams::default(),
            max_iter: 100,
            max_time: Duration::from_secs(300),
            tau_min: 1.0 / 256.0,
            lbfgs_mem: 10,
            quadratic_upperbound_threshold: 10.0 * f64::EPSILON,
            update_lipschitz_in_linesearch: true,
            alternative_linesearch_cond: false,
            anderson_acceleration: 0,
            print_interval: 0,
        }
    }
}

/// Accelerated inner solver.
pub struct PanocSolver<D = Lbfgs> {
    params: PanocParams,
    direction: D,
    stop: StopSignal,
}

impl PanocSolver<Lbfgs> {
    /// Solver with an L-BFGS direction provider sized by `lbfgs_mem`.
    pub fn new(params: PanocParams) -> Self {
        let direction = Lbfgs::with_memory(params.lbfgs_mem);
        PanocSolver::with_direction(params, direction)
    }
}

impl<D: DirectionProvider> PanocSolver<D> {
    pub fn with_direction(params: PanocParams, direction: D) -> Self {
        PanocSolver { params, direction, stop: StopSignal::default() }
    }

    pub fn name(&self) -> &'static str {
        "PANOC"
    }

    pub fn params(&self) -> &PanocParams {
        &self.params
    }

    /// Handle for requesting a cooperative stop from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Minimize `ψ` over the problem's feasible set.
    ///
    /// `x` and `y` are starting values; together with `err_z` they are
    /// overwritten with the final iterate, multiplier candidate and
    /// constraint violation on `Converged`, `Interrupted`, or whenever
    /// `always_overwrite_results` is set, and left untouched otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn solve<SC: Constraint, SD: Constraint>(
        &mut self,
        problem: &Problem<'_, SC, SD>,
        sigma: ArrayView1<f64>,
        eps: f64,
        always_overwrite_results: bool,
        x: &mut Array1<f64>,
        y: &mut Array1<f64>,
        err_z: &mut Array1<f64>,
    ) -> Result<Stats, SolverError> {
        let params = self.params.clone();
        let n = problem.n;
        let m = problem.m;

        check_dims("x", n, x.len())?;
        check_dims("y", m, y.len())?;
        check_dims("sigma", m, sigma.len())?;
        check_dims("err_z", m, err_z.len())?;
        if sigma.iter().any(|&s| !(s > 0.0)) {
            return Err(SolverError::NonPositivePenalty);
        }
        if !(eps > 0.0) {
            return Err(SolverError::NonPositiveTolerance);
        }
        if params.lbfgs_mem == 0 {
            return Err(SolverError::ZeroLbfgsMemory);
        }

        self.stop.clear();
        let start_time = Instant::now();
        let mut stats = Stats::default();

        // Iteration buffers ---------------------------------------------------

        let mut x_k = x.clone();
        let mut x_hat_k = Array1::zeros(n);
        let mut x_next = Array1::zeros(n);
        let mut x_hat_next = Array1::zeros(n);
        let mut yhat_k = Array1::zeros(m); // ŷ(x̂ₖ)
        let mut yhat_next = Array1::zeros(m);
        let mut p_k = Array1::zeros(n);
        let mut p_next = Array1::zeros(n);
        let mut q_k = Array1::zeros(n);
        let mut grad_psi_k = Array1::zeros(n);
        let mut grad_psi_hat_k = Array1::zeros(n); // ∇ψ(x̂ₖ)
        let mut grad_psi_next = Array1::zeros(n);
        let mut work_n = Array1::zeros(n);
        let mut work_m = Array1::zeros(m);
        let mut work_m2 = Array1::zeros(m);

        let mut anderson = if params.anderson_acceleration > 0 {
            Some(Anderson::new(n, params.anderson_acceleration.min(n)))
        } else {
            None
        };
        let mut x_acc = Array1::zeros(if anderson.is_some() { n } else { 0 });
        let mut yhat_acc = Array1::zeros(if anderson.is_some() { m } else { 0 });

        // Estimate the Lipschitz constant at the starting point ---------------

        let (psi_0, L_est) = estimate_lipschitz(
            problem,
            x_k.view(),
            y.view(),
            sigma,
            &params.lipschitz,
            grad_psi_k.view_mut(),
            x_next.view_mut(),
            grad_psi_next.view_mut(),
            work_n.view_mut(),
            work_m.view_mut(),
            work_m2.view_mut(),
        );
        let mut psi_k = psi_0;
        let mut L_k = L_est;
        if L_k < f64::EPSILON {
            L_k = f64::EPSILON;
        } else if !L_k.is_finite() {
            stats.status = SolverStatus::NotFinite;
            stats.elapsed = start_time.elapsed();
            return Ok(stats);
        }
        let mut gamma_k = params.lipschitz.l_gamma_factor / L_k;
        let mut sigma_k = gamma_k * (1.0 - gamma_k * L_k) / 2.0;

        // First projected gradient step ---------------------------------------

        calc_xhat(problem, gamma_k, x_k.view(), grad_psi_k.view(), x_hat_k.view_mut(), p_k.view_mut());
        let mut psi_hat_k =
            calc_psi_yhat(problem, x_hat_k.view(), y.view(), sigma, yhat_k.view_mut(), work_m.view_mut());
        let mut grad_psi_k_dot_p_k = grad_psi_k.dot(&p_k);
        let mut norm_sq_p_k = p_k.dot(&p_k);
        let mut phi_k = psi_k + norm_sq_p_k / (2.0 * gamma_k) + grad_psi_k_dot_p_k;

        let mut no_progress: usize = 0;

        // Main loop ===========================================================

        for k in 0..=params.max_iter {
            // Quadratic upper bound: grow L until ψ(x̂ₖ) is majorized, unless
            // the bound is numerically meaningless
            let old_gamma = gamma_k;
            if k == 0 || !params.update_lipschitz_in_linesearch {
                while psi_hat_k - psi_k > grad_psi_k_dot_p_k + 0.5 * L_k * norm_sq_p_k
                    && (grad_psi_k_dot_p_k / psi_k).abs() > params.quadratic_upperbound_threshold
                {
                    L_k *= 2.0;
                    sigma_k /= 2.0;
                    gamma_k /= 2.0;
                    calc_xhat(problem, gamma_k, x_k.view(), grad_psi_k.view(), x_hat_k.view_mut(), p_k.view_mut());
                    grad_psi_k_dot_p_k = grad_psi_k.dot(&p_k);
                    norm_sq_p_k = p_k.dot(&p_k);
                    psi_hat_k =
                        calc_psi_yhat(problem, x_hat_k.view(), y.view(), sigma, yhat_k.view_mut(), work_m.view_mut());
                }
            }
            if k > 0 && gamma_k != old_gamma {
                self.direction.changed_gamma(gamma_k, old_gamma);
                if let Some(aa) = anderson.as_mut() {
                    aa.changed_gamma(gamma_k, old_gamma);
                }
            }

            if k == 0 {
                self.direction.initialize(x_k.view(), x_hat_k.view(), p_k.view(), grad_psi_k.view());
            }

            // ∇ψ(x̂ₖ), reusing ŷ(x̂ₖ) from the ψ evaluation
            calc_grad_psi_from_yhat(problem, x_hat_k.view(), yhat_k.view(), grad_psi_hat_k.view_mut(), work_n.view_mut());

            // Stop test -------------------------------------------------------

            let eps_k = calc_error_stop_crit(gamma_k, p_k.view(), grad_psi_hat_k.view(), grad_psi_k.view());

            if params.print_interval != 0 && k % params.print_interval == 0 {
                tracing::info!(
                    target: "panoc",
                    "{:6}: ψ = {:13.6e}, ‖∇ψ‖ = {:13.6e}, ‖p‖ = {:13.6e}, γ = {:13.6e}, εₖ = {:13.6e}",
                    k,
                    psi_k,
                    grad_psi_k.dot(&grad_psi_k).sqrt(),
                    norm_sq_p_k.sqrt(),
                    gamma_k,
                    eps_k
                );
            }

            let time_elapsed = start_time.elapsed();
            let out_of_time = time_elapsed > params.max_time;
            let out_of_iter = k == params.max_iter;
            let interrupted = self.stop.is_stop_requested();
            let not_finite = !eps_k.is_finite();
            let conv = eps_k <= eps;
            let max_no_progress = no_progress > params.lbfgs_mem;
            if conv || out_of_iter || out_of_time || not_finite || interrupted || max_no_progress {
                if conv || interrupted || always_overwrite_results {
                    calc_err_z(problem, x_hat_k.view(), y.view(), sigma, err_z.view_mut(), work_m.view_mut());
                    x.assign(&x_hat_k);
                    y.assign(&yhat_k);
                }
                stats.iterations = k;
                stats.epsilon = eps_k;
                stats.elapsed = time_elapsed;
                stats.status = if conv {
                    SolverStatus::Converged
                } else if out_of_time {
                    SolverStatus::MaxTime
                } else if out_of_iter {
                    SolverStatus::MaxIter
                } else if not_finite {
                    SolverStatus::NotFinite
                } else if max_no_progress {
                    SolverStatus::NoProgress
                } else {
                    SolverStatus::Interrupted
                };
                return Ok(stats);
            }

            // Quasi-Newton direction ------------------------------------------

            let mut have_direction = false;
            if k > 0 {
                have_direction =
                    self.direction.apply(x_k.view(), x_hat_k.view(), p_k.view(), grad_psi_k.view(), &mut q_k);
            }

            // Anderson candidate ----------------------------------------------

            let mut anderson_accepted = false;
            if let Some(aa) = anderson.as_mut() {
                if k == 0 {
                    aa.initialize(x_k.view(), grad_psi_k.view(), gamma_k);
                } else {
                    let y_aa = aa.candidate(x_k.view(), grad_psi_k.view(), gamma_k);
                    x_acc.assign(y_aa);
                    problem.c.project(x_acc.view_mut());
                    let psi_acc =
                        calc_psi_yhat(problem, x_acc.view(), y.view(), sigma, yhat_acc.view_mut(), work_m.view_mut());
                    anderson_accepted = psi_acc < psi_hat_k;
                    if anderson_accepted {
                        std::mem::swap(&mut x_hat_k, &mut x_acc);
                        azip!((pi in &mut p_k, &xh in &x_hat_k, &xi in &x_k) *pi = xh - xi);
                        psi_hat_k = psi_acc;
                        calc_grad_psi_from_yhat(
                            problem,
                            x_hat_k.view(),
                            yhat_acc.view(),
                            grad_psi_hat_k.view_mut(),
                            work_n.view_mut(),
                        );
                    }
                }
            }

            // Line search on the forward-backward envelope --------------------

            let mut tau;
            let sigma_norm_p_over_gamma = sigma_k * norm_sq_p_k / (gamma_k * gamma_k);
            let mut phi_next: f64;
            let mut psi_next: f64;
            let mut psi_hat_next: f64;
            let mut grad_next_dot_p_next: f64;
            let mut norm_sq_p_next: f64;
            let mut L_next: f64;
            let mut sigma_next: f64;
            let mut gamma_next: f64;

            if k == 0 {
                tau = 0.0;
            } else if !have_direction {
                tau = 0.0;
            } else if q_k.iter().any(|v| !v.is_finite()) {
                tau = 0.0;
                stats.lbfgs_failures += 1;
                self.direction.reset();
            } else {
                tau = 1.0;
            }

            loop {
                L_next = L_k;
                sigma_next = sigma_k;
                gamma_next = gamma_k;

                if tau / 2.0 < params.tau_min {
                    // safe projected gradient step; its ψ and ∇ψ are already
                    // known, so swap them in instead of recomputing
                    std::mem::swap(&mut x_next, &mut x_hat_k);
                    psi_next = psi_hat_k;
                    std::mem::swap(&mut grad_psi_next, &mut grad_psi_hat_k);
                } else {
                    azip!((xn in &mut x_next, &xi in &x_k, &pi in &p_k, &qi in &q_k)
                        *xn = xi + (1.0 - tau) * pi + tau * qi);
                    psi_next = calc_psi_grad_psi(
                        problem,
                        x_next.view(),
                        y.view(),
                        sigma,
                        grad_psi_next.view_mut(),
                        work_n.view_mut(),
                        work_m.view_mut(),
                        work_m2.view_mut(),
                    );
                }

                calc_xhat(problem, gamma_next, x_next.view(), grad_psi_next.view(), x_hat_next.view_mut(), p_next.view_mut());
                psi_hat_next =
                    calc_psi_yhat(problem, x_hat_next.view(), y.view(), sigma, yhat_next.view_mut(), work_m.view_mut());
                grad_next_dot_p_next = grad_psi_next.dot(&p_next);
                norm_sq_p_next = p_next.dot(&p_next);
                // residual norm of the prox step taken with the unmodified γₖ
                let norm_sq_p_next_old_gamma = norm_sq_p_next;

                if params.update_lipschitz_in_linesearch {
                    let old_gamma_next = gamma_next;
                    while psi_hat_next - psi_next > grad_next_dot_p_next + 0.5 * L_next * norm_sq_p_next
                        && (grad_next_dot_p_next / psi_next).abs() > params.quadratic_upperbound_threshold
                    {
                        L_next *= 2.0;
                        sigma_next /= 2.0;
                        gamma_next /= 2.0;
                        calc_xhat(problem, gamma_next, x_next.view(), grad_psi_next.view(), x_hat_next.view_mut(), p_next.view_mut());
                        grad_next_dot_p_next = grad_psi_next.dot(&p_next);
                        norm_sq_p_next = p_next.dot(&p_next);
                        psi_hat_next =
                            calc_psi_yhat(problem, x_hat_next.view(), y.view(), sigma, yhat_next.view_mut(), work_m.view_mut());
                    }
                    if gamma_next != old_gamma_next {
                        self.direction.changed_gamma(gamma_next, old_gamma_next);
                        if let Some(aa) = anderson.as_mut() {
                            aa.changed_gamma(gamma_next, old_gamma_next);
                        }
                    }
                }

                phi_next = psi_next + norm_sq_p_next / (2.0 * gamma_next) + grad_next_dot_p_next;
                tau /= 2.0;

                let mut ls_cond = phi_next - (phi_k - sigma_norm_p_over_gamma);
                if params.alternative_linesearch_cond {
                    ls_cond -= (0.5 / gamma_next - 0.5 / gamma_k) * norm_sq_p_next_old_gamma;
                }
                if !(ls_cond > 0.0 && tau >= params.tau_min) {
                    break;
                }
            }

            // τ below the floor means the prox step was accepted as fallback
            if tau < params.tau_min && k != 0 && have_direction {
                stats.linesearch_failures += 1;
            }

            // Offer the transition as curvature information
            let pair_accepted = self.direction.update(
                x_k.view(),
                x_next.view(),
                p_k.view(),
                p_next.view(),
                grad_psi_next.view(),
                &problem.c,
                gamma_next,
            );
            if !pair_accepted {
                stats.lbfgs_rejected += 1;
            }

            // Stall detection: exact equality only, checked on the curvature
            // window boundary or while a stall is already suspected
            if no_progress > 0 || k % params.lbfgs_mem == 0 {
                no_progress = if x_k == x_next { no_progress + 1 } else { 0 };
            }

            if k > 0 {
                if let Some(aa) = anderson.as_mut() {
                    aa.finish_iteration(anderson_accepted);
                }
            }

            // Advance: swap buffer roles and carry the scalars forward
            L_k = L_next;
            sigma_k = sigma_next;
            gamma_k = gamma_next;
            psi_k = psi_next;
            psi_hat_k = psi_hat_next;
            phi_k = phi_next;
            std::mem::swap(&mut x_k, &mut x_next);
            std::mem::swap(&mut x_hat_k, &mut x_hat_next);
            std::mem::swap(&mut yhat_k, &mut yhat_next);
            std::mem::swap(&mut p_k, &mut p_next);
            std::mem::swap(&mut grad_psi_k, &mut grad_psi_next);
            grad_psi_k_dot_p_k = grad_next_dot_p_next;
            norm_sq_p_k = norm_sq_p_next;
        }
        unreachable!("accelerated driver loop ended without a status");
    }
}
