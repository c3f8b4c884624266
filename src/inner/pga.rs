#![allow(non_snake_case)]
//! Plain projected gradient driver
//!
//! The degenerate counterpart of the accelerated driver: no direction
//! provider, no line search, every step is the projected gradient step with
//! the same adaptive upper-bound adjustment of the Lipschitz estimate.
//! Useful as a baseline and for debugging problem descriptions.

use crate::augmented::{
    calc_err_z, calc_error_stop_crit, calc_grad_psi_from_yhat, calc_psi_yhat, calc_xhat,
    estimate_lipschitz, LipschitzParams,
};
use crate::constraints::Constraint;
use crate::inner::{check_dims, SolverError, SolverStatus, Stats, StopSignal};
use crate::problem::Problem;
use ndarray::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PgaParams {
    pub lipschitz: LipschitzParams,
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Maximum wall-clock duration of one solve.
    pub max_time: Duration,
    /// Relative magnitude of `∇ψᵀp / ψ` below which the quadratic upper
    /// bound is no longer enforced.
    pub quadratic_upperbound_threshold: f64,
    /// Emit a progress event every this many iterations; 0 is silent.
    pub print_interval: usize,
}

impl Default for PgaParams {
    fn default() -> Self {
        PgaParams {
            lipschitz: LipschitzParams::default(),
            max_iter: 100,
            max_time: Duration::from_secs(300),
            quadratic_upperbound_threshold: 10.0 * f64::EPSILON,
            print_interval: 0,
        }
    }
}

/// Projected gradient inner solver.
pub struct PgaSolver {
    params: PgaParams,
    stop: StopSignal,
}

impl PgaSolver {
    pub fn new(params: PgaParams) -> PgaSolver {
        PgaSolver { params, stop: StopSignal::default() }
    }

    pub fn name(&self) -> &'static str {
        "PGA"
    }

    pub fn params(&self) -> &PgaParams {
        &self.params
    }

    /// Handle for requesting a cooperative stop from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Minimize `ψ` over the problem's feasible set.
    ///
    /// Write-back of `x`, `y` and `err_z` follows the same gating as the
    /// accelerated driver: on `Converged`, `Interrupted`, or whenever
    /// `always_overwrite_results` is set.
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

        self.stop.clear();
        let start_time = Instant::now();
        let mut stats = Stats::default();

        let mut x_k = x.clone();
        let mut x_hat = Array1::zeros(n);
        let mut p = Array1::zeros(n);
        let mut yhat = Array1::zeros(m);
        let mut grad_psi = Array1::zeros(n);
        let mut grad_psi_hat = Array1::zeros(n);
        let mut work_n = Array1::zeros(n);
        let mut work_m = Array1::zeros(m);
        let mut work_m2 = Array1::zeros(m);

        let (psi_0, L_est) = estimate_lipschitz(
            problem,
            x_k.view(),
            y.view(),
            sigma,
            &params.lipschitz,
            grad_psi.view_mut(),
            x_hat.view_mut(),
            grad_psi_hat.view_mut(),
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

        let mut no_progress: usize = 0;

        for k in 0..=params.max_iter {
            // Projected gradient step, with the upper-bound adjustment
            calc_xhat(problem, gamma_k, x_k.view(), grad_psi.view(), x_hat.view_mut(), p.view_mut());
            let mut psi_hat =
                calc_psi_yhat(problem, x_hat.view(), y.view(), sigma, yhat.view_mut(), work_m.view_mut());
            let mut grad_psi_dot_p = grad_psi.dot(&p);
            let mut norm_sq_p = p.dot(&p);
            while psi_hat - psi_k > grad_psi_dot_p + 0.5 * L_k * norm_sq_p
                && (grad_psi_dot_p / psi_k).abs() > params.quadratic_upperbound_threshold
            {
                L_k *= 2.0;
                gamma_k /= 2.0;
                calc_xhat(problem, gamma_k, x_k.view(), grad_psi.view(), x_hat.view_mut(), p.view_mut());
                psi_hat =
                    calc_psi_yhat(problem, x_hat.view(), y.view(), sigma, yhat.view_mut(), work_m.view_mut());
                grad_psi_dot_p = grad_psi.dot(&p);
                norm_sq_p = p.dot(&p);
            }

            calc_grad_psi_from_yhat(problem, x_hat.view(), yhat.view(), grad_psi_hat.view_mut(), work_n.view_mut());

            // Stop test -------------------------------------------------------

            let eps_k = calc_error_stop_crit(gamma_k, p.view(), grad_psi_hat.view(), grad_psi.view());

            if params.print_interval != 0 && k % params.print_interval == 0 {
                tracing::info!(
                    target: "pga",
                    "{:6}: ψ = {:13.6e}, ‖∇ψ‖ = {:13.6e}, ‖p‖ = {:13.6e}, γ = {:13.6e}, εₖ = {:13.6e}",
                    k,
                    psi_k,
                    grad_psi.dot(&grad_psi).sqrt(),
                    norm_sq_p.sqrt(),
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
            let max_no_progress = no_progress > 1;
            if conv || out_of_iter || out_of_time || not_finite || interrupted || max_no_progress {
                if conv || interrupted || always_overwrite_results {
                    calc_err_z(problem, x_hat.view(), y.view(), sigma, err_z.view_mut(), work_m.view_mut());
                    x.assign(&x_hat);
                    y.assign(&yhat);
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

            if x_k == x_hat {
                no_progress += 1;
            } else {
                no_progress = 0;
            }

            std::mem::swap(&mut x_k, &mut x_hat);
            std::mem::swap(&mut grad_psi, &mut grad_psi_hat);
            psi_k = psi_hat;
        }
        unreachable!("projected gradient loop ended without a status");
    }
}
