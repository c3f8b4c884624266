//! Limited-memory BFGS direction provider
//!
//! Stores the most recent curvature pairs $`s_k = x_{k+1} - x_k`$ and
//! $`t_k = p_k - p_{k+1}`$ (the forward-backward adaptation of the usual
//! gradient difference: near the interior of the feasible set
//! $`p \approx -\gamma\nabla\psi`$, so $`t \approx \gamma\,\nabla^2\psi\, s`$)
//! and applies the inverse Hessian approximation to the residual `p` with
//! the standard two-loop recursion, warm-started with
//! $`H_0 = \frac{s^T t}{t^T t} I`$.
//!
//! Pair admission enforces positive curvature and optionally the cautious
//! criterion of Li & Fukushima, "On the global convergence of the BFGS
//! method for nonconvex unconstrained optimization problems" (2001):
//! $`s^T t / s^T s > \varepsilon \|\nabla\psi\|^\alpha`$.

use super::DirectionProvider;
use crate::constraints::Constraint;
use ndarray::prelude::*;
use std::collections::VecDeque;

/// Cautious-update safeguard; `epsilon = 0` disables the test.
#[derive(Debug, Clone)]
pub struct CbfgsParams {
    pub alpha: f64,
    pub epsilon: f64,
}

impl Default for CbfgsParams {
    fn default() -> Self {
        CbfgsParams { alpha: 1.0, epsilon: 1e-10 }
    }
}

#[derive(Debug, Clone)]
pub struct LbfgsParams {
    /// Number of curvature pairs to remember.
    pub memory: usize,
    pub cbfgs: CbfgsParams,
}

impl Default for LbfgsParams {
    fn default() -> Self {
        LbfgsParams { memory: 10, cbfgs: CbfgsParams::default() }
    }
}

struct CurvaturePair {
    rho: f64,
    s: Array1<f64>,
    t: Array1<f64>,
}

/// L-BFGS estimator of the inverse Hessian, acting on residual vectors.
pub struct Lbfgs {
    params: LbfgsParams,
    pairs: VecDeque<CurvaturePair>,
    alphas: Vec<f64>,
}

impl Lbfgs {
    pub fn new(params: LbfgsParams) -> Lbfgs {
        let memory = params.memory;
        Lbfgs { params, pairs: VecDeque::with_capacity(memory), alphas: Vec::with_capacity(memory) }
    }

    pub fn with_memory(memory: usize) -> Lbfgs {
        Lbfgs::new(LbfgsParams { memory, ..LbfgsParams::default() })
    }

    /// Number of stored curvature pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl DirectionProvider for Lbfgs {
    fn initialize(
        &mut self,
        _x: ArrayView1<f64>,
        _xhat: ArrayView1<f64>,
        _p: ArrayView1<f64>,
        _grad_psi: ArrayView1<f64>,
    ) {
        self.pairs.clear();
    }

    fn apply(
        &mut self,
        _x: ArrayView1<f64>,
        _xhat: ArrayView1<f64>,
        p: ArrayView1<f64>,
        _grad_psi: ArrayView1<f64>,
        q: &mut Array1<f64>,
    ) -> bool {
        let k = self.pairs.len();
        if k == 0 {
            q.fill(0.0);
            return false;
        }
        q.assign(&p);
        self.alphas.clear();
        // newest to oldest
        for pair in self.pairs.iter().rev() {
            let a = pair.rho * pair.s.dot(q);
            q.scaled_add(-a, &pair.t);
            self.alphas.push(a);
        }
        let newest = &self.pairs[k - 1];
        let tt = newest.t.dot(&newest.t);
        let gamma_h = if tt > 0.0 { newest.s.dot(&newest.t) / tt } else { 1.0 };
        *q *= gamma_h;
        // oldest to newest
        for (pair, &a) in self.pairs.iter().zip(self.alphas.iter().rev()) {
            let b = pair.rho * pair.t.dot(q);
            q.scaled_add(a - b, &pair.s);
        }
        true
    }

    fn update(
        &mut self,
        x: ArrayView1<f64>,
        x_next: ArrayView1<f64>,
        p: ArrayView1<f64>,
        p_next: ArrayView1<f64>,
        grad_psi_next: ArrayView1<f64>,
        _set: &dyn Constraint,
        _gamma: f64,
    ) -> bool {
        let s = &x_next - &x;
        let t = &p - &p_next;
        if s.iter().any(|v| !v.is_finite()) || t.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let sty = s.dot(&t);
        if !(sty > 0.0) {
            return false;
        }
        let cbfgs = &self.params.cbfgs;
        if cbfgs.epsilon > 0.0 && cbfgs.alpha > 0.0 {
            let ss = s.dot(&s);
            let grad_norm = grad_psi_next.dot(&grad_psi_next).sqrt();
            if !(sty / ss > cbfgs.epsilon * grad_norm.powf(cbfgs.alpha)) {
                return false;
            }
        }
        if self.pairs.len() >= self.params.memory {
            self.pairs.pop_front();
        }
        self.pairs.push_back(CurvaturePair { rho: 1.0 / sty, s, t });
        true
    }

    fn changed_gamma(&mut self, gamma_new: f64, gamma_old: f64) {
        // t ∝ γ, so the stored pairs stay consistent under rescaling
        let factor = gamma_new / gamma_old;
        for pair in &mut self.pairs {
            pair.t *= factor;
            pair.rho /= factor;
        }
    }

    fn reset(&mut self) {
        self.pairs.clear();
    }
}
