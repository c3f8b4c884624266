//! Anderson acceleration
//!
//! Accelerates the fixed-point iteration of the gradient-step map
//! $`g(x) = x - \gamma\nabla\psi(x)`$ by combining the recent candidates with
//! least-squares coefficients that minimize the combined residual
//! $`r_k = g(x_k) - y_{k-1}`$ over the span of its recent differences.
//!
//! The least-squares problem is kept as an incrementally updated QR
//! factorization of the residual-difference matrix: new columns enter by
//! Gram-Schmidt, the oldest column leaves by re-triangularizing with Givens
//! rotations. Because the residual is proportional to the step size near the
//! interior of the feasible set, the `R` factor and the cached previous
//! residual are rescaled whenever `γ` changes.

use ndarray::prelude::*;
use ndarray::{azip, Zip};
use std::collections::VecDeque;

/// QR factorization of a tall matrix that gains columns on the right and
/// loses them on the left.
pub struct LimitedMemoryQR {
    max_cols: usize,
    /// Orthonormal columns.
    q: Vec<Array1<f64>>,
    /// Upper-triangular factor, stored by column; `r[j]` has `j + 1` entries.
    r: Vec<Vec<f64>>,
}

fn givens(a: f64, b: f64) -> (f64, f64) {
    let r = a.hypot(b);
    if r == 0.0 {
        (1.0, 0.0)
    } else {
        (a / r, b / r)
    }
}

impl LimitedMemoryQR {
    pub fn new(max_cols: usize) -> LimitedMemoryQR {
        LimitedMemoryQR { max_cols, q: Vec::with_capacity(max_cols), r: Vec::with_capacity(max_cols) }
    }

    pub fn num_columns(&self) -> usize {
        self.q.len()
    }

    pub fn is_full(&self) -> bool {
        self.q.len() == self.max_cols
    }

    /// Append a column on the right (the factorization must not be full).
    pub fn add_column(&mut self, v: &Array1<f64>) {
        debug_assert!(!self.is_full());
        let mut w = v.clone();
        let mut col = Vec::with_capacity(self.q.len() + 1);
        for qi in &self.q {
            let c = qi.dot(&w);
            w.scaled_add(-c, qi);
            col.push(c);
        }
        let norm = w.dot(&w).sqrt();
        if norm > 0.0 {
            w /= norm;
        }
        col.push(norm);
        self.q.push(w);
        self.r.push(col);
    }

    /// Drop the oldest (leftmost) column and restore triangularity.
    pub fn remove_first_column(&mut self) {
        if self.r.is_empty() {
            return;
        }
        self.r.remove(0);
        let k = self.r.len();
        for j in 0..k {
            // eliminate the subdiagonal entry of column j with a rotation of
            // rows j and j+1, applied to R and accumulated into Q
            let (c, s) = givens(self.r[j][j], self.r[j][j + 1]);
            for col in j..k {
                let rc = &mut self.r[col];
                let (u, v) = (rc[j], rc[j + 1]);
                rc[j] = c * u + s * v;
                rc[j + 1] = -s * u + c * v;
            }
            self.r[j].truncate(j + 1);
            let (head, tail) = self.q.split_at_mut(j + 1);
            Zip::from(&mut head[j]).and(&mut tail[0]).for_each(|a, b| {
                let (u, v) = (*a, *b);
                *a = c * u + s * v;
                *b = -s * u + c * v;
            });
        }
        self.q.pop();
    }

    /// Least-squares coefficients `argmin_γ ‖rhs − A γ‖₂` for the factored
    /// matrix `A`, by back substitution. A rank-deficient factor yields
    /// non-finite coefficients, which the caller is expected to detect.
    pub fn solve(&self, rhs: &Array1<f64>) -> Vec<f64> {
        let k = self.q.len();
        let mut gamma: Vec<f64> = self.q.iter().map(|qi| qi.dot(rhs)).collect();
        for j in (0..k).rev() {
            for i in (j + 1)..k {
                gamma[j] -= self.r[i][j] * gamma[i];
            }
            gamma[j] /= self.r[j][j];
        }
        gamma
    }

    /// Scale the `R` factor (equivalent to scaling every stored column).
    pub fn scale_r(&mut self, factor: f64) {
        for col in &mut self.r {
            for v in col {
                *v *= factor;
            }
        }
    }

    pub fn reset(&mut self) {
        self.q.clear();
        self.r.clear();
    }
}

/// Driver-facing Anderson accelerator state.
pub struct Anderson {
    qr: LimitedMemoryQR,
    /// Recent values of the gradient-step map, oldest first; always exactly
    /// one longer than the number of QR columns.
    history: VecDeque<Array1<f64>>,
    r_prev: Array1<f64>,
    r_cur: Array1<f64>,
    g_cur: Array1<f64>,
    y: Array1<f64>,
}

impl Anderson {
    /// Accelerator for an `n`-dimensional iteration with window `memory ≥ 1`.
    pub fn new(n: usize, memory: usize) -> Anderson {
        Anderson {
            qr: LimitedMemoryQR::new(memory),
            history: VecDeque::with_capacity(memory + 1),
            r_prev: Array1::zeros(n),
            r_cur: Array1::zeros(n),
            g_cur: Array1::zeros(n),
            y: Array1::zeros(n),
        }
    }

    /// Seed the history at the first iterate: `r₀ = −γ∇ψ(x₀)`,
    /// `y₀ = x₀ + r₀`.
    pub fn initialize(&mut self, x: ArrayView1<f64>, grad_psi: ArrayView1<f64>, gamma: f64) {
        azip!((r in &mut self.r_prev, &g in &grad_psi) *r = -gamma * g);
        azip!((y in &mut self.y, &xi in &x, &r in &self.r_prev) *y = xi + r);
        self.history.clear();
        self.history.push_back(self.y.clone());
        self.qr.reset();
    }

    /// Compute the combined candidate for the current iterate and push the
    /// new residual difference into the window. The returned vector is the
    /// unprojected candidate `yₖ`.
    pub fn candidate(&mut self, x: ArrayView1<f64>, grad_psi: ArrayView1<f64>, gamma: f64) -> &Array1<f64> {
        azip!((g in &mut self.g_cur, &xi in &x, &gi in &grad_psi) *g = xi - gamma * gi);
        azip!((r in &mut self.r_cur, &g in &self.g_cur, &y in &self.y) *r = g - y);

        if self.qr.is_full() {
            self.qr.remove_first_column();
            self.history.pop_front();
        }
        let dr = &self.r_cur - &self.r_prev;
        self.qr.add_column(&dr);
        self.history.push_back(self.g_cur.clone());

        let gamma_ls = self.qr.solve(&self.r_cur);
        let k = gamma_ls.len();
        self.y.fill(0.0);
        for (j, gj) in self.history.iter().enumerate() {
            let alpha = if j == 0 {
                gamma_ls[0]
            } else if j < k {
                gamma_ls[j] - gamma_ls[j - 1]
            } else {
                1.0 - gamma_ls[k - 1]
            };
            self.y.scaled_add(alpha, gj);
        }

        // a degenerate least-squares solve poisons the candidate; keep only
        // the newest column so the window can rebuild
        if gamma_ls.iter().any(|v| !v.is_finite()) {
            if let Some(newest) = self.history.pop_back() {
                self.history.clear();
                self.history.push_back(newest);
            }
            self.qr.reset();
        }
        &self.y
    }

    /// Rescale the window after a step-size change.
    pub fn changed_gamma(&mut self, gamma_new: f64, gamma_old: f64) {
        let factor = gamma_new / gamma_old;
        self.qr.scale_r(factor);
        self.r_prev *= factor;
    }

    /// Roll the residuals; when the candidate was rejected the raw map value
    /// becomes the reference point instead.
    pub fn finish_iteration(&mut self, accepted: bool) {
        if !accepted {
            std::mem::swap(&mut self.y, &mut self.g_cur);
        }
        std::mem::swap(&mut self.r_cur, &mut self.r_prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn qr_solves_orthogonal_least_squares() {
        let mut qr = LimitedMemoryQR::new(3);
        qr.add_column(&array![1.0, 0.0, 0.0]);
        qr.add_column(&array![0.0, 2.0, 0.0]);
        let gamma = qr.solve(&array![3.0, 4.0, 5.0]);
        assert_abs_diff_eq!(gamma[0], 3.0, epsilon = 1e-14);
        assert_abs_diff_eq!(gamma[1], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn qr_column_removal_matches_a_fresh_factorization() {
        let v1 = array![1.0, 2.0, -1.0, 0.5];
        let v2 = array![0.0, 1.0, 3.0, -2.0];
        let v3 = array![2.0, -1.0, 0.0, 1.0];
        let rhs = array![1.0, 1.0, 1.0, 1.0];

        let mut qr = LimitedMemoryQR::new(3);
        qr.add_column(&v1);
        qr.add_column(&v2);
        qr.add_column(&v3);
        qr.remove_first_column();
        assert_eq!(qr.num_columns(), 2);
        let got = qr.solve(&rhs);

        let mut fresh = LimitedMemoryQR::new(2);
        fresh.add_column(&v2);
        fresh.add_column(&v3);
        let want = fresh.solve(&rhs);

        assert_abs_diff_eq!(got[0], want[0], epsilon = 1e-12);
        assert_abs_diff_eq!(got[1], want[1], epsilon = 1e-12);
    }

    #[test]
    fn qr_scaling_scales_the_solution_inversely() {
        let mut qr = LimitedMemoryQR::new(2);
        qr.add_column(&array![1.0, 1.0]);
        let base = qr.solve(&array![2.0, 2.0]);
        qr.scale_r(2.0);
        let scaled = qr.solve(&array![2.0, 2.0]);
        assert_abs_diff_eq!(scaled[0], base[0] / 2.0, epsilon = 1e-14);
    }

    #[test]
    fn rank_deficient_solve_is_nonfinite() {
        let mut qr = LimitedMemoryQR::new(2);
        qr.add_column(&array![1.0, 0.0]);
        qr.add_column(&array![2.0, 0.0]); // linearly dependent
        let gamma = qr.solve(&array![1.0, 1.0]);
        assert!(gamma.iter().any(|v| !v.is_finite()));
    }

    #[test]
    fn affine_fixed_point_is_found_after_one_update() {
        // map g(x) = x − γ∇ψ(x) with γ = 1, ∇ψ(x) = 0.5 x − 1, so
        // g(x) = 0.5 x + 1 with fixed point 2
        let mut aa = Anderson::new(1, 3);
        aa.initialize(array![0.0].view(), array![-1.0].view(), 1.0);
        let y = aa.candidate(array![1.0].view(), array![-0.5].view(), 1.0);
        assert_abs_diff_eq!(y[0], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn rejected_candidate_rolls_back_to_the_map_value() {
        let mut aa = Anderson::new(1, 3);
        aa.initialize(array![0.0].view(), array![-1.0].view(), 1.0);
        aa.candidate(array![1.0].view(), array![-0.5].view(), 1.0);
        aa.finish_iteration(false);
        // the reference point is now g(x₁) = 1.5, so the next residual is
        // measured against it
        assert_abs_diff_eq!(aa.y[0], 1.5, epsilon = 1e-14);
    }
}
