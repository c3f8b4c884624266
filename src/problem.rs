//! User problem description
//!
//! A problem bundles the smooth cost `f`, the general constraint function
//! `g`, their derivative callables, and the two projectable sets: `c` for the
//! decision variable and `d` for the image of `g`. The callables receive
//! read-only views and write into caller-owned output views, so the solvers
//! can reuse their scratch buffers across iterations.

use crate::constraints::{Constraint, NoConstraints};
use ndarray::prelude::*;

type CostFn<'a> = Box<dyn Fn(ArrayView1<f64>) -> f64 + 'a>;
type GradFn<'a> = Box<dyn Fn(ArrayView1<f64>, ArrayViewMut1<f64>) + 'a>;
type ConstraintFn<'a> = Box<dyn Fn(ArrayView1<f64>, ArrayViewMut1<f64>) + 'a>;
type JacProdFn<'a> = Box<dyn Fn(ArrayView1<f64>, ArrayView1<f64>, ArrayViewMut1<f64>) + 'a>;

/// Problem description evaluated (but never mutated) by the inner solvers.
pub struct Problem<'a, C, D> {
    /// Dimension of the decision variable.
    pub n: usize,
    /// Number of general constraints.
    pub m: usize,
    /// Set the decision variable is projected onto.
    pub c: C,
    /// Set the constraint values are projected onto.
    pub d: D,
    f: CostFn<'a>,
    grad_f: GradFn<'a>,
    g: ConstraintFn<'a>,
    grad_g_prod: JacProdFn<'a>,
}

impl<'a, C: Constraint, D: Constraint> Problem<'a, C, D> {
    /// A problem with `m` general constraints `g(x) ∈ d` on top of `x ∈ c`.
    ///
    /// `grad_g_prod(x, v, out)` must write the Jacobian-transpose product
    /// `∇g(x)ᵀ v` into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n: usize,
        m: usize,
        c: C,
        d: D,
        f: impl Fn(ArrayView1<f64>) -> f64 + 'a,
        grad_f: impl Fn(ArrayView1<f64>, ArrayViewMut1<f64>) + 'a,
        g: impl Fn(ArrayView1<f64>, ArrayViewMut1<f64>) + 'a,
        grad_g_prod: impl Fn(ArrayView1<f64>, ArrayView1<f64>, ArrayViewMut1<f64>) + 'a,
    ) -> Self {
        Problem {
            n,
            m,
            c,
            d,
            f: Box::new(f),
            grad_f: Box::new(grad_f),
            g: Box::new(g),
            grad_g_prod: Box::new(grad_g_prod),
        }
    }

    /// Cost function value.
    #[inline]
    pub fn eval_f(&self, x: ArrayView1<f64>) -> f64 {
        (self.f)(x)
    }

    /// Cost gradient, written into `out`.
    #[inline]
    pub fn eval_grad_f(&self, x: ArrayView1<f64>, out: ArrayViewMut1<f64>) {
        (self.grad_f)(x, out);
    }

    /// Constraint values `g(x)`, written into `out` (length `m`).
    #[inline]
    pub fn eval_g(&self, x: ArrayView1<f64>, out: ArrayViewMut1<f64>) {
        (self.g)(x, out);
    }

    /// Jacobian-transpose product `∇g(x)ᵀ v`, written into `out` (length `n`).
    #[inline]
    pub fn eval_grad_g_prod(&self, x: ArrayView1<f64>, v: ArrayView1<f64>, out: ArrayViewMut1<f64>) {
        (self.grad_g_prod)(x, v, out);
    }
}

impl<'a, C: Constraint> Problem<'a, C, NoConstraints> {
    /// A problem without general constraints (`m = 0`); the set `c` still
    /// applies to the decision variable.
    pub fn unconstrained(
        n: usize,
        c: C,
        f: impl Fn(ArrayView1<f64>) -> f64 + 'a,
        grad_f: impl Fn(ArrayView1<f64>, ArrayViewMut1<f64>) + 'a,
    ) -> Self {
        Problem::new(n, 0, c, NoConstraints, f, grad_f, |_, _| (), |_, _, _| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::NoConstraints;

    #[test]
    fn evaluates_through_the_boxed_callables() {
        let problem = Problem::new(
            2,
            1,
            NoConstraints,
            NoConstraints,
            |x| x[0] * x[0] + x[1],
            |x, mut out| {
                out[0] = 2.0 * x[0];
                out[1] = 1.0;
            },
            |x, mut out| out[0] = x[0] + x[1],
            |_x, v, mut out| {
                out[0] = v[0];
                out[1] = v[0];
            },
        );
        let x = array![3.0, -1.0];
        assert_eq!(problem.eval_f(x.view()), 8.0);

        let mut grad = Array1::zeros(2);
        problem.eval_grad_f(x.view(), grad.view_mut());
        assert_eq!(grad, array![6.0, 1.0]);

        let mut gx = Array1::zeros(1);
        problem.eval_g(x.view(), gx.view_mut());
        assert_eq!(gx, array![2.0]);

        let v = array![0.5];
        let mut jtv = Array1::zeros(2);
        problem.eval_grad_g_prod(x.view(), v.view(), jtv.view_mut());
        assert_eq!(jtv, array![0.5, 0.5]);
    }
}
