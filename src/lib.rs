//! The `ndarray-panoc` crate provides the inner solvers of a nonconvex
//! constrained optimization engine, minimizing a smooth cost over a simple
//! projectable set with general constraints handled through an outer
//! augmented-Lagrangian penalty.
//!
//! It includes:
//! - PANOC, a forward-backward method accelerated by an L-BFGS direction
//!   with a line search on the forward-backward envelope
//! - optional Anderson acceleration of the fixed-point iteration
//! - a plain projected gradient baseline sharing the same contracts
//!
//! The outer loop that updates multipliers and penalty weights is not part
//! of this crate: a solve takes the current multipliers `y` and weights `Σ`,
//! returns the new iterate together with the constraint violation `err_z`,
//! and reports its outcome in a [`Stats`](inner::Stats) record.
//!
//! ```
//! use ndarray::{array, Array1};
//! use ndarray_panoc::{NoConstraints, PanocParams, PanocSolver, Problem, SolverStatus};
//!
//! // minimize (x₁ − 1)² + (x₂ + 2)²
//! let problem = Problem::unconstrained(
//!     2,
//!     NoConstraints,
//!     |x| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2),
//!     |x, mut g| {
//!         g[0] = 2.0 * (x[0] - 1.0);
//!         g[1] = 2.0 * (x[1] + 2.0);
//!     },
//! );
//! let mut solver = PanocSolver::new(PanocParams::default());
//! let mut x = array![0.0, 0.0];
//! let mut y = Array1::zeros(0);
//! let mut err_z = Array1::zeros(0);
//! let stats = solver
//!     .solve(&problem, Array1::zeros(0).view(), 1e-9, false, &mut x, &mut y, &mut err_z)
//!     .unwrap();
//! assert_eq!(stats.status, SolverStatus::Converged);
//! ```

pub mod anderson;
pub mod augmented;
pub mod constraints;
pub mod direction;
pub mod inner;
pub mod problem;

pub use augmented::LipschitzParams;
pub use constraints::{Ball2, Constraint, NoConstraints, Rectangle};
pub use direction::{CbfgsParams, DirectionProvider, Lbfgs, LbfgsParams, NoDirection};
pub use inner::{
    PanocParams, PanocSolver, PgaParams, PgaSolver, SolverError, SolverStatus, Stats, StopSignal,
};
pub use problem::Problem;
