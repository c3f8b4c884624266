//! Inner solvers and their shared vocabulary
//!
//! Both drivers consume the same problem description and report through the
//! same [`Stats`] record, so an embedding outer loop can swap one for the
//! other.

mod panoc;
mod pga;
pub use panoc::*;
pub use pga::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reason a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverStatus {
    /// No result yet.
    #[default]
    Unknown,
    /// Residual tolerance reached.
    Converged,
    /// Iteration budget exhausted.
    MaxIter,
    /// Wall-clock budget exhausted.
    MaxTime,
    /// A non-finite quantity was encountered.
    NotFinite,
    /// The iterate stopped moving entirely.
    NoProgress,
    /// Stopped cooperatively from another thread.
    Interrupted,
}

/// Outcome record of a single solve.
#[derive(Debug, Clone)]
pub struct Stats {
    pub status: SolverStatus,
    /// Completed iterations.
    pub iterations: usize,
    /// Final value of the stopping residual.
    pub epsilon: f64,
    pub elapsed: Duration,
    /// Line searches that fell back to the projected gradient step.
    pub linesearch_failures: usize,
    /// Non-finite quasi-Newton directions (each resets the memory).
    pub lbfgs_failures: usize,
    /// Curvature pairs refused by the direction provider.
    pub lbfgs_rejected: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            status: SolverStatus::Unknown,
            iterations: 0,
            epsilon: f64::INFINITY,
            elapsed: Duration::ZERO,
            linesearch_failures: 0,
            lbfgs_failures: 0,
            lbfgs_rejected: 0,
        }
    }
}

/// Cooperative stop flag, cloneable across threads.
///
/// `stop` is the only operation that may be called from another thread while
/// a solve is running; the flag is polled once per iteration and cleared
/// when a new solve starts.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Precondition violations detected before the first iteration.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("dimension mismatch: `{what}` must have {expected} entries, got {got}")]
    DimensionMismatch { what: &'static str, expected: usize, got: usize },
    #[error("penalty weights must be strictly positive")]
    NonPositivePenalty,
    #[error("tolerance must be strictly positive")]
    NonPositiveTolerance,
    #[error("L-BFGS memory must be at least 1")]
    ZeroLbfgsMemory,
}

pub(crate) fn check_dims(
    what: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), SolverError> {
    if expected != got {
        return Err(SolverError::DimensionMismatch { what, expected, got });
    }
    Ok(())
}
