/// Unpreconditioned Conjugate Gradient over a [CsrMatrix](sparse_matrix::CsrMatrix)
pub mod cg;
/// Use Nalgebra's Cholesky decomposition to solve small SPD systems directly
pub mod nalgebra_solve;
/// Sparsely Packed Matrices
pub mod sparse_matrix;

use cg::ConjugateGradient;
use nalgebra_solve::DenseCholesky;
use sparse_matrix::CsrMatrix;
use thiserror::Error;

/// Default relative residual tolerance of the velocity mass solve
pub const DEFAULT_CG_REL_TOL: f64 = 1e-8;
/// Default iteration cap of the velocity mass solve
pub const DEFAULT_CG_MAX_ITER: usize = 200;

/// A solver for a fixed (already factored or captured) linear system `A x = b`
///
/// Implementors own whatever representation of `A` they need. The velocity mass matrix is
/// constant for the whole simulation, so solvers are built once and reused every evaluation.
pub trait LinearSolver: Send + Sync {
    /// Number of unknowns
    fn size(&self) -> usize;

    /// Solve `A x = rhs`. `x` is used as the initial guess by iterative solvers.
    fn solve(&self, rhs: &[f64], x: &mut [f64]) -> Result<SolveReport, SolverError>;
}

/// Outcome of one linear solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub iterations: usize,
    /// Final residual norm (zero for direct solvers)
    pub residual: f64,
    pub converged: bool,
}

/// Choice of velocity mass solver
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolverKind {
    ConjugateGradient {
        rel_tol: f64,
        abs_tol: f64,
        max_iter: usize,
    },
    DenseCholesky,
}

impl Default for SolverKind {
    fn default() -> Self {
        Self::ConjugateGradient {
            rel_tol: DEFAULT_CG_REL_TOL,
            abs_tol: 0.0,
            max_iter: DEFAULT_CG_MAX_ITER,
        }
    }
}

impl SolverKind {
    /// Build a solver of this kind for `matrix`
    pub fn build(&self, matrix: CsrMatrix) -> Result<Box<dyn LinearSolver>, SolverError> {
        match *self {
            Self::ConjugateGradient {
                rel_tol,
                abs_tol,
                max_iter,
            } => Ok(Box::new(ConjugateGradient::new(
                matrix, rel_tol, abs_tol, max_iter,
            )?)),
            Self::DenseCholesky => Ok(Box::new(DenseCholesky::new(&matrix)?)),
        }
    }
}

/// Error type for the linear solvers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolverError {
    #[error("Matrix is not square ({0}x{1}); cannot build linear solver!")]
    NotSquare(usize, usize),
    #[error("Vector has length {received} (expected {expected}); cannot solve linear system!")]
    DimensionMismatch { expected: usize, received: usize },
    #[error("Matrix is not positive definite; cannot continue Conjugate Gradient iterations!")]
    NotPositiveDefinite,
    #[error("Failed to factor matrix (via cholesky); likely not SPD or ill-conditioned!")]
    FailedToFactor,
    #[error("Matrix Exceeded Maximum Dense Size ({0}x{0}); cannot factor!")]
    ProblemTooLarge(usize),
}

fn check_dimensions(n: usize, rhs: &[f64], x: &[f64]) -> Result<(), SolverError> {
    for len in [rhs.len(), x.len()] {
        if len != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                received: len,
            });
        }
    }
    Ok(())
}
