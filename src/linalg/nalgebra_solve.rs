use super::{check_dimensions, sparse_matrix::CsrMatrix, LinearSolver, SolveReport, SolverError};
use nalgebra::{linalg::Cholesky, DVector, Dynamic};

// TODO: use Nalgebra's Sparse crate to lift this limit
pub const MAX_DENSE_SIZE: usize = 2000;

/// Direct solver for small SPD systems
///
/// The matrix is cast as a dense nalgebra matrix and factored once with a Cholesky decomposition.
/// This uses a large amount of memory when the system is large, so it is limited to [MAX_DENSE_SIZE] unknowns.
/// For larger problems the [ConjugateGradient](super::cg::ConjugateGradient) solver is recommended.
pub struct DenseCholesky {
    factor: Cholesky<f64, Dynamic>,
}

impl DenseCholesky {
    pub fn new(matrix: &CsrMatrix) -> Result<Self, SolverError> {
        if matrix.rows() != matrix.cols() {
            return Err(SolverError::NotSquare(matrix.rows(), matrix.cols()));
        }
        if matrix.rows() > MAX_DENSE_SIZE {
            return Err(SolverError::ProblemTooLarge(MAX_DENSE_SIZE));
        }

        match matrix.to_dense().cholesky() {
            Some(factor) => Ok(Self { factor }),
            None => Err(SolverError::FailedToFactor),
        }
    }
}

impl LinearSolver for DenseCholesky {
    fn size(&self) -> usize {
        self.factor.l_dirty().nrows()
    }

    fn solve(&self, rhs: &[f64], x: &mut [f64]) -> Result<SolveReport, SolverError> {
        check_dimensions(self.size(), rhs, x)?;

        let solution = self.factor.solve(&DVector::from_column_slice(rhs));
        x.copy_from_slice(solution.as_slice());

        Ok(SolveReport {
            iterations: 1,
            residual: 0.0,
            converged: true,
        })
    }
}
