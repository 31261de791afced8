use super::{check_dimensions, sparse_matrix::CsrMatrix, LinearSolver, SolveReport, SolverError};

/// Conjugate Gradient solver for a symmetric positive definite [CsrMatrix]
pub struct ConjugateGradient {
    matrix: CsrMatrix,
    rel_tol: f64,
    abs_tol: f64,
    max_iter: usize,
}

impl ConjugateGradient {
    /// Iterations stop once `|r| <= max(rel_tol * |r_0|, abs_tol)` or after `max_iter` iterations
    pub fn new(
        matrix: CsrMatrix,
        rel_tol: f64,
        abs_tol: f64,
        max_iter: usize,
    ) -> Result<Self, SolverError> {
        if matrix.rows() != matrix.cols() {
            return Err(SolverError::NotSquare(matrix.rows(), matrix.cols()));
        }

        Ok(Self {
            matrix,
            rel_tol,
            abs_tol,
            max_iter,
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(a, b)| a * b).sum()
}

impl LinearSolver for ConjugateGradient {
    fn size(&self) -> usize {
        self.matrix.rows()
    }

    fn solve(&self, rhs: &[f64], x: &mut [f64]) -> Result<SolveReport, SolverError> {
        let n = self.size();
        check_dimensions(n, rhs, x)?;

        let mut ap = vec![0.0; n];
        self.matrix.mult(x, &mut ap);
        let mut r: Vec<f64> = rhs.iter().zip(ap.iter()).map(|(b, ax)| b - ax).collect();
        let mut p = r.clone();

        let mut nom = dot(&r, &r);
        let tolerance = (self.rel_tol * nom.sqrt()).max(self.abs_tol);

        if nom.sqrt() <= tolerance {
            return Ok(SolveReport {
                iterations: 0,
                residual: nom.sqrt(),
                converged: true,
            });
        }

        for iteration in 1..=self.max_iter {
            self.matrix.mult(&p, &mut ap);
            let den = dot(&p, &ap);
            if den <= 0.0 {
                return Err(SolverError::NotPositiveDefinite);
            }

            let alpha = nom / den;
            x.iter_mut()
                .zip(p.iter())
                .for_each(|(x_i, p_i)| *x_i += alpha * p_i);
            r.iter_mut()
                .zip(ap.iter())
                .for_each(|(r_i, ap_i)| *r_i -= alpha * ap_i);

            let betanom = dot(&r, &r);
            if betanom.sqrt() <= tolerance {
                return Ok(SolveReport {
                    iterations: iteration,
                    residual: betanom.sqrt(),
                    converged: true,
                });
            }

            let beta = betanom / nom;
            p.iter_mut()
                .zip(r.iter())
                .for_each(|(p_i, r_i)| *p_i = r_i + beta * *p_i);
            nom = betanom;
        }

        Ok(SolveReport {
            iterations: self.max_iter,
            residual: nom.sqrt(),
            converged: false,
        })
    }
}
