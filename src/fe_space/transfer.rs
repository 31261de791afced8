use super::dof_map::{direct_copies, DirectCopy};
use crate::linalg::sparse_matrix::CsrMatrix;

/// The partition-aware view of a global DoF space
///
/// Maps the unique "true" DoFs owned by this partition to the global DoFs seen by its elements.
/// Sizes refer to flat vectors (all vector components included).
///
/// The default communication methods are no-ops, which is correct for a single partition.
pub trait ParallelDofSpace: Send + Sync {
    /// Length of a true-DoF vector
    fn true_size(&self) -> usize;

    /// Length of a global-DoF vector
    fn global_size(&self) -> usize;

    /// `true_size` x `global_size` matrix selecting the primal copy of every true DoF
    fn restriction(&self) -> &CsrMatrix;

    /// `global_size` x `true_size` matrix expanding true DoFs into global DoFs
    fn prolongation(&self) -> &CsrMatrix;

    /// True DoFs with an essential (Dirichlet) boundary condition
    fn essential_true_dofs(&self) -> &[usize];

    /// Make shared global DoFs consistent across partitions after a prolongation
    fn broadcast(&self, _global: &mut [f64]) {}

    /// Accumulate contributions to shared global DoFs from other partitions before a transposed prolongation
    fn reduce(&self, _global: &mut [f64]) {}

    /// Minimum of `value` over all partitions
    fn min_all(&self, value: f64) -> f64 {
        value
    }
}

/// A single-partition [ParallelDofSpace]
#[derive(Clone, Debug)]
pub struct SerialDofSpace {
    restriction: CsrMatrix,
    prolongation: CsrMatrix,
    essential: Vec<usize>,
}

impl SerialDofSpace {
    /// Every global DoF is a true DoF
    pub fn identity(size: usize, mut essential: Vec<usize>) -> Self {
        essential.sort_unstable();
        essential.dedup();
        Self {
            restriction: CsrMatrix::identity(size),
            prolongation: CsrMatrix::identity(size),
            essential,
        }
    }

    /// Constrained spaces (periodic or hanging DoFs) described by explicit operators
    pub fn with_matrices(
        prolongation: CsrMatrix,
        restriction: CsrMatrix,
        mut essential: Vec<usize>,
    ) -> Self {
        assert_eq!(
            (prolongation.rows(), prolongation.cols()),
            (restriction.cols(), restriction.rows()),
            "Prolongation and Restriction have incompatible shapes; cannot build DoF space!"
        );
        essential.sort_unstable();
        essential.dedup();
        Self {
            restriction,
            prolongation,
            essential,
        }
    }
}

impl ParallelDofSpace for SerialDofSpace {
    fn true_size(&self) -> usize {
        self.restriction.rows()
    }

    fn global_size(&self) -> usize {
        self.restriction.cols()
    }

    fn restriction(&self) -> &CsrMatrix {
        &self.restriction
    }

    fn prolongation(&self) -> &CsrMatrix {
        &self.prolongation
    }

    fn essential_true_dofs(&self) -> &[usize] {
        &self.essential
    }
}

/// Global -> true extraction
///
/// Rows of the restriction with exactly one nonzero are treated as direct copies;
/// the remaining rows are applied as general sparse rows.
#[derive(Clone, Debug)]
pub struct RestrictionOperator {
    copies: Vec<DirectCopy>,
    general_rows: Vec<usize>,
    matrix: CsrMatrix,
}

impl RestrictionOperator {
    pub fn new(matrix: CsrMatrix) -> Self {
        let (copies, general_rows) = direct_copies(&matrix);
        Self {
            copies,
            general_rows,
            matrix,
        }
    }

    pub fn direct_copies(&self) -> &[DirectCopy] {
        &self.copies
    }

    pub fn num_general_rows(&self) -> usize {
        self.general_rows.len()
    }

    pub fn mult(&self, global: &[f64], true_dofs: &mut [f64]) {
        assert_eq!(global.len(), self.matrix.cols(), "Global vector has the wrong size; cannot restrict!");
        assert_eq!(true_dofs.len(), self.matrix.rows(), "True vector has the wrong size; cannot restrict!");

        for copy in self.copies.iter() {
            true_dofs[copy.true_dof] = global[copy.global_dof];
        }
        for &row in self.general_rows.iter() {
            true_dofs[row] = self.matrix.row_iter(row).map(|(c, v)| v * global[c]).sum();
        }
    }
}

/// True -> global expansion
///
/// Global DoFs which are plain copies of a direct-copy true DoF are assigned directly,
/// the remaining rows of the prolongation are applied as general sparse rows.
#[derive(Clone, Debug)]
pub struct ProlongationOperator {
    copies: Vec<DirectCopy>,
    general_rows: Vec<usize>,
    matrix: CsrMatrix,
}

impl ProlongationOperator {
    pub fn new(matrix: CsrMatrix, copies: &[DirectCopy]) -> Self {
        let mut covered = vec![false; matrix.rows()];
        let copies: Vec<DirectCopy> = copies
            .iter()
            .filter(|copy| {
                let (cols, vals) = matrix.row(copy.global_dof);
                cols.len() == 1 && cols[0] == copy.true_dof && vals[0] == 1.0
            })
            .copied()
            .collect();
        for copy in copies.iter() {
            covered[copy.global_dof] = true;
        }
        let general_rows = (0..matrix.rows()).filter(|r| !covered[*r]).collect();

        Self {
            copies,
            general_rows,
            matrix,
        }
    }

    pub fn num_general_rows(&self) -> usize {
        self.general_rows.len()
    }

    /// `global = P true_dofs` (without any communication)
    pub fn mult(&self, true_dofs: &[f64], global: &mut [f64]) {
        assert_eq!(true_dofs.len(), self.matrix.cols(), "True vector has the wrong size; cannot prolong!");
        assert_eq!(global.len(), self.matrix.rows(), "Global vector has the wrong size; cannot prolong!");

        for copy in self.copies.iter() {
            global[copy.global_dof] = true_dofs[copy.true_dof];
        }
        for &row in self.general_rows.iter() {
            global[row] = self.matrix.row_iter(row).map(|(c, v)| v * true_dofs[c]).sum();
        }
    }

    /// `true_dofs = P^T global` (without any communication)
    pub fn mult_transpose(&self, global: &[f64], true_dofs: &mut [f64]) {
        assert_eq!(global.len(), self.matrix.rows(), "Global vector has the wrong size; cannot apply transposed prolongation!");
        assert_eq!(true_dofs.len(), self.matrix.cols(), "True vector has the wrong size; cannot apply transposed prolongation!");

        true_dofs.iter_mut().for_each(|t| *t = 0.0);
        for copy in self.copies.iter() {
            true_dofs[copy.true_dof] += global[copy.global_dof];
        }
        for &row in self.general_rows.iter() {
            for (c, v) in self.matrix.row_iter(row) {
                true_dofs[c] += v * global[row];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // three global DoFs on a periodic line where the last is a copy of the first
    fn periodic_line() -> SerialDofSpace {
        SerialDofSpace::with_matrices(
            CsrMatrix::from_triplets(3, 2, vec![([0, 0], 1.0), ([1, 1], 1.0), ([2, 0], 1.0)]),
            CsrMatrix::from_triplets(2, 3, vec![([0, 0], 1.0), ([1, 1], 1.0)]),
            vec![],
        )
    }

    #[test]
    fn identity_space() {
        let space = SerialDofSpace::identity(4, vec![3, 0, 3]);
        assert_eq!(space.true_size(), 4);
        assert_eq!(space.global_size(), 4);
        assert_eq!(space.essential_true_dofs(), &[0, 3]);
        assert_eq!(space.min_all(2.5), 2.5);

        let r = RestrictionOperator::new(space.restriction().clone());
        assert_eq!(r.direct_copies().len(), 4);
        assert_eq!(r.num_general_rows(), 0);
    }

    #[test]
    fn periodic_prolongation() {
        let space = periodic_line();
        let r = RestrictionOperator::new(space.restriction().clone());
        let p = ProlongationOperator::new(space.prolongation().clone(), r.direct_copies());
        assert_eq!(p.num_general_rows(), 1);

        let mut global = vec![0.0; 3];
        p.mult(&[4.0, 7.0], &mut global);
        assert_eq!(global, vec![4.0, 7.0, 4.0]);

        let mut t = vec![0.0; 2];
        r.mult(&global, &mut t);
        assert_eq!(t, vec![4.0, 7.0]);

        p.mult_transpose(&[1.0, 2.0, 3.0], &mut t);
        assert_eq!(t, vec![4.0, 2.0]);
    }

    #[test]
    fn weighted_restriction_rows() {
        let r = RestrictionOperator::new(CsrMatrix::from_triplets(
            1,
            2,
            vec![([0, 0], 0.5), ([0, 1], 0.5)],
        ));
        let mut t = vec![0.0; 1];
        r.mult(&[2.0, 4.0], &mut t);
        assert_eq!(t, vec![3.0]);
    }
}
