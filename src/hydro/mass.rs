use super::Discretization;
use crate::linalg::sparse_matrix::{CsrMatrix, SparseMatrix};
use crate::parallel::Backend;
use nalgebra::DMatrix;
use rayon::iter::{IntoParallelIterator, ParallelExtend, ParallelIterator};
use std::sync::mpsc::channel;

/// Accumulates element contributions to the (symmetric) velocity mass matrix
pub struct MassAssembly {
    pub matrix: SparseMatrix,
}

impl MassAssembly {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            matrix: SparseMatrix::new(num_dofs),
        }
    }
}

impl ParallelExtend<SparseMatrix> for MassAssembly {
    fn par_extend<I>(&mut self, elem_matrices_iter: I)
    where
        I: IntoParallelIterator<Item = SparseMatrix>,
    {
        let (sender, receiver) = channel();

        elem_matrices_iter
            .into_par_iter()
            .for_each_with(sender, |s, elem_matrix| {
                s.send(elem_matrix).expect(
                    "Failed to send sub-matrix over MSPC channel; cannot construct Mass Matrix!",
                )
            });

        receiver
            .iter()
            .for_each(|mut elem_matrix| self.matrix.consume_matrix(&mut elem_matrix));
    }
}

/// Density weighted scalar mass matrix of the kinematic basis on zone `z`
fn zone_scalar_mass(disc: &Discretization, rho0_det_j0_w: &[f64], z: usize) -> DMatrix<f64> {
    let nd = disc.h1.element_dofs();
    let num_points = disc.rule.len();
    let mut mass = DMatrix::zeros(nd, nd);

    for q in 0..num_points {
        let m = rho0_det_j0_w[z * num_points + q];
        for i in 0..nd {
            for j in 0..nd {
                mass[(i, j)] += m * disc.h1_shapes.value(q, i) * disc.h1_shapes.value(q, j);
            }
        }
    }

    mass
}

/// Contribution of zone `z` to the true-DoF velocity mass matrix (`P^T M P`)
fn zone_velocity_mass(disc: &Discretization, rho0_det_j0_w: &[f64], z: usize) -> SparseMatrix {
    let nd = disc.h1.element_dofs();
    let p = disc.h1.dof_space().prolongation();
    let scalar = zone_scalar_mass(disc, rho0_det_j0_w, z);

    let mut entries = Vec::new();
    for c in 0..disc.dim() {
        for i in 0..nd {
            let gi = disc.h1.global_index(c, disc.h1.dof_map().global_dof(z, i));
            for j in 0..nd {
                let gj = disc.h1.global_index(c, disc.h1.dof_map().global_dof(z, j));
                for (t, p_t) in p.row_iter(gi) {
                    // the symmetric store keeps the upper triangle only
                    for (s, p_s) in p.row_iter(gj).filter(|(s, _)| t <= *s) {
                        entries.push(([t, s], p_t * scalar[(i, j)] * p_s));
                    }
                }
            }
        }
    }

    let mut local = SparseMatrix::new(disc.h1.true_size());
    local.insert_group(entries);
    local
}

/// Assemble the constant velocity mass matrix over the true DoFs of the kinematic space
pub fn velocity_mass_matrix(disc: &Discretization, rho0_det_j0_w: &[f64]) -> CsrMatrix {
    let mut assembly = MassAssembly::new(disc.h1.true_size());

    match disc.backend {
        Backend::Threaded => assembly.par_extend(
            (0..disc.num_zones())
                .into_par_iter()
                .map(|z| zone_velocity_mass(disc, rho0_det_j0_w, z)),
        ),
        Backend::Serial => (0..disc.num_zones()).for_each(|z| {
            assembly
                .matrix
                .consume_matrix(&mut zone_velocity_mass(disc, rho0_det_j0_w, z))
        }),
    }

    assembly.matrix.into()
}

/// Per-zone thermodynamic mass matrices `sum_q rho0 det(J0) w psi psi^T`
pub fn energy_mass_matrices(disc: &Discretization, rho0_det_j0_w: &[f64]) -> Vec<DMatrix<f64>> {
    let nd = disc.l2.element_dofs();
    let num_points = disc.rule.len();

    disc.backend.map_collect(disc.num_zones(), |z| {
        let mut mass = DMatrix::zeros(nd, nd);
        for q in 0..num_points {
            let m = rho0_det_j0_w[z * num_points + q];
            for k in 0..nd {
                for l in 0..nd {
                    mass[(k, l)] += m * disc.l2_shapes.value(q, k) * disc.l2_shapes.value(q, l);
                }
            }
        }
        mass
    })
}

/// Invert every zone mass matrix (via cholesky). Returns the first zone which cannot be factored on failure.
pub fn invert_energy_masses(masses: &[DMatrix<f64>]) -> Result<Vec<DMatrix<f64>>, usize> {
    masses
        .iter()
        .enumerate()
        .map(|(z, mass)| match mass.clone().cholesky() {
            Some(factor) => Ok(factor.inverse()),
            None => Err(z),
        })
        .collect()
}
