use super::{quadrature_data::QuadratureData, Discretization};
use crate::linalg::sparse_matrix::CsrMatrix;
use nalgebra::DMatrix;

/// The rectangular force operator coupling the kinematic (H1) and thermodynamic (L2) spaces
///
/// `F[(c, i), k] = sum_q psi_k(q) sum_d (stress J^-T w det J)[c, d] dphi_i/dxi_d(q)`
///
/// Both actions map between true-DoF vectors.
pub trait ForceOperator: Send + Sync {
    /// Called once per quadrature data epoch
    fn update(&mut self, disc: &Discretization, data: &QuadratureData);

    /// `h1 = F l2`
    fn mult(&self, disc: &Discretization, data: &QuadratureData, l2: &[f64], h1: &mut [f64]);

    /// `l2 = F^T h1`
    fn mult_transpose(&self, disc: &Discretization, data: &QuadratureData, h1: &[f64], l2: &mut [f64]);
}

// (num_dofs_h1 x dim) matrix B_q with B_q[i, c] = sum_d S[c, d] dphi_i/dxi_d(q)
fn weighted_gradients(disc: &Discretization, data: &QuadratureData, z: usize, q: usize) -> DMatrix<f64> {
    disc.h1_shapes.grad(q) * data.stress_jinv_t(z, q).transpose()
}

/// Matrix-free force: element kernels evaluated from the quadrature data on every application
#[derive(Clone, Copy, Debug, Default)]
pub struct PartialForce;

impl ForceOperator for PartialForce {
    fn update(&mut self, _disc: &Discretization, _data: &QuadratureData) {}

    fn mult(&self, disc: &Discretization, data: &QuadratureData, l2: &[f64], h1: &mut [f64]) {
        let mut l2_local = vec![0.0; disc.l2.local_size()];
        disc.l2.true_to_local(l2, &mut l2_local);

        let dim = disc.dim();
        let nd = disc.h1.element_dofs();
        let zone_forces: Vec<DMatrix<f64>> = disc.backend.map_collect(disc.num_zones(), |z| {
            let mut force = DMatrix::zeros(nd, dim);
            for q in 0..disc.rule.len() {
                let e_q = disc.l2_value(&l2_local, z, q);
                force += weighted_gradients(disc, data, z, q) * e_q;
            }
            force
        });

        let mut h1_local = vec![0.0; disc.h1.local_size()];
        for (z, force) in zone_forces.iter().enumerate() {
            for c in 0..dim {
                for i in 0..nd {
                    h1_local[disc.h1.local_index(c, z, i)] = force[(i, c)];
                }
            }
        }
        disc.h1.local_to_true(&h1_local, h1);
    }

    fn mult_transpose(&self, disc: &Discretization, data: &QuadratureData, h1: &[f64], l2: &mut [f64]) {
        let mut h1_local = vec![0.0; disc.h1.local_size()];
        disc.h1.true_to_local(h1, &mut h1_local);

        let nd_l2 = disc.l2.element_dofs();
        let zone_rhs: Vec<Vec<f64>> = disc.backend.map_collect(disc.num_zones(), |z| {
            let values = disc.zone_h1_values(&h1_local, z);
            let mut rhs = vec![0.0; nd_l2];
            for q in 0..disc.rule.len() {
                // sum_{c, i} v[c, i] B_q[i, c]
                let b = weighted_gradients(disc, data, z, q);
                let work = (&values * &b).trace();
                for (k, rhs_k) in rhs.iter_mut().enumerate() {
                    *rhs_k += disc.l2_shapes.value(q, k) * work;
                }
            }
            rhs
        });

        let mut l2_local = vec![0.0; disc.l2.local_size()];
        for (z, rhs) in zone_rhs.iter().enumerate() {
            for (k, value) in rhs.iter().enumerate() {
                l2_local[disc.l2.local_index(0, z, k)] = *value;
            }
        }
        disc.l2.local_to_true(&l2_local, l2);
    }
}

/// Force assembled into a sparse true-DoF matrix once per epoch
#[derive(Clone, Debug, Default)]
pub struct AssembledForce {
    matrix: Option<CsrMatrix>,
}

impl AssembledForce {
    pub fn matrix(&self) -> Option<&CsrMatrix> {
        self.matrix.as_ref()
    }

    fn assemble(disc: &Discretization, data: &QuadratureData) -> CsrMatrix {
        let dim = disc.dim();
        let nd = disc.h1.element_dofs();
        let nd_l2 = disc.l2.element_dofs();
        let p_h1 = disc.h1.dof_space().prolongation();
        let p_l2 = disc.l2.dof_space().prolongation();

        let zone_entries: Vec<Vec<([usize; 2], f64)>> =
            disc.backend.map_collect(disc.num_zones(), |z| {
                // (dim * nd) x nd_l2 element matrix, rows ordered (c, i)
                let mut element = DMatrix::<f64>::zeros(dim * nd, nd_l2);
                for q in 0..disc.rule.len() {
                    let b = weighted_gradients(disc, data, z, q);
                    for k in 0..nd_l2 {
                        let psi = disc.l2_shapes.value(q, k);
                        for c in 0..dim {
                            for i in 0..nd {
                                element[(c * nd + i, k)] += psi * b[(i, c)];
                            }
                        }
                    }
                }

                let mut entries = Vec::new();
                for c in 0..dim {
                    for i in 0..nd {
                        let gi = disc.h1.global_index(c, disc.h1.dof_map().global_dof(z, i));
                        for k in 0..nd_l2 {
                            let gk = disc.l2.global_index(0, disc.l2.dof_map().global_dof(z, k));
                            let value = element[(c * nd + i, k)];
                            for (t, p) in p_h1.row_iter(gi) {
                                for (s, r) in p_l2.row_iter(gk) {
                                    entries.push(([t, s], p * value * r));
                                }
                            }
                        }
                    }
                }
                entries
            });

        CsrMatrix::from_triplets(
            disc.h1.true_size(),
            disc.l2.true_size(),
            zone_entries.into_iter().flatten().collect(),
        )
    }
}

impl ForceOperator for AssembledForce {
    fn update(&mut self, disc: &Discretization, data: &QuadratureData) {
        let matrix = Self::assemble(disc, data);
        log::debug!("Assembled force matrix with {} entries", matrix.nnz());
        self.matrix = Some(matrix);
    }

    fn mult(&self, disc: &Discretization, data: &QuadratureData, l2: &[f64], h1: &mut [f64]) {
        match self.matrix.as_ref() {
            Some(matrix) => matrix.mult(l2, h1),
            None => PartialForce.mult(disc, data, l2, h1),
        }
    }

    fn mult_transpose(&self, disc: &Discretization, data: &QuadratureData, h1: &[f64], l2: &mut [f64]) {
        match self.matrix.as_ref() {
            Some(matrix) => matrix.mult_transpose(h1, l2),
            None => PartialForce.mult_transpose(disc, data, h1, l2),
        }
    }
}
