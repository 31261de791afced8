use super::Discretization;
use nalgebra::{DMatrix, SymmetricEigen};

/// Physical data at every (zone, quadrature point) of one cache epoch
#[derive(Clone, Debug, PartialEq)]
pub struct QuadratureData {
    dim: usize,
    num_points: usize,
    /// `stress * J^-T * w * det(J)`, row-major `dim x dim` per point
    stress_jinv_t: Vec<f64>,
    density: Vec<f64>,
    det_j: Vec<f64>,
}

impl QuadratureData {
    fn zeros(dim: usize, num_zones: usize, num_points: usize) -> Self {
        let n = num_zones * num_points;
        Self {
            dim,
            num_points,
            stress_jinv_t: vec![0.0; n * dim * dim],
            density: vec![0.0; n],
            det_j: vec![0.0; n],
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn num_zones(&self) -> usize {
        self.density.len() / self.num_points
    }

    /// Weighted stress tensor at a point as a `dim x dim` matrix
    pub fn stress_jinv_t(&self, z: usize, q: usize) -> DMatrix<f64> {
        let dd = self.dim * self.dim;
        let start = (z * self.num_points + q) * dd;
        DMatrix::from_row_slice(self.dim, self.dim, &self.stress_jinv_t[start..start + dd])
    }

    pub fn density(&self, z: usize, q: usize) -> f64 {
        self.density[z * self.num_points + q]
    }

    pub fn det_j(&self, z: usize, q: usize) -> f64 {
        self.det_j[z * self.num_points + q]
    }
}

/// Parameters of the ideal gas closure and the time step control
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GasModel {
    pub gamma: f64,
    pub cfl: f64,
    pub use_viscosity: bool,
}

/// Quantities fixed at construction from the initial mesh
#[derive(Clone, Debug)]
pub struct InitialGeometry {
    /// `rho_0 * det(J_0) * w` (the mass associated with each point)
    pub rho0_det_j0_w: Vec<f64>,
    pub jac0_inv: Vec<DMatrix<f64>>,
    /// Initial characteristic zone length
    pub h0: f64,
}

/// Lazily recomputed [QuadratureData] with a CFL time step estimate
///
/// The data is recomputed at most once between two invalidations. A recomputation fills fresh
/// buffers and only replaces the previous epoch once every zone has been processed.
pub struct QuadratureCache {
    data: Option<QuadratureData>,
    is_current: bool,
    dt_estimate: f64,
    updates: usize,
    initial: InitialGeometry,
    model: GasModel,
}

struct ZoneUpdate {
    stress_jinv_t: Vec<f64>,
    density: Vec<f64>,
    det_j: Vec<f64>,
    dt: f64,
    inverted: bool,
}

impl QuadratureCache {
    pub fn new(initial: InitialGeometry, model: GasModel) -> Self {
        Self {
            data: None,
            is_current: false,
            dt_estimate: f64::INFINITY,
            updates: 0,
            initial,
            model,
        }
    }

    pub fn is_current(&self) -> bool {
        self.is_current
    }

    /// Force a recomputation on the next update
    pub fn invalidate(&mut self) {
        self.is_current = false;
    }

    /// Data of the last completed epoch
    pub fn data(&self) -> Option<&QuadratureData> {
        self.data.as_ref()
    }

    pub fn dt_estimate(&self) -> f64 {
        self.dt_estimate
    }

    pub fn reset_dt_estimate(&mut self) {
        self.dt_estimate = f64::INFINITY;
    }

    /// Number of completed epochs
    pub fn updates(&self) -> usize {
        self.updates
    }

    pub fn initial(&self) -> &InitialGeometry {
        &self.initial
    }

    /// Recompute every zone if the cache is stale. Returns `true` if a new epoch was computed.
    ///
    /// `x`, `v` and `e` are element-local vectors of the position, velocity and energy fields.
    pub fn update(&mut self, disc: &Discretization, x: &[f64], v: &[f64], e: &[f64]) -> bool {
        if self.is_current {
            return false;
        }

        let num_zones = disc.num_zones();
        let num_points = disc.rule.len();
        let dd = disc.dim() * disc.dim();

        let cache = &*self;
        let zones: Vec<ZoneUpdate> = disc
            .backend
            .map_collect(num_zones, |z| cache.update_zone(disc, z, x, v, e));

        let mut data = QuadratureData::zeros(disc.dim(), num_zones, num_points);
        let mut dt_estimate = self.dt_estimate;
        for (z, zone) in zones.iter().enumerate() {
            let start = z * num_points;
            data.stress_jinv_t[start * dd..(start + num_points) * dd]
                .copy_from_slice(&zone.stress_jinv_t);
            data.density[start..start + num_points].copy_from_slice(&zone.density);
            data.det_j[start..start + num_points].copy_from_slice(&zone.det_j);
            dt_estimate = dt_estimate.min(zone.dt);

            if zone.inverted {
                log::warn!("Zone {} is inverted or degenerate; time step estimate forced to zero", z);
            }
        }

        self.data = Some(data);
        self.dt_estimate = dt_estimate;
        self.is_current = true;
        self.updates += 1;

        log::debug!(
            "Quadrature data epoch {} computed over {} zones (dt estimate = {:e})",
            self.updates,
            num_zones,
            dt_estimate
        );

        true
    }

    fn update_zone(&self, disc: &Discretization, z: usize, x: &[f64], v: &[f64], e: &[f64]) -> ZoneUpdate {
        let dim = disc.dim();
        let num_points = disc.rule.len();
        let order = disc.h1_order as f64;
        let GasModel {
            gamma,
            cfl,
            use_viscosity,
        } = self.model;

        let positions = disc.zone_h1_values(x, z);
        let velocities = disc.zone_h1_values(v, z);

        let mut update = ZoneUpdate {
            stress_jinv_t: vec![0.0; num_points * dim * dim],
            density: vec![0.0; num_points],
            det_j: vec![0.0; num_points],
            dt: f64::INFINITY,
            inverted: false,
        };

        for q in 0..num_points {
            let zq = z * num_points + q;
            let w = disc.rule.weight(q);

            let jac = disc.reference_gradient(&positions, q);
            let det_j = jac.determinant();
            update.det_j[q] = det_j;

            let jinv = match jac.clone().try_inverse() {
                Some(jinv) if det_j > 0.0 && det_j.is_finite() => jinv,
                _ => {
                    update.inverted = true;
                    update.dt = 0.0;
                    continue;
                }
            };

            let rho = self.initial.rho0_det_j0_w[zq] / (det_j * w);
            let energy = disc.l2_value(e, z, q).max(0.0);
            let pressure = (gamma - 1.0) * rho * energy;
            let sound_speed = (gamma * (gamma - 1.0) * energy).sqrt();
            update.density[q] = rho;

            let mut stress = DMatrix::<f64>::identity(dim, dim) * -pressure;

            let h_min = jac.singular_values().min() / order;

            let mut visc_coeff = 0.0;
            if use_viscosity {
                // symmetric part of the physical velocity gradient
                let grad_v = disc.reference_gradient(&velocities, q) * &jinv;
                let sgrad_v = (&grad_v + grad_v.transpose()) * 0.5;

                let eigen = SymmetricEigen::new(sgrad_v.clone());
                let (min_idx, mu) = eigen
                    .eigenvalues
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f64::INFINITY), |min, (i, val)| if val < min.1 { (i, val) } else { min });
                let compr_dir = eigen.eigenvectors.column(min_idx).into_owned();

                // length scale along the direction of maximal compression
                let ph_dir = &jac * &self.initial.jac0_inv[zq] * &compr_dir;
                let h = self.initial.h0 * ph_dir.norm() / compr_dir.norm();

                visc_coeff = 2.0 * rho * h * h * mu.abs();
                if mu < 0.0 {
                    visc_coeff += 0.5 * rho * h * sound_speed;
                }
                stress += &sgrad_v * visc_coeff;
            }

            let inv_dt = sound_speed / h_min + 2.5 * visc_coeff / rho / h_min / h_min;
            if h_min <= 0.0 || !inv_dt.is_finite() {
                update.inverted = true;
                update.dt = 0.0;
            } else if inv_dt > 0.0 {
                update.dt = update.dt.min(cfl / inv_dt);
            }

            let weighted = stress * jinv.transpose() * (w * det_j);
            for c in 0..dim {
                for d in 0..dim {
                    update.stress_jinv_t[(q * dim + c) * dim + d] = weighted[(c, d)];
                }
            }
        }

        update
    }
}
