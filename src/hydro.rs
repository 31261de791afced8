/// The rectangular force operator in matrix-free and assembled forms
pub mod force;
/// Velocity and energy mass matrices
pub mod mass;
/// Cached physical data at the quadrature points
pub mod quadrature_data;
/// Manufactured energy sources
pub mod source;

use force::{AssembledForce, ForceOperator, PartialForce};
use quadrature_data::{GasModel, InitialGeometry, QuadratureCache, QuadratureData};

use crate::basis::{ElementBasis, ShapeTable};
use crate::fe_space::{DofMapError, FiniteElementSpace};
use crate::integration::QuadratureRule;
use crate::linalg::{sparse_matrix::CsrMatrix, LinearSolver, SolverError, SolverKind};
use crate::parallel::Backend;

use nalgebra::DMatrix;
use std::ops::Range;
use thiserror::Error;

/// Default CFL safety factor
pub const DEFAULT_CFL: f64 = 0.5;
/// Default adiabatic index (diatomic ideal gas)
pub const DEFAULT_GAMMA: f64 = 1.4;

/// How the force operator is applied
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForceAssembly {
    /// Element kernels evaluated on every application
    #[default]
    Partial,
    /// A sparse matrix assembled once per quadrature data epoch
    Full,
}

/// Volumetric energy source added to the energy equation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnergySource {
    #[default]
    None,
    /// The steady-state heating of the 2D Taylor-Green vortex (scaled by the configured `gamma`)
    TaylorGreen,
}

/// Settings of a [LagrangianHydroOperator]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HydroConfig {
    pub cfl: f64,
    pub gamma: f64,
    pub use_viscosity: bool,
    pub assembly: ForceAssembly,
    pub source: EnergySource,
    /// Gauss-Legendre points per direction (defaults to twice the kinematic order)
    pub quadrature_points: Option<usize>,
    pub mass_solver: SolverKind,
    /// Backend of the element kernels
    pub backend: Backend,
}

impl Default for HydroConfig {
    fn default() -> Self {
        Self {
            cfl: DEFAULT_CFL,
            gamma: DEFAULT_GAMMA,
            use_viscosity: true,
            assembly: ForceAssembly::default(),
            source: EnergySource::default(),
            quadrature_points: None,
            mass_solver: SolverKind::default(),
            backend: Backend::default(),
        }
    }
}

impl HydroConfig {
    pub fn with_cfl(mut self, cfl: f64) -> Self {
        self.cfl = cfl;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_viscosity(mut self, use_viscosity: bool) -> Self {
        self.use_viscosity = use_viscosity;
        self
    }

    pub fn with_assembly(mut self, assembly: ForceAssembly) -> Self {
        self.assembly = assembly;
        self
    }

    pub fn with_source(mut self, source: EnergySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_quadrature_points(mut self, n: usize) -> Self {
        self.quadrature_points = Some(n);
        self
    }

    pub fn with_mass_solver(mut self, mass_solver: SolverKind) -> Self {
        self.mass_solver = mass_solver;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<(), HydroError> {
        if !(self.cfl > 0.0 && self.cfl.is_finite()) {
            return Err(HydroError::InvalidConfig(format!("cfl must be positive (got {})", self.cfl)));
        }
        if !(self.gamma > 1.0 && self.gamma.is_finite()) {
            return Err(HydroError::InvalidConfig(format!(
                "gamma must exceed 1 (got {})",
                self.gamma
            )));
        }
        if self.quadrature_points == Some(0) {
            return Err(HydroError::InvalidConfig(
                "at least one quadrature point is required".into(),
            ));
        }
        if let SolverKind::ConjugateGradient { rel_tol, abs_tol, max_iter } = self.mass_solver {
            if rel_tol < 0.0 || abs_tol < 0.0 || max_iter == 0 {
                return Err(HydroError::InvalidConfig(
                    "conjugate gradient tolerances must be non-negative with a positive iteration cap"
                        .into(),
                ));
            }
        }
        Ok(())
    }
}

/// An operator `F` defining the ODE system `dy/dt = F(y)`
pub trait TimeDependentOperator {
    /// Length of the state vector
    fn size(&self) -> usize;

    /// Evaluate the time derivative of `state` into `d_state`
    fn mult(&mut self, state: &[f64], d_state: &mut [f64]) -> Result<(), HydroError>;
}

/// Block layout `[x | v | e]` of the hydrodynamic state vector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateLayout {
    h1_size: usize,
    l2_size: usize,
}

impl StateLayout {
    pub fn new(h1_size: usize, l2_size: usize) -> Self {
        Self { h1_size, l2_size }
    }

    pub fn size(&self) -> usize {
        2 * self.h1_size + self.l2_size
    }

    pub fn position(&self) -> Range<usize> {
        0..self.h1_size
    }

    pub fn velocity(&self) -> Range<usize> {
        self.h1_size..2 * self.h1_size
    }

    pub fn energy(&self) -> Range<usize> {
        2 * self.h1_size..self.size()
    }

    /// Split a state vector into its position, velocity and energy blocks
    pub fn split<'a>(&self, state: &'a [f64]) -> (&'a [f64], &'a [f64], &'a [f64]) {
        let (x, rest) = state.split_at(self.h1_size);
        let (v, e) = rest.split_at(self.h1_size);
        (x, v, e)
    }

    pub fn split_mut<'a>(&self, state: &'a mut [f64]) -> (&'a mut [f64], &'a mut [f64], &'a mut [f64]) {
        let (x, rest) = state.split_at_mut(self.h1_size);
        let (v, e) = rest.split_at_mut(self.h1_size);
        (x, v, e)
    }

    /// Assemble a state vector from its blocks
    pub fn join(&self, x: &[f64], v: &[f64], e: &[f64]) -> Vec<f64> {
        assert_eq!(x.len(), self.h1_size, "Position block has the wrong size; cannot build state!");
        assert_eq!(v.len(), self.h1_size, "Velocity block has the wrong size; cannot build state!");
        assert_eq!(e.len(), self.l2_size, "Energy block has the wrong size; cannot build state!");
        [x, v, e].concat()
    }
}

/// The finite element spaces, quadrature rule and sampled bases shared by every kernel
pub struct Discretization {
    pub h1: FiniteElementSpace,
    pub l2: FiniteElementSpace,
    pub rule: QuadratureRule,
    pub h1_shapes: ShapeTable,
    pub l2_shapes: ShapeTable,
    pub h1_order: usize,
    pub backend: Backend,
}

impl Discretization {
    pub fn dim(&self) -> usize {
        self.rule.dim()
    }

    pub fn num_zones(&self) -> usize {
        self.h1.num_elements()
    }

    /// Values of an element-local kinematic vector on zone `z` as a `vdim x num_dofs` matrix
    pub fn zone_h1_values(&self, local: &[f64], z: usize) -> DMatrix<f64> {
        DMatrix::from_fn(self.h1.vdim(), self.h1.element_dofs(), |c, i| {
            local[self.h1.local_index(c, z, i)]
        })
    }

    /// `sum_i values[:, i] (x) grad(phi_i)(q)`: the reference gradient of a kinematic field
    pub fn reference_gradient(&self, zone_values: &DMatrix<f64>, q: usize) -> DMatrix<f64> {
        zone_values * self.h1_shapes.grad(q)
    }

    /// Value of an element-local thermodynamic field at quadrature point `q` of zone `z`
    pub fn l2_value(&self, local: &[f64], z: usize, q: usize) -> f64 {
        (0..self.l2.element_dofs())
            .map(|k| local[self.l2.local_index(0, z, k)] * self.l2_shapes.value(q, k))
            .sum()
    }
}

/// Semi-discrete Lagrangian hydrodynamics: the time derivative of `[x | v | e]`
///
/// * `dx/dt = v`
/// * `M_v dv/dt = -F 1` (with essential velocity DoFs held at zero)
/// * `M_e de/dt = F^T v (+ source)`
///
/// The force `F` depends on the state through the cached quadrature data, which is recomputed
/// whenever [reset_quadrature_data](Self::reset_quadrature_data) has been called since the last evaluation.
pub struct LagrangianHydroOperator {
    disc: Discretization,
    layout: StateLayout,
    config: HydroConfig,
    cache: QuadratureCache,
    force: Box<dyn ForceOperator>,
    force_epoch: usize,
    velocity_mass: CsrMatrix,
    constrained_mass: CsrMatrix,
    velocity_solver: Box<dyn LinearSolver>,
    energy_mass: Vec<DMatrix<f64>>,
    energy_mass_inv: Vec<DMatrix<f64>>,
}

impl LagrangianHydroOperator {
    /// Build the operator from the kinematic (`h1`, vector valued) and thermodynamic (`l2`) spaces
    ///
    /// `x0` holds the initial node positions and `rho0` the initial density (both as true-DoF vectors).
    /// The mass matrices are computed here once and reused for the whole simulation.
    pub fn new(
        h1: FiniteElementSpace,
        l2: FiniteElementSpace,
        h1_basis: &dyn ElementBasis,
        l2_basis: &dyn ElementBasis,
        x0: &[f64],
        rho0: &[f64],
        config: HydroConfig,
    ) -> Result<Self, HydroError> {
        config.validate()?;
        check_spaces(&h1, &l2, h1_basis, l2_basis)?;
        if config.source == EnergySource::TaylorGreen && h1_basis.dim() != 2 {
            return Err(HydroError::InvalidConfig(
                "the Taylor-Green source is only defined in 2D".into(),
            ));
        }
        check_size(x0, h1.true_size())?;
        check_size(rho0, l2.true_size())?;

        let dim = h1_basis.dim();
        let h1_order = h1_basis.order();
        let n_1d = config.quadrature_points.unwrap_or(2 * h1_order);
        let rule = QuadratureRule::tensor_gauss_legendre(dim, n_1d);
        let disc = Discretization {
            h1_shapes: ShapeTable::new(h1_basis, &rule),
            l2_shapes: ShapeTable::new(l2_basis, &rule),
            h1,
            l2,
            rule,
            h1_order,
            backend: config.backend,
        };

        let initial = initial_geometry(&disc, x0, rho0)?;
        let velocity_mass = mass::velocity_mass_matrix(&disc, &initial.rho0_det_j0_w);
        let constrained_mass = velocity_mass.eliminate_rows_cols(disc.h1.essential_true_dofs());
        let velocity_solver = config.mass_solver.build(constrained_mass.clone())?;

        let energy_mass = mass::energy_mass_matrices(&disc, &initial.rho0_det_j0_w);
        let energy_mass_inv =
            mass::invert_energy_masses(&energy_mass).map_err(HydroError::SingularEnergyMass)?;

        let force: Box<dyn ForceOperator> = match config.assembly {
            ForceAssembly::Partial => Box::new(PartialForce),
            ForceAssembly::Full => Box::new(AssembledForce::default()),
        };

        let layout = StateLayout::new(disc.h1.true_size(), disc.l2.true_size());
        log::info!(
            "Lagrangian hydro operator: {}D, {} zones, H1 order {} ({} true DoFs), L2 order {} ({} true DoFs), {} quadrature points per zone",
            dim,
            disc.num_zones(),
            h1_order,
            disc.h1.true_size(),
            l2_basis.order(),
            disc.l2.true_size(),
            disc.rule.len(),
        );

        let model = GasModel {
            gamma: config.gamma,
            cfl: config.cfl,
            use_viscosity: config.use_viscosity,
        };

        Ok(Self {
            disc,
            layout,
            config,
            cache: QuadratureCache::new(initial, model),
            force,
            force_epoch: 0,
            velocity_mass,
            constrained_mass,
            velocity_solver,
            energy_mass,
            energy_mass_inv,
        })
    }

    pub fn layout(&self) -> StateLayout {
        self.layout
    }

    pub fn config(&self) -> &HydroConfig {
        &self.config
    }

    pub fn discretization(&self) -> &Discretization {
        &self.disc
    }

    /// Replace the solver of the (constrained) velocity mass system
    pub fn set_velocity_solver(&mut self, solver: Box<dyn LinearSolver>) -> Result<(), HydroError> {
        if solver.size() != self.constrained_mass.rows() {
            return Err(HydroError::StateSize {
                expected: self.constrained_mass.rows(),
                received: solver.size(),
            });
        }
        self.velocity_solver = solver;
        Ok(())
    }

    /// The velocity mass matrix over the true DoFs (without boundary conditions)
    pub fn velocity_mass_matrix(&self) -> &CsrMatrix {
        &self.velocity_mass
    }

    /// The velocity mass matrix with the essential rows and columns eliminated
    pub fn constrained_velocity_mass_matrix(&self) -> &CsrMatrix {
        &self.constrained_mass
    }

    /// Write the constrained velocity mass matrix in PETSc's binary `Mat` format (for an external solver)
    pub fn export_velocity_mass(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        log::debug!(
            "Exporting {}x{} velocity mass matrix ({} entries) to {}",
            self.constrained_mass.rows(),
            self.constrained_mass.cols(),
            self.constrained_mass.nnz(),
            path.as_ref().display()
        );
        self.constrained_mass.write_petsc_binary(path)
    }

    pub fn energy_mass_matrix(&self, z: usize) -> &DMatrix<f64> {
        &self.energy_mass[z]
    }

    pub fn energy_mass_inverse(&self, z: usize) -> &DMatrix<f64> {
        &self.energy_mass_inv[z]
    }

    /// The cached data of the last completed epoch
    pub fn quadrature_data(&self) -> Option<&QuadratureData> {
        self.cache.data()
    }

    /// Number of times the quadrature data has been recomputed
    pub fn quadrature_updates(&self) -> usize {
        self.cache.updates()
    }

    pub fn is_quadrature_data_current(&self) -> bool {
        self.cache.is_current()
    }

    /// Mark the quadrature data stale (the state changed since it was computed)
    pub fn reset_quadrature_data(&mut self) {
        self.cache.invalidate();
    }

    pub fn reset_time_step_estimate(&mut self) {
        self.cache.reset_dt_estimate();
    }

    /// Bring the quadrature data up to date with `state` if it is stale
    pub fn update_quadrature_data(&mut self, state: &[f64]) -> Result<(), HydroError> {
        check_size(state, self.layout.size())?;
        if self.cache.is_current() {
            return Ok(());
        }

        let (x, v, e) = self.layout.split(state);
        let mut x_local = vec![0.0; self.disc.h1.local_size()];
        let mut v_local = vec![0.0; self.disc.h1.local_size()];
        let mut e_local = vec![0.0; self.disc.l2.local_size()];
        self.disc.h1.true_to_local(x, &mut x_local);
        self.disc.h1.true_to_local(v, &mut v_local);
        self.disc.l2.true_to_local(e, &mut e_local);

        self.cache.update(&self.disc, &x_local, &v_local, &e_local);
        Ok(())
    }

    /// The largest stable time step for `state` (minimum over every epoch since the last reset)
    pub fn time_step_estimate(&mut self, state: &[f64]) -> Result<f64, HydroError> {
        self.update_quadrature_data(state)?;
        let dt = self.disc.h1.dof_space().min_all(self.cache.dt_estimate());
        if !(dt > 0.0) {
            log::warn!("Time step estimate is not positive ({}); the mesh may be tangled", dt);
        }
        Ok(dt)
    }

    /// Project the quadrature point density of the last epoch onto the thermodynamic space
    pub fn compute_density(&self, out: &mut [f64]) -> Result<(), HydroError> {
        check_size(out, self.disc.l2.true_size())?;
        let data = self.cache.data().ok_or(HydroError::NoQuadratureData)?;
        let rho0_det_j0_w = &self.cache.initial().rho0_det_j0_w;

        let nd = self.disc.l2.element_dofs();
        let num_points = self.disc.rule.len();
        let zones: Vec<Result<Vec<f64>, HydroError>> =
            self.disc.backend.map_collect(self.disc.num_zones(), |z| {
                let mut mass = DMatrix::zeros(nd, nd);
                let mut rhs = nalgebra::DVector::zeros(nd);
                for q in 0..num_points {
                    let w_det_j = self.disc.rule.weight(q) * data.det_j(z, q);
                    for k in 0..nd {
                        let psi_k = self.disc.l2_shapes.value(q, k);
                        rhs[k] += rho0_det_j0_w[z * num_points + q] * psi_k;
                        for l in 0..nd {
                            mass[(k, l)] += w_det_j * psi_k * self.disc.l2_shapes.value(q, l);
                        }
                    }
                }
                match mass.cholesky() {
                    Some(factor) => Ok(factor.solve(&rhs).as_slice().to_vec()),
                    None => Err(HydroError::DegenerateZone(z)),
                }
            });

        let mut local = vec![0.0; self.disc.l2.local_size()];
        for (z, density) in zones.into_iter().enumerate() {
            for (k, value) in density?.iter().enumerate() {
                local[self.disc.l2.local_index(0, z, k)] = *value;
            }
        }

        let mut global = vec![0.0; self.disc.l2.global_size()];
        self.disc.l2.local_to_global(&local, &mut global);
        self.disc.l2.restrict(&global, out);
        Ok(())
    }

    /// `1/2 v^T M_v v`
    pub fn kinetic_energy(&self, state: &[f64]) -> Result<f64, HydroError> {
        check_size(state, self.layout.size())?;
        let (_, v, _) = self.layout.split(state);
        let mut mv = vec![0.0; v.len()];
        self.velocity_mass.mult(v, &mut mv);
        Ok(0.5 * dot(v, &mv))
    }

    /// `sum_z 1^T M_e,z e_z`
    pub fn internal_energy(&self, state: &[f64]) -> Result<f64, HydroError> {
        check_size(state, self.layout.size())?;
        let (_, _, e) = self.layout.split(state);
        let mut e_local = vec![0.0; self.disc.l2.local_size()];
        self.disc.l2.true_to_local(e, &mut e_local);

        Ok((0..self.disc.num_zones())
            .map(|z| {
                let e_z = self.zone_l2_values(&e_local, z);
                (&self.energy_mass[z] * e_z).sum()
            })
            .sum())
    }

    fn zone_l2_values(&self, local: &[f64], z: usize) -> nalgebra::DVector<f64> {
        nalgebra::DVector::from_fn(self.disc.l2.element_dofs(), |k, _| {
            local[self.disc.l2.local_index(0, z, k)]
        })
    }

    fn refresh_force(&mut self) -> Result<(), HydroError> {
        let data = self.cache.data().ok_or(HydroError::NoQuadratureData)?;
        if self.force_epoch != self.cache.updates() {
            self.force.update(&self.disc, data);
            self.force_epoch = self.cache.updates();
        }
        Ok(())
    }

    fn solve_velocity(&self, dv: &mut [f64]) -> Result<(), HydroError> {
        let data = self.cache.data().ok_or(HydroError::NoQuadratureData)?;
        let essential = self.disc.h1.essential_true_dofs();

        let one = vec![1.0; self.disc.l2.true_size()];
        let mut rhs = vec![0.0; self.disc.h1.true_size()];
        self.force.mult(&self.disc, data, &one, &mut rhs);
        rhs.iter_mut().for_each(|r| *r = -*r);
        for &d in essential {
            rhs[d] = 0.0;
        }

        dv.iter_mut().for_each(|a| *a = 0.0);
        let report = self.velocity_solver.solve(&rhs, dv)?;
        if !report.converged {
            log::warn!(
                "Velocity mass solve did not converge ({} iterations, residual {:e})",
                report.iterations,
                report.residual
            );
        }
        for &d in essential {
            dv[d] = 0.0;
        }
        Ok(())
    }

    fn solve_energy(&self, x: &[f64], v: &[f64], de: &mut [f64]) -> Result<(), HydroError> {
        let data = self.cache.data().ok_or(HydroError::NoQuadratureData)?;

        let mut rhs = vec![0.0; self.disc.l2.true_size()];
        self.force.mult_transpose(&self.disc, data, v, &mut rhs);

        let mut rhs_local = vec![0.0; self.disc.l2.local_size()];
        self.disc.l2.true_to_local(&rhs, &mut rhs_local);

        if self.config.source == EnergySource::TaylorGreen {
            let mut x_local = vec![0.0; self.disc.h1.local_size()];
            self.disc.h1.true_to_local(x, &mut x_local);
            let heating = source::taylor_green_source(&self.disc, data, &x_local, self.config.gamma);
            rhs_local
                .iter_mut()
                .zip(heating.iter())
                .for_each(|(r, h)| *r += h);
        }

        let mut de_local = vec![0.0; self.disc.l2.local_size()];
        for z in 0..self.disc.num_zones() {
            let de_z = &self.energy_mass_inv[z] * self.zone_l2_values(&rhs_local, z);
            for (k, value) in de_z.iter().enumerate() {
                de_local[self.disc.l2.local_index(0, z, k)] = *value;
            }
        }

        let mut global = vec![0.0; self.disc.l2.global_size()];
        self.disc.l2.local_to_global(&de_local, &mut global);
        self.disc.l2.restrict(&global, de);
        Ok(())
    }
}

impl TimeDependentOperator for LagrangianHydroOperator {
    fn size(&self) -> usize {
        self.layout.size()
    }

    fn mult(&mut self, state: &[f64], d_state: &mut [f64]) -> Result<(), HydroError> {
        check_size(state, self.layout.size())?;
        check_size(d_state, self.layout.size())?;

        self.update_quadrature_data(state)?;
        self.refresh_force()?;

        let (x, v, _) = self.layout.split(state);
        let (dx, dv, de) = self.layout.split_mut(d_state);

        self.solve_velocity(dv)?;
        self.solve_energy(x, v, de)?;
        dx.copy_from_slice(v);

        Ok(())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(a, b)| a * b).sum()
}

fn check_size(vector: &[f64], expected: usize) -> Result<(), HydroError> {
    if vector.len() == expected {
        Ok(())
    } else {
        Err(HydroError::StateSize {
            expected,
            received: vector.len(),
        })
    }
}

fn check_spaces(
    h1: &FiniteElementSpace,
    l2: &FiniteElementSpace,
    h1_basis: &dyn ElementBasis,
    l2_basis: &dyn ElementBasis,
) -> Result<(), HydroError> {
    let dim = h1_basis.dim();
    let compatible = l2_basis.dim() == dim
        && h1.vdim() == dim
        && l2.vdim() == 1
        && h1.num_elements() == l2.num_elements()
        && h1.element_dofs() == h1_basis.num_dofs()
        && l2.element_dofs() == l2_basis.num_dofs();
    if !compatible {
        return Err(HydroError::IncompatibleSpaces);
    }

    // the thermodynamic space must be discontinuous: one element per global DoF, one global DoF per true DoF
    let l2_map = l2.dof_map();
    let discontinuous = (0..l2_map.global_dofs()).all(|g| l2_map.multiplicity(g) == 1)
        && l2.true_size() == l2.global_size();
    if !discontinuous {
        return Err(HydroError::IncompatibleSpaces);
    }

    Ok(())
}

/// `rho0 det(J0) w`, `J0^-1` at every point and the initial zone length
fn initial_geometry(disc: &Discretization, x0: &[f64], rho0: &[f64]) -> Result<InitialGeometry, HydroError> {
    let mut x_local = vec![0.0; disc.h1.local_size()];
    let mut rho_local = vec![0.0; disc.l2.local_size()];
    disc.h1.true_to_local(x0, &mut x_local);
    disc.l2.true_to_local(rho0, &mut rho_local);

    let num_points = disc.rule.len();
    let zones: Vec<Result<Vec<(f64, DMatrix<f64>, f64)>, HydroError>> =
        disc.backend.map_collect(disc.num_zones(), |z| {
            let positions = disc.zone_h1_values(&x_local, z);
            (0..num_points)
                .map(|q| {
                    let jac = disc.reference_gradient(&positions, q);
                    let det_j = jac.determinant();
                    match jac.try_inverse() {
                        Some(jinv) if det_j > 0.0 => {
                            let w_det_j = disc.rule.weight(q) * det_j;
                            Ok((disc.l2_value(&rho_local, z, q) * w_det_j, jinv, w_det_j))
                        }
                        _ => Err(HydroError::InvalidInitialMesh(z)),
                    }
                })
                .collect()
        });

    let mut rho0_det_j0_w = Vec::with_capacity(disc.num_zones() * num_points);
    let mut jac0_inv = Vec::with_capacity(disc.num_zones() * num_points);
    let mut volume = 0.0;
    for zone in zones {
        for (m, jinv, w_det_j) in zone? {
            rho0_det_j0_w.push(m);
            jac0_inv.push(jinv);
            volume += w_det_j;
        }
    }

    let h0 = (volume / disc.num_zones() as f64).powf(1.0 / disc.dim() as f64) / disc.h1_order as f64;
    log::debug!("Initial mesh volume {:e}, characteristic zone length {:e}", volume, h0);

    Ok(InitialGeometry {
        rho0_det_j0_w,
        jac0_inv,
        h0,
    })
}

/// Errors raised by the [LagrangianHydroOperator]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HydroError {
    #[error("Invalid configuration ({0}); cannot build hydro operator!")]
    InvalidConfig(String),
    #[error(transparent)]
    DofMap(#[from] DofMapError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("Vector has length {received} (expected {expected}); cannot evaluate hydro operator!")]
    StateSize { expected: usize, received: usize },
    #[error("Energy mass matrix of zone {0} is not SPD; cannot invert!")]
    SingularEnergyMass(usize),
    #[error("Kinematic and thermodynamic spaces are incompatible; cannot build hydro operator!")]
    IncompatibleSpaces,
    #[error("Zone {0} of the initial mesh is inverted or degenerate; cannot build hydro operator!")]
    InvalidInitialMesh(usize),
    #[error("Zone {0} is inverted or degenerate; cannot project density!")]
    DegenerateZone(usize),
    #[error("Quadrature data has not been computed yet; cannot continue!")]
    NoQuadratureData,
}
