use crate::basis::TensorLagrangeBasis;
use crate::fe_space::{scatter::DofOrdering, FiniteElementSpace};
use crate::fields::{interpolate_h1_vector, interpolate_l2, FieldSet};
use crate::hydro::{HydroConfig, HydroError, LagrangianHydroOperator, StateLayout};
use crate::mesh::CartesianMesh;
use std::f64::consts::PI;

/// Initial density, velocity and specific internal energy of a test problem
pub trait InitialCondition: Sync {
    fn density(&self, x: &[f64]) -> f64;

    fn velocity(&self, x: &[f64], v: &mut [f64]);

    fn specific_internal_energy(&self, x: &[f64], gamma: f64) -> f64;
}

/// A gas at rest with constant density and pressure
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UniformGas {
    pub density: f64,
    pub pressure: f64,
}

impl InitialCondition for UniformGas {
    fn density(&self, _x: &[f64]) -> f64 {
        self.density
    }

    fn velocity(&self, _x: &[f64], v: &mut [f64]) {
        v.iter_mut().for_each(|v| *v = 0.0);
    }

    fn specific_internal_energy(&self, _x: &[f64], gamma: f64) -> f64 {
        self.pressure / ((gamma - 1.0) * self.density)
    }
}

/// Sod's shock tube: a diaphragm at `x = 0.5` separating two gases at rest
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SodShockTube;

impl SodShockTube {
    fn left(x: &[f64]) -> bool {
        x[0] < 0.5
    }
}

impl InitialCondition for SodShockTube {
    fn density(&self, x: &[f64]) -> f64 {
        if Self::left(x) {
            1.0
        } else {
            0.125
        }
    }

    fn velocity(&self, _x: &[f64], v: &mut [f64]) {
        v.iter_mut().for_each(|v| *v = 0.0);
    }

    fn specific_internal_energy(&self, x: &[f64], gamma: f64) -> f64 {
        let pressure = if Self::left(x) { 1.0 } else { 0.1 };
        pressure / ((gamma - 1.0) * self.density(x))
    }
}

/// The 2D Taylor-Green vortex on the unit square (steady with [EnergySource::TaylorGreen](crate::hydro::EnergySource))
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TaylorGreen;

impl InitialCondition for TaylorGreen {
    fn density(&self, _x: &[f64]) -> f64 {
        1.0
    }

    fn velocity(&self, x: &[f64], v: &mut [f64]) {
        v[0] = (PI * x[0]).sin() * (PI * x[1]).cos();
        v[1] = -(PI * x[0]).cos() * (PI * x[1]).sin();
        v.iter_mut().skip(2).for_each(|v| *v = 0.0);
    }

    fn specific_internal_energy(&self, x: &[f64], gamma: f64) -> f64 {
        let pressure = 100.0 + ((2.0 * PI * x[0]).cos() + (2.0 * PI * x[1]).cos()) / 4.0;
        pressure / (gamma - 1.0)
    }
}

/// A ready to integrate hydrodynamics problem on a [CartesianMesh]
pub struct HydroProblem {
    pub mesh: CartesianMesh,
    pub operator: LagrangianHydroOperator,
    /// Initial `[x | v | e]`
    pub state: Vec<f64>,
}

impl HydroProblem {
    /// Kinematic order `order`, thermodynamic order `order - 1`, slip walls on every boundary
    pub fn cartesian(
        mesh: CartesianMesh,
        order: usize,
        initial: &dyn InitialCondition,
        config: HydroConfig,
    ) -> Result<Self, HydroError> {
        if order == 0 {
            return Err(HydroError::InvalidConfig(
                "the kinematic order must be at least 1".into(),
            ));
        }
        config.validate()?;
        let dim = mesh.dim();

        let h1_basis = TensorLagrangeBasis::h1(dim, order);
        let l2_basis = TensorLagrangeBasis::l2(dim, order - 1);

        let essential = mesh.boundary_essential_dofs(order);
        let h1 = FiniteElementSpace::serial(
            &mesh.h1_incidence(order),
            dim,
            DofOrdering::ByNodes,
            essential.clone(),
            config.backend,
        )?;
        let l2 = FiniteElementSpace::serial(
            &mesh.l2_incidence(order - 1),
            1,
            DofOrdering::ByNodes,
            Vec::new(),
            config.backend,
        )?;

        let x0 = mesh.node_coordinates(order);
        let mut v0 = interpolate_h1_vector(&mesh, order, |x, v| initial.velocity(x, v));
        for d in essential {
            v0[d] = 0.0;
        }
        let rho0 = interpolate_l2(&l2, &l2_basis, &mesh, |x| initial.density(x));
        let e0 = interpolate_l2(&l2, &l2_basis, &mesh, |x| {
            initial.specific_internal_energy(x, config.gamma)
        });

        let layout = StateLayout::new(h1.true_size(), l2.true_size());
        let state = layout.join(&x0, &v0, &e0);

        let operator = LagrangianHydroOperator::new(h1, l2, &h1_basis, &l2_basis, &x0, &rho0, config)?;

        Ok(Self {
            mesh,
            operator,
            state,
        })
    }

    /// Position, velocity, energy and (projected) density of a state as named fields
    pub fn fields(&self, state: &[f64]) -> Result<FieldSet, HydroError> {
        let layout = self.operator.layout();
        if state.len() != layout.size() {
            return Err(HydroError::StateSize {
                expected: layout.size(),
                received: state.len(),
            });
        }

        let mut fields = FieldSet::new();
        fields.insert("position", state[layout.position()].to_vec());
        fields.insert("velocity", state[layout.velocity()].to_vec());
        fields.insert("specific_internal_energy", state[layout.energy()].to_vec());

        if self.operator.quadrature_data().is_some() {
            let mut density = vec![0.0; layout.energy().len()];
            self.operator.compute_density(&mut density)?;
            fields.insert("density", density);
        }

        Ok(fields)
    }
}
