//! High order Lagrangian hydrodynamics on tensor-product meshes
//!
//! The crate provides the two pieces needed to integrate the semi-discrete Euler equations in a
//! moving (Lagrangian) frame:
//! * a compressed mapping between the globally unique and the per-element (duplicated) DoF numberings,
//!   with gather/scatter kernels and true <-> global transfer operators ([fe_space])
//! * the right-hand side operator `d[x, v, e]/dt`, built from force terms evaluated against cached
//!   quadrature point data ([hydro])
//!
//! ```
//! use lagrangian_hydro::prelude::*;
//!
//! let mesh = CartesianMesh::unit(&[8]).unwrap();
//! let mut problem = HydroProblem::cartesian(mesh, 2, &SodShockTube, HydroConfig::default()).unwrap();
//!
//! let mut d_state = vec![0.0; problem.operator.size()];
//! problem.operator.mult(&problem.state, &mut d_state).unwrap();
//!
//! let dt = problem.operator.time_step_estimate(&problem.state).unwrap();
//! assert!(dt > 0.0 && dt.is_finite());
//! ```

/// Finite element basis functions on the reference element
pub mod basis;
/// Finite element spaces and the mapping between their DoF numberings
pub mod fe_space;
/// Nodal field interpolation and export
pub mod fields;
/// The Lagrangian hydrodynamics operator
pub mod hydro;
/// Structures and functions to assist in Gauss-Legendre-Quadrature integration
pub mod integration;
/// Sparse matrices and linear solvers
pub mod linalg;
/// Axis-aligned tensor-product meshes
pub mod mesh;
/// Serial and threaded execution of data-parallel kernels
pub mod parallel;
/// Initial conditions of standard test problems
pub mod problems;

/// Commonly used types
pub mod prelude {
    pub use crate::basis::{ElementBasis, TensorLagrangeBasis};
    pub use crate::fe_space::{scatter::DofOrdering, ElementIncidence, FiniteElementSpace};
    pub use crate::hydro::{
        EnergySource, ForceAssembly, HydroConfig, HydroError, LagrangianHydroOperator,
        TimeDependentOperator,
    };
    pub use crate::linalg::SolverKind;
    pub use crate::mesh::CartesianMesh;
    pub use crate::parallel::Backend;
    pub use crate::problems::{HydroProblem, SodShockTube, TaylorGreen, UniformGas};
}
