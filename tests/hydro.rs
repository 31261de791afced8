use approx::assert_relative_eq;
use lagrangian_hydro::fe_space::dof_map::ElementDofMap;
use lagrangian_hydro::prelude::*;

fn dense_config() -> HydroConfig {
    HydroConfig::default().with_mass_solver(SolverKind::DenseCholesky)
}

fn derivative(problem: &mut HydroProblem, state: &[f64]) -> Vec<f64> {
    let mut d_state = vec![0.0; problem.operator.size()];
    problem.operator.mult(state, &mut d_state).unwrap();
    d_state
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |max, v| max.max(v.abs()))
}

#[test]
fn shared_interface_dof_mapping() {
    let incidence = ElementIncidence {
        elements: 2,
        local_dofs: 2,
        global_dofs: 3,
        element_map: vec![0, 1, 1, 2],
        dof_map: Vec::new(),
    };

    for backend in [Backend::Serial, Backend::Threaded] {
        let map = ElementDofMap::build(&incidence, backend).unwrap();
        assert_eq!(map.offsets(), &[0, 1, 3, 4]);

        let space =
            FiniteElementSpace::serial(&incidence, 1, DofOrdering::ByNodes, vec![], backend).unwrap();
        let mut global = vec![0.0; 3];
        space.local_to_global(&[1.0; 4], &mut global);
        assert_eq!(global, vec![1.0, 2.0, 1.0]);
    }
}

#[test]
fn semi_discrete_energy_is_conserved() {
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[3, 3]).unwrap(), 2, &TaylorGreen, dense_config())
            .unwrap();
    let state = problem.state.clone();
    let d_state = derivative(&mut problem, &state);

    let layout = problem.operator.layout();
    let v = &state[layout.velocity()];
    let dv = &d_state[layout.velocity()];
    let de = &d_state[layout.energy()];

    // d/dt (1/2 v^T M v) = v^T M dv/dt
    let mut m_dv = vec![0.0; dv.len()];
    problem.operator.velocity_mass_matrix().mult(dv, &mut m_dv);
    let kinetic_rate: f64 = v.iter().zip(m_dv.iter()).map(|(a, b)| a * b).sum();

    // internal energy is linear in e
    let rate_state = layout.join(&state[layout.position()], v, de);
    let internal_rate = problem.operator.internal_energy(&rate_state).unwrap();

    assert!(kinetic_rate.abs() > 1e-6);
    assert!(
        (kinetic_rate + internal_rate).abs() < 1e-9 * (kinetic_rate.abs() + internal_rate.abs()),
        "kinetic rate {} + internal rate {} != 0",
        kinetic_rate,
        internal_rate
    );
}

#[test]
fn viscosity_is_inactive_at_rest() {
    let mesh = CartesianMesh::unit(&[6]).unwrap();
    let mut with_visc =
        HydroProblem::cartesian(mesh.clone(), 2, &SodShockTube, dense_config().with_viscosity(true))
            .unwrap();
    let mut without_visc =
        HydroProblem::cartesian(mesh, 2, &SodShockTube, dense_config().with_viscosity(false)).unwrap();

    let state = with_visc.state.clone();
    let a = derivative(&mut with_visc, &state);
    let b = derivative(&mut without_visc, &state);

    for (a, b) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-12);
    }
    assert_relative_eq!(
        with_visc.operator.time_step_estimate(&state).unwrap(),
        without_visc.operator.time_step_estimate(&state).unwrap(),
        max_relative = 1e-12
    );
}

#[test]
fn uniform_pressure_has_no_acceleration() {
    let gas = UniformGas {
        density: 1.5,
        pressure: 2.0,
    };
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[3, 3]).unwrap(), 2, &gas, dense_config()).unwrap();
    let state = problem.state.clone();
    let d_state = derivative(&mut problem, &state);

    let layout = problem.operator.layout();
    assert!(max_abs(&d_state[layout.velocity()]) < 1e-10);
    assert!(max_abs(&d_state[layout.energy()]) < 1e-10);
    assert!(max_abs(&d_state[layout.position()]) == 0.0);
}

#[test]
fn pressure_jump_pushes_toward_low_pressure() {
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[4]).unwrap(), 1, &SodShockTube, dense_config())
            .unwrap();
    let state = problem.state.clone();
    let d_state = derivative(&mut problem, &state);

    let layout = problem.operator.layout();
    let dv = &d_state[layout.velocity()];
    assert_eq!(dv[0], 0.0);
    assert_eq!(dv[4], 0.0);

    // M dv reproduces the nodal force: only the diaphragm node (x = 0.5) feels p_L - p_R
    let mut m_dv = vec![0.0; dv.len()];
    problem.operator.velocity_mass_matrix().mult(dv, &mut m_dv);
    assert!(m_dv[1].abs() < 1e-12);
    assert!(m_dv[3].abs() < 1e-12);
    assert_relative_eq!(m_dv[2], 1.0 - 0.1, max_relative = 1e-10);
    assert!(dv[2] > 0.0);
}

#[test]
fn time_step_of_gas_at_rest() {
    let gas = UniformGas {
        density: 1.0,
        pressure: 1.0,
    };
    let config = HydroConfig::default().with_cfl(0.5);
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[4]).unwrap(), 2, &gas, config).unwrap();
    let state = problem.state.clone();

    let sound_speed = (config.gamma * gas.pressure / gas.density).sqrt();
    let expected = 0.5 * 0.25 / (2.0 * sound_speed);
    let dt = problem.operator.time_step_estimate(&state).unwrap();
    assert_relative_eq!(dt, expected, max_relative = 1e-12);

    // a hotter gas lowers the estimate, which then persists until it is reset
    let layout = problem.operator.layout();
    let mut hot = state.clone();
    hot[layout.energy()].iter_mut().for_each(|e| *e *= 4.0);
    problem.operator.reset_quadrature_data();
    let dt_hot = problem.operator.time_step_estimate(&hot).unwrap();
    assert_relative_eq!(dt_hot, expected / 2.0, max_relative = 1e-12);

    problem.operator.reset_quadrature_data();
    assert_relative_eq!(
        problem.operator.time_step_estimate(&state).unwrap(),
        expected / 2.0,
        max_relative = 1e-12
    );

    problem.operator.reset_quadrature_data();
    problem.operator.reset_time_step_estimate();
    assert_relative_eq!(
        problem.operator.time_step_estimate(&state).unwrap(),
        expected,
        max_relative = 1e-12
    );
}

#[test]
fn inverted_zone_forces_zero_time_step() {
    let gas = UniformGas {
        density: 1.0,
        pressure: 1.0,
    };
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[4]).unwrap(), 1, &gas, dense_config()).unwrap();
    let layout = problem.operator.layout();

    // swap the two interior-most nodes to tangle the mesh
    let mut tangled = problem.state.clone();
    tangled[layout.position()].swap(1, 2);
    assert_eq!(problem.operator.time_step_estimate(&tangled).unwrap(), 0.0);
}

#[test]
fn partial_and_assembled_force_agree() {
    let mesh = CartesianMesh::unit(&[2, 3]).unwrap();
    let mut partial = HydroProblem::cartesian(
        mesh.clone(),
        2,
        &TaylorGreen,
        dense_config().with_assembly(ForceAssembly::Partial),
    )
    .unwrap();
    let mut full = HydroProblem::cartesian(
        mesh,
        2,
        &TaylorGreen,
        dense_config().with_assembly(ForceAssembly::Full),
    )
    .unwrap();

    let state = partial.state.clone();
    let a = derivative(&mut partial, &state);
    let b = derivative(&mut full, &state);

    let scale = max_abs(&a);
    for (a, b) in a.iter().zip(b.iter()) {
        assert!((a - b).abs() <= 1e-11 * scale);
    }
}

#[test]
fn backends_agree() {
    let mesh = CartesianMesh::unit(&[3, 2]).unwrap();
    let mut serial = HydroProblem::cartesian(
        mesh.clone(),
        2,
        &TaylorGreen,
        dense_config().with_backend(Backend::Serial),
    )
    .unwrap();
    let mut threaded = HydroProblem::cartesian(
        mesh,
        2,
        &TaylorGreen,
        dense_config().with_backend(Backend::Threaded),
    )
    .unwrap();

    let state = serial.state.clone();
    let a = derivative(&mut serial, &state);
    let b = derivative(&mut threaded, &state);

    let scale = max_abs(&a);
    for (a, b) in a.iter().zip(b.iter()) {
        assert!((a - b).abs() <= 1e-11 * scale);
    }
}

#[test]
fn quadrature_data_is_cached_between_resets() {
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[2, 2]).unwrap(), 1, &TaylorGreen, dense_config())
            .unwrap();
    let state = problem.state.clone();
    assert!(!problem.operator.is_quadrature_data_current());
    assert_eq!(problem.operator.quadrature_updates(), 0);

    let first = derivative(&mut problem, &state);
    let second = derivative(&mut problem, &state);
    problem.operator.time_step_estimate(&state).unwrap();
    assert_eq!(problem.operator.quadrature_updates(), 1);
    assert_eq!(first, second);

    problem.operator.reset_quadrature_data();
    assert!(!problem.operator.is_quadrature_data_current());
    derivative(&mut problem, &state);
    assert_eq!(problem.operator.quadrature_updates(), 2);
}

#[test]
fn invalid_state_leaves_cache_stale() {
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[3]).unwrap(), 1, &SodShockTube, dense_config())
            .unwrap();
    let size = problem.operator.size();

    let mut d_state = vec![0.0; size];
    let result = problem.operator.mult(&vec![0.0; size - 1], &mut d_state);
    assert_eq!(
        result,
        Err(HydroError::StateSize {
            expected: size,
            received: size - 1
        })
    );
    assert!(!problem.operator.is_quadrature_data_current());
    assert!(problem.operator.quadrature_data().is_none());
}

#[test]
fn density_follows_compression() {
    let gas = UniformGas {
        density: 1.25,
        pressure: 1.0,
    };
    let mut problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[4]).unwrap(), 2, &gas, dense_config()).unwrap();
    let layout = problem.operator.layout();
    let mut density = vec![0.0; layout.energy().len()];

    assert_eq!(
        problem.operator.compute_density(&mut density),
        Err(HydroError::NoQuadratureData)
    );

    let state = problem.state.clone();
    problem.operator.update_quadrature_data(&state).unwrap();
    problem.operator.compute_density(&mut density).unwrap();
    density
        .iter()
        .for_each(|rho| assert_relative_eq!(*rho, 1.25, max_relative = 1e-12));

    // halve every zone
    let mut compressed = state.clone();
    compressed[layout.position()].iter_mut().for_each(|x| *x *= 0.5);
    problem.operator.reset_quadrature_data();
    problem.operator.update_quadrature_data(&compressed).unwrap();
    problem.operator.compute_density(&mut density).unwrap();
    density
        .iter()
        .for_each(|rho| assert_relative_eq!(*rho, 2.5, max_relative = 1e-12));
}

#[test]
fn energy_source_heats_the_vortex() {
    let mesh = CartesianMesh::unit(&[2, 2]).unwrap();
    let mut plain = HydroProblem::cartesian(mesh.clone(), 2, &TaylorGreen, dense_config()).unwrap();
    let mut heated = HydroProblem::cartesian(
        mesh,
        2,
        &TaylorGreen,
        dense_config().with_source(EnergySource::TaylorGreen),
    )
    .unwrap();

    let state = plain.state.clone();
    let a = derivative(&mut plain, &state);
    let b = derivative(&mut heated, &state);
    let layout = plain.operator.layout();

    let scale = max_abs(&a[layout.velocity()]);
    for (a, b) in a[layout.velocity()].iter().zip(b[layout.velocity()].iter()) {
        assert!((a - b).abs() <= 1e-11 * scale);
    }
    assert!(max_abs(
        &a[layout.energy()]
            .iter()
            .zip(b[layout.energy()].iter())
            .map(|(a, b)| a - b)
            .collect::<Vec<_>>()
    ) > 1e-3);

    let one_d = HydroProblem::cartesian(
        CartesianMesh::unit(&[4]).unwrap(),
        2,
        &SodShockTube,
        dense_config().with_source(EnergySource::TaylorGreen),
    );
    assert!(matches!(one_d, Err(HydroError::InvalidConfig(_))));
}

#[test]
fn inverted_initial_mesh_is_rejected() {
    let mesh = CartesianMesh::unit(&[2]).unwrap();
    let h1_basis = TensorLagrangeBasis::h1(1, 1);
    let l2_basis = TensorLagrangeBasis::l2(1, 0);
    let h1 = FiniteElementSpace::serial(
        &mesh.h1_incidence(1),
        1,
        DofOrdering::ByNodes,
        mesh.boundary_essential_dofs(1),
        Backend::Serial,
    )
    .unwrap();
    let l2 = FiniteElementSpace::serial(
        &mesh.l2_incidence(0),
        1,
        DofOrdering::ByNodes,
        vec![],
        Backend::Serial,
    )
    .unwrap();

    let x0 = vec![1.0, 0.5, 0.0];
    let result = LagrangianHydroOperator::new(
        h1,
        l2,
        &h1_basis,
        &l2_basis,
        &x0,
        &[1.0, 1.0],
        HydroConfig::default(),
    );
    assert!(matches!(result, Err(HydroError::InvalidInitialMesh(0))));
}

#[test]
fn conjugate_gradient_matches_direct_solve() {
    let mesh = CartesianMesh::unit(&[3, 3]).unwrap();
    let cg_config = HydroConfig::default().with_mass_solver(SolverKind::ConjugateGradient {
        rel_tol: 1e-12,
        abs_tol: 0.0,
        max_iter: 500,
    });
    let mut direct = HydroProblem::cartesian(mesh.clone(), 2, &TaylorGreen, dense_config()).unwrap();
    let mut iterative = HydroProblem::cartesian(mesh, 2, &TaylorGreen, cg_config).unwrap();

    let state = direct.state.clone();
    let a = derivative(&mut direct, &state);
    let b = derivative(&mut iterative, &state);

    let layout = direct.operator.layout();
    let scale = max_abs(&a[layout.velocity()]);
    for (a, b) in a[layout.velocity()].iter().zip(b[layout.velocity()].iter()) {
        assert!((a - b).abs() <= 1e-9 * scale);
    }
}

#[test]
fn energy_source_balances_advection_at_any_gamma() {
    use std::f64::consts::PI;

    let order = 2;
    let mesh = CartesianMesh::unit(&[12, 12]).unwrap();
    let l2_basis = TensorLagrangeBasis::l2(2, order - 1);

    for gamma in [1.4, 5.0 / 3.0] {
        let config = HydroConfig::default().with_gamma(gamma);
        let mut plain = HydroProblem::cartesian(mesh.clone(), order, &TaylorGreen, config).unwrap();
        let mut heated = HydroProblem::cartesian(
            mesh.clone(),
            order,
            &TaylorGreen,
            config.with_source(EnergySource::TaylorGreen),
        )
        .unwrap();

        let state = plain.state.clone();
        let a = derivative(&mut plain, &state);
        let b = derivative(&mut heated, &state);
        let layout = plain.operator.layout();
        let (de_plain, de_heated) = (&a[layout.energy()], &b[layout.energy()]);

        // a steady vortex needs de/dt = v . grad(p) / ((gamma - 1) rho) from the source alone
        let l2 = &plain.operator.discretization().l2;
        let mut max_error: f64 = 0.0;
        let mut max_exact: f64 = 0.0;
        for z in 0..mesh.num_zones() {
            for k in 0..l2_basis.num_dofs() {
                let x = mesh.map_reference_point(z, &l2_basis.node(k));
                let v = [
                    (PI * x[0]).sin() * (PI * x[1]).cos(),
                    -(PI * x[0]).cos() * (PI * x[1]).sin(),
                ];
                let grad_p = [
                    -PI / 2.0 * (2.0 * PI * x[0]).sin(),
                    -PI / 2.0 * (2.0 * PI * x[1]).sin(),
                ];
                let exact = (v[0] * grad_p[0] + v[1] * grad_p[1]) / (gamma - 1.0);

                let i = l2.local_index(0, z, k);
                max_error = max_error.max((de_heated[i] - de_plain[i] - exact).abs());
                max_exact = max_exact.max(exact.abs());
            }
        }
        assert!(
            max_error < 1e-2 * max_exact,
            "gamma = {}: source error {:e} (max {:e})",
            gamma,
            max_error,
            max_exact
        );
    }
}

#[test]
fn velocity_mass_exports_to_petsc() {
    let problem =
        HydroProblem::cartesian(CartesianMesh::unit(&[3]).unwrap(), 2, &SodShockTube, dense_config())
            .unwrap();
    let mass = problem.operator.constrained_velocity_mass_matrix();

    let path = std::env::temp_dir().join("lagrangian_hydro_velocity_mass.petsc");
    problem.operator.export_velocity_mass(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let header: Vec<i32> = bytes[..16]
        .chunks(4)
        .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(header[1..], [mass.rows() as i32, mass.cols() as i32, mass.nnz() as i32]);
    assert_eq!(bytes.len(), 16 + 4 * mass.rows() + 12 * mass.nnz());

    let values_start = 16 + 4 * mass.rows() + 4 * mass.nnz();
    let exported: f64 = bytes[values_start..]
        .chunks(8)
        .map(|c| f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .sum();
    let expected: f64 = (0..mass.rows())
        .flat_map(|r| mass.row_iter(r).map(|(_, v)| v))
        .sum();
    assert_relative_eq!(exported, expected, max_relative = 1e-12);
}
