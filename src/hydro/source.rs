use super::{quadrature_data::QuadratureData, Discretization};
use std::f64::consts::PI;

/// Volumetric heating which makes the 2D Taylor-Green vortex a steady solution of the Euler equations
///
/// The vortex pressure `p = 100 + (cos 2pi x + cos 2pi y) / 4` is advected by a divergence-free velocity,
/// so steadiness requires `Q = rho v . grad(e) = v . grad(p) / (gamma - 1)`.
pub fn taylor_green_heating(x: &[f64], gamma: f64) -> f64 {
    PI / (4.0 * (gamma - 1.0))
        * ((3.0 * PI * x[0]).cos() * (PI * x[1]).cos() - (PI * x[0]).cos() * (3.0 * PI * x[1]).cos())
}

/// Integrate the Taylor-Green heating against the thermodynamic basis on the current geometry
///
/// `positions` is the element-local position vector; the result is element-local over the L2 space.
pub fn taylor_green_source(
    disc: &Discretization,
    data: &QuadratureData,
    positions: &[f64],
    gamma: f64,
) -> Vec<f64> {
    let nd = disc.l2.element_dofs();
    let nd_h1 = disc.h1.element_dofs();
    let num_points = disc.rule.len();

    let zone_sources: Vec<Vec<f64>> = disc.backend.map_collect(disc.num_zones(), |z| {
        let coords = disc.zone_h1_values(positions, z);
        let mut source = vec![0.0; nd];

        for q in 0..num_points {
            let x_q: Vec<f64> = (0..disc.dim())
                .map(|c| (0..nd_h1).map(|i| coords[(c, i)] * disc.h1_shapes.value(q, i)).sum())
                .collect();
            let weight = disc.rule.weight(q) * data.det_j(z, q) * taylor_green_heating(&x_q, gamma);

            for (k, source_k) in source.iter_mut().enumerate() {
                *source_k += weight * disc.l2_shapes.value(q, k);
            }
        }
        source
    });

    let mut local = vec![0.0; disc.l2.local_size()];
    for (z, source) in zone_sources.iter().enumerate() {
        for (k, value) in source.iter().enumerate() {
            local[disc.l2.local_index(0, z, k)] = *value;
        }
    }
    local
}
