/// Methods to assist in Gauss-Legendre-Quadrature integration
pub mod glq;

use glq::unit_gauss_quadrature_points;
use smallvec::SmallVec;

/// Coordinates of a point in (up to 3D) reference space
pub type RefPoint = SmallVec<[f64; 3]>;

/// A quadrature rule over the reference element `[0, 1]^dim`
#[derive(Clone, Debug)]
pub struct QuadratureRule {
    dim: usize,
    points: Vec<RefPoint>,
    weights: Vec<f64>,
}

impl QuadratureRule {
    /// Tensor product of `n` Gauss-Legendre points along each direction
    ///
    /// Points are ordered lexicographically with the first coordinate running fastest.
    pub fn tensor_gauss_legendre(dim: usize, n: usize) -> Self {
        assert!(
            (1..=3).contains(&dim),
            "Reference elements must have 1, 2 or 3 dimensions!"
        );
        let (points_1d, weights_1d) = unit_gauss_quadrature_points(n);

        let num_points = n.pow(dim as u32);
        let mut points = Vec::with_capacity(num_points);
        let mut weights = Vec::with_capacity(num_points);

        for q in 0..num_points {
            let mut point = RefPoint::new();
            let mut weight = 1.0;
            let mut rem = q;
            for _ in 0..dim {
                point.push(points_1d[rem % n]);
                weight *= weights_1d[rem % n];
                rem /= n;
            }
            points.push(point);
            weights.push(weight);
        }

        Self {
            dim,
            points,
            weights,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn point(&self, q: usize) -> &[f64] {
        &self.points[q]
    }

    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weights_sum_to_unit_volume() {
        for dim in 1..=3 {
            let rule = QuadratureRule::tensor_gauss_legendre(dim, 3);
            assert_eq!(rule.len(), 3usize.pow(dim as u32));
            assert_relative_eq!(rule.weights().iter().sum::<f64>(), 1.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn integrates_bilinear_monomial() {
        let rule = QuadratureRule::tensor_gauss_legendre(2, 2);
        let integral: f64 = (0..rule.len())
            .map(|q| rule.weight(q) * rule.point(q)[0] * rule.point(q)[1].powi(2))
            .sum();
        assert_relative_eq!(integral, 1.0 / 6.0, epsilon = 1e-14);
    }
}
