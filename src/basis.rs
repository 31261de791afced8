use crate::integration::{glq::unit_gauss_quadrature_points, QuadratureRule, RefPoint};
use nalgebra::DMatrix;

/// Shape functions of one reference element
///
/// Local DoFs are numbered in the element's tensor-product (lexicographic) order. Meshes that
/// number their element DoFs differently supply a reordering table alongside the incidence.
pub trait ElementBasis: Send + Sync {
    /// Dimension of the reference element
    fn dim(&self) -> usize;

    /// Polynomial order
    fn order(&self) -> usize;

    /// Number of shape functions
    fn num_dofs(&self) -> usize;

    /// Reference coordinates of the node associated with local DoF `i`
    fn node(&self, i: usize) -> RefPoint;

    /// Evaluate every shape function at a reference point
    fn shape(&self, point: &[f64], values: &mut [f64]);

    /// Evaluate the reference gradient of every shape function (`num_dofs` x `dim`)
    fn grad(&self, point: &[f64], grads: &mut DMatrix<f64>);
}

/// Tensor-product Lagrange basis on `[0, 1]^dim`
#[derive(Clone, Debug)]
pub struct TensorLagrangeBasis {
    dim: usize,
    order: usize,
    nodes_1d: Vec<f64>,
}

impl TensorLagrangeBasis {
    /// Continuous (kinematic) basis with equispaced nodes including the element boundary
    pub fn h1(dim: usize, order: usize) -> Self {
        assert!(order >= 1, "H1 bases must have an order of at least 1!");
        Self::with_nodes(
            dim,
            order,
            (0..=order).map(|i| i as f64 / order as f64).collect(),
        )
    }

    /// Discontinuous (thermodynamic) basis with nodes at the interior Gauss-Legendre points
    pub fn l2(dim: usize, order: usize) -> Self {
        let (nodes, _) = unit_gauss_quadrature_points(order + 1);
        Self::with_nodes(dim, order, nodes)
    }

    fn with_nodes(dim: usize, order: usize, nodes_1d: Vec<f64>) -> Self {
        assert!(
            (1..=3).contains(&dim),
            "Reference elements must have 1, 2 or 3 dimensions!"
        );
        Self {
            dim,
            order,
            nodes_1d,
        }
    }

    pub fn nodes_1d(&self) -> &[f64] {
        &self.nodes_1d
    }

    // split a lexicographic DoF index into per-direction indices
    fn multi_index(&self, i: usize) -> [usize; 3] {
        let n = self.nodes_1d.len();
        let mut idx = [0; 3];
        let mut rem = i;
        for d in idx.iter_mut().take(self.dim) {
            *d = rem % n;
            rem /= n;
        }
        idx
    }

    // 1D values and derivatives along each direction
    fn eval_1d(&self, point: &[f64]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let n = self.nodes_1d.len();
        let mut values = vec![vec![0.0; n]; self.dim];
        let mut derivs = vec![vec![0.0; n]; self.dim];
        for d in 0..self.dim {
            lagrange_1d(&self.nodes_1d, point[d], &mut values[d], &mut derivs[d]);
        }
        (values, derivs)
    }
}

impl ElementBasis for TensorLagrangeBasis {
    fn dim(&self) -> usize {
        self.dim
    }

    fn order(&self) -> usize {
        self.order
    }

    fn num_dofs(&self) -> usize {
        self.nodes_1d.len().pow(self.dim as u32)
    }

    fn node(&self, i: usize) -> RefPoint {
        let idx = self.multi_index(i);
        (0..self.dim).map(|d| self.nodes_1d[idx[d]]).collect()
    }

    fn shape(&self, point: &[f64], values: &mut [f64]) {
        assert_eq!(values.len(), self.num_dofs(), "Shape buffer has the wrong size!");
        let (values_1d, _) = self.eval_1d(point);

        for (i, value) in values.iter_mut().enumerate() {
            let idx = self.multi_index(i);
            *value = (0..self.dim).map(|d| values_1d[d][idx[d]]).product();
        }
    }

    fn grad(&self, point: &[f64], grads: &mut DMatrix<f64>) {
        assert_eq!(
            grads.shape(),
            (self.num_dofs(), self.dim),
            "Gradient buffer has the wrong shape!"
        );
        let (values_1d, derivs_1d) = self.eval_1d(point);

        for i in 0..self.num_dofs() {
            let idx = self.multi_index(i);
            for g in 0..self.dim {
                grads[(i, g)] = (0..self.dim)
                    .map(|d| {
                        if d == g {
                            derivs_1d[d][idx[d]]
                        } else {
                            values_1d[d][idx[d]]
                        }
                    })
                    .product();
            }
        }
    }
}

/// 1D Lagrange polynomials (and their derivatives) through `nodes`, evaluated at `x`
fn lagrange_1d(nodes: &[f64], x: f64, values: &mut [f64], derivs: &mut [f64]) {
    for j in 0..nodes.len() {
        let mut value = 1.0;
        let mut deriv = 0.0;
        for (m, node_m) in nodes.iter().enumerate() {
            if m == j {
                continue;
            }
            let denom = nodes[j] - node_m;
            deriv = deriv * (x - node_m) / denom + value / denom;
            value *= (x - node_m) / denom;
        }
        values[j] = value;
        derivs[j] = deriv;
    }
}

/// Shape function values and reference gradients sampled at every point of a [QuadratureRule]
#[derive(Clone, Debug)]
pub struct ShapeTable {
    /// `num_points` x `num_dofs`
    values: DMatrix<f64>,
    /// one `num_dofs` x `dim` matrix per quadrature point
    grads: Vec<DMatrix<f64>>,
}

impl ShapeTable {
    pub fn new(basis: &dyn ElementBasis, rule: &QuadratureRule) -> Self {
        assert_eq!(
            basis.dim(),
            rule.dim(),
            "Basis and quadrature rule have different dimensions!"
        );
        let nd = basis.num_dofs();
        let mut values = DMatrix::zeros(rule.len(), nd);
        let mut grads = Vec::with_capacity(rule.len());
        let mut buffer = vec![0.0; nd];

        for q in 0..rule.len() {
            basis.shape(rule.point(q), &mut buffer);
            for (i, v) in buffer.iter().enumerate() {
                values[(q, i)] = *v;
            }

            let mut grad = DMatrix::zeros(nd, basis.dim());
            basis.grad(rule.point(q), &mut grad);
            grads.push(grad);
        }

        Self { values, grads }
    }

    pub fn num_points(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_dofs(&self) -> usize {
        self.values.ncols()
    }

    /// Value of shape function `i` at quadrature point `q`
    pub fn value(&self, q: usize, i: usize) -> f64 {
        self.values[(q, i)]
    }

    /// Reference gradients of every shape function at quadrature point `q`
    pub fn grad(&self, q: usize) -> &DMatrix<f64> {
        &self.grads[q]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kronecker_property_at_nodes() {
        for basis in [
            TensorLagrangeBasis::h1(2, 2),
            TensorLagrangeBasis::l2(2, 1),
            TensorLagrangeBasis::h1(3, 1),
        ] {
            let nd = basis.num_dofs();
            let mut values = vec![0.0; nd];
            for i in 0..nd {
                basis.shape(&basis.node(i), &mut values);
                for (j, v) in values.iter().enumerate() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_abs_diff_eq!(*v, expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn partition_of_unity() {
        let basis = TensorLagrangeBasis::h1(2, 3);
        let point = [0.3, 0.85];

        let mut values = vec![0.0; basis.num_dofs()];
        basis.shape(&point, &mut values);
        assert_abs_diff_eq!(values.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        let mut grads = DMatrix::zeros(basis.num_dofs(), 2);
        basis.grad(&point, &mut grads);
        for g in 0..2 {
            assert_abs_diff_eq!(grads.column(g).sum(), 0.0, epsilon = 1e-11);
        }
    }

    #[test]
    fn linear_gradients() {
        let basis = TensorLagrangeBasis::h1(1, 1);
        let mut grads = DMatrix::zeros(2, 1);
        basis.grad(&[0.25], &mut grads);
        assert_abs_diff_eq!(grads[(0, 0)], -1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(grads[(1, 0)], 1.0, epsilon = 1e-15);
    }

    #[test]
    fn piecewise_constant_l2() {
        let basis = TensorLagrangeBasis::l2(2, 0);
        assert_eq!(basis.num_dofs(), 1);
        assert_abs_diff_eq!(basis.node(0)[0], 0.5, epsilon = 1e-14);

        let mut values = vec![0.0; 1];
        basis.shape(&[0.1, 0.9], &mut values);
        assert_eq!(values[0], 1.0);
    }

    #[test]
    fn shape_table_dimensions() {
        let basis = TensorLagrangeBasis::h1(2, 1);
        let rule = QuadratureRule::tensor_gauss_legendre(2, 2);
        let table = ShapeTable::new(&basis, &rule);

        assert_eq!(table.num_points(), 4);
        assert_eq!(table.num_dofs(), 4);
        assert_eq!(table.grad(0).shape(), (4, 2));
        let row_sum: f64 = (0..4).map(|i| table.value(2, i)).sum();
        assert_abs_diff_eq!(row_sum, 1.0, epsilon = 1e-14);
    }
}
