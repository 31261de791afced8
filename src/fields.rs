use crate::basis::ElementBasis;
use crate::fe_space::FiniteElementSpace;
use crate::mesh::CartesianMesh;

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use std::collections::BTreeMap;
#[cfg(feature = "json_export")]
use std::{fs::File, io::BufWriter};

/// Interpolate a vector function at the H1 nodes of a [CartesianMesh] (component-major layout)
pub fn interpolate_h1_vector<F>(mesh: &CartesianMesh, order: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64], &mut [f64]),
{
    let dim = mesh.dim();
    let num_nodes = mesh.num_h1_nodes(order);
    let coords = mesh.node_coordinates(order);

    let mut values = vec![0.0; dim * num_nodes];
    let mut point = vec![0.0; dim];
    let mut value = vec![0.0; dim];
    for g in 0..num_nodes {
        for d in 0..dim {
            point[d] = coords[d * num_nodes + g];
        }
        f(&point, &mut value);
        for d in 0..dim {
            values[d * num_nodes + g] = value[d];
        }
    }

    values
}

/// Interpolate a scalar function at the nodes of a discontinuous space, returning its true DoFs
pub fn interpolate_l2<F>(
    space: &FiniteElementSpace,
    basis: &dyn ElementBasis,
    mesh: &CartesianMesh,
    f: F,
) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut local = vec![0.0; space.local_size()];
    for z in 0..space.num_elements() {
        for k in 0..basis.num_dofs() {
            let x = mesh.map_reference_point(z, &basis.node(k));
            local[space.local_index(0, z, k)] = f(&x);
        }
    }

    let mut global = vec![0.0; space.global_size()];
    space.local_to_global(&local, &mut global);
    let mut true_dofs = vec![0.0; space.true_size()];
    space.restrict(&global, &mut true_dofs);
    true_dofs
}

/// A named collection of nodal fields
#[derive(Clone, Debug, Default)]
pub struct FieldSet {
    quantities: BTreeMap<String, Vec<f64>>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a quantity
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.quantities.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.quantities.get(name).map(|values| values.as_slice())
    }

    pub fn len(&self) -> usize {
        self.quantities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantities.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.quantities.keys().map(|name| name.as_str())
    }

    /// Print every quantity to a JSON file specified by path.
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        let mut fields_object = object! {};
        for (name, values) in self.quantities.iter() {
            fields_object[name.as_str()] = JsonValue::from(values.clone());
        }
        let export = object! {
            "Fields": fields_object,
        };
        export.write_pretty(&mut w, 4)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::TensorLagrangeBasis;
    use crate::fe_space::scatter::DofOrdering;
    use crate::parallel::Backend;

    #[test]
    fn h1_interpolation_layout() {
        let mesh = CartesianMesh::unit(&[2, 1]).unwrap();
        let values = interpolate_h1_vector(&mesh, 1, |x, v| {
            v[0] = x[0];
            v[1] = 2.0 * x[1];
        });
        assert_eq!(values, vec![0.0, 0.5, 1.0, 0.0, 0.5, 1.0, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn l2_interpolation_of_linear_function() {
        let mesh = CartesianMesh::unit(&[2]).unwrap();
        let basis = TensorLagrangeBasis::l2(1, 1);
        let space = FiniteElementSpace::serial(
            &mesh.l2_incidence(1),
            1,
            DofOrdering::ByNodes,
            vec![],
            Backend::Serial,
        )
        .unwrap();

        let values = interpolate_l2(&space, &basis, &mesh, |x| 4.0 * x[0]);
        let nodes = basis.nodes_1d();
        let expected: Vec<f64> = (0..2)
            .flat_map(|z| nodes.iter().map(move |n| 4.0 * 0.5 * (z as f64 + n)))
            .collect();
        for (v, e) in values.iter().zip(expected.iter()) {
            assert!((v - e).abs() < 1e-14);
        }
    }

    #[cfg(feature = "json_export")]
    #[test]
    fn export_fields() {
        let mut fields = FieldSet::new();
        fields.insert("density", vec![1.0, 0.125]);
        fields.insert("energy", vec![2.5, 2.0]);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.names().collect::<Vec<_>>(), vec!["density", "energy"]);

        let path = std::env::temp_dir().join("lagrangian_hydro_fields.json");
        fields.export_to_json(path.to_str().unwrap()).unwrap();

        let parsed = json::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["Fields"]["density"][1].as_f64(), Some(0.125));
    }
}
