use crate::fe_space::ElementIncidence;
use crate::integration::RefPoint;

#[cfg(feature = "json_export")]
use json::{object, JsonValue};
use smallvec::SmallVec;
use std::fs::read_to_string;
#[cfg(feature = "json_export")]
use std::{fs::File, io::BufWriter};
use thiserror::Error;

/// Vertex ordering of the reference element corners (as bit-flags of the upper coordinate in each direction)
const CORNERS_1D: [usize; 2] = [0b0, 0b1];
const CORNERS_2D: [usize; 4] = [0b00, 0b01, 0b11, 0b10];
const CORNERS_3D: [usize; 8] = [
    0b000, 0b001, 0b011, 0b010, 0b100, 0b101, 0b111, 0b110,
];

/// An axis-aligned tensor-product grid of line, quadrilateral or hexahedral zones
///
/// Zones are numbered lexicographically (first direction fastest). The DoFs of each zone are stored
/// in "native" order: the vertices first (counter-clockwise on each face), then the remaining nodes in
/// tensor-product order. The reordering back to tensor-product order is supplied with the incidence.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianMesh {
    elements: SmallVec<[usize; 3]>,
    lower: RefPoint,
    upper: RefPoint,
}

impl CartesianMesh {
    pub fn new(elements: &[usize], lower: &[f64], upper: &[f64]) -> Result<Self, MeshError> {
        let dim = elements.len();
        if !(1..=3).contains(&dim) {
            return Err(MeshError::InvalidDimension(dim));
        }
        if lower.len() != dim || upper.len() != dim {
            return Err(MeshError::InvalidBounds(dim));
        }
        if let Some(axis) = elements.iter().position(|n| *n == 0) {
            return Err(MeshError::NoElements(axis));
        }
        if let Some(axis) = (0..dim).find(|d| !(upper[*d] > lower[*d])) {
            return Err(MeshError::InvalidBounds(axis));
        }

        Ok(Self {
            elements: elements.iter().copied().collect(),
            lower: lower.iter().copied().collect(),
            upper: upper.iter().copied().collect(),
        })
    }

    /// A grid over the unit interval/square/cube
    pub fn unit(elements: &[usize]) -> Result<Self, MeshError> {
        let lower = vec![0.0; elements.len()];
        let upper = vec![1.0; elements.len()];
        Self::new(elements, &lower, &upper)
    }

    /// Load a mesh description from a JSON file
    ///
    /// ```text
    /// {
    ///     "Elements": [8, 4],
    ///     "Lower": [0.0, 0.0],
    ///     "Upper": [2.0, 1.0]
    /// }
    /// ```
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, MeshError> {
        let contents = read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, MeshError> {
        let mesh_json = json::parse(contents).map_err(|err| MeshError::Parse(err.to_string()))?;

        let elements: Vec<usize> = mesh_json["Elements"]
            .members()
            .map(|n| {
                n.as_usize()
                    .ok_or_else(|| MeshError::Parse("Elements must be unsigned integers".into()))
            })
            .collect::<Result<_, _>>()?;
        let parse_bounds = |key: &str| -> Result<Vec<f64>, MeshError> {
            mesh_json[key]
                .members()
                .map(|x| {
                    x.as_f64()
                        .ok_or_else(|| MeshError::Parse(format!("{} must be numbers", key)))
                })
                .collect()
        };

        Self::new(&elements, &parse_bounds("Lower")?, &parse_bounds("Upper")?)
    }

    /// Print the mesh description to a JSON file specified by path.
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        let mesh_object = object! {
            "Elements": JsonValue::from(self.elements.to_vec()),
            "Lower": JsonValue::from(self.lower.to_vec()),
            "Upper": JsonValue::from(self.upper.to_vec()),
        };
        mesh_object.write_pretty(&mut w, 4)?;

        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.elements.len()
    }

    pub fn num_zones(&self) -> usize {
        self.elements.iter().product()
    }

    pub fn elements_per_dim(&self) -> &[usize] {
        &self.elements
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn volume(&self) -> f64 {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(l, u)| u - l)
            .product()
    }

    /// Edge length of every zone along direction `d`
    pub fn zone_size(&self, d: usize) -> f64 {
        (self.upper[d] - self.lower[d]) / self.elements[d] as f64
    }

    /// Per-direction position of zone `z` in the grid
    pub fn zone_position(&self, z: usize) -> [usize; 3] {
        split_lexicographic(z, &self.elements)
    }

    /// Physical coordinates of a reference point in zone `z`
    pub fn map_reference_point(&self, z: usize, point: &[f64]) -> RefPoint {
        let zone = self.zone_position(z);
        (0..self.dim())
            .map(|d| self.lower[d] + (zone[d] as f64 + point[d]) * self.zone_size(d))
            .collect()
    }

    /// Number of H1 nodes along each direction for a given order
    pub fn nodes_per_dim(&self, order: usize) -> SmallVec<[usize; 3]> {
        self.elements.iter().map(|n| n * order + 1).collect()
    }

    pub fn num_h1_nodes(&self, order: usize) -> usize {
        self.nodes_per_dim(order).iter().product()
    }

    /// Continuous (H1) incidence of scalar nodal DoFs
    pub fn h1_incidence(&self, order: usize) -> ElementIncidence {
        assert!(order >= 1, "H1 spaces must have an order of at least 1!");
        let dim = self.dim();
        let nodes = self.nodes_per_dim(order);
        let local_1d: SmallVec<[usize; 3]> = (0..dim).map(|_| order + 1).collect();
        let local_dofs = (order + 1).pow(dim as u32);

        let native = native_order(dim, order);
        let mut dof_map = vec![0; local_dofs];
        for (position, lex) in native.iter().enumerate() {
            dof_map[*lex] = position;
        }

        let mut element_map = Vec::with_capacity(self.num_zones() * local_dofs);
        for z in 0..self.num_zones() {
            let zone = self.zone_position(z);
            for lex in native.iter() {
                let local = split_lexicographic(*lex, &local_1d);
                let node: SmallVec<[usize; 3]> =
                    (0..dim).map(|d| zone[d] * order + local[d]).collect();
                element_map.push(join_lexicographic(&node, &nodes));
            }
        }

        ElementIncidence {
            elements: self.num_zones(),
            local_dofs,
            global_dofs: self.num_h1_nodes(order),
            element_map,
            dof_map,
        }
    }

    /// Discontinuous (L2) incidence: every zone owns its DoFs
    pub fn l2_incidence(&self, order: usize) -> ElementIncidence {
        let local_dofs = (order + 1).pow(self.dim() as u32);
        let total = self.num_zones() * local_dofs;

        ElementIncidence {
            elements: self.num_zones(),
            local_dofs,
            global_dofs: total,
            element_map: (0..total).collect(),
            dof_map: Vec::new(),
        }
    }

    /// Coordinates of every H1 node, component-major (`c * num_nodes + g`)
    pub fn node_coordinates(&self, order: usize) -> Vec<f64> {
        let nodes = self.nodes_per_dim(order);
        let num_nodes = self.num_h1_nodes(order);
        let mut coords = vec![0.0; self.dim() * num_nodes];

        for g in 0..num_nodes {
            let node = split_lexicographic(g, &nodes);
            for d in 0..self.dim() {
                coords[d * num_nodes + g] = self.lower[d]
                    + (self.upper[d] - self.lower[d]) * node[d] as f64 / (nodes[d] - 1) as f64;
            }
        }

        coords
    }

    /// Normal velocity components on the boundary (`c * num_nodes + g`), sorted
    pub fn boundary_essential_dofs(&self, order: usize) -> Vec<usize> {
        let nodes = self.nodes_per_dim(order);
        let num_nodes = self.num_h1_nodes(order);
        let mut essential = Vec::new();

        for d in 0..self.dim() {
            for g in 0..num_nodes {
                let node = split_lexicographic(g, &nodes);
                if node[d] == 0 || node[d] == nodes[d] - 1 {
                    essential.push(d * num_nodes + g);
                }
            }
        }

        essential
    }
}

/// Lexicographic indices of a zone's DoFs in native order: vertices first, then the rest
fn native_order(dim: usize, order: usize) -> Vec<usize> {
    let n = order + 1;
    let corners: &[usize] = match dim {
        1 => &CORNERS_1D,
        2 => &CORNERS_2D,
        _ => &CORNERS_3D,
    };

    let mut native: Vec<usize> = corners
        .iter()
        .map(|bits| {
            (0..dim)
                .map(|d| if bits & (1 << d) != 0 { order * n.pow(d as u32) } else { 0 })
                .sum()
        })
        .collect();
    let mut is_corner = vec![false; n.pow(dim as u32)];
    for lex in native.iter() {
        is_corner[*lex] = true;
    }
    native.extend((0..n.pow(dim as u32)).filter(|lex| !is_corner[*lex]));

    native
}

fn split_lexicographic(index: usize, sizes: &[usize]) -> [usize; 3] {
    let mut idx = [0; 3];
    let mut rem = index;
    for (i, size) in idx.iter_mut().zip(sizes.iter()) {
        *i = rem % size;
        rem /= size;
    }
    idx
}

fn join_lexicographic(idx: &[usize], sizes: &[usize]) -> usize {
    idx.iter()
        .zip(sizes.iter())
        .rev()
        .fold(0, |acc, (i, size)| acc * size + i)
}

/// Errors raised while constructing a [CartesianMesh]
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Meshes must have 1, 2 or 3 dimensions (got {0}); cannot build mesh!")]
    InvalidDimension(usize),
    #[error("Direction {0} has no elements; cannot build mesh!")]
    NoElements(usize),
    #[error("Bounds along direction {0} are invalid; cannot build mesh!")]
    InvalidBounds(usize),
    #[error("Unable to parse mesh description ({0}); cannot build mesh!")]
    Parse(String),
    #[error("Unable to read mesh file; cannot build mesh!")]
    Io(#[from] std::io::Error),
}
