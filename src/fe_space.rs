/// Construction of the compressed element-local <-> global DoF mapping
pub mod dof_map;
/// Broadcast (global -> local) and bucket summation (local -> global) kernels
pub mod scatter;
/// True <-> global DoF transfer and the partition-aware DoF space
pub mod transfer;

use dof_map::{DirectCopy, ElementDofMap};
use scatter::DofOrdering;
use transfer::{ParallelDofSpace, ProlongationOperator, RestrictionOperator, SerialDofSpace};

use crate::parallel::Backend;
use std::sync::Arc;
use thiserror::Error;

/// Element -> global DoF incidence, as provided by a mesh
///
/// `element_map[e * local_dofs + k]` is the global DoF of the `k`th DoF of element `e` in the mesh's
/// native local order. `dof_map[d]` is the native position of the `d`th DoF in tensor-product order
/// (an empty `dof_map` means the two orders coincide).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementIncidence {
    pub elements: usize,
    pub local_dofs: usize,
    pub global_dofs: usize,
    pub element_map: Vec<usize>,
    pub dof_map: Vec<usize>,
}

impl ElementIncidence {
    /// Check the structural preconditions of the DoF map builder
    pub fn validate(&self) -> Result<(), DofMapError> {
        if self.local_dofs == 0 {
            return Err(DofMapError::NoLocalDofs);
        }

        let expected = self.elements * self.local_dofs;
        if self.element_map.len() != expected {
            return Err(DofMapError::IncidenceLength {
                expected,
                received: self.element_map.len(),
            });
        }

        if let Some((entry, gid)) = self
            .element_map
            .iter()
            .enumerate()
            .find(|(_, gid)| **gid >= self.global_dofs)
        {
            return Err(DofMapError::GlobalDofOutOfRange {
                entry,
                gid: *gid,
                global_dofs: self.global_dofs,
            });
        }

        if !self.dof_map.is_empty() {
            let mut seen = vec![false; self.local_dofs];
            if self.dof_map.len() != self.local_dofs {
                return Err(DofMapError::InvalidReordering);
            }
            for &k in self.dof_map.iter() {
                if k >= self.local_dofs || seen[k] {
                    return Err(DofMapError::InvalidReordering);
                }
                seen[k] = true;
            }
        }

        Ok(())
    }

    /// The tensor-product -> native reordering (identity when none was supplied)
    pub fn reordering(&self) -> Vec<usize> {
        if self.dof_map.is_empty() {
            (0..self.local_dofs).collect()
        } else {
            self.dof_map.clone()
        }
    }
}

/// A (possibly vector valued) finite element space over a set of elements
///
/// Owns the mapping between its three numberings:
/// * **true** DoFs: the unique unknowns owned by this partition
/// * **global** DoFs: every DoF touched by the local elements
/// * **local** entries: one copy of each global DoF per element that references it
pub struct FiniteElementSpace {
    dofs: ElementDofMap,
    vdim: usize,
    ordering: DofOrdering,
    backend: Backend,
    dof_space: Arc<dyn ParallelDofSpace>,
    restriction: RestrictionOperator,
    prolongation: ProlongationOperator,
}

impl FiniteElementSpace {
    pub fn new(
        incidence: &ElementIncidence,
        vdim: usize,
        ordering: DofOrdering,
        dof_space: Arc<dyn ParallelDofSpace>,
        backend: Backend,
    ) -> Result<Self, DofMapError> {
        if vdim == 0 {
            return Err(DofMapError::InvalidVectorDimension);
        }

        let dofs = ElementDofMap::build(incidence, backend)?;
        let expected = dofs.global_dofs() * vdim;
        if dof_space.global_size() != expected {
            return Err(DofMapError::SpaceSizeMismatch {
                expected,
                received: dof_space.global_size(),
            });
        }

        let (r, p) = (dof_space.restriction(), dof_space.prolongation());
        if (r.rows(), r.cols()) != (dof_space.true_size(), expected)
            || (p.rows(), p.cols()) != (expected, dof_space.true_size())
        {
            return Err(DofMapError::TransferShape);
        }

        let restriction = RestrictionOperator::new(r.clone());
        let prolongation = ProlongationOperator::new(p.clone(), restriction.direct_copies());

        log::debug!(
            "Finite element space: {} true / {} global / {} local entries (vdim = {}, {} general prolongation rows)",
            dof_space.true_size(),
            expected,
            dofs.local_size() * vdim,
            vdim,
            prolongation.num_general_rows(),
        );

        Ok(Self {
            dofs,
            vdim,
            ordering,
            backend,
            dof_space,
            restriction,
            prolongation,
        })
    }

    /// A single-partition space in which every global DoF is a true DoF
    pub fn serial(
        incidence: &ElementIncidence,
        vdim: usize,
        ordering: DofOrdering,
        essential_true_dofs: Vec<usize>,
        backend: Backend,
    ) -> Result<Self, DofMapError> {
        let dof_space = SerialDofSpace::identity(incidence.global_dofs * vdim, essential_true_dofs);
        Self::new(incidence, vdim, ordering, Arc::new(dof_space), backend)
    }

    pub fn dof_map(&self) -> &ElementDofMap {
        &self.dofs
    }

    pub fn vdim(&self) -> usize {
        self.vdim
    }

    pub fn ordering(&self) -> DofOrdering {
        self.ordering
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn dof_space(&self) -> &dyn ParallelDofSpace {
        self.dof_space.as_ref()
    }

    pub fn num_elements(&self) -> usize {
        self.dofs.num_elements()
    }

    /// Scalar DoFs per element
    pub fn element_dofs(&self) -> usize {
        self.dofs.local_dofs()
    }

    pub fn true_size(&self) -> usize {
        self.dof_space.true_size()
    }

    pub fn global_size(&self) -> usize {
        self.dofs.global_dofs() * self.vdim
    }

    pub fn local_size(&self) -> usize {
        self.dofs.local_size() * self.vdim
    }

    pub fn essential_true_dofs(&self) -> &[usize] {
        self.dof_space.essential_true_dofs()
    }

    pub fn direct_copies(&self) -> &[DirectCopy] {
        self.restriction.direct_copies()
    }

    /// Position of component `c` of local DoF `i` on element `z` in a local vector
    #[inline]
    pub fn local_index(&self, c: usize, z: usize, i: usize) -> usize {
        self.ordering.index(
            z * self.dofs.local_dofs() + i,
            c,
            self.dofs.local_size(),
            self.vdim,
        )
    }

    /// Position of component `c` of global DoF `g` in a global vector
    #[inline]
    pub fn global_index(&self, c: usize, g: usize) -> usize {
        self.ordering.index(g, c, self.dofs.global_dofs(), self.vdim)
    }

    pub fn global_to_local(&self, global: &[f64], local: &mut [f64]) {
        scatter::global_to_local(&self.dofs, self.vdim, self.ordering, self.backend, global, local);
    }

    pub fn local_to_global(&self, local: &[f64], global: &mut [f64]) {
        scatter::local_to_global(&self.dofs, self.vdim, self.ordering, self.backend, local, global);
    }

    /// global = P true_dofs, made consistent across partitions
    pub fn prolong(&self, true_dofs: &[f64], global: &mut [f64]) {
        self.prolongation.mult(true_dofs, global);
        self.dof_space.broadcast(global);
    }

    /// Extract the true DoFs from a (consistent) global vector
    pub fn restrict(&self, global: &[f64], true_dofs: &mut [f64]) {
        self.restriction.mult(global, true_dofs);
    }

    /// Expand a true-DoF vector into the element-local numbering
    pub fn true_to_local(&self, true_dofs: &[f64], local: &mut [f64]) {
        let mut global = vec![0.0; self.global_size()];
        self.prolong(true_dofs, &mut global);
        self.global_to_local(&global, local);
    }

    /// Sum an element-local vector into the true-DoF numbering (the transpose of [Self::true_to_local])
    pub fn local_to_true(&self, local: &[f64], true_dofs: &mut [f64]) {
        let mut global = vec![0.0; self.global_size()];
        self.local_to_global(local, &mut global);
        self.dof_space.reduce(&mut global);
        self.prolongation.mult_transpose(&global, true_dofs);
    }
}

/// Errors raised while building an [ElementDofMap] or a [FiniteElementSpace]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DofMapError {
    #[error("Element map has {received} entries (expected {expected}); cannot build DoF map!")]
    IncidenceLength { expected: usize, received: usize },
    #[error("Local entry {entry} references global DoF {gid} (only {global_dofs} exist); cannot build DoF map!")]
    GlobalDofOutOfRange {
        entry: usize,
        gid: usize,
        global_dofs: usize,
    },
    #[error("Local DoF reordering is not a permutation; cannot build DoF map!")]
    InvalidReordering,
    #[error("Elements must have at least one local DoF; cannot build DoF map!")]
    NoLocalDofs,
    #[error("Global DoF {0} is not referenced by any element; cannot build DoF map!")]
    UnreferencedGlobalDof(usize),
    #[error("Vector dimension must be positive; cannot build finite element space!")]
    InvalidVectorDimension,
    #[error("DoF space has {received} global DoFs (expected {expected}); cannot build finite element space!")]
    SpaceSizeMismatch { expected: usize, received: usize },
    #[error("Restriction/Prolongation shapes do not match the DoF space; cannot build finite element space!")]
    TransferShape,
}
