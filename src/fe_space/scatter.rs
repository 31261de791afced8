use super::dof_map::ElementDofMap;
use crate::parallel::Backend;

/// Memory layout of a vector-valued field with `vdim` components over `n` DoFs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DofOrdering {
    /// component-major: `c * n + i`
    #[default]
    ByNodes,
    /// DoF-major: `i * vdim + c`
    ByVdim,
}

impl DofOrdering {
    /// Flat index of component `c` of DoF `i`
    #[inline]
    pub fn index(self, i: usize, c: usize, n: usize, vdim: usize) -> usize {
        match self {
            Self::ByNodes => c * n + i,
            Self::ByVdim => i * vdim + c,
        }
    }

    /// Inverse of [DofOrdering::index]: split a flat index into `(i, c)`
    #[inline]
    pub fn split(self, index: usize, n: usize, vdim: usize) -> (usize, usize) {
        match self {
            Self::ByNodes => (index % n, index / n),
            Self::ByVdim => (index / vdim, index % vdim),
        }
    }
}

/// Broadcast a global vector to the element-local (duplicated) numbering
///
/// Every local entry receives the value of its global DoF; each local value is written by exactly one work item.
pub fn global_to_local(
    dofs: &ElementDofMap,
    vdim: usize,
    ordering: DofOrdering,
    backend: Backend,
    global: &[f64],
    local: &mut [f64],
) {
    let n_global = dofs.global_dofs();
    let n_local = dofs.local_size();
    assert_eq!(
        global.len(),
        n_global * vdim,
        "Global vector has the wrong size; cannot scatter to local!"
    );
    assert_eq!(
        local.len(),
        n_local * vdim,
        "Local vector has the wrong size; cannot scatter to local!"
    );

    let map = dofs.map();
    backend.for_each_chunk(local, 1, |index, value| {
        let (lid, c) = ordering.split(index, n_local, vdim);
        value[0] = global[ordering.index(map[lid], c, n_global, vdim)];
    });
}

/// Gather an element-local vector into the global numbering
///
/// Each global value is the sum of its local copies, accumulated in increasing local-entry order
/// by a single work item, so the result does not depend on the backend.
pub fn local_to_global(
    dofs: &ElementDofMap,
    vdim: usize,
    ordering: DofOrdering,
    backend: Backend,
    local: &[f64],
    global: &mut [f64],
) {
    let n_global = dofs.global_dofs();
    let n_local = dofs.local_size();
    assert_eq!(
        local.len(),
        n_local * vdim,
        "Local vector has the wrong size; cannot gather to global!"
    );
    assert_eq!(
        global.len(),
        n_global * vdim,
        "Global vector has the wrong size; cannot gather to global!"
    );

    backend.for_each_chunk(global, 1, |index, value| {
        let (gid, c) = ordering.split(index, n_global, vdim);
        value[0] = dofs
            .bucket(gid)
            .iter()
            .map(|lid| local[ordering.index(*lid, c, n_local, vdim)])
            .sum();
    });
}
