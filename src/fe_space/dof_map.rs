use super::{DofMapError, ElementIncidence};
use crate::linalg::sparse_matrix::CsrMatrix;
use crate::parallel::Backend;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Compressed mapping between the element-local (duplicated) and global (unique) DoF numberings
///
/// Local entry `lid = e * local_dofs + d` refers to local DoF `d` (in tensor-product order) of
/// element `e`. The local entries referring to global DoF `g` are stored contiguously in
/// `indices[offsets[g]..offsets[g + 1]]`, in increasing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementDofMap {
    elements: usize,
    local_dofs: usize,
    offsets: Vec<usize>,
    indices: Vec<usize>,
    map: Vec<usize>,
}

impl ElementDofMap {
    /// Build the mapping from an element incidence table
    ///
    /// ```
    /// use lagrangian_hydro::fe_space::{dof_map::ElementDofMap, ElementIncidence};
    /// use lagrangian_hydro::parallel::Backend;
    ///
    /// // two linear 1D elements sharing their middle node
    /// let incidence = ElementIncidence {
    ///     elements: 2,
    ///     local_dofs: 2,
    ///     global_dofs: 3,
    ///     element_map: vec![0, 1, 1, 2],
    ///     dof_map: Vec::new(),
    /// };
    /// let map = ElementDofMap::build(&incidence, Backend::Serial).unwrap();
    ///
    /// assert_eq!(map.offsets(), &[0, 1, 3, 4]);
    /// assert_eq!(map.bucket(1), &[1, 2]);
    /// ```
    pub fn build(incidence: &ElementIncidence, backend: Backend) -> Result<Self, DofMapError> {
        incidence.validate()?;

        let ElementIncidence {
            elements,
            local_dofs,
            global_dofs,
            ..
        } = *incidence;
        let num_local = elements * local_dofs;
        let dof_map = incidence.reordering();

        // flush
        let counts: Vec<AtomicUsize> = (0..=global_dofs).map(|_| AtomicUsize::new(0)).collect();

        // count the local entries referencing each global DoF (shifted up by one)
        backend.for_each_index(num_local, |lid| {
            let gid = incidence.element_map[lid];
            counts[gid + 1].fetch_add(1, Ordering::Relaxed);
        });
        let mut offsets: Vec<usize> = counts.into_iter().map(AtomicUsize::into_inner).collect();

        if let Some(g) = offsets[1..].iter().position(|count| *count == 0) {
            return Err(DofMapError::UnreferencedGlobalDof(g));
        }

        // prefix-sum
        for g in 1..=global_dofs {
            offsets[g] += offsets[g - 1];
        }

        // local entry -> global DoF (elements are independent of one another)
        let mut map = vec![0; num_local];
        backend.for_each_chunk(&mut map, local_dofs, |e, element_entries| {
            for (d, gid) in element_entries.iter_mut().enumerate() {
                *gid = incidence.element_map[e * local_dofs + dof_map[d]];
            }
        });

        // scatter with a self-incrementing cursor; visiting the local entries in order keeps
        // every bucket sorted
        let mut indices = vec![0; num_local];
        for (lid, gid) in map.iter().enumerate() {
            indices[offsets[*gid]] = lid;
            offsets[*gid] += 1;
        }

        // un-shift
        for g in (1..=global_dofs).rev() {
            offsets[g] = offsets[g - 1];
        }
        offsets[0] = 0;

        log::debug!(
            "Built element DoF map: {} elements x {} local DoFs -> {} global DoFs",
            elements,
            local_dofs,
            global_dofs
        );

        Ok(Self {
            elements,
            local_dofs,
            offsets,
            indices,
            map,
        })
    }

    pub fn num_elements(&self) -> usize {
        self.elements
    }

    pub fn local_dofs(&self) -> usize {
        self.local_dofs
    }

    /// Number of element-local entries (`elements * local_dofs`)
    pub fn local_size(&self) -> usize {
        self.map.len()
    }

    pub fn global_dofs(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn map(&self) -> &[usize] {
        &self.map
    }

    /// Local entries referring to global DoF `g`
    pub fn bucket(&self, g: usize) -> &[usize] {
        &self.indices[self.offsets[g]..self.offsets[g + 1]]
    }

    /// Number of local entries referring to global DoF `g`
    pub fn multiplicity(&self, g: usize) -> usize {
        self.offsets[g + 1] - self.offsets[g]
    }

    /// Global DoF of local DoF `d` on element `e`
    pub fn global_dof(&self, e: usize, d: usize) -> usize {
        self.map[e * self.local_dofs + d]
    }

    /// Global DoFs of element `e` in local (tensor-product) order
    pub fn element_dofs(&self, e: usize) -> &[usize] {
        &self.map[e * self.local_dofs..(e + 1) * self.local_dofs]
    }
}

/// A true DoF which is an exact copy of a single global DoF
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirectCopy {
    pub true_dof: usize,
    pub global_dof: usize,
}

/// Collect the rows of a restriction matrix with exactly one nonzero entry
///
/// Returns the direct copies alongside the remaining (general) rows.
pub fn direct_copies(restriction: &CsrMatrix) -> (Vec<DirectCopy>, Vec<usize>) {
    let mut copies = Vec::new();
    let mut general = Vec::new();

    for row in 0..restriction.rows() {
        let (cols, _) = restriction.row(row);
        if cols.len() == 1 {
            copies.push(DirectCopy {
                true_dof: row,
                global_dof: cols[0],
            });
        } else {
            general.push(row);
        }
    }

    (copies, general)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_linear_elements() -> ElementIncidence {
        ElementIncidence {
            elements: 2,
            local_dofs: 2,
            global_dofs: 3,
            element_map: vec![0, 1, 1, 2],
            dof_map: Vec::new(),
        }
    }

    #[test]
    fn shared_interface_dof() {
        let map = ElementDofMap::build(&two_linear_elements(), Backend::Serial).unwrap();

        assert_eq!(map.offsets(), &[0, 1, 3, 4]);
        assert_eq!(map.indices(), &[0, 1, 2, 3]);
        assert_eq!(map.map(), &[0, 1, 1, 2]);
        assert_eq!(map.multiplicity(1), 2);
    }

    #[test]
    fn reordering_is_applied() {
        // a single bilinear quad stored in counter-clockwise (vertex) order
        let incidence = ElementIncidence {
            elements: 1,
            local_dofs: 4,
            global_dofs: 4,
            element_map: vec![0, 1, 3, 2],
            dof_map: vec![0, 1, 3, 2],
        };
        let map = ElementDofMap::build(&incidence, Backend::Serial).unwrap();

        assert_eq!(map.element_dofs(0), &[0, 1, 2, 3]);
        assert_eq!(map.bucket(2), &[2]);
    }

    #[test]
    fn buckets_are_sorted_and_complete() {
        // 3x3 grid of bilinear elements on a 4x4 node grid
        let mut element_map = Vec::new();
        for ey in 0..3 {
            for ex in 0..3 {
                let n0 = ex + 4 * ey;
                element_map.extend([n0, n0 + 1, n0 + 4, n0 + 5]);
            }
        }
        let incidence = ElementIncidence {
            elements: 9,
            local_dofs: 4,
            global_dofs: 16,
            element_map,
            dof_map: Vec::new(),
        };
        let map = ElementDofMap::build(&incidence, Backend::Threaded).unwrap();

        assert_eq!(map.offsets()[16], 36);
        for g in 0..16 {
            let bucket = map.bucket(g);
            assert!(bucket.windows(2).all(|w| w[0] < w[1]));
            assert!(bucket.iter().all(|lid| map.map()[*lid] == g));
        }
        // the center nodes are shared by four elements
        assert_eq!(map.multiplicity(5), 4);
        assert_eq!(map.multiplicity(0), 1);
    }

    #[test]
    fn backends_agree() {
        let incidence = ElementIncidence {
            elements: 50,
            local_dofs: 3,
            global_dofs: 101,
            element_map: (0..50).flat_map(|e| [2 * e, 2 * e + 1, 2 * e + 2]).collect(),
            dof_map: vec![0, 2, 1],
        };

        assert_eq!(
            ElementDofMap::build(&incidence, Backend::Serial).unwrap(),
            ElementDofMap::build(&incidence, Backend::Threaded).unwrap()
        );
    }

    #[test]
    fn malformed_incidence() {
        let mut bad_length = two_linear_elements();
        bad_length.element_map.pop();
        assert_eq!(
            ElementDofMap::build(&bad_length, Backend::Serial),
            Err(DofMapError::IncidenceLength {
                expected: 4,
                received: 3
            })
        );

        let mut out_of_range = two_linear_elements();
        out_of_range.element_map[3] = 3;
        assert!(matches!(
            ElementDofMap::build(&out_of_range, Backend::Serial),
            Err(DofMapError::GlobalDofOutOfRange { .. })
        ));

        let mut orphan = two_linear_elements();
        orphan.global_dofs = 4;
        assert_eq!(
            ElementDofMap::build(&orphan, Backend::Serial),
            Err(DofMapError::UnreferencedGlobalDof(3))
        );

        let mut bad_perm = two_linear_elements();
        bad_perm.dof_map = vec![1, 1];
        assert_eq!(
            ElementDofMap::build(&bad_perm, Backend::Serial),
            Err(DofMapError::InvalidReordering)
        );

        let mut empty = two_linear_elements();
        empty.local_dofs = 0;
        empty.element_map.clear();
        assert_eq!(
            ElementDofMap::build(&empty, Backend::Serial),
            Err(DofMapError::NoLocalDofs)
        );
    }

    #[test]
    fn direct_copy_rows() {
        let r = CsrMatrix::from_triplets(
            3,
            4,
            vec![([0, 0], 1.0), ([1, 1], 0.5), ([1, 3], 0.5), ([2, 2], 1.0)],
        );
        let (copies, general) = direct_copies(&r);

        assert_eq!(
            copies,
            vec![
                DirectCopy {
                    true_dof: 0,
                    global_dof: 0
                },
                DirectCopy {
                    true_dof: 2,
                    global_dof: 2
                },
            ]
        );
        assert_eq!(general, vec![1]);
    }
}
