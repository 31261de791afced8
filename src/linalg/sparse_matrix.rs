use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use bytes::{BufMut, BytesMut};
use nalgebra::DMatrix;

/// PETSc's class id for `Mat` objects in binary files
const PETSC_MAT_CLASSID: i32 = 1211216;

/// Wrapper around a BTreeMap to accumulate square-symmetric matrices in a sparse data structure
///
/// Used to sum element contributions (mass matrices) before compressing them into a [CsrMatrix].
#[derive(Clone)]
pub struct SparseMatrix {
    /// Size of the square matrix
    pub dimension: usize,
    /// Matrix Entries (upper triangle)
    entries: BTreeMap<[u32; 2], f64>,
}

impl SparseMatrix {
    pub fn new(dimension: usize) -> Self {
        assert!(
            dimension <= (u32::MAX as usize),
            "Matrix Dimension cannot exceed the size of a u32!"
        );

        Self {
            dimension,
            entries: BTreeMap::new(),
        }
    }

    /// Number of entries in the full (upper and lower) matrix
    pub fn num_entries(&self) -> usize {
        let num_diag = self.entries.keys().filter(|[i, j]| i == j).count();
        2 * self.entries.len() - num_diag
    }

    /// Insert a value into the matrix. Assumes symmetry: row/col order does not matter.
    pub fn insert(&mut self, [row_idx, col_idx]: [usize; 2], value: f64) {
        let coordinates = self.upper_coordinates(row_idx, col_idx);
        self.entries
            .entry(coordinates)
            .and_modify(|current_value| *current_value += value)
            .or_insert(value);
    }

    /// Insert a group of entries
    pub fn insert_group(&mut self, mut entry_group: Vec<([usize; 2], f64)>) {
        for ([r, c], value) in entry_group.drain(0..) {
            self.insert([r, c], value);
        }
    }

    fn upper_coordinates(&self, row_idx: usize, col_idx: usize) -> [u32; 2] {
        assert!(
            row_idx < self.dimension,
            "row_idx exceeded matrix dimension; cannot insert value!"
        );
        assert!(
            col_idx < self.dimension,
            "col_idx exceeded matrix dimension; cannot insert value!"
        );

        // both indices are bounded by `dimension`, which fits in a u32
        if row_idx <= col_idx {
            [row_idx as u32, col_idx as u32]
        } else {
            [col_idx as u32, row_idx as u32]
        }
    }

    // Remove the entries from the matrix, replacing them with an empty BTreeMap.
    fn take_entries(&mut self) -> BTreeMap<[u32; 2], f64> {
        std::mem::take(&mut self.entries)
    }

    /// Consume the entries from another sparse matrix leaving it empty.
    pub fn consume_matrix(&mut self, other: &mut Self) {
        assert!(
            self.dimension == other.dimension,
            "Sparse Matrices have different dimensions; cannot consume matrix!"
        );
        let new_entries = other.take_entries();

        for (coordinates, value) in new_entries.iter() {
            self.entries
                .entry(*coordinates)
                .and_modify(|current_value| *current_value += *value)
                .or_insert(*value);
        }
    }

    /// Iterate over the upper triangle of the matrix.
    pub fn iter_upper_tri(&self) -> impl Iterator<Item = ([usize; 2], f64)> + '_ {
        self.entries
            .iter()
            .map(|(coords, value)| ([coords[0] as usize, coords[1] as usize], *value))
    }
}

impl From<SparseMatrix> for CsrMatrix {
    fn from(sm: SparseMatrix) -> Self {
        let mut full_entries = Vec::with_capacity(sm.num_entries());
        for ([r, c], v) in sm.iter_upper_tri() {
            full_entries.push(([r, c], v));
            if r != c {
                full_entries.push(([c, r], v));
            }
        }

        CsrMatrix::from_triplets(sm.dimension, sm.dimension, full_entries)
    }
}

/// Compressed Sparse Row matrix
///
/// `row_offsets[r]..row_offsets[r + 1]` indexes the (column-sorted) entries of row `r`.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Build a matrix from a list of `([row, col], value)` entries. Duplicate entries are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut entries: Vec<([usize; 2], f64)>) -> Self {
        for ([r, c], _) in entries.iter() {
            assert!(
                *r < rows && *c < cols,
                "Entry ({}, {}) exceeded matrix dimensions ({}x{}); cannot build CSR matrix!",
                r,
                c,
                rows,
                cols
            );
        }

        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut row_offsets = vec![0; rows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(entries.len());
        let mut values: Vec<f64> = Vec::with_capacity(entries.len());
        let mut last: Option<[usize; 2]> = None;

        for ([r, c], v) in entries.drain(0..) {
            if last == Some([r, c]) {
                if let Some(prev) = values.last_mut() {
                    *prev += v;
                }
            } else {
                row_offsets[r + 1] += 1;
                col_indices.push(c);
                values.push(v);
                last = Some([r, c]);
            }
        }

        for r in 0..rows {
            row_offsets[r + 1] += row_offsets[r];
        }

        Self {
            rows,
            cols,
            row_offsets,
            col_indices,
            values,
        }
    }

    pub fn identity(n: usize) -> Self {
        Self {
            rows: n,
            cols: n,
            row_offsets: (0..=n).collect(),
            col_indices: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row_nnz(&self, row: usize) -> usize {
        self.row_offsets[row + 1] - self.row_offsets[row]
    }

    /// Column indices and values of one row
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        (&self.col_indices[range.clone()], &self.values[range])
    }

    /// Iterate over the `(column, value)` pairs of one row
    pub fn row_iter(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let (cols, vals) = self.row(row);
        cols.iter().cloned().zip(vals.iter().cloned())
    }

    /// y = A x
    pub fn mult(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.cols, "Input vector does not match matrix width!");
        assert_eq!(y.len(), self.rows, "Output vector does not match matrix height!");

        for (r, y_r) in y.iter_mut().enumerate() {
            *y_r = self.row_iter(r).map(|(c, v)| v * x[c]).sum();
        }
    }

    /// y = A^T x
    pub fn mult_transpose(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.rows, "Input vector does not match matrix height!");
        assert_eq!(y.len(), self.cols, "Output vector does not match matrix width!");

        y.iter_mut().for_each(|y_c| *y_c = 0.0);
        for (r, x_r) in x.iter().enumerate() {
            for (c, v) in self.row_iter(r) {
                y[c] += v * x_r;
            }
        }
    }

    /// Zero the rows and columns of the listed (square) DoFs and place a one on their diagonal
    pub fn eliminate_rows_cols(&self, dofs: &[usize]) -> Self {
        assert_eq!(
            self.rows, self.cols,
            "Only square matrices support row/column elimination!"
        );

        let mut eliminated = vec![false; self.rows];
        for &d in dofs {
            eliminated[d] = true;
        }

        let mut entries: Vec<([usize; 2], f64)> = Vec::with_capacity(self.nnz());
        for r in 0..self.rows {
            if eliminated[r] {
                entries.push(([r, r], 1.0));
                continue;
            }
            entries.extend(
                self.row_iter(r)
                    .filter(|(c, _)| !eliminated[*c])
                    .map(|(c, v)| ([r, c], v)),
            );
        }

        Self::from_triplets(self.rows, self.cols, entries)
    }

    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.rows, self.cols);
        for r in 0..self.rows {
            for (c, v) in self.row_iter(r) {
                dense[(r, c)] += v;
            }
        }
        dense
    }

    /// Write the matrix in PETSc's binary `Mat` format so it can be handed to an external solver
    pub fn write_petsc_binary(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);

        // header
        let mut header_buf = BytesMut::with_capacity(16);
        header_buf.put_i32(PETSC_MAT_CLASSID);
        header_buf.put_i32(self.rows as i32);
        header_buf.put_i32(self.cols as i32);
        header_buf.put_i32(self.nnz() as i32);
        writer.write_all(header_buf.as_ref())?;

        // num-non-zero entries on each row
        let mut rnnz_buf = BytesMut::with_capacity(self.rows * 4);
        for r in 0..self.rows {
            rnnz_buf.put_i32(self.row_nnz(r) as i32);
        }
        writer.write_all(rnnz_buf.as_ref())?;

        // column indices of non-zero entries
        let mut j_buf = BytesMut::with_capacity(self.nnz() * 4);
        for &j in self.col_indices.iter() {
            j_buf.put_i32(j as i32);
        }
        writer.write_all(j_buf.as_ref())?;

        // non-zero entries
        let mut a_buf = BytesMut::with_capacity(self.nnz() * 8);
        for &a in self.values.iter() {
            a_buf.put_f64(a);
        }
        writer.write_all(a_buf.as_ref())?;

        writer.flush()
    }
}

impl From<&CsrMatrix> for DMatrix<f64> {
    fn from(csr: &CsrMatrix) -> Self {
        csr.to_dense()
    }
}
