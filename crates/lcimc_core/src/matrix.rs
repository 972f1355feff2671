//! Coordinate-format sparse matrices with a fixed structure
//!
//! The structure (which (row, col) positions exist) is decided once when the
//! matrix is built from the dataset. Sampling and balancing only ever rewrite
//! `data`, so a position index stays valid for the lifetime of a job.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Which of the two system matrices a position refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatrixKind {
    Technosphere,
    Biosphere,
}

impl MatrixKind {
    /// File stem used under `Matrices/`
    pub fn file_stem(self) -> &'static str {
        match self {
            MatrixKind::Technosphere => "A_matrix",
            MatrixKind::Biosphere => "B_matrix",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    nrows: usize,
    ncols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    pub data: Vec<f64>,
    lookup: FxHashMap<(usize, usize), usize>,
}

impl SparseMatrix {
    /// Build an all-zero matrix with one stored position per distinct coordinate
    pub fn with_structure(
        nrows: usize,
        ncols: usize,
        coords: impl IntoIterator<Item = (usize, usize)>,
    ) -> Self {
        let mut matrix = Self {
            nrows,
            ncols,
            rows: Vec::new(),
            cols: Vec::new(),
            data: Vec::new(),
            lookup: FxHashMap::default(),
        };
        for coord in coords {
            matrix.ensure(coord.0, coord.1);
        }
        matrix
    }

    /// Position of (row, col), adding it with value 0 if absent
    pub fn ensure(&mut self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.nrows && col < self.ncols);
        if let Some(&pos) = self.lookup.get(&(row, col)) {
            return pos;
        }
        let pos = self.data.len();
        self.rows.push(row);
        self.cols.push(col);
        self.data.push(0.0);
        self.lookup.insert((row, col), pos);
        pos
    }

    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        self.lookup.get(&(row, col)).copied()
    }

    /// Value at (row, col); absent positions are structural zeros
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.position(row, col).map_or(0.0, |pos| self.data[pos])
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// (row, col) of every stored position, in storage order
    pub fn indices(&self) -> Vec<(usize, usize)> {
        self.rows.iter().copied().zip(self.cols.iter().copied()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.data)
            .map(|((&r, &c), &v)| (r, c, v))
    }

    /// Matrix-vector product `self * x`
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.ncols);
        let mut out = vec![0.0; self.nrows];
        for (r, c, v) in self.iter() {
            out[r] += v * x[c];
        }
        out
    }
}

/// One sampled (or unperturbed) pair of system matrices
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSet {
    pub technosphere: SparseMatrix,
    pub biosphere: SparseMatrix,
}

impl MatrixSet {
    pub fn matrix(&self, kind: MatrixKind) -> &SparseMatrix {
        match kind {
            MatrixKind::Technosphere => &self.technosphere,
            MatrixKind::Biosphere => &self.biosphere,
        }
    }

    pub fn matrix_mut(&mut self, kind: MatrixKind) -> &mut SparseMatrix {
        match kind {
            MatrixKind::Technosphere => &mut self.technosphere,
            MatrixKind::Biosphere => &mut self.biosphere,
        }
    }

    pub fn value(&self, kind: MatrixKind, position: usize) -> f64 {
        self.matrix(kind).data[position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_deduplicates_coordinates() {
        let m = SparseMatrix::with_structure(2, 2, [(0, 0), (1, 0), (0, 0)]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.position(1, 0), Some(1));
        assert_eq!(m.position(1, 1), None);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn test_mul_vec() {
        let mut m = SparseMatrix::with_structure(2, 3, [(0, 0), (0, 2), (1, 1)]);
        m.data = vec![1.0, 2.0, 3.0];
        assert_eq!(m.mul_vec(&[1.0, 1.0, 0.5]), vec![2.0, 3.0]);
    }
}
