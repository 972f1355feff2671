//! Sparse LU solve of `A x = d` and inventory `B x`
//!
//! The technosphere is factorized once per iteration; every functional unit
//! of that iteration reuses the factorization.

use faer::Mat;
use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::Lu;
use faer::sparse::{SparseColMat, Triplet};

use crate::error::SolverError;
use crate::matrix::SparseMatrix;
use crate::model::ActivityKey;

pub struct SolverStage {
    lu: Lu<usize, f64>,
    dim: usize,
}

impl SolverStage {
    pub fn factorize(technosphere: &SparseMatrix) -> Result<Self, SolverError> {
        let (rows, cols) = (technosphere.nrows(), technosphere.ncols());
        if rows != cols {
            return Err(SolverError::NotSquare { rows, cols });
        }
        let triplets: Vec<Triplet<usize, usize, f64>> = technosphere
            .iter()
            .filter(|(_, _, v)| *v != 0.0)
            .map(|(r, c, v)| Triplet::new(r, c, v))
            .collect();
        let a = SparseColMat::<usize, f64>::try_new_from_triplets(rows, cols, &triplets)
            .map_err(|e| SolverError::Assembly(format!("{e:?}")))?;
        let lu = a
            .as_ref()
            .sp_lu()
            .map_err(|e| SolverError::Factorization(format!("{e:?}")))?;
        Ok(Self { lu, dim: rows })
    }

    /// Supply vector for `amount` of the product at `row`
    pub fn supply(
        &self,
        row: usize,
        amount: f64,
        activity: &ActivityKey,
    ) -> Result<Vec<f64>, SolverError> {
        let mut demand = Mat::<f64>::zeros(self.dim, 1);
        demand[(row, 0)] = amount;
        let x = self.lu.solve(demand.as_ref());
        let supply: Vec<f64> = (0..self.dim).map(|i| x[(i, 0)]).collect();
        if supply.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::Singular {
                activity: activity.clone(),
            });
        }
        Ok(supply)
    }
}

/// Inventory `B x` of one supply vector, one entry per elementary flow
pub fn inventory(biosphere: &SparseMatrix, supply: &[f64]) -> Vec<f64> {
    biosphere.mul_vec(supply)
}
