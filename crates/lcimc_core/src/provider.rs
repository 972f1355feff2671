//! Turning a dataset into the technosphere (A) and biosphere (B) matrices

use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::matrix::{MatrixSet, SparseMatrix};
use crate::model::{Dataset, Exchange, ReferenceIndex, Uncertainty};

/// One exchange as it lands in a matrix.
///
/// The stored value is `sign * amount`; several parameters may share a
/// position, in which case their contributions are summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixParam {
    pub row: usize,
    pub col: usize,
    pub position: usize,
    pub amount: f64,
    pub sign: f64,
    pub uncertainty: Uncertainty,
}

/// Everything the sampling loop needs from the source
#[derive(Debug, Clone)]
pub struct MatrixData {
    pub index: ReferenceIndex,
    /// Unperturbed matrices
    pub matrices: MatrixSet,
    pub technosphere_params: Vec<MatrixParam>,
    pub biosphere_params: Vec<MatrixParam>,
    /// Per stored position: does any parameter there carry uncertainty
    uncertain_technosphere: Vec<bool>,
    uncertain_biosphere: Vec<bool>,
}

impl MatrixData {
    pub fn new(
        index: ReferenceIndex,
        matrices: MatrixSet,
        technosphere_params: Vec<MatrixParam>,
        biosphere_params: Vec<MatrixParam>,
    ) -> Self {
        let uncertain_technosphere =
            uncertain_positions(matrices.technosphere.nnz(), &technosphere_params);
        let uncertain_biosphere = uncertain_positions(matrices.biosphere.nnz(), &biosphere_params);
        Self {
            index,
            matrices,
            technosphere_params,
            biosphere_params,
            uncertain_technosphere,
            uncertain_biosphere,
        }
    }

    /// Whether any parameter stored at `position` of the technosphere carries uncertainty
    pub fn technosphere_uncertain(&self, position: usize) -> bool {
        self.uncertain_technosphere.get(position).copied().unwrap_or(false)
    }

    pub fn biosphere_uncertain(&self, position: usize) -> bool {
        self.uncertain_biosphere.get(position).copied().unwrap_or(false)
    }
}

fn uncertain_positions(nnz: usize, params: &[MatrixParam]) -> Vec<bool> {
    let mut flags = vec![false; nnz];
    for p in params.iter().filter(|p| !p.uncertainty.is_static()) {
        if let Some(flag) = flags.get_mut(p.position) {
            *flag = true;
        }
    }
    flags
}

/// Source of ready-made matrices and canonical index dictionaries
pub trait MatrixProvider {
    fn load_matrices(&self) -> Result<MatrixData, LookupError>;
}

struct PendingParam {
    row: usize,
    col: usize,
    amount: f64,
    sign: f64,
    uncertainty: Uncertainty,
}

impl MatrixProvider for Dataset {
    /// Indices follow declaration order: activities (and their reference
    /// products) in the order listed, flows in the order listed.
    fn load_matrices(&self) -> Result<MatrixData, LookupError> {
        let mut index = ReferenceIndex::default();
        for act in &self.activities {
            if index.activities.contains(&act.key) {
                return Err(LookupError::DuplicateActivity(act.key.clone()));
            }
            index.activities.insert(act.key.clone());
            index.products.insert(act.key.clone());
        }
        for flow in &self.flows {
            if index.flows.contains(&flow.key) {
                return Err(LookupError::DuplicateFlow(flow.key.clone()));
            }
            index.flows.insert(flow.key.clone());
        }

        let mut tech = Vec::new();
        let mut bio = Vec::new();
        for (col, act) in self.activities.iter().enumerate() {
            for exc in &act.exchanges {
                match exc {
                    Exchange::Technosphere {
                        input,
                        amount,
                        uncertainty,
                    } => {
                        let row = index
                            .products
                            .get(input)
                            .ok_or_else(|| LookupError::ActivityNotFound(input.clone()))?;
                        tech.push(PendingParam {
                            row,
                            col,
                            amount: *amount,
                            sign: -1.0,
                            uncertainty: uncertainty.clone(),
                        });
                    }
                    Exchange::Production {
                        input,
                        amount,
                        uncertainty,
                    } => {
                        if input != &act.key {
                            return Err(LookupError::ForeignProduction {
                                activity: act.key.clone(),
                                product: input.clone(),
                            });
                        }
                        tech.push(PendingParam {
                            row: col,
                            col,
                            amount: *amount,
                            sign: 1.0,
                            uncertainty: uncertainty.clone(),
                        });
                    }
                    Exchange::Biosphere {
                        input,
                        amount,
                        uncertainty,
                    } => {
                        let row = index
                            .flows
                            .get(input)
                            .ok_or_else(|| LookupError::FlowNotFound(input.clone()))?;
                        bio.push(PendingParam {
                            row,
                            col,
                            amount: *amount,
                            sign: 1.0,
                            uncertainty: uncertainty.clone(),
                        });
                    }
                }
            }
            if !act.has_production() {
                tech.push(PendingParam {
                    row: col,
                    col,
                    amount: 1.0,
                    sign: 1.0,
                    uncertainty: Uncertainty::NoUncertainty,
                });
            }
        }

        let n = index.activities.len();
        let (technosphere, technosphere_params) = assemble(n, n, tech);
        let (biosphere, biosphere_params) = assemble(index.flows.len(), n, bio);

        Ok(MatrixData::new(
            index,
            MatrixSet {
                technosphere,
                biosphere,
            },
            technosphere_params,
            biosphere_params,
        ))
    }
}

fn assemble(
    nrows: usize,
    ncols: usize,
    pending: Vec<PendingParam>,
) -> (SparseMatrix, Vec<MatrixParam>) {
    let mut matrix = SparseMatrix::with_structure(nrows, ncols, std::iter::empty());
    let params = pending
        .into_iter()
        .map(|p| {
            let position = matrix.ensure(p.row, p.col);
            matrix.data[position] += p.sign * p.amount;
            MatrixParam {
                row: p.row,
                col: p.col,
                position,
                amount: p.amount,
                sign: p.sign,
                uncertainty: p.uncertainty,
            }
        })
        .collect();
    (matrix, params)
}
