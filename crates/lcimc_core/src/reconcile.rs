//! Aligning arrays of different jobs on semantic keys
//!
//! Two jobs over the same entities may number their rows differently. Rows
//! are matched by key against the reference job, never by position.

use std::hash::Hash;

use ndarray::{Array2, Axis};
use rustc_hash::FxHashMap;

use crate::error::ReconciliationError;
use crate::matrix::MatrixKind;
use crate::model::{ActivityKey, FlowKey, IndexDict, ReferenceIndex};

/// Semantic key of one stored matrix position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PositionKey {
    /// (product, activity) in the technosphere
    Technosphere(ActivityKey, ActivityKey),
    /// (flow, activity) in the biosphere
    Biosphere(FlowKey, ActivityKey),
}

/// Bijection from semantic key to local row within one job
#[derive(Debug, Clone)]
pub struct RowIndexMap<K: Eq + Hash> {
    keys: Vec<K>,
    rows: FxHashMap<K, usize>,
}

impl<K: Eq + Hash + Clone> RowIndexMap<K> {
    /// Row `i` belongs to the `i`-th key
    pub fn from_keys(keys: impl IntoIterator<Item = K>) -> Self {
        let keys: Vec<K> = keys.into_iter().collect();
        let rows = keys
            .iter()
            .enumerate()
            .map(|(row, key)| (key.clone(), row))
            .collect();
        Self { keys, rows }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn row(&self, key: &K) -> Option<usize> {
        self.rows.get(key).copied()
    }

    /// Permutation taking this job's rows to the reference ordering
    pub fn permutation_to(
        &self,
        reference: &RowIndexMap<K>,
        job: &str,
        dictionary: &'static str,
    ) -> Result<Permutation, ReconciliationError> {
        let mut source = Vec::with_capacity(reference.len());
        let mut missing = 0;
        for key in &reference.keys {
            match self.row(key) {
                Some(row) => source.push(row),
                None => missing += 1,
            }
        }
        let unexpected = self.len() - source.len();
        if missing > 0 || unexpected > 0 {
            return Err(ReconciliationError::KeySetMismatch {
                job: job.to_string(),
                dictionary,
                missing,
                unexpected,
            });
        }
        Ok(Permutation { source })
    }
}

impl<K: Eq + Hash + Clone> From<&IndexDict<K>> for RowIndexMap<K> {
    fn from(dict: &IndexDict<K>) -> Self {
        Self::from_keys(dict.keys().iter().cloned())
    }
}

/// Position keys of a matrix from its stored (row, col) coordinates
pub fn position_keys(
    kind: MatrixKind,
    coords: &[(usize, usize)],
    index: &ReferenceIndex,
    job: &str,
) -> Result<RowIndexMap<PositionKey>, ReconciliationError> {
    let keys = coords
        .iter()
        .map(|&(row, col)| -> Result<PositionKey, ReconciliationError> {
            let unknown = || ReconciliationError::UnknownPosition {
                job: job.to_string(),
                row,
                col,
            };
            let activity = index.activities.key(col).ok_or_else(unknown)?.clone();
            Ok(match kind {
                MatrixKind::Technosphere => PositionKey::Technosphere(
                    index.products.key(row).ok_or_else(unknown)?.clone(),
                    activity,
                ),
                MatrixKind::Biosphere => PositionKey::Biosphere(
                    index.flows.key(row).ok_or_else(unknown)?.clone(),
                    activity,
                ),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RowIndexMap::from_keys(keys))
}

/// Row reordering: output row `i` is input row `source[i]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    source: Vec<usize>,
}

impl Permutation {
    pub fn identity(len: usize) -> Self {
        Self {
            source: (0..len).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.source.iter().enumerate().all(|(i, &s)| i == s)
    }

    pub fn inverse(&self) -> Self {
        let mut source = vec![0; self.source.len()];
        for (i, &s) in self.source.iter().enumerate() {
            source[s] = i;
        }
        Self { source }
    }

    pub fn apply<T: Clone>(&self, values: &[T]) -> Result<Vec<T>, ReconciliationError> {
        self.check(values.len())?;
        Ok(self.source.iter().map(|&s| values[s].clone()).collect())
    }

    /// Reorder the rows of a (rows x iterations) array
    pub fn apply_rows<A: Clone>(&self, array: &Array2<A>) -> Result<Array2<A>, ReconciliationError> {
        self.check(array.nrows())?;
        if self.is_identity() {
            return Ok(array.clone());
        }
        Ok(array.select(Axis(0), &self.source))
    }

    fn check(&self, found: usize) -> Result<(), ReconciliationError> {
        if found == self.source.len() {
            Ok(())
        } else {
            Err(ReconciliationError::LengthMismatch {
                expected: self.source.len(),
                found,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_permutation_matches_keys() {
        let reference = RowIndexMap::from_keys(["a", "b", "c"]);
        let job = RowIndexMap::from_keys(["c", "a", "b"]);
        let perm = job.permutation_to(&reference, "job", "flows").unwrap();
        // job rows hold values for c, a, b
        let values = vec![3.0, 1.0, 2.0];
        assert_eq!(perm.apply(&values).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(!perm.is_identity());
    }

    #[test]
    fn test_round_trip_reproduces_array() {
        let reference = RowIndexMap::from_keys(["a", "b", "c", "d"]);
        let job = RowIndexMap::from_keys(["d", "b", "a", "c"]);
        let perm = job.permutation_to(&reference, "job", "flows").unwrap();
        let original = array![[1.0f32, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let aligned = perm.apply_rows(&original).unwrap();
        let back = perm.inverse().apply_rows(&aligned).unwrap();
        assert_eq!(back, original);
        assert_eq!(aligned.row(0).to_vec(), vec![3.0, 30.0]);
    }

    #[test]
    fn test_identical_ordering_is_identity() {
        let keys = RowIndexMap::from_keys([1, 2, 3]);
        let perm = keys.permutation_to(&keys, "job", "activities").unwrap();
        assert!(perm.is_identity());
        assert_eq!(perm, Permutation::identity(3));
    }

    #[test]
    fn test_key_set_mismatch() {
        let reference = RowIndexMap::from_keys(["a", "b"]);
        let job = RowIndexMap::from_keys(["a", "x", "y"]);
        let err = job.permutation_to(&reference, "j2", "flows").unwrap_err();
        assert_eq!(
            err,
            ReconciliationError::KeySetMismatch {
                job: "j2".into(),
                dictionary: "flows",
                missing: 1,
                unexpected: 2,
            }
        );
    }

    #[test]
    fn test_wrong_row_count_rejected() {
        let perm = Permutation::identity(3);
        let array = Array2::<f32>::zeros((2, 4));
        assert!(matches!(
            perm.apply_rows(&array),
            Err(ReconciliationError::LengthMismatch { expected: 3, found: 2 })
        ));
    }
}
