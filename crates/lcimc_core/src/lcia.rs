//! Impact scores from merged inventory arrays

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, PipelineError};
use crate::model::{FlowKey, IndexDict, OutputKind};
use crate::store::{
    BIO_DICT, LCIA_DIR, REFERENCE_DIR, list_arrays, read_array, read_json, write_array_once,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterizationFactor {
    pub flow: FlowKey,
    pub factor: f64,
}

/// A named set of characterization factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterizationMethod {
    pub name: String,
    pub factors: Vec<CharacterizationFactor>,
}

impl CharacterizationMethod {
    /// Folder name of the method's scores
    pub fn dir_name(&self) -> String {
        method_dir_name(&self.name)
    }
}

/// Replace every character that is unsafe in a folder name
pub fn method_dir_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "method".to_string()
    } else {
        cleaned
    }
}

/// One score per iteration column of a (flows x iterations) inventory array.
///
/// Factors for flows absent from `bio_index` contribute nothing.
pub fn score_array(
    inventory: &Array2<f32>,
    bio_index: &IndexDict<FlowKey>,
    method: &CharacterizationMethod,
) -> Array1<f32> {
    let mut scores = Array1::<f64>::zeros(inventory.ncols());
    for cf in &method.factors {
        let Some(row) = bio_index.get(&cf.flow) else {
            tracing::debug!(flow = %cf.flow, method = %method.name, "flow not in inventory");
            continue;
        };
        if row >= inventory.nrows() {
            continue;
        }
        for (score, &amount) in scores.iter_mut().zip(inventory.row(row)) {
            *score += cf.factor * amount as f64;
        }
    }
    scores.mapv(|s| s as f32)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub method_dir: PathBuf,
    pub written: usize,
    pub skipped: usize,
}

/// Score every merged inventory array of a results directory
pub fn score_results(
    results_dir: &Path,
    method: &CharacterizationMethod,
) -> Result<ScoreSummary, PipelineError> {
    let inventory_dir = results_dir.join(OutputKind::Inventory.dir_name());
    if !inventory_dir.is_dir() {
        return Err(ConfigurationError::MissingResults(inventory_dir).into());
    }
    let bio_index: IndexDict<FlowKey> =
        read_json(&results_dir.join(REFERENCE_DIR).join(BIO_DICT))?;
    let method_dir = results_dir.join(LCIA_DIR).join(method.dir_name());

    let mut summary = ScoreSummary {
        method_dir: method_dir.clone(),
        written: 0,
        skipped: 0,
    };
    for stem in list_arrays(&inventory_dir)? {
        let target = method_dir.join(format!("{stem}.npy"));
        if target.exists() {
            summary.skipped += 1;
            continue;
        }
        let inventory: Array2<f32> = read_array(&inventory_dir.join(format!("{stem}.npy")))?;
        let scores = score_array(&inventory, &bio_index, method);
        if write_array_once(&target, &scores)? {
            summary.written += 1;
        } else {
            summary.skipped += 1;
        }
    }
    tracing::info!(
        method = %method.name,
        written = summary.written,
        skipped = summary.skipped,
        "impact scores written"
    );
    Ok(summary)
}
