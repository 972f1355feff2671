//! On-disk layout of jobs and results
//!
//! Directory structure:
//! <output_root>/<database>/
//!   jobs/<job_id>/
//!     log.json
//!     common_files/            # manifest, dataset copy, index dictionaries
//!     iteration_<w>-<i>/
//!       Supply/<code>.npy
//!       Inventory/<code>.npy
//!       Matrices/{A_matrix,B_matrix}.npy
//!       .complete
//!     concatenated_arrays/{Inventory,Supply,Matrices}/ sources.json
//!   results/
//!     reference_files/ Inventory/ Supply/ Matrices/ LCIA/ log.json sources.json
//!
//! Every file is written next to its destination and renamed into place, so
//! an existing file is a complete file. Array writes never replace an
//! existing file.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use ndarray_npy::{ReadNpyExt, WriteNpyExt, read_npy, write_npy};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::matrix::{MatrixKind, MatrixSet};
use crate::model::{ActivityKey, OutputKind, ReferenceIndex};

pub const LOG_FILE: &str = "log.json";
pub const COMMON_DIR: &str = "common_files";
pub const CONCAT_DIR: &str = "concatenated_arrays";
pub const COMPLETE_MARKER: &str = ".complete";
pub const REFERENCE_DIR: &str = "reference_files";
pub const LCIA_DIR: &str = "LCIA";

pub const MANIFEST: &str = "job_manifest.json";
pub const DATASET: &str = "dataset.json";
pub const ACTIVITY_DICT: &str = "activity_dict.json";
pub const PRODUCT_DICT: &str = "product_dict.json";
pub const BIO_DICT: &str = "bio_dict.json";
pub const TECH_INDICES: &str = "tech_indices.json";
pub const BIO_INDICES: &str = "bio_indices.json";
pub const ACTIVITY_CODES: &str = "activity_codes.json";
pub const BALANCING_DIR: &str = "balancing";
/// Inputs a merged directory was built from
pub const MERGE_SOURCES: &str = "sources.json";

/// Files every complete `common_files` folder holds
pub const COMMON_FILES: [&str; 8] = [
    MANIFEST,
    DATASET,
    ACTIVITY_DICT,
    PRODUCT_DICT,
    BIO_DICT,
    TECH_INDICES,
    BIO_INDICES,
    ACTIVITY_CODES,
];

// ============================================================================
// File primitives
// ============================================================================

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    Ok(())
}

/// Write bytes to a file atomically using write-then-rename.
pub fn atomic_write_bytes(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;
    let temp = temp_path(path);
    fs::write(&temp, content).map_err(|e| StoreError::io(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write_bytes(path, &bytes)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write an array unless the file exists. Returns whether it was written.
pub fn write_array_once<T: WriteNpyExt>(path: &Path, array: &T) -> Result<bool, StoreError> {
    if path.exists() {
        return Ok(false);
    }
    ensure_parent(path)?;
    let temp = temp_path(path);
    write_npy(&temp, array).map_err(|e| StoreError::WriteArray {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::rename(&temp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(true)
}

/// Prepare `dir` for a merge of `sources`.
///
/// A directory recorded as built from exactly `sources` is kept, so an
/// interrupted merge resumes. Anything else (other sources, no record) is
/// removed first and the merge starts over. Returns whether existing
/// content was discarded.
pub fn claim_merge_dir<T>(dir: &Path, sources: &T) -> Result<bool, StoreError>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    let record = dir.join(MERGE_SOURCES);
    if record.is_file() {
        let previous: T = read_json(&record)?;
        if &previous == sources {
            return Ok(false);
        }
    }
    let discarded = dir.exists();
    if discarded {
        fs::remove_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
    }
    write_json(&record, sources)?;
    Ok(discarded)
}

pub fn read_array<T: ReadNpyExt>(path: &Path) -> Result<T, StoreError> {
    read_npy(path).map_err(|e| StoreError::ReadArray {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn copy_dir(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(to).map_err(|e| StoreError::io(to, e))?;
    for entry in fs::read_dir(from).map_err(|e| StoreError::io(from, e))? {
        let entry = entry.map_err(|e| StoreError::io(from, e))?;
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| StoreError::io(&target, e))?;
        }
    }
    Ok(())
}

/// Names of the `.npy` files directly inside `dir`, sorted
pub fn list_arrays(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        if path.is_file()
            && path.extension().is_some_and(|ext| ext == "npy")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// File stem of an activity's result arrays
pub fn array_stem(code: &str) -> String {
    code.replace(['/', '\\'], "_")
}

// ============================================================================
// Layout
// ============================================================================

pub fn jobs_dir(output_root: &Path, database: &str) -> PathBuf {
    output_root.join(database).join("jobs")
}

pub fn results_dir(output_root: &Path, database: &str) -> PathBuf {
    output_root.join(database).join("results")
}

/// Job directories under `jobs_dir`, ordered by name
pub fn list_jobs(jobs_dir: &Path) -> Result<Vec<JobPaths>, StoreError> {
    let mut jobs = Vec::new();
    for entry in fs::read_dir(jobs_dir).map_err(|e| StoreError::io(jobs_dir, e))? {
        let entry = entry.map_err(|e| StoreError::io(jobs_dir, e))?;
        if entry.path().is_dir() {
            jobs.push(JobPaths::new(entry.path()));
        }
    }
    jobs.sort_by(|a, b| a.root.cmp(&b.root));
    Ok(jobs)
}

/// One iteration folder of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationDir {
    pub worker: usize,
    pub index: usize,
    pub path: PathBuf,
}

impl IterationDir {
    pub fn name(worker: usize, index: usize) -> String {
        format!("iteration_{worker}-{index}")
    }

    fn parse(name: &str) -> Option<(usize, usize)> {
        let (worker, index) = name.strip_prefix("iteration_")?.split_once('-')?;
        Some((worker.parse().ok()?, index.parse().ok()?))
    }

    pub fn output_dir(&self, kind: OutputKind) -> PathBuf {
        self.path.join(kind.dir_name())
    }

    pub fn vector_path(&self, kind: OutputKind, code: &str) -> PathBuf {
        self.output_dir(kind).join(format!("{}.npy", array_stem(code)))
    }

    pub fn matrix_path(&self, kind: MatrixKind) -> PathBuf {
        self.output_dir(OutputKind::Matrices)
            .join(format!("{}.npy", kind.file_stem()))
    }

    pub fn is_complete(&self) -> bool {
        self.path.join(COMPLETE_MARKER).is_file()
    }

    pub fn mark_complete(&self) -> Result<(), StoreError> {
        atomic_write_bytes(&self.path.join(COMPLETE_MARKER), b"")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub root: PathBuf,
}

impl JobPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn job_id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn common_dir(&self) -> PathBuf {
        self.root.join(COMMON_DIR)
    }

    pub fn common_file(&self, name: &str) -> PathBuf {
        self.common_dir().join(name)
    }

    pub fn balancing_path(&self, domain: &str) -> PathBuf {
        self.common_dir()
            .join(BALANCING_DIR)
            .join(format!("{domain}.json"))
    }

    pub fn concat_dir(&self, kind: OutputKind) -> PathBuf {
        self.root.join(CONCAT_DIR).join(kind.dir_name())
    }

    pub fn iteration(&self, worker: usize, index: usize) -> IterationDir {
        IterationDir {
            worker,
            index,
            path: self.root.join(IterationDir::name(worker, index)),
        }
    }

    /// Existing iteration folders, ordered by (worker, index)
    pub fn iterations(&self) -> Result<Vec<IterationDir>, StoreError> {
        let mut iterations = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))? {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let name = entry.file_name();
            if let Some((worker, index)) = name.to_str().and_then(IterationDir::parse)
                && entry.path().is_dir()
            {
                iterations.push(IterationDir {
                    worker,
                    index,
                    path: entry.path(),
                });
            }
        }
        iterations.sort_by_key(|it| (it.worker, it.index));
        Ok(iterations)
    }

    pub fn read_index(&self) -> Result<ReferenceIndex, StoreError> {
        read_index_from(&self.common_dir())
    }

    pub fn read_activity_keys(&self) -> Result<Vec<ActivityKey>, StoreError> {
        read_json(&self.common_file(ACTIVITY_CODES))
    }
}

/// Persist the index dictionaries and matrix coordinates of a job
pub fn write_index(
    common_dir: &Path,
    index: &ReferenceIndex,
    matrices: &MatrixSet,
) -> Result<(), StoreError> {
    write_json(&common_dir.join(ACTIVITY_DICT), &index.activities)?;
    write_json(&common_dir.join(PRODUCT_DICT), &index.products)?;
    write_json(&common_dir.join(BIO_DICT), &index.flows)?;
    write_json(
        &common_dir.join(TECH_INDICES),
        &matrices.technosphere.indices(),
    )?;
    write_json(&common_dir.join(BIO_INDICES), &matrices.biosphere.indices())?;
    Ok(())
}

pub fn read_index_from(common_dir: &Path) -> Result<ReferenceIndex, StoreError> {
    Ok(ReferenceIndex {
        activities: read_json(&common_dir.join(ACTIVITY_DICT))?,
        products: read_json(&common_dir.join(PRODUCT_DICT))?,
        flows: read_json(&common_dir.join(BIO_DICT))?,
    })
}

pub fn read_matrix_indices(
    common_dir: &Path,
    kind: MatrixKind,
) -> Result<Vec<(usize, usize)>, StoreError> {
    let name = match kind {
        MatrixKind::Technosphere => TECH_INDICES,
        MatrixKind::Biosphere => BIO_INDICES,
    };
    read_json(&common_dir.join(name))
}

// ============================================================================
// Per-iteration writer
// ============================================================================

fn to_f32(values: &[f64]) -> Array1<f32> {
    values.iter().map(|&v| v as f32).collect()
}

/// Writes the result files of one iteration; files that exist are left alone
pub struct ResultStore<'a> {
    iteration: &'a IterationDir,
}

impl<'a> ResultStore<'a> {
    pub fn new(iteration: &'a IterationDir) -> Self {
        Self { iteration }
    }

    pub fn has_vector(&self, kind: OutputKind, code: &str) -> bool {
        self.iteration.vector_path(kind, code).exists()
    }

    pub fn has_matrices(&self) -> bool {
        self.iteration.matrix_path(MatrixKind::Technosphere).exists()
            && self.iteration.matrix_path(MatrixKind::Biosphere).exists()
    }

    pub fn write_vector(
        &self,
        kind: OutputKind,
        code: &str,
        values: &[f64],
    ) -> Result<bool, StoreError> {
        write_array_once(&self.iteration.vector_path(kind, code), &to_f32(values))
    }

    /// Raw values of A and B in storage order
    pub fn write_matrices(&self, matrices: &MatrixSet) -> Result<(), StoreError> {
        for kind in [MatrixKind::Technosphere, MatrixKind::Biosphere] {
            write_array_once(
                &self.iteration.matrix_path(kind),
                &to_f32(&matrices.matrix(kind).data),
            )?;
        }
        Ok(())
    }

    /// Make sure every selected output folder exists, even with zero files
    pub fn create_dirs(&self, kinds: impl Iterator<Item = OutputKind>) -> Result<(), StoreError> {
        for kind in kinds {
            let dir = self.iteration.output_dir(kind);
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }
}
