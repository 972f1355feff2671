//! Concatenating per-iteration arrays, first within a job, then across jobs
//!
//! Result arrays are (rows x iterations): rows follow the (reference) index,
//! columns follow concatenation order. Each merged directory records the
//! iterations or jobs it was built from. While they are unchanged, existing
//! outputs are skipped so a merge can be resumed; once they change, the
//! directory is rebuilt from scratch.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use jiff::Timestamp;
use ndarray::{Array1, Array2, ArrayView2, Axis, concatenate, stack};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{ConfigurationError, PipelineError, ReconciliationError, StoreError};
use crate::matrix::MatrixKind;
use crate::model::{ActivityKey, FlowKey, OutputKind, OutputSelection};
use crate::reconcile::{Permutation, PositionKey, RowIndexMap, position_keys};
use crate::status::{IncludedJob, JobLog, ResultsLog, StageMarker};
use crate::store::{
    CONCAT_DIR, COMMON_DIR, IterationDir, JobPaths, LOG_FILE, MERGE_SOURCES, REFERENCE_DIR,
    array_stem, claim_merge_dir, copy_dir, list_jobs, read_array, read_json, read_matrix_indices,
    write_array_once, write_json,
};

/// Run `task` over every item, in parallel when the feature is enabled.
/// Returns how many items wrote a new file.
fn for_each_item<T, F>(items: &[T], task: F) -> Result<usize, PipelineError>
where
    T: Sync,
    F: Fn(&T) -> Result<bool, PipelineError> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let results: Vec<Result<bool, PipelineError>> = items.par_iter().map(&task).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<bool, PipelineError>> = items.iter().map(&task).collect();

    let mut written = 0;
    for result in results {
        if result? {
            written += 1;
        }
    }
    Ok(written)
}

/// Stack equally long vectors as the columns of a (len x n) array
fn stack_columns(target: &Path, vectors: &[Array1<f32>]) -> Result<Array2<f32>, PipelineError> {
    let Some(first) = vectors.first() else {
        return Ok(Array2::zeros((0, 0)));
    };
    if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
        return Err(ReconciliationError::LengthMismatch {
            expected: first.len(),
            found: bad.len(),
        }
        .into());
    }
    let views: Vec<_> = vectors.iter().map(|v| v.view()).collect();
    stack(Axis(1), &views).map_err(|e| {
        PipelineError::Store(StoreError::WriteArray {
            path: target.to_path_buf(),
            message: e.to_string(),
        })
    })
}

/// One per-iteration file family: its path inside an iteration and its
/// merged file name
#[derive(Debug, Clone)]
enum Family {
    Vector { kind: OutputKind, stem: String },
    Matrix(MatrixKind),
}

impl Family {
    fn kind(&self) -> OutputKind {
        match self {
            Family::Vector { kind, .. } => *kind,
            Family::Matrix(_) => OutputKind::Matrices,
        }
    }

    fn stem(&self) -> String {
        match self {
            Family::Vector { stem, .. } => stem.clone(),
            Family::Matrix(kind) => kind.file_stem().to_string(),
        }
    }

    fn iteration_path(&self, iteration: &IterationDir) -> PathBuf {
        match self {
            Family::Vector { kind, stem } => iteration.vector_path(*kind, stem),
            Family::Matrix(kind) => iteration.matrix_path(*kind),
        }
    }
}

fn families(outputs: &OutputSelection, stems: &[String]) -> Vec<Family> {
    let mut families = Vec::new();
    for kind in outputs.kinds() {
        match kind {
            OutputKind::Matrices => {
                families.push(Family::Matrix(MatrixKind::Technosphere));
                families.push(Family::Matrix(MatrixKind::Biosphere));
            }
            kind => families.extend(stems.iter().map(|stem| Family::Vector {
                kind,
                stem: stem.clone(),
            })),
        }
    }
    families
}

fn merged_path(dir: &Path, family: &Family) -> PathBuf {
    dir.join(family.kind().dir_name())
        .join(format!("{}.npy", family.stem()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithinJobSummary {
    pub job: PathBuf,
    pub iterations: usize,
    pub written: usize,
    pub skipped: usize,
}

/// Merge every iteration of a cleaned job into `concatenated_arrays/`.
///
/// Iterations are concatenated in (worker, index) order. With
/// `delete_raw`, the merged per-iteration folders are removed afterwards.
pub fn merge_within_job(
    job_root: &Path,
    outputs: &OutputSelection,
    delete_raw: bool,
) -> Result<WithinJobSummary, PipelineError> {
    let job = JobPaths::new(job_root);
    let log_path = job.log_path();
    let mut log = JobLog::load(&log_path)?;
    log.require(job_root, StageMarker::Cleaned, outputs)?;

    let iterations = job.iterations()?;
    if iterations.is_empty() {
        return Err(ConfigurationError::EmptyJob(job_root.to_path_buf()).into());
    }
    let stems: Vec<String> = job
        .read_activity_keys()?
        .iter()
        .map(|key| array_stem(&key.code))
        .collect();
    let families = families(outputs, &stems);
    let concat_root = job.root.join(CONCAT_DIR);
    let sources: Vec<String> = iterations
        .iter()
        .map(|it| IterationDir::name(it.worker, it.index))
        .collect();
    if claim_merge_dir(&concat_root, &sources)? {
        tracing::info!(
            job = %job.job_id(),
            "iterations changed since the last merge, rebuilding"
        );
    }

    tracing::info!(
        job = %job.job_id(),
        iterations = iterations.len(),
        files = families.len(),
        "concatenating within job"
    );
    let written = for_each_item(&families, |family| {
        let target = merged_path(&concat_root, family);
        if target.exists() {
            return Ok(false);
        }
        let vectors = iterations
            .iter()
            .map(|it| read_array::<Array1<f32>>(&family.iteration_path(it)))
            .collect::<Result<Vec<_>, _>>()?;
        let merged = stack_columns(&target, &vectors)?;
        Ok(write_array_once(&target, &merged)?)
    })?;

    if delete_raw {
        for iteration in &iterations {
            for kind in outputs.kinds() {
                let dir = iteration.output_dir(kind);
                if dir.exists() {
                    fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
                }
            }
        }
    }

    log.mark(StageMarker::InternallyConcatenated, *outputs);
    log.save(&log_path)?;
    Ok(WithinJobSummary {
        job: job_root.to_path_buf(),
        iterations: iterations.len(),
        written,
        skipped: families.len() - written,
    })
}

/// Row alignment of one job against the reference job
struct JobAlignment {
    job: JobPaths,
    supply: Permutation,
    inventory: Permutation,
    technosphere: Permutation,
    biosphere: Permutation,
}

impl JobAlignment {
    fn permutation(&self, family: &Family) -> &Permutation {
        match family {
            Family::Vector {
                kind: OutputKind::Supply,
                ..
            } => &self.supply,
            Family::Vector { .. } => &self.inventory,
            Family::Matrix(MatrixKind::Technosphere) => &self.technosphere,
            Family::Matrix(MatrixKind::Biosphere) => &self.biosphere,
        }
    }
}

struct ReferenceMaps {
    activities: RowIndexMap<ActivityKey>,
    flows: RowIndexMap<FlowKey>,
    technosphere: RowIndexMap<PositionKey>,
    biosphere: RowIndexMap<PositionKey>,
}

impl ReferenceMaps {
    fn load(job: &JobPaths) -> Result<Self, PipelineError> {
        let index = job.read_index()?;
        let id = job.job_id();
        let common = job.common_dir();
        Ok(Self {
            activities: RowIndexMap::from(&index.activities),
            flows: RowIndexMap::from(&index.flows),
            technosphere: position_keys(
                MatrixKind::Technosphere,
                &read_matrix_indices(&common, MatrixKind::Technosphere)?,
                &index,
                &id,
            )?,
            biosphere: position_keys(
                MatrixKind::Biosphere,
                &read_matrix_indices(&common, MatrixKind::Biosphere)?,
                &index,
                &id,
            )?,
        })
    }

    fn align(
        &self,
        job: &JobPaths,
        reference: &ReferenceMaps,
    ) -> Result<JobAlignment, ReconciliationError> {
        let id = job.job_id();
        Ok(JobAlignment {
            job: job.clone(),
            supply: self
                .activities
                .permutation_to(&reference.activities, &id, "activity")?,
            inventory: self.flows.permutation_to(&reference.flows, &id, "biosphere")?,
            technosphere: self.technosphere.permutation_to(
                &reference.technosphere,
                &id,
                "technosphere position",
            )?,
            biosphere: self.biosphere.permutation_to(
                &reference.biosphere,
                &id,
                "biosphere position",
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcrossJobsSummary {
    pub reference_job: String,
    pub jobs: Vec<String>,
    pub iterations: usize,
    pub written: usize,
}

/// Merge the concatenated arrays of every job under `jobs_dir` into
/// `results_dir`, aligning rows on the first job's index.
///
/// All jobs must track the same set of activities and have completed the
/// within-job merge for the requested outputs.
pub fn merge_across_jobs(
    jobs_dir: &Path,
    results_dir: &Path,
    outputs: &OutputSelection,
) -> Result<AcrossJobsSummary, PipelineError> {
    let jobs = list_jobs(jobs_dir)?;
    let Some(reference) = jobs.first() else {
        return Err(ConfigurationError::NoJobs(jobs_dir.to_path_buf()).into());
    };
    let mut logs = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let log = JobLog::load(&job.log_path())?;
        log.require(&job.root, StageMarker::InternallyConcatenated, outputs)?;
        logs.push(log);
    }

    let reference_keys: BTreeSet<_> = reference.read_activity_keys()?.into_iter().collect();
    let reference_maps = ReferenceMaps::load(reference)?;
    let mut alignments = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let keys: BTreeSet<_> = job.read_activity_keys()?.into_iter().collect();
        if keys != reference_keys {
            return Err(ReconciliationError::ActivitySetMismatch {
                job: job.job_id(),
                reference: reference.job_id(),
            }
            .into());
        }
        let alignment = ReferenceMaps::load(job)?.align(job, &reference_maps)?;
        if !alignment.inventory.is_identity() || !alignment.supply.is_identity() {
            tracing::info!(
                job = %job.job_id(),
                "job indexing differs from reference, reordering rows"
            );
        }
        alignments.push(alignment);
    }

    // iterations as recorded by each job's own merge
    let mut counts = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let merged: Vec<String> = read_json(&job.root.join(CONCAT_DIR).join(MERGE_SOURCES))?;
        counts.push((job.job_id(), merged.len()));
    }
    if claim_merge_dir(results_dir, &counts)? {
        tracing::info!(
            jobs = jobs.len(),
            "included jobs changed since the last merge, rebuilding results"
        );
    }
    let reference_files = results_dir.join(REFERENCE_DIR);
    if !reference_files.exists() {
        copy_dir(&reference.root.join(COMMON_DIR), &reference_files)?;
    }

    let stems: Vec<String> = reference_keys
        .iter()
        .map(|key| array_stem(&key.code))
        .collect();
    let families = families(outputs, &stems);
    tracing::info!(
        jobs = jobs.len(),
        reference = %reference.job_id(),
        files = families.len(),
        "concatenating across jobs"
    );

    let written = for_each_item(&families, |family| {
        let target = merged_path(results_dir, family);
        if target.exists() {
            return Ok(false);
        }
        let mut aligned = Vec::with_capacity(alignments.len());
        for alignment in &alignments {
            let source = merged_path(&alignment.job.root.join(CONCAT_DIR), family);
            let array: Array2<f32> = read_array(&source)?;
            aligned.push(alignment.permutation(family).apply_rows(&array)?);
        }
        let views: Vec<ArrayView2<f32>> = aligned.iter().map(|a| a.view()).collect();
        let merged = concatenate(Axis(1), &views).map_err(|e| {
            PipelineError::Store(StoreError::WriteArray {
                path: target.clone(),
                message: e.to_string(),
            })
        })?;
        Ok(write_array_once(&target, &merged)?)
    })?;

    let mut iterations = 0;
    let mut included = Vec::with_capacity(jobs.len());
    for ((job, mut log), (job_id, count)) in jobs.iter().zip(logs).zip(counts) {
        iterations += count;
        log.mark(StageMarker::GloballyConcatenated, *outputs);
        log.save(&job.log_path())?;
        included.push(IncludedJob {
            job_id,
            iterations: count,
            log,
        });
    }
    let results_log = ResultsLog {
        included_jobs: included,
        reference_job: Some(reference.job_id()),
        completed: Some(Timestamp::now()),
    };
    write_json(&results_dir.join(LOG_FILE), &results_log)?;

    Ok(AcrossJobsSummary {
        reference_job: reference.job_id(),
        jobs: jobs.iter().map(JobPaths::job_id).collect(),
        iterations,
        written,
    })
}
