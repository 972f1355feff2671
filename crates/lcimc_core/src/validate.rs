//! Validation of generated jobs and confirmed deletion of incomplete ones
//!
//! Validation is read-only: it produces a report of what is incomplete.
//! Nothing is repaired. Deletion happens only through [`clean`], and only
//! after the caller confirms the report.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, StoreError};
use crate::model::{OutputKind, OutputSelection};
use crate::status::{JobLog, StageMarker};
use crate::store::{COMMON_FILES, IterationDir, JobPaths, list_arrays, list_jobs};

/// Why a job or iteration is incomplete
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    IncompleteCommonFiles { missing: Vec<&'static str> },
    NotGenerated,
    MissingCompletionMarker,
    MissingOutputFolder(OutputKind),
    FileCountMismatch {
        kind: OutputKind,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::IncompleteCommonFiles { missing } => {
                write!(f, "common files missing: {}", missing.join(", "))
            }
            ValidationError::NotGenerated => write!(f, "sample generation never completed"),
            ValidationError::MissingCompletionMarker => write!(f, "iteration did not finish"),
            ValidationError::MissingOutputFolder(kind) => {
                write!(f, "{} folder missing", kind.dir_name())
            }
            ValidationError::FileCountMismatch {
                kind,
                expected,
                found,
            } => write!(
                f,
                "{} holds {found} files, expected {expected}",
                kind.dir_name()
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub path: PathBuf,
    pub error: ValidationError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Jobs that passed job-level checks
    pub jobs_checked: Vec<PathBuf>,
    pub jobs_to_delete: Vec<PathBuf>,
    pub iterations_to_delete: Vec<PathBuf>,
    pub findings: Vec<Finding>,
    pub outputs: OutputSelection,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.jobs_to_delete.is_empty() && self.iterations_to_delete.is_empty()
    }

    fn merge(&mut self, other: ValidationReport) {
        self.jobs_checked.extend(other.jobs_checked);
        self.jobs_to_delete.extend(other.jobs_to_delete);
        self.iterations_to_delete.extend(other.iterations_to_delete);
        self.findings.extend(other.findings);
    }
}

fn check_iteration(
    iteration: &IterationDir,
    expected_entity_count: usize,
    outputs: &OutputSelection,
) -> Result<Option<ValidationError>, StoreError> {
    if !iteration.is_complete() {
        return Ok(Some(ValidationError::MissingCompletionMarker));
    }
    for kind in outputs.kinds() {
        let dir = iteration.output_dir(kind);
        if !dir.is_dir() {
            return Ok(Some(ValidationError::MissingOutputFolder(kind)));
        }
        let expected = match kind {
            OutputKind::Matrices => 2,
            _ => expected_entity_count,
        };
        let found = list_arrays(&dir)?.len();
        if found != expected {
            return Ok(Some(ValidationError::FileCountMismatch {
                kind,
                expected,
                found,
            }));
        }
    }
    Ok(None)
}

/// Check one job against the expected per-iteration output set.
///
/// Asking for an output kind the job never generated is a configuration
/// error: no iteration could pass, so nothing is marked for deletion.
pub fn validate_job(
    job_root: &Path,
    expected_entity_count: usize,
    outputs: &OutputSelection,
) -> Result<ValidationReport, PipelineError> {
    let job = JobPaths::new(job_root);
    let mut report = ValidationReport {
        outputs: *outputs,
        ..ValidationReport::default()
    };

    let missing: Vec<&'static str> = COMMON_FILES
        .into_iter()
        .filter(|name| !job.common_file(name).is_file())
        .collect();
    let log = JobLog::load(&job.log_path())?;
    let job_error = if !missing.is_empty() {
        Some(ValidationError::IncompleteCommonFiles { missing })
    } else if log.record(StageMarker::SamplesGenerated).is_none() {
        Some(ValidationError::NotGenerated)
    } else {
        log.require(job_root, StageMarker::SamplesGenerated, outputs)?;
        None
    };
    if let Some(error) = job_error {
        tracing::warn!(job = %job_root.display(), %error, "job marked for deletion");
        report.jobs_to_delete.push(job_root.to_path_buf());
        report.findings.push(Finding {
            path: job_root.to_path_buf(),
            error,
        });
        return Ok(report);
    }

    report.jobs_checked.push(job_root.to_path_buf());
    for iteration in job.iterations()? {
        if let Some(error) = check_iteration(&iteration, expected_entity_count, outputs)? {
            tracing::warn!(iteration = %iteration.path.display(), %error, "iteration marked for deletion");
            report.iterations_to_delete.push(iteration.path.clone());
            report.findings.push(Finding {
                path: iteration.path,
                error,
            });
        }
    }
    Ok(report)
}

/// Validate every job under a jobs directory.
///
/// The expected entity count of each job is its tracked-activity count.
pub fn validate_jobs(
    jobs_dir: &Path,
    outputs: &OutputSelection,
) -> Result<ValidationReport, PipelineError> {
    let mut report = ValidationReport {
        outputs: *outputs,
        ..ValidationReport::default()
    };
    for job in list_jobs(jobs_dir)? {
        let expected = job.read_activity_keys().map(|keys| keys.len()).unwrap_or(0);
        report.merge(validate_job(&job.root, expected, outputs)?);
    }
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanOutcome {
    pub confirmed: bool,
    pub deleted_jobs: usize,
    pub deleted_iterations: usize,
    pub cleaned_jobs: usize,
}

/// Delete what a report lists, after `confirm` approves it, and record the
/// `cleaned` stage on every surviving job.
///
/// A clean report needs no confirmation.
pub fn clean(
    report: &ValidationReport,
    confirm: impl FnOnce(&ValidationReport) -> bool,
) -> Result<CleanOutcome, StoreError> {
    let mut outcome = CleanOutcome::default();
    if !report.is_clean() && !confirm(report) {
        tracing::info!("deletion declined, nothing changed");
        return Ok(outcome);
    }
    outcome.confirmed = true;

    for path in &report.jobs_to_delete {
        fs::remove_dir_all(path).map_err(|e| StoreError::io(path, e))?;
        outcome.deleted_jobs += 1;
    }
    for path in &report.iterations_to_delete {
        fs::remove_dir_all(path).map_err(|e| StoreError::io(path, e))?;
        outcome.deleted_iterations += 1;
    }
    for root in &report.jobs_checked {
        let job = JobPaths::new(root);
        let mut log = JobLog::load(&job.log_path())?;
        log.mark(StageMarker::Cleaned, report.outputs);
        log.save(&job.log_path())?;
        outcome.cleaned_jobs += 1;
    }
    tracing::info!(
        deleted_jobs = outcome.deleted_jobs,
        deleted_iterations = outcome.deleted_iterations,
        cleaned_jobs = outcome.cleaned_jobs,
        "cleaning finished"
    );
    Ok(outcome)
}
