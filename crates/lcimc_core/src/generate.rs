//! Sample generation: set up a job, run its workers, record completion

use std::path::{Path, PathBuf};

use jiff::Zoned;
use rustc_hash::FxHashMap;

use crate::balancing::plan_domains;
use crate::config::{JobManifest, RunConfig};
use crate::error::{ConfigurationError, LookupError, PipelineError};
use crate::model::{ActivityKey, Dataset, FunctionalUnit};
use crate::provider::MatrixProvider;
use crate::solver::SolverStage;
use crate::status::{JobLog, StageMarker};
use crate::store::{
    ACTIVITY_CODES, DATASET, JobPaths, MANIFEST, array_stem, jobs_dir, read_json, write_index,
    write_json,
};
use crate::worker::{
    WorkerLauncher, WorkerReport, WorkerTask, partition_iterations, worker_seeds,
};

/// What a finished generation stage produced
#[derive(Debug)]
pub struct JobSummary {
    pub job: JobPaths,
    pub manifest: JobManifest,
    pub reports: Vec<WorkerReport>,
    /// Workers that terminated with an error; their iterations are incomplete
    pub failures: Vec<(usize, String)>,
}

impl JobSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Job identifier from the current user and local time
pub fn job_id() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "job".to_string());
    let stamp = Zoned::now().strftime("%Y-%m-%d_%Hh%Mm%S").to_string();
    format!("{user}_{stamp}")
}

fn unique_job_root(jobs: &Path, id: &str) -> PathBuf {
    let mut root = jobs.join(id);
    let mut n = 1;
    while root.exists() {
        root = jobs.join(format!("{id}_{n}"));
        n += 1;
    }
    root
}

/// Tracked activities, each with a distinct array file stem
fn tracked_activities(
    dataset: &Dataset,
    config: &RunConfig,
) -> Result<Vec<ActivityKey>, LookupError> {
    let keys = match &config.activities {
        None => dataset.activities.iter().map(|a| a.key.clone()).collect(),
        Some(keys) => {
            for key in keys {
                if dataset.activity(key).is_none() {
                    return Err(LookupError::ActivityNotFound(key.clone()));
                }
            }
            keys.clone()
        }
    };

    let mut stems: FxHashMap<String, &ActivityKey> = FxHashMap::default();
    for key in &keys {
        let stem = array_stem(&key.code);
        if let Some(first) = stems.insert(stem.clone(), key) {
            return Err(LookupError::ArrayNameCollision {
                first: first.clone(),
                second: key.clone(),
                stem,
            });
        }
    }
    Ok(keys)
}

/// Create a job under `<output_root>/<database>/jobs/`, run all its workers
/// and record the `samples_generated` stage.
///
/// Fails before any file is written when no output kind is selected or the
/// unperturbed system cannot be solved.
pub fn generate(
    dataset: &Dataset,
    config: &RunConfig,
    output_root: &Path,
    launcher: &dyn WorkerLauncher,
) -> Result<JobSummary, PipelineError> {
    if config.outputs.is_empty() {
        return Err(ConfigurationError::NoOutputSelected.into());
    }
    if config.iterations == 0 {
        return Err(ConfigurationError::ZeroIterations.into());
    }
    let shares = partition_iterations(config.iterations, config.worker_count())?;

    let data = dataset.load_matrices()?;
    let activities = tracked_activities(dataset, config)?;

    // Reference solve on the unperturbed system
    let solver = SolverStage::factorize(&data.matrices.technosphere)?;
    if let Some(first) = activities.first() {
        let row = data
            .index
            .products
            .get(first)
            .ok_or_else(|| LookupError::ActivityNotFound(first.clone()))?;
        solver.supply(row, config.functional_unit_amount, first)?;
    }

    let plans = plan_domains(&config.domains, dataset, &data)?;

    let seed = config.seed.unwrap_or_else(rand::random::<u64>);
    let manifest = JobManifest {
        database: dataset.name.clone(),
        seed,
        iterations: config.iterations,
        worker_seeds: worker_seeds(seed, shares.len()),
        shares,
        outputs: config.outputs,
        functional_units: activities
            .iter()
            .map(|activity| FunctionalUnit {
                activity: activity.clone(),
                amount: config.functional_unit_amount,
            })
            .collect(),
        domains: plans.iter().map(|p| p.domain.clone()).collect(),
    };

    let job = JobPaths::new(unique_job_root(
        &jobs_dir(output_root, &dataset.name),
        &job_id(),
    ));
    tracing::info!(
        job = %job.root.display(),
        seed,
        iterations = manifest.iterations,
        workers = manifest.shares.len(),
        "creating job"
    );

    let common = job.common_dir();
    write_json(&common.join(DATASET), dataset)?;
    write_index(&common, &data.index, &data.matrices)?;
    write_json(&common.join(ACTIVITY_CODES), &activities)?;
    for plan in &plans {
        write_json(&job.balancing_path(&plan.domain), plan)?;
    }
    write_json(&common.join(MANIFEST), &manifest)?;

    run_workers(job, manifest, launcher)
}

/// Run the workers of an existing job again.
///
/// Iterations that carry a completion marker are kept; deleted or partial
/// ones are regenerated from scratch with the same random stream.
pub fn resume(job_root: &Path, launcher: &dyn WorkerLauncher) -> Result<JobSummary, PipelineError> {
    let job = JobPaths::new(job_root);
    let manifest: JobManifest = read_json(&job.common_file(MANIFEST))?;
    tracing::info!(job = %job.root.display(), "resuming job");
    run_workers(job, manifest, launcher)
}

fn run_workers(
    job: JobPaths,
    manifest: JobManifest,
    launcher: &dyn WorkerLauncher,
) -> Result<JobSummary, PipelineError> {
    let tasks: Vec<WorkerTask> = manifest
        .shares
        .iter()
        .enumerate()
        .filter(|(_, share)| **share > 0)
        .map(|(worker, share)| WorkerTask {
            worker,
            iterations: *share,
        })
        .collect();

    let outcomes = launcher.launch(&job.root, &tasks);

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(report) => reports.push(report),
            Err(message) => {
                tracing::error!(worker = outcome.worker, %message, "worker failed");
                failures.push((outcome.worker, message));
            }
        }
    }

    let mut log = JobLog::load(&job.log_path())?;
    log.mark(StageMarker::SamplesGenerated, manifest.outputs);
    log.save(&job.log_path())?;

    tracing::info!(
        job = %job.job_id(),
        written = reports.iter().map(|r| r.written).sum::<usize>(),
        failed = failures.len(),
        "sample generation finished"
    );
    Ok(JobSummary {
        job,
        manifest,
        reports,
        failures,
    })
}
