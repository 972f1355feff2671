//! Shared-nothing worker pool
//!
//! Iterations are split statically between workers before any of them
//! starts. Each worker owns the iteration folders `iteration_<worker>-*` and
//! reads everything else from `common_files`, so workers never coordinate
//! beyond the filesystem. Launchers only have to wait for all of them.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::balancing::{BalanceCorrector, BalancingPlan};
use crate::config::JobManifest;
use crate::error::{ConfigurationError, LookupError, PipelineError};
use crate::matrix::MatrixSet;
use crate::model::{ActivityKey, Dataset, OutputKind, OutputSelection};
use crate::provider::MatrixProvider;
use crate::sampling::SampleEngine;
use crate::solver::{SolverStage, inventory};
use crate::store::{DATASET, IterationDir, JobPaths, MANIFEST, ResultStore, read_json};

/// Split `total` iterations as evenly as possible, remainder to the first workers
pub fn partition_iterations(total: usize, workers: usize) -> Result<Vec<usize>, ConfigurationError> {
    if workers == 0 {
        return Err(ConfigurationError::ZeroWorkers);
    }
    let base = total / workers;
    let remainder = total % workers;
    Ok((0..workers)
        .map(|w| base + usize::from(w < remainder))
        .collect())
}

/// One seed per worker, derived from the job seed
pub fn worker_seeds(job_seed: u64, workers: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(job_seed);
    (0..workers).map(|_| rng.next_u64()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTask {
    pub worker: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: usize,
    pub written: usize,
    /// Iterations that already carried a completion marker
    pub skipped: usize,
}

#[derive(Debug)]
pub struct WorkerOutcome {
    pub worker: usize,
    pub result: Result<WorkerReport, String>,
}

/// Starts one worker per task and returns once every worker has terminated
pub trait WorkerLauncher {
    fn launch(&self, job_root: &Path, tasks: &[WorkerTask]) -> Vec<WorkerOutcome>;
}

/// Runs workers as threads of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLauncher;

impl WorkerLauncher for ThreadLauncher {
    fn launch(&self, job_root: &Path, tasks: &[WorkerTask]) -> Vec<WorkerOutcome> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = tasks
                .iter()
                .map(|task| {
                    let worker = task.worker;
                    (worker, scope.spawn(move || run_worker(job_root, worker)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(worker, handle)| WorkerOutcome {
                    worker,
                    result: match handle.join() {
                        Ok(Ok(report)) => Ok(report),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err("worker thread panicked".to_string()),
                    },
                })
                .collect()
        })
    }
}

struct Demand {
    key: ActivityKey,
    row: usize,
    amount: f64,
}

/// Run every iteration of one worker.
///
/// All draws are made even for iterations that are already complete so that
/// a regenerated iteration gets exactly the sample it would have had.
pub fn run_worker(job_root: &Path, worker: usize) -> Result<WorkerReport, PipelineError> {
    let job = JobPaths::new(job_root);
    let manifest: JobManifest = read_json(&job.common_file(MANIFEST))?;
    let (Some(&share), Some(&seed)) = (manifest.shares.get(worker), manifest.worker_seeds.get(worker))
    else {
        return Err(ConfigurationError::WorkerFailed {
            worker,
            message: format!("job has only {} workers", manifest.shares.len()),
        }
        .into());
    };

    let dataset: Dataset = read_json(&job.common_file(DATASET))?;
    let data = dataset.load_matrices()?;
    if data.index != job.read_index()? {
        return Err(ConfigurationError::IndexMismatch(job.root.clone()).into());
    }
    let plans = manifest
        .domains
        .iter()
        .map(|domain| read_json::<BalancingPlan>(&job.balancing_path(domain)))
        .collect::<Result<Vec<_>, _>>()?;
    let corrector = BalanceCorrector::new(plans);

    let demands = manifest
        .functional_units
        .iter()
        .map(|fu| {
            data.index
                .products
                .get(&fu.activity)
                .map(|row| Demand {
                    key: fu.activity.clone(),
                    row,
                    amount: fu.amount,
                })
                .ok_or_else(|| LookupError::ActivityNotFound(fu.activity.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut engine = SampleEngine::new(&data, seed)?;
    let mut matrices = data.matrices.clone();
    let mut report = WorkerReport {
        worker,
        ..WorkerReport::default()
    };
    tracing::info!(worker, iterations = share, "worker started");

    for index in 0..share {
        engine.rebuild(&mut matrices);
        let iteration = job.iteration(worker, index);
        if iteration.is_complete() {
            report.skipped += 1;
            tracing::debug!(worker, index, "iteration already complete");
            continue;
        }
        corrector.apply(&mut matrices)?;
        run_iteration(&iteration, &matrices, &demands, &manifest.outputs)?;
        iteration.mark_complete()?;
        report.written += 1;
        tracing::debug!(worker, index, "iteration written");
    }

    tracing::info!(
        worker,
        written = report.written,
        skipped = report.skipped,
        "worker finished"
    );
    Ok(report)
}

/// Solve and persist one iteration; the factorization is skipped when every
/// requested vector already exists
fn run_iteration(
    iteration: &IterationDir,
    matrices: &MatrixSet,
    demands: &[Demand],
    outputs: &OutputSelection,
) -> Result<(), PipelineError> {
    let store = ResultStore::new(iteration);
    store.create_dirs(outputs.kinds())?;
    if outputs.matrices {
        store.write_matrices(matrices)?;
    }

    let pending: Vec<&Demand> = demands
        .iter()
        .filter(|d| {
            (outputs.supply && !store.has_vector(OutputKind::Supply, &d.key.code))
                || (outputs.inventory && !store.has_vector(OutputKind::Inventory, &d.key.code))
        })
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let solver = SolverStage::factorize(&matrices.technosphere)?;
    for demand in pending {
        let supply = solver.supply(demand.row, demand.amount, &demand.key)?;
        if outputs.supply {
            store.write_vector(OutputKind::Supply, &demand.key.code, &supply)?;
        }
        if outputs.inventory {
            let inv = inventory(&matrices.biosphere, &supply);
            store.write_vector(OutputKind::Inventory, &demand.key.code, &inv)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_remainder_goes_first() {
        assert_eq!(partition_iterations(10, 4).unwrap(), vec![3, 3, 2, 2]);
        assert_eq!(partition_iterations(5, 2).unwrap(), vec![3, 2]);
        assert_eq!(partition_iterations(2, 4).unwrap(), vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_partition_is_exact_cover() {
        for total in 0..40 {
            for workers in 1..9 {
                let shares = partition_iterations(total, workers).unwrap();
                assert_eq!(shares.iter().sum::<usize>(), total);
                let (min, max) = (
                    shares.iter().min().copied().unwrap(),
                    shares.iter().max().copied().unwrap(),
                );
                assert!(max - min <= 1, "uneven split {shares:?}");
            }
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert_eq!(
            partition_iterations(10, 0),
            Err(ConfigurationError::ZeroWorkers)
        );
    }

    #[test]
    fn test_worker_seeds_are_deterministic_and_distinct() {
        let a = worker_seeds(42, 4);
        assert_eq!(a, worker_seeds(42, 4));
        assert_ne!(a[0], a[1]);
        assert_eq!(&worker_seeds(42, 2)[..], &a[..2]);
    }
}
