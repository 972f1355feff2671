//! Run configuration and the per-job manifest
//!
//! `RunConfig` is what a caller asks for; `JobManifest` is what a job
//! actually runs with (resolved worker count, shares, seeds) and is written
//! to `common_files` so that every worker reads the same settings.

use std::thread::available_parallelism;

use serde::{Deserialize, Serialize};

use crate::balancing::DomainConfig;
use crate::model::{ActivityKey, FunctionalUnit, OutputSelection};

pub fn default_workers() -> usize {
    available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn default_iterations() -> usize {
    100
}

fn default_amount() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Job seed; drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Worker count; available parallelism when absent
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub outputs: OutputSelection,
    /// Demand placed on each tracked activity
    #[serde(default = "default_amount")]
    pub functional_unit_amount: f64,
    /// Restrict results to these activities; all activities when absent
    #[serde(default)]
    pub activities: Option<Vec<ActivityKey>>,
    /// Conserved quantities to rebalance after sampling, in order
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            iterations: default_iterations(),
            workers: None,
            outputs: OutputSelection::default(),
            functional_unit_amount: default_amount(),
            activities: None,
            domains: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }
}

/// Settings of one job as persisted in `common_files/job_manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub database: String,
    pub seed: u64,
    pub iterations: usize,
    /// Iterations per worker; worker `w` runs indices `0..shares[w]`
    pub shares: Vec<usize>,
    pub worker_seeds: Vec<u64>,
    pub outputs: OutputSelection,
    pub functional_units: Vec<FunctionalUnit>,
    /// Balancing domains in application order
    pub domains: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"iterations": 10}"#).unwrap();
        assert_eq!(config.iterations, 10);
        assert_eq!(config.functional_unit_amount, 1.0);
        assert!(config.outputs.inventory);
        assert!(config.domains.is_empty());
    }

    #[test]
    fn test_explicit_workers_win() {
        let config = RunConfig {
            workers: Some(3),
            ..RunConfig::default()
        };
        assert_eq!(config.worker_count(), 3);
        assert!(RunConfig::default().worker_count() >= 1);
    }
}
