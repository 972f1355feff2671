//! Correlated Monte Carlo sampling of life-cycle inventory matrices
//!
//! This crate draws technosphere (A) and biosphere (B) matrices from their
//! uncertainty distributions, optionally rebalances conserved quantities such
//! as water so that sampled inputs and outputs stay consistent, solves each
//! sampled system and persists the results per iteration. It supports:
//! - A static split of iterations over shared-nothing workers
//! - Resumable generation: complete iterations are never recomputed
//! - Validation and confirmed cleanup of incomplete jobs
//! - Concatenation within a job and across jobs, aligned on semantic keys
//! - Impact scoring of merged inventories
//!
//! # Example
//!
//! ```ignore
//! use lcimc_core::config::RunConfig;
//! use lcimc_core::generate::generate;
//! use lcimc_core::worker::ThreadLauncher;
//!
//! let config = RunConfig { iterations: 1000, seed: Some(7), ..RunConfig::default() };
//! let summary = generate(&dataset, &config, output_root, &ThreadLauncher)?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod balancing;
pub mod error;
pub mod matrix;
pub mod provider;
pub mod sampling;
pub mod solver;

// ============================================================================
// Job lifecycle
// ============================================================================

pub mod aggregate;
pub mod generate;
pub mod lcia;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod validate;
pub mod worker;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::RunConfig;
pub use error::{PipelineError, Result};
pub use model::{ActivityKey, Dataset, FlowKey, OutputSelection};
