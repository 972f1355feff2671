//! Scenario tests for the sampling pipeline
//!
//! Tests are organized by topic:
//! - `end_to_end` - Generation, cleaning and both merges on a small system
//! - `balancing` - Strategy assignment and per-iteration corrections
//! - `validation` - Detection and confirmed deletion of incomplete output
//! - `reconciliation` - Merging jobs whose indices were assigned differently
//!
//! Shared fixtures live in `common`.

mod balancing;
mod common;
