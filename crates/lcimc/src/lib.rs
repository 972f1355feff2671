//! Command-line front end of the LCI Monte Carlo sampler
//!
//! Everything that touches the process environment lives here: logging
//! set-up, reading settings and datasets, and launching worker processes.
//! The pipeline itself is in `lcimc_core`.

pub mod launcher;
pub mod logging;
pub mod settings;

pub use launcher::ProcessLauncher;
pub use logging::init_logging;
