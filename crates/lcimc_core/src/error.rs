use std::fmt;
use std::path::PathBuf;

use crate::model::{ActivityKey, FlowKey};

/// Errors related to key lookups in the source dataset or index dictionaries
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    ActivityNotFound(ActivityKey),
    FlowNotFound(FlowKey),
    /// A production exchange names a product other than the activity's own
    ForeignProduction {
        activity: ActivityKey,
        product: ActivityKey,
    },
    DuplicateActivity(ActivityKey),
    DuplicateFlow(FlowKey),
    /// Two tracked activities would be stored under the same array file name
    ArrayNameCollision {
        first: ActivityKey,
        second: ActivityKey,
        stem: String,
    },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::ActivityNotFound(key) => write!(f, "activity {key} not found"),
            LookupError::FlowNotFound(key) => write!(f, "elementary flow {key} not found"),
            LookupError::ForeignProduction { activity, product } => {
                write!(f, "activity {activity} declares production of {product}")
            }
            LookupError::DuplicateActivity(key) => write!(f, "activity {key} declared twice"),
            LookupError::DuplicateFlow(key) => write!(f, "elementary flow {key} declared twice"),
            LookupError::ArrayNameCollision {
                first,
                second,
                stem,
            } => write!(f, "activities {first} and {second} both store arrays as '{stem}'"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Errors raised while preparing distributions for sampling
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    InvalidDistributionParameters {
        distribution: &'static str,
        row: usize,
        col: usize,
        reason: &'static str,
    },
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::InvalidDistributionParameters {
                distribution,
                row,
                col,
                reason,
            } => write!(
                f,
                "invalid {distribution} parameters at ({row}, {col}): {reason}"
            ),
        }
    }
}

impl std::error::Error for SampleError {}

/// Errors raised while rebalancing a conserved quantity
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceError {
    /// A scaling factor had a zero denominator or came out non-finite
    ZeroDenominator {
        domain: String,
        activity: ActivityKey,
        numerator: f64,
        denominator: f64,
    },
}

impl fmt::Display for BalanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceError::ZeroDenominator {
                domain,
                activity,
                numerator,
                denominator,
            } => write!(
                f,
                "{domain} balancing of {activity}: scaling {numerator} / {denominator} is not finite"
            ),
        }
    }
}

impl std::error::Error for BalanceError {}

/// Errors from the linear solve of one iteration
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    NotSquare { rows: usize, cols: usize },
    Assembly(String),
    Factorization(String),
    /// The factorization succeeded but produced a non-finite supply vector
    Singular { activity: ActivityKey },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::NotSquare { rows, cols } => {
                write!(f, "technosphere matrix is {rows}x{cols}, expected square")
            }
            SolverError::Assembly(msg) => write!(f, "could not assemble technosphere: {msg}"),
            SolverError::Factorization(msg) => write!(f, "LU factorization failed: {msg}"),
            SolverError::Singular { activity } => {
                write!(f, "singular technosphere while solving for {activity}")
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Filesystem and serialization errors of the result store
#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: std::io::Error },
    Json { path: PathBuf, source: serde_json::Error },
    ReadArray { path: PathBuf, message: String },
    WriteArray { path: PathBuf, message: String },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            StoreError::Json { path, source } => {
                write!(f, "{}: invalid JSON: {source}", path.display())
            }
            StoreError::ReadArray { path, message } => {
                write!(f, "{}: could not read array: {message}", path.display())
            }
            StoreError::WriteArray { path, message } => {
                write!(f, "{}: could not write array: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Invalid run settings or a missing prerequisite; aborts before any work starts
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    NoOutputSelected,
    ZeroIterations,
    ZeroWorkers,
    MissingStageMarker {
        job: PathBuf,
        stage: &'static str,
    },
    /// The stage marker exists but does not cover every requested output kind
    StageMissingOutputs {
        job: PathBuf,
        stage: &'static str,
        missing: Vec<&'static str>,
    },
    NoJobs(PathBuf),
    EmptyJob(PathBuf),
    /// No merged results to score at this path
    MissingResults(PathBuf),
    /// A worker derived a different index than the one persisted for its job
    IndexMismatch(PathBuf),
    InvalidDomain {
        domain: String,
        reason: String,
    },
    WorkerFailed {
        worker: usize,
        message: String,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::NoOutputSelected => write!(f, "no output requested"),
            ConfigurationError::ZeroIterations => write!(f, "iteration count must be positive"),
            ConfigurationError::ZeroWorkers => write!(f, "worker count must be positive"),
            ConfigurationError::MissingStageMarker { job, stage } => {
                write!(f, "{}: stage '{stage}' has not completed", job.display())
            }
            ConfigurationError::StageMissingOutputs {
                job,
                stage,
                missing,
            } => write!(
                f,
                "{}: stage '{stage}' did not include {}",
                job.display(),
                missing.join(", ")
            ),
            ConfigurationError::NoJobs(root) => write!(f, "no jobs found under {}", root.display()),
            ConfigurationError::MissingResults(dir) => {
                write!(f, "no merged results at {}", dir.display())
            }
            ConfigurationError::EmptyJob(job) => {
                write!(f, "{}: no iteration folders", job.display())
            }
            ConfigurationError::IndexMismatch(job) => write!(
                f,
                "{}: dataset no longer matches the job's reference index",
                job.display()
            ),
            ConfigurationError::InvalidDomain { domain, reason } => {
                write!(f, "conservation domain '{domain}': {reason}")
            }
            ConfigurationError::WorkerFailed { worker, message } => {
                write!(f, "worker {worker} failed: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Jobs whose semantic keys cannot be aligned with the reference job
#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationError {
    ActivitySetMismatch {
        job: String,
        reference: String,
    },
    KeySetMismatch {
        job: String,
        dictionary: &'static str,
        missing: usize,
        unexpected: usize,
    },
    /// The array's row count differs from its job's index dictionary
    LengthMismatch {
        expected: usize,
        found: usize,
    },
    /// A stored matrix coordinate has no key in the job's dictionaries
    UnknownPosition {
        job: String,
        row: usize,
        col: usize,
    },
}

impl fmt::Display for ReconciliationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationError::ActivitySetMismatch { job, reference } => write!(
                f,
                "job {job} tracks a different set of activities than reference job {reference}"
            ),
            ReconciliationError::KeySetMismatch {
                job,
                dictionary,
                missing,
                unexpected,
            } => write!(
                f,
                "job {job}: {dictionary} keys differ from the reference ({missing} missing, {unexpected} unexpected)"
            ),
            ReconciliationError::LengthMismatch { expected, found } => {
                write!(f, "array has {found} rows, index has {expected}")
            }
            ReconciliationError::UnknownPosition { job, row, col } => {
                write!(f, "job {job}: matrix position ({row}, {col}) is outside its index")
            }
        }
    }
}

impl std::error::Error for ReconciliationError {}

/// Umbrella error for the job lifecycle operations
#[derive(Debug)]
pub enum PipelineError {
    Configuration(ConfigurationError),
    Lookup(LookupError),
    Sample(SampleError),
    Balance(BalanceError),
    Solver(SolverError),
    Store(StoreError),
    Reconciliation(ReconciliationError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Configuration(e) => write!(f, "configuration error: {e}"),
            PipelineError::Lookup(e) => write!(f, "{e}"),
            PipelineError::Sample(e) => write!(f, "{e}"),
            PipelineError::Balance(e) => write!(f, "{e}"),
            PipelineError::Solver(e) => write!(f, "{e}"),
            PipelineError::Store(e) => write!(f, "{e}"),
            PipelineError::Reconciliation(e) => write!(f, "reconciliation failed: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Configuration(e) => Some(e),
            PipelineError::Lookup(e) => Some(e),
            PipelineError::Sample(e) => Some(e),
            PipelineError::Balance(e) => Some(e),
            PipelineError::Solver(e) => Some(e),
            PipelineError::Store(e) => Some(e),
            PipelineError::Reconciliation(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for PipelineError {
    fn from(err: ConfigurationError) -> Self {
        PipelineError::Configuration(err)
    }
}

impl From<LookupError> for PipelineError {
    fn from(err: LookupError) -> Self {
        PipelineError::Lookup(err)
    }
}

impl From<SampleError> for PipelineError {
    fn from(err: SampleError) -> Self {
        PipelineError::Sample(err)
    }
}

impl From<BalanceError> for PipelineError {
    fn from(err: BalanceError) -> Self {
        PipelineError::Balance(err)
    }
}

impl From<SolverError> for PipelineError {
    fn from(err: SolverError) -> Self {
        PipelineError::Solver(err)
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Store(err)
    }
}

impl From<ReconciliationError> for PipelineError {
    fn from(err: ReconciliationError) -> Self {
        PipelineError::Reconciliation(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
