//! Per-job status log recording which pipeline stage completed
//!
//! Lifecycle: Raw -> Cleaned -> ConcatenatedWithinJob -> ConcatenatedAcrossJobs.
//! Each stage requires the previous marker to cover the requested outputs.

use std::path::Path;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, StoreError};
use crate::model::OutputSelection;
use crate::store::{read_json, write_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobStage {
    Raw,
    Cleaned,
    ConcatenatedWithinJob,
    ConcatenatedAcrossJobs,
}

/// The stage markers a job log can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMarker {
    SamplesGenerated,
    Cleaned,
    InternallyConcatenated,
    GloballyConcatenated,
}

impl StageMarker {
    pub fn name(self) -> &'static str {
        match self {
            StageMarker::SamplesGenerated => "samples_generated",
            StageMarker::Cleaned => "cleaned",
            StageMarker::InternallyConcatenated => "internally_concatenated",
            StageMarker::GloballyConcatenated => "included_in_global_concatenated_results",
        }
    }
}

/// Completion marker of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub included_elements: OutputSelection,
    pub completed: Timestamp,
}

impl StageRecord {
    pub fn now(included_elements: OutputSelection) -> Self {
        Self {
            included_elements,
            completed: Timestamp::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples_generated: Option<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned: Option<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internally_concatenated: Option<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_in_global_concatenated_results: Option<StageRecord>,
}

impl JobLog {
    /// Missing log means nothing has been recorded yet
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            read_json(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json(path, self)
    }

    pub fn stage(&self) -> JobStage {
        if self.included_in_global_concatenated_results.is_some() {
            JobStage::ConcatenatedAcrossJobs
        } else if self.internally_concatenated.is_some() {
            JobStage::ConcatenatedWithinJob
        } else if self.cleaned.is_some() {
            JobStage::Cleaned
        } else {
            JobStage::Raw
        }
    }

    pub fn record(&self, marker: StageMarker) -> Option<&StageRecord> {
        match marker {
            StageMarker::SamplesGenerated => self.samples_generated.as_ref(),
            StageMarker::Cleaned => self.cleaned.as_ref(),
            StageMarker::InternallyConcatenated => self.internally_concatenated.as_ref(),
            StageMarker::GloballyConcatenated => {
                self.included_in_global_concatenated_results.as_ref()
            }
        }
    }

    pub fn mark(&mut self, marker: StageMarker, included_elements: OutputSelection) {
        let record = Some(StageRecord::now(included_elements));
        match marker {
            StageMarker::SamplesGenerated => self.samples_generated = record,
            StageMarker::Cleaned => self.cleaned = record,
            StageMarker::InternallyConcatenated => self.internally_concatenated = record,
            StageMarker::GloballyConcatenated => {
                self.included_in_global_concatenated_results = record
            }
        }
    }

    /// Check that `marker` is recorded and covered every kind in `requested`
    pub fn require(
        &self,
        job: &Path,
        marker: StageMarker,
        requested: &OutputSelection,
    ) -> Result<(), ConfigurationError> {
        let stage = marker.name();
        let Some(record) = self.record(marker) else {
            return Err(ConfigurationError::MissingStageMarker {
                job: job.to_path_buf(),
                stage,
            });
        };
        let missing = record.included_elements.missing_from(requested);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::StageMissingOutputs {
                job: job.to_path_buf(),
                stage,
                missing: missing.into_iter().map(|k| k.dir_name()).collect(),
            })
        }
    }
}

/// Log of the merged results directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsLog {
    pub included_jobs: Vec<IncludedJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludedJob {
    pub job_id: String,
    pub iterations: usize,
    pub log: JobLog,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stage_progression() {
        let mut log = JobLog::default();
        assert_eq!(log.stage(), JobStage::Raw);
        log.mark(StageMarker::SamplesGenerated, OutputSelection::all());
        assert_eq!(log.stage(), JobStage::Raw);
        log.mark(StageMarker::Cleaned, OutputSelection::all());
        assert_eq!(log.stage(), JobStage::Cleaned);
        log.mark(StageMarker::InternallyConcatenated, OutputSelection::default());
        assert_eq!(log.stage(), JobStage::ConcatenatedWithinJob);
    }

    #[test]
    fn test_require_checks_output_kinds() {
        let job = PathBuf::from("job");
        let mut log = JobLog::default();
        assert!(matches!(
            log.require(&job, StageMarker::Cleaned, &OutputSelection::default()),
            Err(ConfigurationError::MissingStageMarker { stage: "cleaned", .. })
        ));
        log.mark(StageMarker::Cleaned, OutputSelection::default());
        assert!(
            log.require(&job, StageMarker::Cleaned, &OutputSelection::default())
                .is_ok()
        );
        assert!(matches!(
            log.require(&job, StageMarker::Cleaned, &OutputSelection::all()),
            Err(ConfigurationError::StageMissingOutputs { .. })
        ));
    }

    #[test]
    fn test_log_json_layout() {
        let mut log = JobLog::default();
        log.mark(StageMarker::Cleaned, OutputSelection::all());
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["cleaned"]["included_elements"]["Supply"], true);
        assert!(json.get("samples_generated").is_none());
    }
}
