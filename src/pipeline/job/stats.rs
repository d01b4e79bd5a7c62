use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ErrorKind, PipelineError};

/// Lifecycle of a processing job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Result record handed to the stats display after a terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub job_id: Uuid,
    pub elapsed_millis: f64,
    pub faces_detected: usize,
    pub workers_used: usize,
    pub status: JobStatus,
    pub phase_millis: IndexMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProcessingStats {
    pub fn waiting(job_id: Uuid) -> Self {
        Self {
            job_id,
            elapsed_millis: 0.0,
            faces_detected: 0,
            workers_used: 0,
            status: JobStatus::Waiting,
            phase_millis: IndexMap::new(),
            error_kind: None,
        }
    }

    /// Stats for a submission that failed before a job could be created.
    pub fn rejected(error: &PipelineError) -> Self {
        Self {
            status: JobStatus::Failed,
            error_kind: Some(error.kind()),
            ..Self::waiting(Uuid::nil())
        }
    }
}
