use serde::Serialize;
use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Failed to access {1}: {0}")]
    Io(std::io::Error, String),
    #[error("Failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

// Pipeline Error Type, the only error that crosses the library boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Face detection failed: {0}")]
    DetectionFailure(String),
    #[error("Blur failed: {0}")]
    BlurFailure(String),
    #[error("Job cancelled: {0}")]
    Cancelled(CancelReason),
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelReason {
    Requested,
    Timeout,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancellation requested"),
            CancelReason::Timeout => write!(f, "time budget exceeded"),
        }
    }
}

/// Flat error classification handed to the stats display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    InvalidInput,
    DetectionFailure,
    BlurFailure,
    Cancelled,
    Timeout,
    DeviceUnavailable,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::DetectionFailure(_) => ErrorKind::DetectionFailure,
            PipelineError::BlurFailure(_) => ErrorKind::BlurFailure,
            PipelineError::Cancelled(CancelReason::Requested) => ErrorKind::Cancelled,
            PipelineError::Cancelled(CancelReason::Timeout) => ErrorKind::Timeout,
            PipelineError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_its_own_kind() {
        let err = PipelineError::Cancelled(CancelReason::Timeout);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Job cancelled: time budget exceeded");
    }

    #[test]
    fn app_error_wraps_pipeline_error() {
        let err: AppError = PipelineError::InvalidInput("empty".to_string()).into();
        assert_eq!(err.to_string(), "Pipeline Error: Invalid input: empty");
    }
}
