pub mod common;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stream;

pub use common::{FaceRegion, Frame, Image, PixelFormat, PixelRect};
pub use self::config::Settings;
pub use error::{AppError, CancelReason, ErrorKind, PipelineError};
pub use report::DetectionReport;

pub use pipeline::{
    BlurConfig, DetectorPreset, FaceBlurService, JobStatus, ProcessingJob, ProcessingStats,
};
pub use stream::{CameraSource, RealtimeStream, SyntheticCamera};
