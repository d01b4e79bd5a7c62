pub mod blur;
pub mod detection;
pub mod job;
pub mod service;
pub mod workers;

pub use blur::{BlurConfig, RegionBlurFilter};
pub use detection::{
    DetectorConfig, DetectorPreset, FaceDetector, OnnxFaceDetector, SkinToneDetector, StaticDetector,
};
pub use job::{JobFailure, JobHandle, JobOutput, JobStatus, ProcessingJob, ProcessingStats};
pub use service::{detector_from_config, FaceBlurService, FaceBlurServiceBuilder, ProcessedImage};
pub use workers::{PartitionConfig, WorkerPool, WorkerPools};
