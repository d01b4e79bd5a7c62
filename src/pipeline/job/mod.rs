pub mod phase_timings;
pub mod processing_job;
pub mod stats;

pub use phase_timings::{JobPhase, PhaseTimings};
pub use processing_job::{JobFailure, JobHandle, JobOutput, ProcessingJob};
pub use stats::{JobStatus, ProcessingStats};
