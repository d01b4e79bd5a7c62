pub mod camera;
pub mod realtime_stream;

pub use camera::{CameraSource, SyntheticCamera};
pub use realtime_stream::{DisplayFrame, RealtimeStream, StreamStats, StreamStatsSnapshot, StreamStatus};
