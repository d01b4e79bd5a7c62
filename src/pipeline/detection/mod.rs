pub mod config;
pub mod detector;
pub mod onnx_detector;
pub mod skin_detector;

pub use self::config::{ChromaBounds, DetectorConfig, DetectorPreset, ModelConfig, ModelLayout};
pub use detector::{FaceDetector, StaticDetector};
pub use onnx_detector::OnnxFaceDetector;
pub use skin_detector::SkinToneDetector;
