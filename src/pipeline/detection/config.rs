use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for face detection with tunable parameters.
///
/// The thresholds apply to every detector. The sampling and chroma fields only
/// drive the skin-tone detector, `model` only the ONNX one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Distance in pixels between two sampled pixels, in both directions.
    pub sample_step: u32,
    pub min_face_size: u32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub max_faces: usize,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    pub chroma: ChromaBounds,
    pub model: ModelConfig,
}

/// ONNX face model. Detection falls back to skin tones when `path` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: Option<PathBuf>,
    pub layout: ModelLayout,
    pub input_width: u32,
    pub input_height: u32,
}

/// How a model lays out its input and its single output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLayout {
    /// RGB input scaled to 0-1, output `[1, 4 + classes, N]` of center boxes
    /// followed by per-class scores.
    #[default]
    Yolo,
    /// BGR input in 0-255, output `[N, 15]` or `[1, N, 15]` of corner-origin
    /// boxes, five landmarks and a score.
    Yunet,
}

/// Named tuning presets, selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectorPreset {
    #[default]
    Balanced,
    Speed,
    Accuracy,
}

impl DetectorPreset {
    pub fn config(self) -> DetectorConfig {
        match self {
            DetectorPreset::Balanced => DetectorConfig::default(),
            DetectorPreset::Speed => DetectorConfig::speed_optimized(),
            DetectorPreset::Accuracy => DetectorConfig::accuracy_optimized(),
        }
    }
}

/// Inclusive Cb/Cr window classified as skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromaBounds {
    pub cb_min: u8,
    pub cb_max: u8,
    pub cr_min: u8,
    pub cr_max: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_step: 4,
            min_face_size: 20,
            confidence_threshold: 0.5,
            nms_threshold: 0.45,
            max_faces: 32,
            min_aspect_ratio: 0.4,
            max_aspect_ratio: 2.5,
            chroma: ChromaBounds::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            layout: ModelLayout::default(),
            input_width: 640,
            input_height: 640,
        }
    }
}

impl Default for ChromaBounds {
    fn default() -> Self {
        Self {
            cb_min: 77,
            cb_max: 127,
            cr_min: 133,
            cr_max: 173,
        }
    }
}

impl DetectorConfig {
    /// Configuration optimized for speed (coarse sampling)
    pub fn speed_optimized() -> Self {
        Self {
            sample_step: 8,
            min_face_size: 32,
            ..Self::default()
        }
    }

    /// Configuration optimized for accuracy (dense sampling, small faces)
    pub fn accuracy_optimized() -> Self {
        Self {
            sample_step: 2,
            min_face_size: 12,
            confidence_threshold: 0.4,
            ..Self::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_step == 0 {
            return Err("Sample step must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("Confidence threshold must be between 0.0 and 1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err("NMS threshold must be between 0.0 and 1.0".to_string());
        }

        if self.min_aspect_ratio <= 0.0 || self.min_aspect_ratio > self.max_aspect_ratio {
            return Err("Aspect ratio bounds must be positive and ordered".to_string());
        }

        if self.chroma.cb_min > self.chroma.cb_max || self.chroma.cr_min > self.chroma.cr_max {
            return Err("Chroma bounds must be ordered".to_string());
        }

        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err("Model input size must be non-zero".to_string());
        }

        Ok(())
    }

    pub fn with_sample_step(mut self, step: u32) -> Self {
        self.sample_step = step.max(1);
        self
    }

    pub fn with_min_face_size(mut self, size: u32) -> Self {
        self.min_face_size = size;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model.path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(DetectorConfig::default().validate().is_ok());
        assert!(DetectorConfig::speed_optimized().validate().is_ok());
        assert!(DetectorConfig::accuracy_optimized().validate().is_ok());
    }

    #[test]
    fn presets_map_to_their_configs() {
        assert_eq!(DetectorPreset::Balanced.config(), DetectorConfig::default());
        assert_eq!(DetectorPreset::Speed.config().sample_step, 8);
        assert_eq!(DetectorPreset::Accuracy.config().min_face_size, 12);
    }

    #[test]
    fn builders_keep_values_valid() {
        let config = DetectorConfig::default()
            .with_sample_step(0)
            .with_min_face_size(48)
            .with_confidence_threshold(1.7)
            .with_model_path("models/face.onnx");
        assert_eq!(config.sample_step, 1);
        assert_eq!(config.min_face_size, 48);
        assert_eq!(config.confidence_threshold, 1.0);
        assert_eq!(config.model.path, Some(PathBuf::from("models/face.onnx")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn model_layout_reads_lowercase_names() {
        let model: ModelConfig = serde_json::from_str(r#"{"layout": "yunet", "input_width": 320}"#).unwrap();
        assert_eq!(model.layout, ModelLayout::Yunet);
        assert_eq!(model.input_width, 320);
        assert_eq!(model.input_height, 640);
        assert_eq!(model.path, None);
    }

    #[test]
    fn rejects_zero_step_and_inverted_bounds() {
        let config = DetectorConfig {
            sample_step: 0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            min_aspect_ratio: 3.0,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
