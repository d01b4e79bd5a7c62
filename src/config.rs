use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;
use crate::pipeline::blur::BlurConfig;
use crate::pipeline::detection::{DetectorConfig, DetectorPreset};
use crate::pipeline::workers::PartitionConfig;

/// Application settings, layered as defaults, then `faceblur.toml` (or an
/// explicit file), then `FACEBLUR__*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub blur: BlurConfig,
    pub detector: DetectorConfig,
    pub partition: PartitionConfig,
    pub job: JobSettings,
    pub stream: StreamSettings,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Wall-clock budget of a single job, unbounded when absent.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub job_timeout_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blur: BlurConfig::default(),
            detector: DetectorConfig::default(),
            partition: PartitionConfig::default(),
            job: JobSettings::default(),
            stream: StreamSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            job_timeout_ms: Some(2_000),
        }
    }
}

impl JobSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl StreamSettings {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.map(Duration::from_millis)
    }
}

impl Settings {
    /// Load settings, reading `path` when given, otherwise an optional
    /// `faceblur.toml` next to the working directory.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("faceblur").required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("FACEBLUR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.detector.validate().map_err(|message| {
            AppError::Config(config::ConfigError::Message(format!(
                "invalid detector settings: {}",
                message
            )))
        })?;
        Ok(settings)
    }

    // Overrides the blur intensity, this will override the loaded settings.
    pub fn intensity(mut self, intensity: u32) -> Self {
        self.blur = self.blur.with_intensity(intensity);
        self
    }

    // Overrides the worker count, this will override the loaded settings.
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.blur = self.blur.with_worker_count(worker_count);
        self
    }

    // Sets the job budget, this will override the loaded settings.
    pub fn job_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.job.timeout_ms = timeout_ms;
        self
    }

    // Replaces the detector tuning with a preset, the configured model is kept.
    pub fn detector_preset(mut self, preset: DetectorPreset) -> Self {
        let model = std::mem::take(&mut self.detector.model);
        self.detector = DetectorConfig {
            model,
            ..preset.config()
        };
        self
    }

    pub fn sample_step(mut self, step: u32) -> Self {
        self.detector = self.detector.with_sample_step(step);
        self
    }

    pub fn min_face_size(mut self, size: u32) -> Self {
        self.detector = self.detector.with_min_face_size(size);
        self
    }

    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.detector = self.detector.with_confidence_threshold(threshold);
        self
    }

    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.detector = self.detector.with_model_path(path);
        self
    }
}
