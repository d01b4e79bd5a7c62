use clap::{Args, Parser, Subcommand};
use faceblur::{DetectorPreset, Settings};
use std::path::PathBuf;

/// Detect faces in images and blur them.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Settings file. Defaults to `faceblur.toml` when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the log level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Blur every detected face and write the result.
    Blur {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Blur intensity, clamped to 5-50.
        #[arg(long)]
        intensity: Option<u32>,

        /// Parallel blur workers, clamped to 1-8.
        #[arg(long)]
        workers: Option<usize>,

        /// Print the job stats as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Report detected faces without modifying the image.
    Detect {
        #[arg(short, long)]
        input: PathBuf,

        /// Print the report as compact JSON instead of pretty JSON.
        #[arg(long)]
        compact: bool,

        #[command(flatten)]
        detector: DetectorArgs,
    },
    /// Replay images as a camera feed through the realtime pipeline.
    Stream {
        /// Images to replay, in order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Delay between frames in milliseconds (33 is roughly 30 fps).
        #[arg(long, default_value_t = 33)]
        interval_ms: u64,

        /// Number of passes over the inputs.
        #[arg(long, default_value_t = 1)]
        passes: usize,

        #[command(flatten)]
        detector: DetectorArgs,
    },
}

/// Detector overrides shared by every subcommand, applied over the settings file.
#[derive(Debug, Default, Args)]
pub struct DetectorArgs {
    /// Start from a tuning preset instead of the configured values.
    #[arg(long, value_enum)]
    pub preset: Option<DetectorPreset>,

    /// ONNX face model, replaces skin-tone detection.
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Pixels between skin samples.
    #[arg(long)]
    pub sample_step: Option<u32>,

    /// Smallest face side in pixels.
    #[arg(long)]
    pub min_face_size: Option<u32>,

    /// Minimum detection confidence, clamped to 0-1.
    #[arg(long)]
    pub confidence: Option<f32>,
}

impl DetectorArgs {
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(preset) = self.preset {
            settings = settings.detector_preset(preset);
        }
        if let Some(model) = &self.model {
            settings = settings.model_path(model.clone());
        }
        if let Some(step) = self.sample_step {
            settings = settings.sample_step(step);
        }
        if let Some(size) = self.min_face_size {
            settings = settings.min_face_size(size);
        }
        if let Some(threshold) = self.confidence {
            settings = settings.confidence_threshold(threshold);
        }
        settings
    }
}

impl Command {
    pub fn detector_args(&self) -> &DetectorArgs {
        match self {
            Command::Blur { detector, .. }
            | Command::Detect { detector, .. }
            | Command::Stream { detector, .. } => detector,
        }
    }
}
