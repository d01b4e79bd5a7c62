mod cli;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use faceblur::error::AppError;
use faceblur::{
    BlurConfig, DetectionReport, FaceBlurService, Image, RealtimeStream, Settings, SyntheticCamera,
};
use faceblur::stream::StreamStatus;
use tokio::sync::watch;
use tracing::{error, info, Level};

use crate::cli::{Cli, Command};

fn init_logging(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn read_file(path: &Path) -> Result<Vec<u8>, AppError> {
    std::fs::read(path).map_err(|e| AppError::Io(e, path.display().to_string()))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = cli
        .command
        .detector_args()
        .apply(Settings::load(cli.config.as_deref())?);
    init_logging(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    match cli.command {
        Command::Blur {
            input,
            output,
            intensity,
            workers,
            json,
            ..
        } => {
            let mut config = settings.blur;
            if let Some(intensity) = intensity {
                config = config.with_intensity(intensity);
            }
            if let Some(workers) = workers {
                config = config.with_worker_count(workers);
            }
            blur(&settings, &input, &output, config, json).await
        }
        Command::Detect { input, compact, .. } => detect(&settings, &input, compact),
        Command::Stream {
            inputs,
            interval_ms,
            passes,
            ..
        } => stream(&settings, &inputs, Duration::from_millis(interval_ms), passes).await,
    }
}

async fn blur(
    settings: &Settings,
    input: &Path,
    output: &Path,
    config: BlurConfig,
    json: bool,
) -> Result<(), AppError> {
    let bytes = read_file(input)?;
    let service = FaceBlurService::from_settings(settings)?;
    let processed = match service.process(&bytes, config).await {
        Ok(processed) => processed,
        Err(failure) => {
            error!("Failed to blur {}: {}", input.display(), failure.error);
            if json {
                println!("{}", serde_json::to_string_pretty(&failure.stats)?);
            }
            return Err(failure.error.into());
        }
    };
    std::fs::write(output, &processed.bytes)
        .map_err(|e| AppError::Io(e, output.display().to_string()))?;
    info!(
        "Blurred {} faces in {:.2}ms, wrote {}",
        processed.stats.faces_detected,
        processed.stats.elapsed_millis,
        output.display()
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&processed.stats)?);
    }
    Ok(())
}

fn detect(settings: &Settings, input: &Path, compact: bool) -> Result<(), AppError> {
    let bytes = read_file(input)?;
    let service = FaceBlurService::from_settings(settings)?;
    let report: DetectionReport = Image::decode(&bytes)
        .and_then(|image| service.detect(&image))
        .into();
    let rendered = if compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    println!("{}", rendered);
    Ok(())
}

async fn stream(
    settings: &Settings,
    inputs: &[std::path::PathBuf],
    interval: Duration,
    passes: usize,
) -> Result<(), AppError> {
    let mut frames = Vec::with_capacity(inputs.len());
    for path in inputs {
        frames.push(Image::decode(&read_file(path)?)?);
    }
    let frames: Vec<Image> = std::iter::repeat(frames).take(passes.max(1)).flatten().collect();

    let service = FaceBlurService::from_settings(settings)?.with_timeout(settings.stream.job_timeout());
    let (_config_tx, config_rx) = watch::channel(settings.blur);
    let mut stream = RealtimeStream::start(SyntheticCamera::new(frames, interval), service, config_rx);

    let status = tokio::select! {
        status = stream.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping stream");
            stream.stop().await
        }
    };
    println!("{}", serde_json::to_string_pretty(&stream.stats())?);
    match status {
        StreamStatus::Failed(e) => Err(e.into()),
        status => {
            info!("Stream finished with status {:?}", status);
            Ok(())
        }
    }
}
