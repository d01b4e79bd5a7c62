use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::common::{FaceRegion, Image};
use crate::config::Settings;
use crate::error::PipelineError;
use crate::pipeline::blur::BlurConfig;
use crate::pipeline::detection::{DetectorConfig, FaceDetector, OnnxFaceDetector, SkinToneDetector};
use crate::pipeline::job::{JobFailure, ProcessingJob, ProcessingStats};
use crate::pipeline::workers::{PartitionConfig, WorkerPools};

/// Encoded output of a finished job.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub regions: Vec<FaceRegion>,
    pub stats: ProcessingStats,
}

/// Entry point for still images: decodes submissions and builds jobs.
///
/// Clones share the detector and the blur thread pools.
#[derive(Clone)]
pub struct FaceBlurService {
    detector: Arc<dyn FaceDetector>,
    pools: Arc<WorkerPools>,
    partition: PartitionConfig,
    timeout: Option<Duration>,
}

/// The ONNX detector when a model is configured, skin tones otherwise.
pub fn detector_from_config(config: &DetectorConfig) -> Result<Arc<dyn FaceDetector>, PipelineError> {
    let detector: Arc<dyn FaceDetector> = if config.model.path.is_some() {
        Arc::new(OnnxFaceDetector::new(config.clone())?)
    } else {
        Arc::new(SkinToneDetector::new(config.clone())?)
    };
    debug!("Using {}", detector.name());
    Ok(detector)
}

impl FaceBlurService {
    pub fn builder() -> FaceBlurServiceBuilder {
        FaceBlurServiceBuilder::default()
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        Self::builder()
            .detector(detector_from_config(&settings.detector)?)
            .partition(settings.partition)
            .timeout(settings.job.timeout())
            .build()
    }

    // Replaces the per-job budget, jobs run unbounded when None.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn detector(&self) -> &Arc<dyn FaceDetector> {
        &self.detector
    }

    pub fn worker_pools(&self) -> &Arc<WorkerPools> {
        &self.pools
    }

    /// Decode `bytes` and create a job for them. Undecodable or empty input is
    /// rejected here, before any job exists.
    pub fn submit(&self, bytes: &[u8], config: BlurConfig) -> Result<ProcessingJob, PipelineError> {
        let image = Image::decode(bytes)?;
        Ok(self.submit_image(image, config))
    }

    pub fn submit_image(&self, image: Image, config: BlurConfig) -> ProcessingJob {
        let job = ProcessingJob::new(self.detector.clone(), image, config)
            .with_partition(self.partition)
            .with_worker_pools(self.pools.clone());
        match self.timeout {
            Some(timeout) => job.with_timeout(timeout),
            None => job,
        }
    }

    /// Submit, run and encode in one call.
    #[instrument(skip_all)]
    pub async fn process(&self, bytes: &[u8], config: BlurConfig) -> Result<ProcessedImage, JobFailure> {
        let job = self.submit(bytes, config).map_err(|error| JobFailure {
            stats: ProcessingStats::rejected(&error),
            error,
        })?;
        let id = job.id();
        let output = job.run().await?;
        let bytes = output.image.encode().map_err(|error| JobFailure {
            error,
            stats: output.stats.clone(),
        })?;
        info!("Job {} encoded {} bytes", id, bytes.len());
        Ok(ProcessedImage {
            bytes,
            regions: output.regions,
            stats: output.stats,
        })
    }

    /// Run detection only.
    pub fn detect(&self, image: &Image) -> Result<Vec<FaceRegion>, PipelineError> {
        self.detector.detect(image)
    }
}

#[derive(Default)]
pub struct FaceBlurServiceBuilder {
    detector: Option<Arc<dyn FaceDetector>>,
    partition: PartitionConfig,
    timeout: Option<Duration>,
}

impl FaceBlurServiceBuilder {
    pub fn detector(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    // Adjusts how large regions are tiled, this will override the default partitioning.
    pub fn partition(mut self, partition: PartitionConfig) -> Self {
        self.partition = partition;
        self
    }

    // Sets the per-job budget, jobs run unbounded when None.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<FaceBlurService, PipelineError> {
        let detector = match self.detector {
            Some(detector) => detector,
            None => Arc::new(SkinToneDetector::new(Default::default())?),
        };
        Ok(FaceBlurService {
            detector,
            pools: Arc::new(WorkerPools::new()),
            partition: self.partition,
            timeout: self.timeout,
        })
    }
}
