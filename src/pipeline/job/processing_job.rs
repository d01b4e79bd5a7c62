use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::phase_timings::{JobPhase, PhaseTimings};
use super::stats::{JobStatus, ProcessingStats};
use crate::common::{FaceRegion, Image};
use crate::error::{CancelReason, PipelineError};
use crate::pipeline::blur::BlurConfig;
use crate::pipeline::detection::FaceDetector;
use crate::pipeline::workers::{PartitionConfig, WorkerPools};

/// Successful terminal value of a job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub image: Image,
    pub regions: Vec<FaceRegion>,
    pub stats: ProcessingStats,
}

/// Failed terminal value of a job, carrying the stats at the time of failure.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct JobFailure {
    pub error: PipelineError,
    pub stats: ProcessingStats,
}

/// Observer and cancel switch for a job, usable while the job runs elsewhere.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    cancel_token: CancellationToken,
    status_rx: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        *self.status_rx.borrow()
    }

    /// Request cooperative cancellation. Units already running finish first.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Wait until the job reaches a terminal state, or its owner drops it.
    pub async fn wait_for_terminal(&mut self) -> JobStatus {
        if let Ok(status) = self.status_rx.wait_for(JobStatus::is_terminal).await {
            return *status;
        }
        self.status()
    }
}

struct Executed {
    image: Image,
    regions: Vec<FaceRegion>,
    workers_used: usize,
    timings: PhaseTimings,
}

/// One detect, blur, merge run over a single submitted image.
///
/// `run` consumes the job, so a job can be started once only. Configuration
/// is captured when the job is built; later settings changes only affect new jobs.
pub struct ProcessingJob {
    id: Uuid,
    image: Image,
    config: BlurConfig,
    partition: PartitionConfig,
    detector: Arc<dyn FaceDetector>,
    pools: Arc<WorkerPools>,
    timeout: Option<Duration>,
    cancel_token: CancellationToken,
    status_tx: watch::Sender<JobStatus>,
}

impl ProcessingJob {
    pub fn new(detector: Arc<dyn FaceDetector>, image: Image, config: BlurConfig) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::Waiting);
        Self {
            id: Uuid::new_v4(),
            image,
            config,
            partition: PartitionConfig::default(),
            detector,
            pools: Arc::new(WorkerPools::new()),
            timeout: None,
            cancel_token: CancellationToken::new(),
            status_tx,
        }
    }

    // Sets a wall-clock budget, exceeding it cancels the job.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partition = partition;
        self
    }

    // Runs the blur phase on shared thread pools instead of a private one.
    pub fn with_worker_pools(mut self, pools: Arc<WorkerPools>) -> Self {
        self.pools = pools;
        self
    }

    // Ties the job to an outer token, cancelling the parent cancels the job.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel_token = parent.child_token();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> BlurConfig {
        self.config
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            cancel_token: self.cancel_token.clone(),
            status_rx: self.status_tx.subscribe(),
        }
    }

    #[instrument(skip_all, fields(job_id = %self.id))]
    pub async fn run(self) -> Result<JobOutput, JobFailure> {
        let start_time = Instant::now();
        self.status_tx.send_replace(JobStatus::Processing);
        let image = self.image;
        info!(
            "Processing {}x{} image, intensity {}, {} workers",
            image.width(),
            image.height(),
            self.config.intensity(),
            self.config.worker_count()
        );

        let detector = self.detector.clone();
        let pools = self.pools.clone();
        let (config, partition) = (self.config, self.partition);
        let token = self.cancel_token.clone();
        let mut work = tokio::task::spawn_blocking(move || {
            Self::execute(detector.as_ref(), &pools, config, partition, image, &token)
        });

        let mut timed_out = false;
        let joined = match self.timeout {
            Some(budget) => match tokio::time::timeout(budget, &mut work).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Job exceeded its {}ms budget, cancelling", budget.as_millis());
                    timed_out = true;
                    self.cancel_token.cancel();
                    work.await
                }
            },
            None => work.await,
        };

        let result = joined
            .map_err(|e| PipelineError::BlurFailure(format!("worker task failed: {}", e)))
            .and_then(|result| result)
            .and_then(|executed| {
                // A cancel that lands after the last unit still wins over completion.
                if self.cancel_token.is_cancelled() {
                    Err(PipelineError::Cancelled(CancelReason::Requested))
                } else {
                    Ok(executed)
                }
            })
            .map_err(|e| match e {
                PipelineError::Cancelled(_) if timed_out => {
                    PipelineError::Cancelled(CancelReason::Timeout)
                }
                other => other,
            });

        let elapsed_millis = start_time.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(executed) => {
                let stats = ProcessingStats {
                    job_id: self.id,
                    elapsed_millis,
                    faces_detected: executed.regions.len(),
                    workers_used: executed.workers_used,
                    status: JobStatus::Completed,
                    phase_millis: executed.timings.to_millis(),
                    error_kind: None,
                };
                self.status_tx.send_replace(JobStatus::Completed);
                info!(
                    "Job completed: {} faces, {} workers, {:.2}ms",
                    stats.faces_detected, stats.workers_used, elapsed_millis
                );
                Ok(JobOutput {
                    image: executed.image,
                    regions: executed.regions,
                    stats,
                })
            }
            Err(error) => {
                let stats = ProcessingStats {
                    elapsed_millis,
                    status: JobStatus::Failed,
                    error_kind: Some(error.kind()),
                    ..ProcessingStats::waiting(self.id)
                };
                self.status_tx.send_replace(JobStatus::Failed);
                warn!("Job failed after {:.2}ms: {}", elapsed_millis, error);
                Err(JobFailure { error, stats })
            }
        }
    }

    fn execute(
        detector: &dyn FaceDetector,
        pools: &WorkerPools,
        config: BlurConfig,
        partition: PartitionConfig,
        image: Image,
        cancel: &CancellationToken,
    ) -> Result<Executed, PipelineError> {
        let mut timings = PhaseTimings::new();
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(CancelReason::Requested));
        }

        let phase_start = Instant::now();
        let regions = detector.detect(&image)?;
        timings.record(JobPhase::Detection, phase_start.elapsed());
        debug!("{} found {} faces", detector.name(), regions.len());

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(CancelReason::Requested));
        }

        let phase_start = Instant::now();
        let pool = pools.get(config, partition)?;
        let outcome = pool.blur_all(&image, &regions, cancel)?;
        timings.record(JobPhase::Blur, phase_start.elapsed());

        Ok(Executed {
            image: outcome.image,
            regions,
            workers_used: outcome.workers_used,
            timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PixelFormat, PixelRect};
    use crate::error::ErrorKind;
    use crate::pipeline::detection::StaticDetector;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct SlowDetector {
        delay: Duration,
        regions: Vec<FaceRegion>,
    }

    impl FaceDetector for SlowDetector {
        fn detect(&self, _image: &Image) -> Result<Vec<FaceRegion>, PipelineError> {
            std::thread::sleep(self.delay);
            Ok(self.regions.clone())
        }

        fn name(&self) -> &'static str {
            "SlowDetector"
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&self, _image: &Image) -> Result<Vec<FaceRegion>, PipelineError> {
            Err(PipelineError::DetectionFailure("model unavailable".to_string()))
        }

        fn name(&self) -> &'static str {
            "FailingDetector"
        }
    }

    fn noise(width: u32, height: u32) -> Image {
        let mut rng = StdRng::seed_from_u64(42);
        let pixels: Vec<u8> = (0..width * height * 3).map(|_| rng.random()).collect();
        Image::from_raw(width, height, PixelFormat::Rgb8, pixels).unwrap()
    }

    fn job(image: &Image, regions: Vec<FaceRegion>, intensity: u32, workers: usize) -> ProcessingJob {
        ProcessingJob::new(
            Arc::new(StaticDetector::new(regions)),
            image.clone(),
            BlurConfig::new(intensity, workers),
        )
    }

    /// Every pixel that differs between the two images lies inside one of `rects`.
    fn changes_confined_to(before: &Image, after: &Image, rects: &[PixelRect]) -> bool {
        (0..before.height()).all(|y| {
            (0..before.width()).all(|x| {
                before.pixel(x, y) == after.pixel(x, y)
                    || rects.iter().any(|rect| rect.contains_point(x, y))
            })
        })
    }

    fn changed_inside(before: &Image, after: &Image, rect: PixelRect) -> bool {
        (rect.y..rect.bottom())
            .any(|y| (rect.x..rect.right()).any(|x| before.pixel(x, y) != after.pixel(x, y)))
    }

    #[tokio::test]
    async fn single_face_scenario() {
        let image = noise(800, 600);
        let face = FaceRegion::new(100, 100, 50, 50, 0.9);
        let output = job(&image, vec![face], 20, 4).run().await.unwrap();

        assert_eq!(output.stats.status, JobStatus::Completed);
        assert_eq!(output.stats.faces_detected, 1);
        assert_eq!(output.stats.workers_used, 1);
        assert!(output.stats.elapsed_millis >= 0.0);
        assert!(changes_confined_to(&image, &output.image, &[face.rect()]));
        assert!(changed_inside(&image, &output.image, face.rect()));
    }

    #[tokio::test]
    async fn five_faces_on_four_workers() {
        let image = noise(640, 480);
        let faces: Vec<FaceRegion> = (0..5)
            .map(|i| FaceRegion::new(20 + i * 120, 40 + i * 60, 60, 70, 0.8))
            .collect();
        let rects: Vec<PixelRect> = faces.iter().map(FaceRegion::rect).collect();
        let output = job(&image, faces, 30, 4).run().await.unwrap();

        assert_eq!(output.stats.faces_detected, 5);
        assert_eq!(output.stats.workers_used, 4);
        assert!(changes_confined_to(&image, &output.image, &rects));
        assert!(rects.iter().all(|&rect| changed_inside(&image, &output.image, rect)));
    }

    #[tokio::test]
    async fn zero_faces_pass_through() {
        let image = noise(120, 90);
        let output = job(&image, Vec::new(), 20, 4).run().await.unwrap();
        assert_eq!(output.image, image);
        assert_eq!(output.stats.faces_detected, 0);
        assert_eq!(output.stats.workers_used, 0);
        assert_eq!(output.stats.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn identical_input_gives_identical_output_for_any_worker_count() {
        let image = noise(400, 300);
        let faces = vec![
            FaceRegion::new(10, 10, 150, 180, 0.9),
            FaceRegion::new(200, 50, 90, 90, 0.9),
            FaceRegion::new(250, 120, 100, 100, 0.9),
        ];
        let reference = job(&image, faces.clone(), 35, 1).run().await.unwrap();
        for workers in [2, 3, 8] {
            let output = job(&image, faces.clone(), 35, workers).run().await.unwrap();
            assert_eq!(output.image, reference.image);
            assert_eq!(output.stats.faces_detected, reference.stats.faces_detected);
            assert!(output.stats.workers_used <= workers);
        }
    }

    #[tokio::test]
    async fn status_transitions_are_observable() {
        let job = job(&noise(32, 32), vec![FaceRegion::new(0, 0, 10, 10, 1.0)], 20, 2);
        let mut handle = job.handle();
        assert_eq!(handle.status(), JobStatus::Waiting);

        let task = tokio::spawn(job.run());
        assert_eq!(handle.wait_for_terminal().await, JobStatus::Completed);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancel_before_run_fails_as_cancelled() {
        let job = job(&noise(32, 32), vec![FaceRegion::new(0, 0, 10, 10, 1.0)], 20, 2);
        let handle = job.handle();
        handle.cancel();

        let failure = job.run().await.unwrap_err();
        assert_eq!(failure.error, PipelineError::Cancelled(CancelReason::Requested));
        assert_eq!(failure.stats.status, JobStatus::Failed);
        assert_eq!(failure.stats.faces_detected, 0);
        assert_eq!(handle.status(), JobStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_while_processing_never_completes() {
        let detector = SlowDetector {
            delay: Duration::from_millis(150),
            regions: vec![FaceRegion::new(0, 0, 20, 20, 1.0)],
        };
        let job = ProcessingJob::new(Arc::new(detector), noise(64, 64), BlurConfig::default());
        let mut handle = job.handle();
        let task = tokio::spawn(job.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let failure = task.await.unwrap().unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::Cancelled);
        assert_eq!(handle.wait_for_terminal().await, JobStatus::Failed);
    }

    #[tokio::test]
    async fn exceeding_the_budget_fails_with_timeout() {
        let detector = SlowDetector {
            delay: Duration::from_millis(200),
            regions: vec![FaceRegion::new(0, 0, 20, 20, 1.0)],
        };
        let job = ProcessingJob::new(Arc::new(detector), noise(64, 64), BlurConfig::default())
            .with_timeout(Duration::from_millis(30));

        let failure = job.run().await.unwrap_err();
        assert_eq!(failure.error, PipelineError::Cancelled(CancelReason::Timeout));
        assert_eq!(failure.stats.error_kind, Some(ErrorKind::Timeout));
        assert!(failure.stats.elapsed_millis >= 30.0);
    }

    #[tokio::test]
    async fn detector_failure_fails_the_job_with_zeroed_counters() {
        let job = ProcessingJob::new(Arc::new(FailingDetector), noise(16, 16), BlurConfig::default());
        let failure = job.run().await.unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::DetectionFailure);
        assert_eq!(failure.stats.workers_used, 0);
        assert_eq!(failure.stats.faces_detected, 0);
        assert_eq!(failure.stats.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn jobs_share_thread_pools() {
        let image = noise(96, 96);
        let pools = Arc::new(WorkerPools::new());
        let faces = vec![FaceRegion::new(10, 10, 40, 40, 0.9)];
        let first = job(&image, faces.clone(), 20, 3)
            .with_worker_pools(pools.clone())
            .run()
            .await
            .unwrap();
        let second = job(&image, faces, 20, 3)
            .with_worker_pools(pools.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(first.image, second.image);
        assert_eq!(pools.len(), 1);
    }

    #[tokio::test]
    async fn parent_token_cancels_the_job() {
        let parent = CancellationToken::new();
        let job = job(&noise(16, 16), vec![FaceRegion::new(0, 0, 10, 10, 1.0)], 20, 2)
            .with_parent_token(&parent);
        parent.cancel();
        let failure = job.run().await.unwrap_err();
        assert!(failure.error.is_cancelled());
    }
}
