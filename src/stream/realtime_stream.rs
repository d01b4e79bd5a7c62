use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::camera::CameraSource;
use crate::common::Frame;
use crate::error::PipelineError;
use crate::pipeline::blur::BlurConfig;
use crate::pipeline::job::{ProcessingJob, ProcessingStats};
use crate::pipeline::service::FaceBlurService;

/// What the preview shows: a raw frame until the first result, then the latest
/// blurred frame.
#[derive(Debug, Clone)]
pub struct DisplayFrame {
    pub frame: Frame,
    pub blurred: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    Starting,
    Running,
    Stopped,
    Failed(PipelineError),
}

#[derive(Debug, Default)]
pub struct StreamStats {
    captured: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatsSnapshot {
    pub captured: u64,
    pub processed: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    stats: StreamStats,
    in_flight: AtomicBool,
    display_tx: watch::Sender<Option<DisplayFrame>>,
    job_stats_tx: watch::Sender<Option<ProcessingStats>>,
    status_tx: watch::Sender<StreamStatus>,
}

/// Pulls camera frames and blurs them with at most one job in flight.
///
/// Frames arriving while a job runs are dropped, never queued.
pub struct RealtimeStream {
    task: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
    shared: Arc<Shared>,
}

impl RealtimeStream {
    pub fn start<C>(camera: C, service: FaceBlurService, config_rx: watch::Receiver<BlurConfig>) -> Self
    where
        C: CameraSource + 'static,
    {
        let cancel_token = CancellationToken::new();
        let shared = Arc::new(Shared {
            stats: StreamStats::default(),
            in_flight: AtomicBool::new(false),
            display_tx: watch::channel(None).0,
            job_stats_tx: watch::channel(None).0,
            status_tx: watch::channel(StreamStatus::Starting).0,
        });
        let task = tokio::spawn(Self::run(
            camera,
            service,
            config_rx,
            shared.clone(),
            cancel_token.clone(),
        ));
        Self {
            task: Some(task),
            cancel_token,
            shared,
        }
    }

    async fn run<C: CameraSource>(
        mut camera: C,
        service: FaceBlurService,
        config_rx: watch::Receiver<BlurConfig>,
        shared: Arc<Shared>,
        cancel_token: CancellationToken,
    ) {
        if let Err(e) = camera.open().await {
            error!("Failed to open camera {}: {}", camera.name(), e);
            shared.status_tx.send_replace(StreamStatus::Failed(Self::device_error(e)));
            return;
        }
        shared.status_tx.send_replace(StreamStatus::Running);
        info!("Streaming from camera {}", camera.name());

        let mut sequence = 0u64;
        let mut job_task: Option<JoinHandle<()>> = None;
        let mut failure = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                next = camera.next_frame() => next,
            };
            let image = match next {
                Ok(Some(image)) => image,
                Ok(None) => {
                    info!("Camera {} reached end of stream", camera.name());
                    break;
                }
                Err(e) => {
                    error!("Camera {} failed: {}", camera.name(), e);
                    failure = Some(Self::device_error(e));
                    break;
                }
            };

            sequence += 1;
            shared.stats.captured.fetch_add(1, Ordering::Relaxed);
            let frame = Frame::new(sequence, image, Utc::now());
            shared.display_tx.send_if_modified(|current| {
                if current.as_ref().is_some_and(|shown| shown.blurred) {
                    return false;
                }
                *current = Some(DisplayFrame {
                    frame: frame.clone(),
                    blurred: false,
                });
                true
            });

            if shared.in_flight.swap(true, Ordering::AcqRel) {
                shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping frame {}: job in flight", sequence);
                continue;
            }

            let config = *config_rx.borrow();
            let job = service
                .submit_image(frame.image().as_ref().clone(), config)
                .with_parent_token(&cancel_token);
            job_task = Some(tokio::spawn(Self::process_frame(
                job,
                frame,
                shared.clone(),
                cancel_token.clone(),
            )));
        }

        camera.close().await;
        if !cancel_token.is_cancelled() {
            if let Some(task) = job_task.take() {
                if let Err(e) = task.await {
                    warn!("Frame job task ended abnormally: {}", e);
                }
            }
        }

        let status = match failure {
            Some(e) => StreamStatus::Failed(e),
            None => StreamStatus::Stopped,
        };
        shared.status_tx.send_replace(status);
        info!("Stream stopped after {} frames", sequence);
    }

    async fn process_frame(
        job: ProcessingJob,
        frame: Frame,
        shared: Arc<Shared>,
        cancel_token: CancellationToken,
    ) {
        match job.run().await {
            Ok(output) => {
                shared.stats.processed.fetch_add(1, Ordering::Relaxed);
                let blurred = Frame::new(frame.sequence(), output.image, frame.captured_at());
                shared.display_tx.send_replace(Some(DisplayFrame {
                    frame: blurred,
                    blurred: true,
                }));
                shared.job_stats_tx.send_replace(Some(output.stats));
            }
            Err(failure) if failure.error.is_cancelled() && cancel_token.is_cancelled() => {
                debug!("Frame {} job cancelled by stream stop", frame.sequence());
            }
            Err(failure) => {
                shared.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Frame {} failed: {}", frame.sequence(), failure.error);
                shared.job_stats_tx.send_replace(Some(failure.stats));
            }
        }
        shared.in_flight.store(false, Ordering::Release);
    }

    fn device_error(error: PipelineError) -> PipelineError {
        match error {
            PipelineError::DeviceUnavailable(_) => error,
            other => PipelineError::DeviceUnavailable(other.to_string()),
        }
    }

    pub fn display(&self) -> watch::Receiver<Option<DisplayFrame>> {
        self.shared.display_tx.subscribe()
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.status_tx.borrow().clone()
    }

    pub fn status_receiver(&self) -> watch::Receiver<StreamStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stats of the most recent frame job that reached a terminal state.
    pub fn latest_job_stats(&self) -> Option<ProcessingStats> {
        self.shared.job_stats_tx.borrow().clone()
    }

    /// Wait for the stream to end on its own (end of stream or device failure).
    pub async fn wait(&mut self) -> StreamStatus {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Stream task ended abnormally: {}", e);
            }
        }
        self.status()
    }

    /// Stop pulling frames, close the camera and cancel the in-flight job.
    pub async fn stop(&mut self) -> StreamStatus {
        self.cancel_token.cancel();
        self.wait().await
    }
}

impl Drop for RealtimeStream {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
