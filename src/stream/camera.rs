use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::common::Image;
use crate::error::PipelineError;

/// A live frame source, owned by exactly one stream task.
#[async_trait]
pub trait CameraSource: Send {
    async fn open(&mut self) -> Result<(), PipelineError>;

    /// Wait for the next frame at the source's native rate. `None` ends the stream.
    async fn next_frame(&mut self) -> Result<Option<Image>, PipelineError>;

    async fn close(&mut self);

    fn name(&self) -> &str;
}

/// In-memory camera replaying a fixed list of frames at a fixed interval.
pub struct SyntheticCamera {
    frames: Vec<Image>,
    pending: VecDeque<Image>,
    interval: Duration,
    looping: bool,
    unavailable: Option<String>,
    opened: bool,
}

impl SyntheticCamera {
    pub fn new(frames: Vec<Image>, interval: Duration) -> Self {
        Self {
            frames,
            pending: VecDeque::new(),
            interval,
            looping: false,
            unavailable: None,
            opened: false,
        }
    }

    /// A camera whose `open` always fails, like an unplugged device.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::new(Vec::new(), Duration::ZERO)
        }
    }

    // Replays the frame list until the stream is stopped.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }
}

#[async_trait]
impl CameraSource for SyntheticCamera {
    async fn open(&mut self) -> Result<(), PipelineError> {
        if let Some(reason) = &self.unavailable {
            return Err(PipelineError::DeviceUnavailable(reason.clone()));
        }
        self.pending = self.frames.iter().cloned().collect();
        self.opened = true;
        info!("Opened synthetic camera with {} frames", self.frames.len());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Image>, PipelineError> {
        if !self.opened {
            return Err(PipelineError::DeviceUnavailable(
                "camera is not open".to_string(),
            ));
        }
        if self.pending.is_empty() && self.looping && !self.frames.is_empty() {
            self.pending = self.frames.iter().cloned().collect();
        }
        let Some(frame) = self.pending.pop_front() else {
            return Ok(None);
        };
        tokio::time::sleep(self.interval).await;
        Ok(Some(frame))
    }

    async fn close(&mut self) {
        if self.opened {
            debug!("Closing synthetic camera");
        }
        self.opened = false;
        self.pending.clear();
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
