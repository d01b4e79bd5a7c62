use serde::{Deserialize, Serialize};

pub const MIN_INTENSITY: u32 = 5;
pub const MAX_INTENSITY: u32 = 50;
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 8;

/// Blur parameters coming from the settings panel.
///
/// Values outside the slider bounds are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBlurConfig")]
pub struct BlurConfig {
    intensity: u32,
    worker_count: usize,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawBlurConfig {
    intensity: u32,
    worker_count: usize,
}

impl Default for RawBlurConfig {
    fn default() -> Self {
        let defaults = BlurConfig::default();
        Self {
            intensity: defaults.intensity,
            worker_count: defaults.worker_count,
        }
    }
}

impl From<RawBlurConfig> for BlurConfig {
    fn from(raw: RawBlurConfig) -> Self {
        BlurConfig::new(raw.intensity, raw.worker_count)
    }
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            intensity: 20,
            worker_count: 4,
        }
    }
}

impl BlurConfig {
    pub fn new(intensity: u32, worker_count: usize) -> Self {
        Self {
            intensity: intensity.clamp(MIN_INTENSITY, MAX_INTENSITY),
            worker_count: worker_count.clamp(MIN_WORKERS, MAX_WORKERS),
        }
    }

    pub fn intensity(&self) -> u32 {
        self.intensity
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn with_intensity(self, intensity: u32) -> Self {
        Self::new(intensity, self.worker_count)
    }

    pub fn with_worker_count(self, worker_count: usize) -> Self {
        Self::new(self.intensity, worker_count)
    }
}
