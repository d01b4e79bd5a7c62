use crate::common::region::clip_and_order;
use crate::common::{FaceRegion, Image};
use crate::error::PipelineError;

/// Pluggable face detection backend.
///
/// Implementations must be deterministic and must not mutate the image. The
/// returned regions lie inside the image and are ordered by `y`, then `x`.
/// Finding no face is `Ok(vec![])`; errors are reserved for detector faults.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &Image) -> Result<Vec<FaceRegion>, PipelineError>;
    fn name(&self) -> &'static str;
}

/// Detector that reports a fixed set of regions, for callers that already know
/// where the faces are.
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    regions: Vec<FaceRegion>,
}

impl StaticDetector {
    pub fn new(regions: Vec<FaceRegion>) -> Self {
        Self { regions }
    }
}

impl FaceDetector for StaticDetector {
    fn detect(&self, image: &Image) -> Result<Vec<FaceRegion>, PipelineError> {
        Ok(clip_and_order(
            self.regions.clone(),
            image.width(),
            image.height(),
        ))
    }

    fn name(&self) -> &'static str {
        "StaticDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PixelFormat;

    #[test]
    fn static_detector_clips_and_orders() {
        let image = Image::from_raw(100, 80, PixelFormat::Luma8, vec![0; 100 * 80]).unwrap();
        let detector = StaticDetector::new(vec![
            FaceRegion::new(80, 60, 40, 40, 0.9),
            FaceRegion::new(10, 10, 20, 20, 0.8),
        ]);
        let regions = detector.detect(&image).unwrap();
        assert_eq!(
            regions,
            vec![
                FaceRegion::new(10, 10, 20, 20, 0.8),
                FaceRegion::new(80, 60, 20, 20, 0.9),
            ]
        );
    }
}
