use std::time::Instant;

use tracing::debug;

use super::config::DetectorConfig;
use super::detector::FaceDetector;
use crate::common::region::{clip_and_order, non_max_suppression};
use crate::common::{FaceRegion, Image, PixelFormat};
use crate::error::PipelineError;

/// Face detector built on skin-chroma classification.
///
/// The image is sampled on a grid, every sample is classified as skin by its
/// Cb/Cr chroma, and 4-connected groups of skin samples become candidate boxes.
/// Candidates are filtered by size, aspect ratio and fill ratio (the fill ratio
/// doubles as the confidence), then de-duplicated with non-maximum suppression.
pub struct SkinToneDetector {
    config: DetectorConfig,
}

struct Component {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    samples: u32,
}

impl SkinToneDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::DetectionFailure(format!("Invalid config: {}", e)))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn is_skin(&self, pixel: &[u8]) -> bool {
        let (r, g, b) = (pixel[0] as i32, pixel[1] as i32, pixel[2] as i32);
        // JPEG fixed-point YCbCr conversion
        let cb = 128 + ((-43 * r - 85 * g + 128 * b) >> 8);
        let cr = 128 + ((128 * r - 107 * g - 21 * b) >> 8);
        let bounds = &self.config.chroma;
        (bounds.cb_min as i32..=bounds.cb_max as i32).contains(&cb)
            && (bounds.cr_min as i32..=bounds.cr_max as i32).contains(&cr)
    }

    fn skin_mask(&self, image: &Image, grid_width: u32, grid_height: u32) -> Vec<bool> {
        let step = self.config.sample_step;
        let mut mask = Vec::with_capacity((grid_width * grid_height) as usize);
        for gy in 0..grid_height {
            for gx in 0..grid_width {
                let skin = image
                    .pixel(gx * step, gy * step)
                    .map(|pixel| {
                        let opaque = image.format() != PixelFormat::Rgba8 || pixel[3] > 0;
                        opaque && self.is_skin(pixel)
                    })
                    .unwrap_or(false);
                mask.push(skin);
            }
        }
        mask
    }

    fn components(mask: &[bool], grid_width: u32, grid_height: u32) -> Vec<Component> {
        let mut visited = vec![false; mask.len()];
        let mut components = Vec::new();
        let mut stack = Vec::new();

        for start in 0..mask.len() {
            if !mask[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push(start);
            let (sx, sy) = ((start as u32) % grid_width, (start as u32) / grid_width);
            let mut component = Component {
                min_x: sx,
                min_y: sy,
                max_x: sx,
                max_y: sy,
                samples: 0,
            };

            while let Some(index) = stack.pop() {
                let (x, y) = ((index as u32) % grid_width, (index as u32) / grid_width);
                component.samples += 1;
                component.min_x = component.min_x.min(x);
                component.min_y = component.min_y.min(y);
                component.max_x = component.max_x.max(x);
                component.max_y = component.max_y.max(y);

                let mut neighbours = Vec::with_capacity(4);
                if x > 0 {
                    neighbours.push(index - 1);
                }
                if x + 1 < grid_width {
                    neighbours.push(index + 1);
                }
                if y > 0 {
                    neighbours.push(index - grid_width as usize);
                }
                if y + 1 < grid_height {
                    neighbours.push(index + grid_width as usize);
                }
                for next in neighbours {
                    if mask[next] && !visited[next] {
                        visited[next] = true;
                        stack.push(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    fn candidate(&self, component: &Component) -> Option<FaceRegion> {
        let step = self.config.sample_step;
        let cells_x = component.max_x - component.min_x + 1;
        let cells_y = component.max_y - component.min_y + 1;
        let width = cells_x * step;
        let height = cells_y * step;
        if width < self.config.min_face_size || height < self.config.min_face_size {
            return None;
        }

        let aspect = width as f32 / height as f32;
        if aspect < self.config.min_aspect_ratio || aspect > self.config.max_aspect_ratio {
            return None;
        }

        let fill = component.samples as f32 / (cells_x * cells_y) as f32;
        if fill < self.config.confidence_threshold {
            return None;
        }

        Some(FaceRegion::new(
            component.min_x * step,
            component.min_y * step,
            width,
            height,
            fill,
        ))
    }

    fn non_max_suppression(&self, candidates: Vec<FaceRegion>) -> Vec<FaceRegion> {
        non_max_suppression(candidates, self.config.nms_threshold, self.config.max_faces)
    }
}

impl FaceDetector for SkinToneDetector {
    fn detect(&self, image: &Image) -> Result<Vec<FaceRegion>, PipelineError> {
        let start_time = Instant::now();
        if image.format() == PixelFormat::Luma8 {
            debug!("Grayscale image carries no chroma, skipping skin detection");
            return Ok(Vec::new());
        }

        let step = self.config.sample_step;
        let grid_width = image.width().div_ceil(step);
        let grid_height = image.height().div_ceil(step);
        let mask = self.skin_mask(image, grid_width, grid_height);
        let components = Self::components(&mask, grid_width, grid_height);
        let candidates: Vec<FaceRegion> = components
            .iter()
            .filter_map(|component| self.candidate(component))
            .collect();
        let faces = self.non_max_suppression(candidates);

        debug!(
            "{}: {} components, {} faces in {}us",
            self.name(),
            components.len(),
            faces.len(),
            start_time.elapsed().as_micros()
        );
        Ok(clip_and_order(faces, image.width(), image.height()))
    }

    fn name(&self) -> &'static str {
        "SkinToneDetector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: [u8; 3] = [224, 172, 140];
    const BACKGROUND: [u8; 3] = [128, 128, 128];

    fn scene(width: u32, height: u32, patches: &[(u32, u32, u32, u32)]) -> Image {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let inside = patches
                    .iter()
                    .any(|&(px, py, pw, ph)| x >= px && x < px + pw && y >= py && y < py + ph);
                pixels.extend_from_slice(if inside { &SKIN } else { &BACKGROUND });
            }
        }
        Image::from_raw(width, height, PixelFormat::Rgb8, pixels).unwrap()
    }

    fn detector() -> SkinToneDetector {
        SkinToneDetector::new(DetectorConfig::default()).unwrap()
    }

    #[test]
    fn finds_a_single_skin_patch() {
        let image = scene(200, 160, &[(60, 40, 48, 64)]);
        let faces = detector().detect(&image).unwrap();
        assert_eq!(faces, vec![FaceRegion::new(60, 40, 48, 64, 1.0)]);
    }

    #[test]
    fn orders_faces_by_position() {
        let image = scene(240, 200, &[(160, 20, 40, 40), (20, 20, 40, 40), (80, 120, 40, 48)]);
        let positions: Vec<(u32, u32)> = detector()
            .detect(&image)
            .unwrap()
            .iter()
            .map(|face| (face.x, face.y))
            .collect();
        assert_eq!(positions, vec![(20, 20), (160, 20), (80, 120)]);
    }

    #[test]
    fn rejects_small_and_elongated_patches() {
        let image = scene(200, 200, &[(10, 10, 8, 8), (40, 100, 160, 24)]);
        assert!(detector().detect(&image).unwrap().is_empty());
    }

    #[test]
    fn no_skin_means_no_faces() {
        let image = scene(64, 64, &[]);
        assert!(detector().detect(&image).unwrap().is_empty());

        let gray = Image::from_raw(64, 64, PixelFormat::Luma8, vec![200; 64 * 64]).unwrap();
        assert!(detector().detect(&gray).unwrap().is_empty());
    }

    #[test]
    fn detection_is_repeatable_and_read_only() {
        let image = scene(200, 160, &[(60, 40, 48, 64), (130, 90, 40, 40)]);
        let before = image.clone();
        let first = detector().detect(&image).unwrap();
        let second = detector().detect(&image).unwrap();
        assert_eq!(first, second);
        assert_eq!(image, before);
    }

    #[test]
    fn suppression_keeps_the_more_confident_overlap() {
        let detector = detector();
        let kept = detector.non_max_suppression(vec![
            FaceRegion::new(0, 0, 40, 40, 0.6),
            FaceRegion::new(2, 2, 40, 40, 0.9),
            FaceRegion::new(100, 100, 40, 40, 0.7),
        ]);
        assert_eq!(
            kept,
            vec![
                FaceRegion::new(2, 2, 40, 40, 0.9),
                FaceRegion::new(100, 100, 40, 40, 0.7),
            ]
        );
    }

    #[test]
    fn invalid_config_is_a_detection_failure() {
        let config = DetectorConfig {
            sample_step: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            SkinToneDetector::new(config),
            Err(PipelineError::DetectionFailure(_))
        ));
    }
}
