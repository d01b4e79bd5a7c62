use std::path::Path;
use std::time::Instant;

use image::imageops::{self, FilterType};
use tracing::{debug, info, warn};
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, Tensor, TypedFact, TypedOp,
};

use super::config::{DetectorConfig, ModelLayout};
use super::detector::FaceDetector;
use crate::common::region::{clip_and_order, non_max_suppression};
use crate::common::{FaceRegion, Image};
use crate::error::PipelineError;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

const YUNET_COLUMNS: usize = 15;
const YUNET_SCORE: usize = 14;

/// Face detector running an ONNX model through `tract`.
///
/// Every image is stretched to the model input size, run once, and the single
/// output tensor is decoded per `ModelLayout`. Boxes are scaled back to the
/// source image, thresholded, suppressed and clipped.
pub struct OnnxFaceDetector {
    runnable: RunnableModel,
    config: DetectorConfig,
}

impl OnnxFaceDetector {
    /// Load the model named by `config.model.path`.
    pub fn new(config: DetectorConfig) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::DetectionFailure(format!("Invalid config: {}", e)))?;
        let path = config.model.path.as_deref().ok_or_else(|| {
            PipelineError::DetectionFailure("no model path configured".to_string())
        })?;
        if !path.exists() {
            return Err(PipelineError::DetectionFailure(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        let runnable = match load_runnable(path, true) {
            Ok(runnable) => runnable,
            Err(e) => {
                warn!(
                    "Optimizing {} failed ({}), falling back to the decluttered graph",
                    path.display(),
                    e
                );
                load_runnable(path, false)?
            }
        };
        info!(
            "Loaded {:?} model {} ({}x{})",
            config.model.layout,
            path.display(),
            config.model.input_width,
            config.model.input_height
        );
        Ok(Self { runnable, config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// `[1, 3, H, W]` planar input in the channel order and range of the layout.
    fn preprocess(&self, image: &Image) -> Result<Tensor, PipelineError> {
        let (input_width, input_height) = (self.config.model.input_width, self.config.model.input_height);
        let rgb = image.to_dynamic()?.to_rgb8();
        let resized = if rgb.dimensions() == (input_width, input_height) {
            rgb
        } else {
            imageops::resize(&rgb, input_width, input_height, FilterType::Triangle)
        };

        let plane = (input_width * input_height) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let index = (y * input_width + x) as usize;
            for channel in 0..3 {
                data[channel * plane + index] = match self.config.model.layout {
                    ModelLayout::Yolo => pixel[channel] as f32 / 255.0,
                    ModelLayout::Yunet => pixel[2 - channel] as f32,
                };
            }
        }
        Tensor::from_shape(&[1, 3, input_height as usize, input_width as usize], &data)
            .map_err(|e| PipelineError::DetectionFailure(format!("failed to build input tensor: {}", e)))
    }
}

fn load_runnable(path: &Path, optimized: bool) -> Result<RunnableModel, PipelineError> {
    let model = tract_onnx::onnx().model_for_path(path).map_err(|e| {
        PipelineError::DetectionFailure(format!(
            "failed to parse ONNX graph from {}: {}",
            path.display(),
            e
        ))
    })?;
    let typed = if optimized {
        model.into_optimized()
    } else {
        model.into_typed().and_then(|typed| typed.into_decluttered())
    };
    typed.and_then(|typed| typed.into_runnable()).map_err(|e| {
        PipelineError::DetectionFailure(format!("unable to prepare {}: {}", path.display(), e))
    })
}

/// Decode one output tensor into face regions of a `source` sized image.
///
/// `input` is the size the image was stretched to before inference.
pub(crate) fn decode_output(
    output: &Tensor,
    layout: ModelLayout,
    source: (u32, u32),
    input: (u32, u32),
    config: &DetectorConfig,
) -> Result<Vec<FaceRegion>, PipelineError> {
    let data = output
        .as_slice::<f32>()
        .map_err(|e| PipelineError::DetectionFailure(format!("model output is not f32: {}", e)))?;
    let shape = output.shape();

    // (x, y, width, height, score) in model input pixels
    let boxes: Vec<[f32; 5]> = match layout {
        ModelLayout::Yolo => {
            let (features, count) = match shape {
                [1, features, count] | [features, count] => (*features, *count),
                other => {
                    return Err(PipelineError::DetectionFailure(format!(
                        "YOLO output must be [1, F, N] or [F, N], got {:?}",
                        other
                    )))
                }
            };
            if features < 5 {
                return Err(PipelineError::DetectionFailure(format!(
                    "YOLO output needs a box and at least one class, got {} features",
                    features
                )));
            }
            (0..count)
                .map(|i| {
                    let at = |feature: usize| data[feature * count + i];
                    let score = (4..features).map(at).fold(0.0f32, f32::max);
                    let (width, height) = (at(2), at(3));
                    [at(0) - width / 2.0, at(1) - height / 2.0, width, height, score]
                })
                .collect()
        }
        ModelLayout::Yunet => {
            match shape {
                [_, YUNET_COLUMNS] | [1, _, YUNET_COLUMNS] => {}
                other => {
                    return Err(PipelineError::DetectionFailure(format!(
                        "YuNet output must be [N, 15] or [1, N, 15], got {:?}",
                        other
                    )))
                }
            }
            data.chunks_exact(YUNET_COLUMNS)
                .map(|row| [row[0], row[1], row[2], row[3], row[YUNET_SCORE]])
                .collect()
        }
    };

    let scale_x = source.0 as f32 / input.0 as f32;
    let scale_y = source.1 as f32 / input.1 as f32;
    let candidates: Vec<FaceRegion> = boxes
        .into_iter()
        .filter(|b| b[4].is_finite() && b[4] >= config.confidence_threshold)
        .filter_map(|[x, y, width, height, score]| {
            to_region(x * scale_x, y * scale_y, width * scale_x, height * scale_y, score)
        })
        .collect();
    let kept = non_max_suppression(candidates, config.nms_threshold, config.max_faces);
    Ok(clip_and_order(kept, source.0, source.1))
}

/// Smallest whole-pixel region covering the box, cut at the top-left image edge.
fn to_region(x: f32, y: f32, width: f32, height: f32, score: f32) -> Option<FaceRegion> {
    if !(x.is_finite() && y.is_finite() && width > 0.0 && height > 0.0) {
        return None;
    }
    let (left, top) = (x.max(0.0).floor(), y.max(0.0).floor());
    let (right, bottom) = ((x + width).ceil(), (y + height).ceil());
    if right <= left || bottom <= top {
        return None;
    }
    Some(FaceRegion::new(
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
        score,
    ))
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, image: &Image) -> Result<Vec<FaceRegion>, PipelineError> {
        let start_time = Instant::now();
        let input = self.preprocess(image)?;
        let outputs = self
            .runnable
            .run(tvec![input.into()])
            .map_err(|e| PipelineError::DetectionFailure(format!("model execution failed: {}", e)))?;
        let output = outputs
            .into_iter()
            .next()
            .map(|value| value.into_tensor())
            .ok_or_else(|| PipelineError::DetectionFailure("model produced no outputs".to_string()))?;

        let model = &self.config.model;
        let faces = decode_output(
            &output,
            model.layout,
            image.dimensions(),
            (model.input_width, model.input_height),
            &self.config,
        )?;
        debug!(
            "{}: {} faces in {}us",
            self.name(),
            faces.len(),
            start_time.elapsed().as_micros()
        );
        Ok(faces)
    }

    fn name(&self) -> &'static str {
        "OnnxFaceDetector"
    }
}
