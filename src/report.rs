use serde::Serialize;

use crate::common::FaceRegion;
use crate::error::PipelineError;

/// One detected face as `[x1, y1, x2, y2]` plus the detector's confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: [u32; 4],
    pub confidence: f32,
}

/// Machine-readable detection result printed by `faceblur detect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub success: bool,
    pub num_faces: usize,
    pub detections: Vec<Detection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionReport {
    pub fn from_regions(regions: &[FaceRegion]) -> Self {
        Self {
            success: true,
            num_faces: regions.len(),
            detections: regions
                .iter()
                .map(|region| Detection {
                    bbox: region.bbox(),
                    confidence: region.confidence,
                })
                .collect(),
            error: None,
        }
    }

    pub fn failed(error: &PipelineError) -> Self {
        Self {
            success: false,
            num_faces: 0,
            detections: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<Vec<FaceRegion>, PipelineError>> for DetectionReport {
    fn from(result: Result<Vec<FaceRegion>, PipelineError>) -> Self {
        match result {
            Ok(regions) => Self::from_regions(&regions),
            Err(e) => Self::failed(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_corner_boxes() {
        let report = DetectionReport::from_regions(&[FaceRegion::new(10, 20, 30, 40, 0.75)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["num_faces"], 1);
        assert!(json.get("numFaces").is_none());
        assert_eq!(json["detections"][0]["bbox"], serde_json::json!([10, 20, 40, 60]));
        assert_eq!(json["detections"][0]["confidence"], 0.75);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_keeps_the_message() {
        let report: DetectionReport =
            Err(PipelineError::InvalidInput("empty image buffer".to_string())).into();
        assert!(!report.success);
        assert_eq!(report.num_faces, 0);
        assert_eq!(report.error.as_deref(), Some("Invalid input: empty image buffer"));
    }
}
