use std::cmp::Ordering;

use serde::Serialize;

/// Integer pixel rectangle, used for units of work and blur patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full_image(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Some(PixelRect::new(x, y, right - x, bottom - y))
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &PixelRect) -> PixelRect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        PixelRect::new(x, y, right - x, bottom - y)
    }

    /// Part of the rectangle inside a `width` x `height` image, if any.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        self.intersection(&PixelRect::full_image(width, height))
    }
}

/// A detected face. Produced once per detection pass and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn rect(&self) -> PixelRect {
        PixelRect::new(self.x, self.y, self.width, self.height)
    }

    /// Corner form `[x1, y1, x2, y2]` used by detection reports.
    pub fn bbox(&self) -> [u32; 4] {
        let rect = self.rect();
        [rect.x, rect.y, rect.right(), rect.bottom()]
    }

    /// Region clipped to image bounds, `None` when nothing is left.
    pub fn clipped(&self, width: u32, height: u32) -> Option<FaceRegion> {
        self.rect().clip_to(width, height).map(|rect| FaceRegion {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            confidence: self.confidence,
        })
    }

    /// Intersection over union of the two boxes.
    pub fn iou(&self, other: &FaceRegion) -> f32 {
        let intersection = match self.rect().intersection(&other.rect()) {
            Some(rect) => rect.area() as f32,
            None => return 0.0,
        };
        let union = self.rect().area() as f32 + other.rect().area() as f32 - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Keep the most confident box of every group overlapping above `iou_threshold`,
/// at most `max_faces` of them, most confident first.
pub fn non_max_suppression(
    mut candidates: Vec<FaceRegion>,
    iou_threshold: f32,
    max_faces: usize,
) -> Vec<FaceRegion> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
    });
    let mut kept: Vec<FaceRegion> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.len() == max_faces {
            break;
        }
        if kept
            .iter()
            .all(|region| candidate.iou(region) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

/// Clip every region to the image and sort by top-left `y`, then `x`.
pub fn clip_and_order(regions: Vec<FaceRegion>, width: u32, height: u32) -> Vec<FaceRegion> {
    let mut clipped: Vec<FaceRegion> = regions
        .iter()
        .filter_map(|region| region.clipped(width, height))
        .collect();
    clipped.sort_by_key(|region| (region.y, region.x));
    clipped
}
