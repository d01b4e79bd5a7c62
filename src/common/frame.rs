use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::common::image::Image;

/// One camera frame as pulled by the realtime stream.
#[derive(Debug, Clone)]
pub struct Frame {
    frame_id: Uuid,
    sequence: u64,
    image: Arc<Image>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(sequence: u64, image: Image, captured_at: DateTime<Utc>) -> Self {
        Self {
            frame_id: Uuid::new_v4(),
            sequence,
            image: Arc::new(image),
            captured_at,
        }
    }

    pub fn frame_id(&self) -> Uuid {
        self.frame_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::image::PixelFormat;

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let image = Image::from_raw(16, 16, PixelFormat::Rgb8, vec![7; 16 * 16 * 3]).unwrap();
        let f1 = Frame::new(0, image, Utc::now());
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(f1.image(), f2.image()));
        assert_eq!(f1.frame_id(), f2.frame_id());
    }
}
