use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use serde::Serialize;

use crate::error::PipelineError;

/// Memory layout of one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// A decoded image that owns its pixel buffer.
///
/// The buffer is row-major with `width * channels` bytes per row and no padding.
/// The container format is remembered so the processed image can be encoded
/// the same way it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
    container: Option<ImageFormat>,
}

impl Image {
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidInput(
                "image dimensions are zero".to_string(),
            ));
        }
        let expected = width as usize * height as usize * format.channels();
        if pixels.len() != expected {
            return Err(PipelineError::InvalidInput(format!(
                "pixel buffer holds {} bytes, expected {} for {}x{} {:?}",
                pixels.len(),
                expected,
                width,
                height,
                format
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
            container: None,
        })
    }

    /// Decode JPEG, PNG, WebP or any other container the `image` crate understands.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::InvalidInput("empty image buffer".to_string()));
        }
        let container = image::guess_format(bytes)
            .map_err(|e| PipelineError::InvalidInput(format!("unknown container: {}", e)))?;
        let decoded = image::load_from_memory_with_format(bytes, container)
            .map_err(|e| PipelineError::InvalidInput(format!("failed to decode image: {}", e)))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PipelineError::InvalidInput(
                "image dimensions are zero".to_string(),
            ));
        }
        Ok(Self::from_dynamic(decoded).with_container(container))
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (format, pixels) = match image {
            DynamicImage::ImageLuma8(buffer) => (PixelFormat::Luma8, buffer.into_raw()),
            DynamicImage::ImageRgb8(buffer) => (PixelFormat::Rgb8, buffer.into_raw()),
            DynamicImage::ImageRgba8(buffer) => (PixelFormat::Rgba8, buffer.into_raw()),
            other @ DynamicImage::ImageLuma16(_) => (PixelFormat::Luma8, other.to_luma8().into_raw()),
            other if other.color().has_alpha() => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
            other => (PixelFormat::Rgb8, other.to_rgb8().into_raw()),
        };
        Self {
            width,
            height,
            format,
            pixels,
            container: None,
        }
    }

    pub fn with_container(mut self, container: ImageFormat) -> Self {
        self.container = Some(container);
        self
    }

    pub fn to_dynamic(&self) -> Result<DynamicImage, PipelineError> {
        let (width, height, pixels) = (self.width, self.height, self.pixels.clone());
        let image = match self.format {
            PixelFormat::Luma8 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
            PixelFormat::Rgb8 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
            PixelFormat::Rgba8 => RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| {
            PipelineError::InvalidInput(format!("buffer does not match {}x{}", width, height))
        })
    }

    /// Encode in the container the image was decoded from, PNG otherwise.
    pub fn encode(&self) -> Result<Vec<u8>, PipelineError> {
        let container = self.container.unwrap_or(ImageFormat::Png);
        let mut image = self.to_dynamic()?;
        if container == ImageFormat::Jpeg && self.format == PixelFormat::Rgba8 {
            // JPEG has no alpha channel
            image = DynamicImage::ImageRgb8(image.to_rgb8());
        }
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), container)
            .map_err(|e| {
                PipelineError::InvalidInput(format!("cannot encode as {:?}: {}", container, e))
            })?;
        Ok(bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn container(&self) -> Option<ImageFormat> {
        self.container
    }

    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Channel values of the pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.channels();
        let start = y as usize * self.row_stride() + x as usize * channels;
        Some(&self.pixels[start..start + channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]))
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let result = Image::from_raw(4, 4, PixelFormat::Rgb8, vec![0; 10]);
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(matches!(
            Image::decode(b"definitely not an image"),
            Err(PipelineError::InvalidInput(_))
        ));
        assert!(matches!(Image::decode(&[]), Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn png_encode_keeps_container_and_pixels() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(gradient(12, 7))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let decoded = Image::decode(&png).unwrap();
        assert_eq!(decoded.container(), Some(ImageFormat::Png));
        assert_eq!(decoded.format(), PixelFormat::Rgb8);
        assert_eq!(decoded.dimensions(), (12, 7));

        let reencoded = Image::decode(&decoded.encode().unwrap()).unwrap();
        assert_eq!(reencoded.pixels(), decoded.pixels());
        assert_eq!(reencoded.container(), Some(ImageFormat::Png));
    }

    #[test]
    fn pixel_lookup_is_bounds_checked() {
        let image = Image::from_dynamic(DynamicImage::ImageRgb8(gradient(5, 3)));
        assert_eq!(image.pixel(4, 2), Some(&[4u8, 2, 6][..]));
        assert_eq!(image.pixel(5, 0), None);
    }
}
