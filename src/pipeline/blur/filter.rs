use super::config::{MAX_INTENSITY, MIN_INTENSITY};
use crate::common::{Image, PixelRect};
use crate::error::PipelineError;

/// Box kernel radius for a blur intensity. Never decreases as intensity grows.
///
/// Intensities outside the supported range are clamped first, which bounds the
/// window sums well inside `u32`.
pub fn kernel_radius(intensity: u32) -> u32 {
    (intensity.clamp(MIN_INTENSITY, MAX_INTENSITY) + 1) / 2
}

/// Blurred pixels for one rectangle of an image, ready to be merged.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurPatch {
    rect: PixelRect,
    channels: usize,
    pixels: Vec<u8>,
}

impl BlurPatch {
    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy the patch over its rectangle of `target`.
    pub fn write_into(&self, target: &mut Image) -> Result<(), PipelineError> {
        let (width, height) = target.dimensions();
        if self.channels != target.channels()
            || self.rect.right() > width
            || self.rect.bottom() > height
        {
            return Err(PipelineError::BlurFailure(format!(
                "patch {:?} does not fit a {}x{} target",
                self.rect, width, height
            )));
        }
        let stride = target.row_stride();
        let row_len = self.rect.width as usize * self.channels;
        let x_offset = self.rect.x as usize * self.channels;
        let buffer = target.pixels_mut();
        for (row, chunk) in self.pixels.chunks_exact(row_len).enumerate() {
            let start = (self.rect.y as usize + row) * stride + x_offset;
            buffer[start..start + row_len].copy_from_slice(chunk);
        }
        Ok(())
    }
}

/// Separable box blur restricted to one face region.
///
/// Sampling never leaves the region: coordinates outside it are clamped to the
/// nearest pixel of the region. All arithmetic is integer with a single
/// round-half-up division, so the same input always produces the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionBlurFilter;

impl RegionBlurFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        image: &Image,
        region: PixelRect,
        intensity: u32,
    ) -> Result<BlurPatch, PipelineError> {
        self.apply_tile(image, region, region, intensity)
    }

    /// Blur only the `tile` part of `region`.
    ///
    /// The result equals the matching rows and columns of `apply(image, region, ..)`,
    /// which is what lets a large region be split across workers.
    pub fn apply_tile(
        &self,
        image: &Image,
        region: PixelRect,
        tile: PixelRect,
        intensity: u32,
    ) -> Result<BlurPatch, PipelineError> {
        let (width, height) = image.dimensions();
        if region.is_empty() || region.right() > width || region.bottom() > height {
            return Err(PipelineError::BlurFailure(format!(
                "region {:?} is outside the {}x{} image",
                region, width, height
            )));
        }
        if tile.is_empty() || tile.intersection(&region) != Some(tile) {
            return Err(PipelineError::BlurFailure(format!(
                "tile {:?} is not inside region {:?}",
                tile, region
            )));
        }

        let radius = kernel_radius(intensity) as isize;
        let window = (2 * radius + 1) as u32;
        let channels = image.channels();
        let stride = image.row_stride();
        let pixels = image.pixels();
        let tile_width = tile.width as usize;
        let row_len = tile_width * channels;

        // Rows the vertical pass can reach, already clamped to the region.
        let src_top = (tile.y as isize - radius).max(region.y as isize) as usize;
        let src_bottom = (tile.bottom() as isize + radius).min(region.bottom() as isize) as usize;

        let (left, right) = (region.x as isize, region.right() as isize - 1);
        let mut horizontal = vec![0u32; (src_bottom - src_top) * row_len];
        for (row_index, y) in (src_top..src_bottom).enumerate() {
            let row = &pixels[y * stride..(y + 1) * stride];
            let out = &mut horizontal[row_index * row_len..(row_index + 1) * row_len];
            for c in 0..channels {
                let sample = |x: isize| row[x.clamp(left, right) as usize * channels + c] as u32;
                let x0 = tile.x as isize;
                let mut sum: u32 = (-radius..=radius).map(|dx| sample(x0 + dx)).sum();
                for i in 0..tile_width {
                    out[i * channels + c] = sum;
                    if i + 1 < tile_width {
                        let x = x0 + i as isize;
                        sum = sum + sample(x + radius + 1) - sample(x - radius);
                    }
                }
            }
        }

        let (top, bottom) = (region.y as isize, region.bottom() as isize - 1);
        let divisor = window * window;
        let tile_height = tile.height as usize;
        let mut blurred = vec![0u8; tile_height * row_len];
        for i in 0..row_len {
            let column = |y: isize| {
                let row = (y.clamp(top, bottom) as usize) - src_top;
                horizontal[row * row_len + i]
            };
            let y0 = tile.y as isize;
            let mut sum: u32 = (-radius..=radius).map(|dy| column(y0 + dy)).sum();
            for j in 0..tile_height {
                blurred[j * row_len + i] = ((sum + divisor / 2) / divisor) as u8;
                if j + 1 < tile_height {
                    let y = y0 + j as isize;
                    sum = sum + column(y + radius + 1) - column(y - radius);
                }
            }
        }

        Ok(BlurPatch {
            rect: tile,
            channels,
            pixels: blurred,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PixelFormat;

    fn checkerboard(width: u32, height: u32) -> Image {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x / 2 + y / 2) % 2 == 0 { 240 } else { 10 };
                pixels.extend_from_slice(&[v, v / 2, 255 - v]);
            }
        }
        Image::from_raw(width, height, PixelFormat::Rgb8, pixels).unwrap()
    }

    #[test]
    fn radius_never_shrinks_with_intensity() {
        for intensity in 5..50 {
            assert!(kernel_radius(intensity) <= kernel_radius(intensity + 1));
        }
        assert!(kernel_radius(50) > kernel_radius(5));
        assert_eq!(kernel_radius(0), kernel_radius(5));
        assert_eq!(kernel_radius(u32::MAX), kernel_radius(50));
    }

    #[test]
    fn out_of_range_intensity_is_clamped() {
        let white = Image::from_raw(40, 40, PixelFormat::Rgb8, vec![255; 40 * 40 * 3]).unwrap();
        let filter = RegionBlurFilter::new();
        let rect = PixelRect::new(0, 0, 40, 40);
        for intensity in [20_000, u32::MAX] {
            let patch = filter.apply(&white, rect, intensity).unwrap();
            assert!(patch.pixels().iter().all(|&v| v == 255));
        }

        let image = checkerboard(40, 40);
        let strongest = filter.apply(&image, rect, 50).unwrap();
        assert_eq!(filter.apply(&image, rect, 20_000).unwrap(), strongest);
        assert_eq!(filter.apply(&image, rect, u32::MAX).unwrap(), strongest);
        assert_eq!(
            filter.apply(&image, rect, 0).unwrap(),
            filter.apply(&image, rect, 5).unwrap()
        );
    }

    #[test]
    fn uniform_region_stays_uniform() {
        let image = Image::from_raw(20, 20, PixelFormat::Rgb8, vec![90; 20 * 20 * 3]).unwrap();
        let patch = RegionBlurFilter::new()
            .apply(&image, PixelRect::new(3, 4, 10, 8), 30)
            .unwrap();
        assert!(patch.pixels().iter().all(|&v| v == 90));
        assert_eq!(patch.pixels().len(), 10 * 8 * 3);
    }

    #[test]
    fn blur_changes_detailed_region_and_is_repeatable() {
        let image = checkerboard(40, 40);
        let filter = RegionBlurFilter::new();
        let rect = PixelRect::new(5, 5, 30, 30);
        let first = filter.apply(&image, rect, 20).unwrap();
        let second = filter.apply(&image, rect, 20).unwrap();
        assert_eq!(first, second);

        let mut output = image.clone();
        first.write_into(&mut output).unwrap();
        assert_ne!(output, image);
        // Pixels outside the region are untouched.
        assert_eq!(output.pixel(0, 0), image.pixel(0, 0));
        assert_eq!(output.pixel(39, 39), image.pixel(39, 39));
    }

    #[test]
    fn tiles_reassemble_the_whole_region() {
        let image = checkerboard(64, 64);
        let filter = RegionBlurFilter::new();
        let region = PixelRect::new(4, 2, 50, 57);
        let whole = filter.apply(&image, region, 17).unwrap();

        let mut whole_image = image.clone();
        whole.write_into(&mut whole_image).unwrap();

        let mut tiled_image = image.clone();
        let mut y = region.y;
        while y < region.bottom() {
            let rows = 9.min(region.bottom() - y);
            let tile = PixelRect::new(region.x, y, region.width, rows);
            filter
                .apply_tile(&image, region, tile, 17)
                .unwrap()
                .write_into(&mut tiled_image)
                .unwrap();
            y += rows;
        }
        assert_eq!(tiled_image, whole_image);
    }

    #[test]
    fn out_of_bounds_region_is_a_blur_failure() {
        let image = checkerboard(10, 10);
        let result = RegionBlurFilter::new().apply(&image, PixelRect::new(5, 5, 10, 10), 10);
        assert!(matches!(result, Err(PipelineError::BlurFailure(_))));

        let result = RegionBlurFilter::new().apply(&image, PixelRect::new(0, 0, 0, 4), 10);
        assert!(matches!(result, Err(PipelineError::BlurFailure(_))));
    }

    #[test]
    fn single_pixel_region_is_its_own_mean() {
        let image = checkerboard(8, 8);
        let patch = RegionBlurFilter::new()
            .apply(&image, PixelRect::new(2, 2, 1, 1), 50)
            .unwrap();
        assert_eq!(patch.pixels(), image.pixel(2, 2).unwrap());
    }
}
