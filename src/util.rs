use image::{DynamicImage, Pixel, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use ndarray::Array3;
use tracing::instrument;

use crate::Region;

/// Channel-first `(3, h, w)` tensor of `pixel * norm - mean * norm`, with
/// pixels in `0.0..=1.0`.
#[instrument(level = "debug", skip(image))]
pub(crate) fn subtract_mean_normalize(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let mut image = image.to_rgb32f();
    let norm = Rgb::<f32>(*norm_vals);
    let mean_vals = Rgb::<f32>(*mean_vals).map2(&norm, |c1, c2| c1 * c2);
    for pixel in image.pixels_mut() {
        *pixel = pixel
            .map2(&norm, |c1, c2| c1 * c2)
            .map2(&mean_vals, |c1, c2| c1 - c2);
    }
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| image.get_pixel(x as u32, y as u32).channels()[ch],
    )
}

/// Mapping between source-image pixels and the detector input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    /// Source width over input width.
    pub factor_x: f32,
    /// Source height over input height.
    pub factor_y: f32,
    pub target_width: u32,
    pub target_height: u32,
}

impl Scale {
    /// Resizes to a fixed `target_width` x `target_height` input, floored to
    /// multiples of 32.
    pub fn fixed(image: &DynamicImage, target_width: u32, target_height: u32) -> Self {
        let target_width = floor_to_32(target_width, "width");
        let target_height = floor_to_32(target_height, "height");
        let factor_x = image.width() as f32 / target_width as f32;
        let factor_y = image.height() as f32 / target_height as f32;
        log::debug!("Resize will change image dimensions from (w: {}, h: {}) to (w: {target_width}, h: {target_height}) with scaling factor ({factor_x}, {factor_y}).", image.width(), image.height());
        Self {
            factor_x,
            factor_y,
            target_width,
            target_height,
        }
    }
}

fn floor_to_32(size: u32, side: &str) -> u32 {
    if size % 32 == 0 {
        return size;
    }
    let floored = (size / 32 * 32).max(32);
    log::debug!("Target {side} of {size} wasn't a multiple of 32, flooring to {floored}.");
    floored
}

/// Cuts `region` out of `image`, clamped to the image bounds. Regions lying
/// fully outside come back as a zero-sized image.
pub(crate) fn crop(image: &DynamicImage, region: &Region) -> DynamicImage {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x = region.start_x.clamp(0, w);
    let y = region.start_y.clamp(0, h);
    let width = (region.end_x.clamp(0, w) - x).max(0);
    let height = (region.end_y.clamp(0, h) - y).max(0);
    log::trace!("Slicing subimage to {region:?}");
    image.crop_imm(x as u32, y as u32, width as u32, height as u32)
}

/// Copy of `image` with every region outlined in green.
pub fn annotate(image: &DynamicImage, regions: &[Region]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let green = Rgb([0, 255, 0]);
    for region in regions {
        // two nested outlines for a 2px border
        for inset in 0..2 {
            let width = region.width() - 2 * inset;
            let height = region.height() - 2 * inset;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(region.start_x + inset, region.start_y + inset)
                .of_size(width as u32, height as u32);
            draw_hollow_rect_mut(&mut canvas, rect, green);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;

    use super::*;

    fn region(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> Region {
        Region {
            index: 1,
            line: 0,
            start_x,
            start_y,
            end_x,
            end_y,
        }
    }

    #[test]
    fn fixed_scale_ratios() {
        let image = DynamicImage::new_rgb8(2560, 640);
        let scale = Scale::fixed(&image, 1280, 1280);
        assert_eq!((scale.target_width, scale.target_height), (1280, 1280));
        assert_eq!((scale.factor_x, scale.factor_y), (2.0, 0.5));
    }

    #[test]
    fn fixed_scale_floors_to_32() {
        let image = DynamicImage::new_rgb8(100, 100);
        let scale = Scale::fixed(&image, 100, 20);
        assert_eq!((scale.target_width, scale.target_height), (96, 32));
    }

    #[test]
    fn crop_clamps_to_image() {
        let image = DynamicImage::new_rgb8(50, 40);
        assert_eq!(crop(&image, &region(-3, -3, 10, 12)).dimensions(), (10, 12));
        assert_eq!(crop(&image, &region(45, 30, 60, 50)).dimensions(), (5, 10));
        assert_eq!(crop(&image, &region(60, 50, 70, 60)).dimensions(), (0, 0));
    }

    #[test]
    fn annotate_draws_border() {
        let image = DynamicImage::new_rgb8(20, 20);
        let canvas = annotate(&image, &[region(2, 2, 12, 12)]);
        assert_eq!(canvas.get_pixel(2, 2), &Rgb([0, 255, 0]));
        assert_eq!(canvas.get_pixel(3, 3), &Rgb([0, 255, 0]));
        assert_eq!(canvas.get_pixel(6, 6), &Rgb([0, 0, 0]));
    }

    #[test]
    fn normalize_layout() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([255, 0, 255]));
        let tensor = subtract_mean_normalize(
            &DynamicImage::ImageRgb8(image),
            &[0.5, 0.5, 0.5],
            &[2.0, 2.0, 2.0],
        );
        assert_eq!(tensor.dim(), (3, 1, 2));
        assert_eq!(tensor[(0, 0, 0)], -1.0);
        assert_eq!(tensor[(0, 0, 1)], 1.0);
        assert_eq!(tensor[(1, 0, 1)], -1.0);
    }
}
