use image::DynamicImage;
use ndarray::Array2;

use crate::{error::OcrError, geometry::DetectorOutput, util::Scale};

/// Produces a score map and a geometry map for an image.
///
/// Implementations resize `image` to `scale.target_width` x
/// `scale.target_height` before running the network.
pub trait Detector {
    fn detect(&self, image: &DynamicImage, scale: Scale) -> Result<DetectorOutput, OcrError>;
}

/// Produces a `(timesteps, classes)` score matrix for one cropped text region.
pub trait Recognizer {
    fn recognize(&self, crop: &DynamicImage) -> Result<Array2<f32>, OcrError>;
}

impl<T: Detector + ?Sized> Detector for &T {
    fn detect(&self, image: &DynamicImage, scale: Scale) -> Result<DetectorOutput, OcrError> {
        (**self).detect(image, scale)
    }
}

impl<T: Recognizer + ?Sized> Recognizer for &T {
    fn recognize(&self, crop: &DynamicImage) -> Result<Array2<f32>, OcrError> {
        (**self).recognize(crop)
    }
}
