use std::path::PathBuf;

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::{Array2, Array4, Axis, Ix2};
use ort::{inputs, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::{
    error::OcrError,
    model::Recognizer,
    providers::{dispatch, first_input, read_input, TensorRtProfile},
    ExecutionProvider,
};

const DEFAULT_INPUT_SIZE: (u32, u32) = (128, 32);

/// CRNN text-line recognizer taking an `NHWC` batch of raw `0..=255` BGR
/// pixels and returning `(1, timesteps, classes)` scores.
pub struct CrnnNet {
    session: Session,
    input_name: String,
    output_name: String,
    input_width: u32,
    input_height: u32,
}

impl CrnnNet {
    /// `input_size` overrides the width and height declared by the model. When
    /// neither is known, 128x32 is used.
    #[instrument(level = "debug")]
    pub fn init(
        model_path: PathBuf,
        num_threads: usize,
        input_size: Option<(u32, u32)>,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self, OcrError> {
        #[cfg(feature = "directml")]
        let parallel = !execution_providers.contains(&ExecutionProvider::DirectML);
        #[cfg(not(feature = "directml"))]
        let parallel = true;

        let cache_path = cache_path.unwrap_or_else(|| {
            model_path
                .parent()
                .map(|parent| parent.join(".cache"))
                .unwrap_or_else(|| PathBuf::from(".cache"))
        });
        let execution_providers = dispatch(execution_providers, &cache_path, || {
            let (input, dimensions) = read_input(&model_path)?;
            let (width, height) = resolve_input_size(input_size, &dimensions);
            Ok(TensorRtProfile::nhwc_fixed(&input, width, height))
        })?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_parallel_execution(parallel)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(execution_providers)?
            .commit_from_file(&model_path)?;

        log::debug!("CRNN Inputs: {:?}", session.inputs);
        log::debug!("CRNN Outputs: {:?}", session.outputs);

        let (input_name, dimensions) = first_input(&session)?;
        let (input_width, input_height) = resolve_input_size(input_size, &dimensions);
        log::debug!("CRNN input size: {input_width}x{input_height}");
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| OcrError::ModelOutputMissing("output".into()))?;

        Ok(Self {
            session,
            input_name,
            output_name,
            input_width,
            input_height,
        })
    }
}

/// Width and height of a static `[N, H, W, C]` input. Dynamic sides are
/// reported as non-positive and give `None`.
fn static_input_size(dimensions: &[i64]) -> Option<(u32, u32)> {
    match *dimensions {
        [_, height, width, _] if height > 0 && width > 0 => {
            Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
        }
        _ => None,
    }
}

fn resolve_input_size(requested: Option<(u32, u32)>, dimensions: &[i64]) -> (u32, u32) {
    requested
        .or_else(|| static_input_size(dimensions))
        .unwrap_or(DEFAULT_INPUT_SIZE)
}

/// `[1, H, W, 3]` tensor with the channels in BGR order.
pub(crate) fn bgr_tensor(image: &RgbImage) -> Array4<f32> {
    Array4::<f32>::from_shape_fn(
        (1, image.height() as usize, image.width() as usize, 3),
        |(_, y, x, ch)| image.get_pixel(x as u32, y as u32)[2 - ch] as f32,
    )
}

impl Recognizer for CrnnNet {
    #[instrument(level = "trace", skip(self, crop))]
    fn recognize(&self, crop: &DynamicImage) -> Result<Array2<f32>, OcrError> {
        let image = crop
            .resize_exact(self.input_width, self.input_height, FilterType::Triangle)
            .to_rgb8();
        let tensor_values = bgr_tensor(&image);
        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => tensor_values]?)?;
        let output_tensor = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| OcrError::ModelOutputMissing(self.output_name.clone()))?
            .try_extract_tensor::<f32>()?;

        log::trace!("Output tensor size: {:?}", output_tensor.dim());
        if output_tensor.ndim() != 3 || output_tensor.len_of(Axis(0)) != 1 {
            return Err(OcrError::ShapeMismatch {
                expected: "[1, T, C]".into(),
                actual: format!("{:?}", output_tensor.shape()),
            });
        }

        Ok(output_tensor
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()?
            .to_owned())
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn pixels_are_fed_as_bgr() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([200, 100, 10]));

        let tensor = bgr_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 1, 2, 3]);
        assert_eq!(
            tensor.slice(ndarray::s![0, 0, 1, ..]).to_vec(),
            vec![10.0, 100.0, 200.0]
        );
        assert!(tensor.slice(ndarray::s![0, 0, 0, ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn input_size_from_static_model_dims() {
        assert_eq!(static_input_size(&[1, 32, 100, 3]), Some((100, 32)));
        assert_eq!(static_input_size(&[-1, 32, -1, 3]), None);
        assert_eq!(static_input_size(&[1, 3, 32]), None);
    }

    #[test]
    fn builder_size_overrides_model_dims() {
        assert_eq!(resolve_input_size(Some((256, 48)), &[1, 32, 100, 3]), (256, 48));
        assert_eq!(resolve_input_size(None, &[1, 32, 100, 3]), (100, 32));
        assert_eq!(resolve_input_size(None, &[]), DEFAULT_INPUT_SIZE);
    }
}
