use std::path::PathBuf;

use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, ArrayViewD, Axis, Dimension, Ix2, Ix3};
use ort::{inputs, GraphOptimizationLevel, Session};
use tracing::instrument;

use crate::{
    error::OcrError,
    geometry::DetectorOutput,
    model::Detector,
    providers::{dispatch, first_input, read_input, TensorRtProfile},
    util::{subtract_mean_normalize, Scale},
    ExecutionProvider,
};

// Per-channel RGB means of the training set, on a 0..=1 scale. With a norm of
// 255 the input ends up as `pixel - mean` in 0..=255 units.
const MEAN_VALUES: [f32; 3] = [123.68 / 255.0, 116.78 / 255.0, 103.94 / 255.0];
const NORM_VALUES: [f32; 3] = [255.0, 255.0, 255.0];

pub const SCORE_OUTPUT: &str = "feature_fusion/Conv_7/Sigmoid";
pub const GEOMETRY_OUTPUT: &str = "feature_fusion/concat_3";

/// EAST-style text detector: one score channel and five geometry channels,
/// both `NCHW`.
pub struct EastNet {
    session: Session,
    input_name: String,
    score_output: String,
    geometry_output: String,
}

impl EastNet {
    #[instrument(level = "debug")]
    pub fn init(
        path: PathBuf,
        num_threads: usize,
        input_size: (u32, u32),
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self, OcrError> {
        #[cfg(feature = "directml")]
        let parallel = !execution_providers.contains(&ExecutionProvider::DirectML);
        #[cfg(not(feature = "directml"))]
        let parallel = true;

        let cache_path = cache_path.unwrap_or_else(|| {
            path.parent()
                .map(|parent| parent.join(".cache"))
                .unwrap_or_else(|| PathBuf::from(".cache"))
        });
        let execution_providers = dispatch(execution_providers, &cache_path, || {
            let (input, _) = read_input(&path)?;
            Ok(TensorRtProfile::nchw(&input, input_size.0, input_size.1))
        })?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_memory_pattern(parallel)?
            .with_parallel_execution(parallel)?
            .with_inter_threads(num_threads)?
            .with_intra_threads(num_threads)?
            .with_execution_providers(execution_providers)?
            .commit_from_file(&path)?;

        log::debug!("EAST Inputs: {:?}", session.inputs);
        log::debug!("EAST Outputs: {:?}", session.outputs);

        let (input_name, _) = first_input(&session)?;

        Ok(Self {
            session,
            input_name,
            score_output: SCORE_OUTPUT.into(),
            geometry_output: GEOMETRY_OUTPUT.into(),
        })
    }
}

/// Drops the batch axis of a `[1, C, H, W]` output, and the channel axis too
/// when `D` is two-dimensional.
fn squeeze<D: Dimension>(tensor: ArrayViewD<f32>, name: &str) -> Result<Array<f32, D>, OcrError> {
    log::trace!("Output {name} size: {:?}", tensor.shape());
    if tensor.ndim() != 4 || tensor.len_of(Axis(0)) != 1 {
        return Err(OcrError::ShapeMismatch {
            expected: "[1, C, H, W]".into(),
            actual: format!("{:?}", tensor.shape()),
        });
    }
    let mut view = tensor.index_axis_move(Axis(0), 0);
    if D::NDIM == Some(2) {
        view = view.index_axis_move(Axis(0), 0);
    }
    Ok(view.into_dimensionality::<D>()?.to_owned())
}

impl Detector for EastNet {
    #[instrument(skip(self, image), level = "debug")]
    fn detect(&self, image: &DynamicImage, scale: Scale) -> Result<DetectorOutput, OcrError> {
        let image =
            image.resize_exact(scale.target_width, scale.target_height, FilterType::Triangle);
        let input_values =
            subtract_mean_normalize(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input_values]?)?;

        let scores = outputs
            .get(self.score_output.as_str())
            .ok_or_else(|| OcrError::ModelOutputMissing(self.score_output.clone()))?
            .try_extract_tensor::<f32>()?;
        let geometry = outputs
            .get(self.geometry_output.as_str())
            .ok_or_else(|| OcrError::ModelOutputMissing(self.geometry_output.clone()))?
            .try_extract_tensor::<f32>()?;

        let scores = squeeze::<Ix2>(scores, &self.score_output)?;
        let geometry = squeeze::<Ix3>(geometry, &self.geometry_output)?;
        DetectorOutput::new(scores, geometry)
    }
}
