use std::path::Path;

use ort::{ExecutionProviderDispatch, Session, ValueType};

use crate::{error::OcrError, ExecutionProvider};

/// TensorRT optimization profile for a network's single image input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TensorRtProfile {
    pub min: String,
    pub opt: String,
    pub max: String,
}

impl TensorRtProfile {
    /// Channel-first input, any size from 32x32 up to `width` x `height`.
    pub fn nchw(input: &str, width: u32, height: u32) -> Self {
        Self {
            min: format!("{input}:1x3x32x32"),
            opt: format!("{input}:1x3x{height}x{width}"),
            max: format!("{input}:1x3x{height}x{width}"),
        }
    }

    /// Channel-last input of exactly `width` x `height`.
    pub fn nhwc_fixed(input: &str, width: u32, height: u32) -> Self {
        let shape = format!("{input}:1x{height}x{width}x3");
        Self {
            min: shape.clone(),
            opt: shape.clone(),
            max: shape,
        }
    }
}

#[cfg(feature = "tensorrt")]
fn setup_tensorrt(cache_path: &Path, profile: &TensorRtProfile) -> ExecutionProviderDispatch {
    use ort::TensorRTExecutionProvider;

    TensorRTExecutionProvider::default()
        .with_profile_min_shapes(&profile.min)
        .with_profile_max_shapes(&profile.max)
        .with_profile_opt_shapes(&profile.opt)
        .with_engine_cache(true)
        .with_engine_cache_path(cache_path.to_string_lossy())
        .with_timing_cache(true)
        .with_builder_optimization_level(5)
        .build()
}

#[cfg(feature = "cuda")]
fn setup_cuda() -> ExecutionProviderDispatch {
    use ort::CUDAExecutionProvider;

    CUDAExecutionProvider::default().build()
}

#[cfg(feature = "coreml")]
fn setup_coreml() -> ExecutionProviderDispatch {
    use ort::CoreMLExecutionProvider;

    CoreMLExecutionProvider::default().build()
}

#[cfg(feature = "directml")]
fn setup_directml() -> ExecutionProviderDispatch {
    use ort::DirectMLExecutionProvider;

    DirectMLExecutionProvider::default().build()
}

/// Name and dimensions of a session's first input. Dynamic dimensions are
/// negative.
pub(crate) fn first_input(session: &Session) -> Result<(String, Vec<i64>), OcrError> {
    let input = session
        .inputs
        .first()
        .ok_or_else(|| OcrError::ModelOutputMissing("input".into()))?;
    let dimensions = match &input.input_type {
        ValueType::Tensor { dimensions, .. } => dimensions.clone(),
        _ => Vec::new(),
    };
    Ok((input.name.clone(), dimensions))
}

/// Reads the first input of a model with a plain CPU session, for settings
/// that must be known before the real session is built.
pub(crate) fn read_input(path: &Path) -> Result<(String, Vec<i64>), OcrError> {
    let session = Session::builder()?.commit_from_file(path)?;
    first_input(&session)
}

/// `profile` is only evaluated when TensorRT is among the providers.
pub(crate) fn dispatch(
    execution_providers: &[ExecutionProvider],
    #[allow(unused_variables)] cache_path: &Path,
    #[allow(unused_variables)] profile: impl Fn() -> Result<TensorRtProfile, OcrError>,
) -> Result<Vec<ExecutionProviderDispatch>, OcrError> {
    #[allow(unused_mut)]
    let mut dispatches = Vec::new();
    for provider in execution_providers {
        match provider {
            ExecutionProvider::Default => {}
            #[cfg(feature = "tensorrt")]
            ExecutionProvider::TensorRT => {
                dispatches.push(setup_tensorrt(cache_path, &profile()?));
            }
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => dispatches.push(setup_cuda()),
            #[cfg(feature = "coreml")]
            ExecutionProvider::CoreML => dispatches.push(setup_coreml()),
            #[cfg(feature = "directml")]
            ExecutionProvider::DirectML => dispatches.push(setup_directml()),
        }
    }
    Ok(dispatches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_profile_is_channel_first() {
        let profile = TensorRtProfile::nchw("input_images", 1280, 640);
        assert_eq!(profile.min, "input_images:1x3x32x32");
        assert_eq!(profile.max, "input_images:1x3x640x1280");
    }

    #[test]
    fn recognizer_profile_is_channel_last() {
        let profile = TensorRtProfile::nhwc_fixed("input", 128, 32);
        assert_eq!(profile.min, "input:1x32x128x3");
        assert_eq!(profile.min, profile.max);
    }
}
