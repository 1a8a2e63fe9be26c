use std::{fmt, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("model output `{0}` is missing")]
    ModelOutputMissing(String),
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),
    #[error("inference took {elapsed:?}, deadline was {deadline:?}")]
    DeadlineExceeded { elapsed: Duration, deadline: Duration },
    #[error("{predictions} predictions but {references} references")]
    ReferenceCountMismatch {
        predictions: usize,
        references: usize,
    },
    #[error(transparent)]
    Runtime(#[from] ort::Error),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Ordering,
    Cropping,
    Recognition,
    Scoring,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Detection => write!(f, "detection"),
            Stage::Ordering => write!(f, "ordering"),
            Stage::Cropping => write!(f, "cropping"),
            Stage::Recognition => write!(f, "recognition"),
            Stage::Scoring => write!(f, "scoring"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: OcrError,
}

pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E: Into<OcrError>> StageExt<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError {
            stage,
            source: source.into(),
        })
    }
}
