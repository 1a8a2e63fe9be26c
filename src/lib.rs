use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

mod buffer;
mod crnn_net;
pub mod ctc;
mod east_net;
mod error;
pub mod geometry;
pub mod metrics;
mod model;
pub mod nms;
pub mod order;
mod providers;
mod result;
pub mod util;
mod vocab;

pub use buffer::CropBuffer;
pub use crnn_net::CrnnNet;
pub use east_net::{EastNet, GEOMETRY_OUTPUT, SCORE_OUTPUT};
pub use error::{OcrError, PipelineError, Stage};
pub use geometry::DetectorOutput;
pub use model::{Detector, Recognizer};
pub use nms::OverlapMetric;
pub use order::Padding;
pub use result::*;
pub use vocab::Vocabulary;

use error::StageExt;
use image::DynamicImage;
use tracing::instrument;
use util::Scale;

pub use ort as runtime;

pub struct OcrBuilder {
    threads: usize,
    det_path: Option<PathBuf>,
    rec_path: Option<PathBuf>,
    keys_path: Option<PathBuf>,
    vocabulary: Option<Vocabulary>,
    det_input_size: (u32, u32),
    rec_input_size: Option<(u32, u32)>,
    cache_path: Option<PathBuf>,
    execution_providers: Vec<ExecutionProvider>,
}

impl OcrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn rec_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.rec_path = Some(path.into());
        self
    }

    /// Reads the vocabulary from a keys file, one symbol per line.
    pub fn keys(mut self, path: impl Into<PathBuf>) -> Self {
        self.keys_path = Some(path.into());
        self
    }

    pub fn vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    /// Detector input resolution. Sides are floored to multiples of 32.
    pub fn det_input_size(mut self, width: u32, height: u32) -> Self {
        self.det_input_size = (width, height);
        self
    }

    /// Recognizer input resolution. Defaults to the size the model declares,
    /// or 128x32 if its input is dynamic.
    pub fn rec_input_size(mut self, width: u32, height: u32) -> Self {
        self.rec_input_size = Some((width, height));
        self
    }

    pub fn with_engine_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    #[instrument(skip(self), level = "debug")]
    fn init_models(&mut self) -> Result<(EastNet, CrnnNet, Vocabulary), OcrError> {
        let det_path = self
            .det_path
            .take()
            .unwrap_or_else(|| "models/east/frozen_east_text_detection.onnx".into());
        let rec_path = self
            .rec_path
            .take()
            .unwrap_or_else(|| "models/crnn/model.onnx".into());
        let vocabulary = match (self.vocabulary.take(), self.keys_path.take()) {
            (Some(vocabulary), _) => vocabulary,
            (None, Some(keys_path)) => Vocabulary::from_file(keys_path)?,
            (None, None) => Vocabulary::alphanumeric(),
        };
        Ok((
            EastNet::init(
                det_path,
                self.threads,
                self.det_input_size,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
            CrnnNet::init(
                rec_path,
                self.threads,
                self.rec_input_size,
                &self.execution_providers,
                self.cache_path.clone(),
            )?,
            vocabulary,
        ))
    }

    #[instrument(skip(self))]
    pub fn build(mut self) -> Result<TextExtractor<EastNet, CrnnNet>, OcrError> {
        let (detector, recognizer, vocabulary) = self.init_models()?;
        Ok(TextExtractor::new(detector, recognizer, vocabulary).with_input_size(
            self.det_input_size.0,
            self.det_input_size.1,
        ))
    }
}

impl Default for OcrBuilder {
    fn default() -> Self {
        Self {
            threads: 4,
            det_path: None,
            rec_path: None,
            keys_path: None,
            vocabulary: None,
            det_input_size: (1280, 1280),
            rec_input_size: None,
            cache_path: None,
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
        }
    }
}

/// Runs detection, ordering, cropping and recognition for one image at a
/// time. Holds no per-request state, so one extractor can serve many images.
pub struct TextExtractor<D, R> {
    detector: D,
    recognizer: R,
    vocabulary: Vocabulary,
    input_size: (u32, u32),
}

impl<D: Detector, R: Recognizer> TextExtractor<D, R> {
    pub fn new(detector: D, recognizer: R, vocabulary: Vocabulary) -> Self {
        Self {
            detector,
            recognizer,
            vocabulary,
            input_size: (1280, 1280),
        }
    }

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_size = (width, height);
        self
    }

    /// Finds text regions and returns them in reading order. An image without
    /// text gives an empty list.
    #[instrument(skip(self, image))]
    pub fn locate(
        &self,
        image: &DynamicImage,
        options: DetectionOptions,
    ) -> Result<Vec<Region>, PipelineError> {
        let scale = Scale::fixed(image, self.input_size.0, self.input_size.1);

        let output = timed(options.inference_deadline, || {
            self.detector.detect(image, scale)
        })
        .stage(Stage::Detection)?;
        let candidates = output.decode(options.score_threshold, options.stride);
        let kept = nms::suppress(
            &candidates,
            options.overlap_threshold,
            options.overlap_metric,
        );

        Ok(order::order_regions(
            &kept,
            scale,
            options.padding,
            options.row_tolerance,
        ))
    }

    /// Full pipeline: locate, crop, recognize and decode every region.
    ///
    /// Fails as a whole; no partial results are returned.
    #[instrument(skip(self, image))]
    pub fn extract(
        &self,
        image: &DynamicImage,
        options: DetectionOptions,
    ) -> Result<Vec<OcrResult>, PipelineError> {
        let regions = self.locate(image, options)?;
        let crops = CropBuffer::new(image, regions);
        if crops.is_empty() {
            log::debug!("No text regions found");
            return Ok(Vec::new());
        }
        #[cfg(feature = "debug")]
        {
            let (dir, written) = crops
                .persist_scoped(std::path::Path::new("part_images"))
                .stage(Stage::Cropping)?;
            log::debug!("Wrote {} crops to {}", written.len(), dir.display());
        }

        let mut results = Vec::with_capacity(crops.len());
        for (region, crop) in crops.iter() {
            let text = if crop.width() == 0 || crop.height() == 0 {
                log::debug!("Region {} lies outside the image", region.index);
                TextLine::default()
            } else {
                let scores = timed(options.inference_deadline, || {
                    self.recognizer.recognize(&crop)
                })
                .stage(Stage::Recognition)?;
                if scores.ncols() != self.vocabulary.num_classes() {
                    log::warn!(
                        "Recognizer returned {} classes, vocabulary expects {}",
                        scores.ncols(),
                        self.vocabulary.num_classes()
                    );
                }
                ctc::greedy_decode(scores.view(), &self.vocabulary)
            };
            results.push(OcrResult {
                region: *region,
                text,
            });
        }
        Ok(results)
    }

    /// Character error rate of extracted lines against references, paired in
    /// reading order.
    #[instrument(skip(self, results, references))]
    pub fn evaluate<S: AsRef<str>>(
        &self,
        results: &[OcrResult],
        references: &[S],
    ) -> Result<CerResult, PipelineError> {
        if results.len() != references.len() {
            return Err(OcrError::ReferenceCountMismatch {
                predictions: results.len(),
                references: references.len(),
            })
            .stage(Stage::Scoring);
        }
        Ok(metrics::char_error_rate(
            results
                .iter()
                .map(|result| result.text.text.as_str())
                .zip(references.iter().map(AsRef::as_ref)),
        ))
    }
}

/// Runs an inference call and rejects its result if it overran `deadline`.
/// The call itself is not interrupted.
fn timed<T>(
    deadline: Option<Duration>,
    call: impl FnOnce() -> Result<T, OcrError>,
) -> Result<T, OcrError> {
    let start = Instant::now();
    let result = call()?;
    let elapsed = start.elapsed();
    log::trace!("Inference took {elapsed:?}");
    match deadline {
        Some(deadline) if elapsed > deadline => Err(OcrError::DeadlineExceeded { elapsed, deadline }),
        _ => Ok(result),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    pub score_threshold: f32,
    /// Input pixels per score-map cell.
    pub stride: f32,
    pub overlap_threshold: f32,
    pub overlap_metric: OverlapMetric,
    pub padding: Padding,
    /// Maximum vertical distance, in source pixels, for two regions to count
    /// as one line.
    pub row_tolerance: i32,
    pub inference_deadline: Option<Duration>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            stride: 4.0,
            overlap_threshold: 0.3,
            overlap_metric: OverlapMetric::Coverage,
            padding: Padding::default(),
            row_tolerance: 10,
            inference_deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "tensorrt")]
    TensorRT,
    #[cfg(feature = "coreml")]
    CoreML,
    #[cfg(feature = "cuda")]
    Cuda,
    #[cfg(feature = "directml")]
    DirectML,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "tensorrt")]
    ExecutionProvider::TensorRT,
    #[cfg(feature = "coreml")]
    ExecutionProvider::CoreML,
    #[cfg(feature = "directml")]
    ExecutionProvider::DirectML,
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];
