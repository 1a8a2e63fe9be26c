use std::{path::PathBuf, time::Duration};

use eastocr::{
    geometry::GEOMETRY_CHANNELS, DetectionOptions, Detector, DetectorOutput, OcrBuilder, OcrError,
    Recognizer, Stage, TextExtractor, Vocabulary,
};
use image::DynamicImage;
use ndarray::{Array2, Array3, Axis};

/// Lights up the given cells; every box is top 2, right 10, bottom 6, left 4.
struct FakeDetector {
    cells: Vec<((usize, usize), f32)>,
}

impl Detector for FakeDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        scale: eastocr::util::Scale,
    ) -> Result<DetectorOutput, OcrError> {
        let shape = (
            scale.target_height as usize / 4,
            scale.target_width as usize / 4,
        );
        let mut scores = Array2::zeros(shape);
        for &(cell, score) in &self.cells {
            scores[cell] = score;
        }
        let mut geometry = Array3::zeros((GEOMETRY_CHANNELS, shape.0, shape.1));
        for (channel, value) in [2.0, 10.0, 6.0, 4.0, 0.0].into_iter().enumerate() {
            geometry.index_axis_mut(Axis(0), channel).fill(value);
        }
        DetectorOutput::new(scores, geometry)
    }
}

struct MissingOutput;

impl Detector for MissingOutput {
    fn detect(&self, _: &DynamicImage, _: eastocr::util::Scale) -> Result<DetectorOutput, OcrError> {
        Err(OcrError::ModelOutputMissing("feature_fusion/concat_3".into()))
    }
}

/// Emits `text` framed by blanks, every symbol held for two timesteps.
struct FakeRecognizer {
    text: &'static str,
    vocab: Vocabulary,
    delay: Duration,
}

impl FakeRecognizer {
    fn new(text: &'static str) -> Self {
        Self {
            text,
            vocab: Vocabulary::alphanumeric(),
            delay: Duration::ZERO,
        }
    }

    fn index_of(&self, symbol: char) -> usize {
        (0..self.vocab.len())
            .find(|&i| self.vocab.get(i) == Some(symbol.to_string().as_str()))
            .unwrap()
    }
}

impl Recognizer for FakeRecognizer {
    fn recognize(&self, crop: &DynamicImage) -> Result<Array2<f32>, OcrError> {
        assert!(crop.width() > 0 && crop.height() > 0);
        std::thread::sleep(self.delay);
        let blank = self.vocab.len();
        let mut frames = vec![blank];
        for symbol in self.text.chars() {
            let index = self.index_of(symbol);
            frames.extend([index, index, blank]);
        }
        let mut scores = Array2::from_elem((frames.len(), self.vocab.num_classes()), 0.01);
        for (t, &index) in frames.iter().enumerate() {
            scores[(t, index)] = 0.9;
        }
        Ok(scores)
    }
}

struct BrokenRecognizer;

impl Recognizer for BrokenRecognizer {
    fn recognize(&self, _: &DynamicImage) -> Result<Array2<f32>, OcrError> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "runtime went away").into())
    }
}

fn extractor<D: Detector, R: Recognizer>(detector: D, recognizer: R) -> TextExtractor<D, R> {
    TextExtractor::new(detector, recognizer, Vocabulary::alphanumeric()).with_input_size(64, 64)
}

fn image() -> DynamicImage {
    DynamicImage::new_rgb8(128, 64)
}

#[test]
fn single_cell_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ocr = extractor(
        FakeDetector {
            cells: vec![((2, 3), 0.9)],
        },
        FakeRecognizer::new("hi"),
    );
    let results = ocr
        .extract(&image(), DetectionOptions::default())
        .expect("Failed recognition.");

    assert_eq!(results.len(), 1);
    let region = results[0].region;
    assert_eq!(region.index, 1);
    // cell box (8, 6)..(22, 14), x scaled by 2, padded by 3
    assert_eq!(
        (region.start_x, region.start_y, region.end_x, region.end_y),
        (13, 3, 47, 17)
    );
    assert_eq!(results[0].text.text, "hi");
    assert_eq!(results[0].text.character_scores, vec![0.9, 0.9]);

    let cer = ocr.evaluate(&results, &["hi"]).unwrap();
    assert_eq!(cer.errors, 0);
    assert_eq!(cer.rate, 0.0);
    assert!(!cer.is_degenerate());
}

#[test]
fn reading_order_across_lines() {
    let ocr = extractor(
        FakeDetector {
            // two boxes on the top line, one well below
            cells: vec![((10, 2), 0.7), ((2, 9), 0.8), ((2, 1), 0.6)],
        },
        FakeRecognizer::new("ok"),
    );
    let regions = ocr.locate(&image(), DetectionOptions::default()).unwrap();

    let starts = regions
        .iter()
        .map(|r| (r.index, r.line, r.start_x, r.start_y))
        .collect::<Vec<_>>();
    assert_eq!(
        starts,
        vec![(1, 0, -3, 3), (2, 0, 61, 3), (3, 1, 5, 35)]
    );
}

#[test]
fn overlapping_cells_are_suppressed() {
    let ocr = extractor(
        FakeDetector {
            cells: vec![((4, 4), 0.6), ((4, 5), 0.95)],
        },
        FakeRecognizer::new("a"),
    );
    let regions = ocr.locate(&image(), DetectionOptions::default()).unwrap();
    assert_eq!(regions.len(), 1);
    // the survivor is the stronger cell at column 5
    assert_eq!(regions[0].start_x, ((5 * 4 + 10 - 14) * 2) - 3);
}

#[test]
fn no_text_is_not_an_error() {
    let ocr = extractor(FakeDetector { cells: vec![] }, FakeRecognizer::new("x"));
    let results = ocr.extract(&image(), DetectionOptions::default()).unwrap();
    assert!(results.is_empty());

    let cer = ocr.evaluate(&results, &[] as &[&str]).unwrap();
    assert!(cer.is_degenerate());
    assert_eq!(cer.rate, 0.0);
}

#[test]
fn failures_carry_their_stage() {
    let err = extractor(MissingOutput, FakeRecognizer::new("x"))
        .extract(&image(), DetectionOptions::default())
        .unwrap_err();
    assert_eq!(err.stage, Stage::Detection);
    assert!(matches!(err.source, OcrError::ModelOutputMissing(_)));
    assert_eq!(
        err.to_string(),
        "detection stage failed: model output `feature_fusion/concat_3` is missing"
    );

    let err = extractor(
        FakeDetector {
            cells: vec![((2, 3), 0.9)],
        },
        BrokenRecognizer,
    )
    .extract(&image(), DetectionOptions::default())
    .unwrap_err();
    assert_eq!(err.stage, Stage::Recognition);
    assert!(matches!(err.source, OcrError::Io(_)));
}

#[test]
fn scoring_rejects_mismatched_references() {
    let ocr = extractor(
        FakeDetector {
            cells: vec![((2, 3), 0.9)],
        },
        FakeRecognizer::new("hi"),
    );
    let results = ocr.extract(&image(), DetectionOptions::default()).unwrap();
    let err = ocr.evaluate(&results, &["hi", "there"]).unwrap_err();
    assert_eq!(err.stage, Stage::Scoring);
    assert!(matches!(
        err.source,
        OcrError::ReferenceCountMismatch {
            predictions: 1,
            references: 2
        }
    ));
}

#[test]
fn slow_inference_overruns_deadline() {
    let mut recognizer = FakeRecognizer::new("hi");
    recognizer.delay = Duration::from_millis(50);
    let ocr = extractor(
        FakeDetector {
            cells: vec![((2, 3), 0.9)],
        },
        recognizer,
    );
    let options = DetectionOptions {
        inference_deadline: Some(Duration::from_millis(5)),
        ..Default::default()
    };
    let err = ocr.extract(&image(), options).unwrap_err();
    assert_eq!(err.stage, Stage::Recognition);
    assert!(matches!(err.source, OcrError::DeadlineExceeded { .. }));
}

#[test]
fn parallel_requests_agree() {
    let ocr = extractor(
        FakeDetector {
            cells: vec![((2, 3), 0.9), ((10, 2), 0.7), ((2, 9), 0.8)],
        },
        FakeRecognizer::new("abc"),
    );
    let expected = ocr.locate(&image(), DetectionOptions::default()).unwrap();

    std::thread::scope(|scope| {
        let handles = (0..4)
            .map(|_| scope.spawn(|| ocr.extract(&image(), DetectionOptions::default()).unwrap()))
            .collect::<Vec<_>>();
        for handle in handles {
            let results = handle.join().unwrap();
            let regions = results.iter().map(|r| r.region).collect::<Vec<_>>();
            assert_eq!(regions, expected);
            assert!(results.iter().all(|r| r.text.text == "abc"));
        }
    });
}

#[test]
#[ignore = "requires detection and recognition models under tests/data/models"]
fn onnx_models_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();

    let image = image::open("tests/data/test_image.png").expect("Failed  to load test image");
    let cache = std::env!("CARGO_TARGET_TMPDIR");
    let cache = PathBuf::from(cache).join(".engine_cache");
    std::fs::create_dir_all(&cache).expect("Failed to create temp dir");
    let ocr = OcrBuilder::new()
        .det_model("tests/data/models/east.onnx")
        .rec_model("tests/data/models/crnn.onnx")
        .with_engine_cache_path(cache)
        .build()
        .expect("Failed to build engine");
    let results = ocr
        .extract(&image, DetectionOptions::default())
        .expect("Failed recognition.");
    assert!(!results.is_empty());
    assert!(results
        .windows(2)
        .all(|pair| pair[0].region.index + 1 == pair[1].region.index));
}
