use std::{path::PathBuf, time::Instant};

use eastocr::{util::annotate, DetectionOptions, OcrBuilder};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let image_path = args
        .next()
        .unwrap_or_else(|| "tests/data/test_image.png".into());
    let reference = args.next();

    let image = image::open(&image_path).expect("Failed to load image");
    let cache = PathBuf::from(".cache");
    std::fs::create_dir_all(&cache).expect("Failed to create cache dir");
    let ocr = OcrBuilder::new()
        .det_model("models/east/frozen_east_text_detection.onnx")
        .rec_model("models/crnn/model.onnx")
        .with_engine_cache_path(cache)
        .build()
        .expect("Failed to build engine");

    let start = Instant::now();
    let results = ocr
        .extract(&image, DetectionOptions::default())
        .expect("Failed recognition.");
    log::debug!("{:?}", start.elapsed());

    for result in &results {
        println!("{}: {}", result.region.index, result.text.text);
    }

    let regions = results.iter().map(|it| it.region).collect::<Vec<_>>();
    annotate(&image, &regions)
        .save("annotated.png")
        .expect("Failed to save annotated image");

    if let Some(reference) = reference {
        let words = reference.split_whitespace().collect::<Vec<_>>();
        match ocr.evaluate(&results, &words) {
            Ok(cer) => println!(
                "CER {:.4} ({} errors over {} characters)",
                cer.rate, cer.errors, cer.reference_length
            ),
            Err(err) => eprintln!("{err}"),
        }
    }
}
