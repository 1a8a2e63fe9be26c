use geo::{coord, Rect};

/// One above-threshold cell of the score map, turned into an axis-aligned box
/// in detector-input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub confidence: f32,
}

impl Candidate {
    pub fn rect(&self) -> Rect<f32> {
        Rect::new(
            coord! { x: self.start_x, y: self.start_y },
            coord! { x: self.end_x, y: self.end_y },
        )
    }
}

/// A candidate rescaled to source-image pixels, padded, and placed in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// 1-based position in reading order.
    pub index: usize,
    /// Text line the region was assigned to, counted from the top.
    pub line: usize,
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
}

impl Region {
    pub fn width(&self) -> i32 {
        self.end_x - self.start_x
    }

    pub fn height(&self) -> i32 {
        self.end_y - self.start_y
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub region: Region,
    pub text: TextLine,
}

/// Aggregate edit-distance rate over a batch of (prediction, reference) pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorRate {
    pub errors: usize,
    pub reference_length: usize,
    /// `errors / reference_length`, or `0.0` when there was no reference at all.
    pub rate: f64,
}

impl ErrorRate {
    pub fn new(errors: usize, reference_length: usize) -> Self {
        let rate = if reference_length == 0 {
            0.0
        } else {
            errors as f64 / reference_length as f64
        };
        Self {
            errors,
            reference_length,
            rate,
        }
    }

    /// True when the rate is the `0.0` sentinel for an empty reference set.
    pub fn is_degenerate(&self) -> bool {
        self.reference_length == 0
    }
}

pub type CerResult = ErrorRate;
