use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use tracing::instrument;

use crate::{error::OcrError, Candidate};

/// Channels per cell in the geometry map: top, right, bottom, left, angle.
pub const GEOMETRY_CHANNELS: usize = 5;

/// Score map and geometry map of one detector pass, checked to share spatial
/// dimensions.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    scores: Array2<f32>,
    geometry: Array3<f32>,
}

impl DetectorOutput {
    /// `scores` is `(rows, cols)`, `geometry` is `(5, rows, cols)`.
    pub fn new(scores: Array2<f32>, geometry: Array3<f32>) -> Result<Self, OcrError> {
        let (rows, cols) = scores.dim();
        if geometry.dim() != (GEOMETRY_CHANNELS, rows, cols) {
            return Err(OcrError::ShapeMismatch {
                expected: format!("[{GEOMETRY_CHANNELS}, {rows}, {cols}]"),
                actual: format!("{:?}", geometry.shape()),
            });
        }
        Ok(Self { scores, geometry })
    }

    pub fn scores(&self) -> ArrayView2<f32> {
        self.scores.view()
    }

    pub fn geometry(&self) -> ArrayView3<f32> {
        self.geometry.view()
    }

    /// Turns every cell scoring at least `threshold` into a [`Candidate`].
    ///
    /// `stride` is the number of input pixels per grid cell. The angle shifts
    /// where the box ends up, but the box itself stays axis-aligned. Results
    /// come out in row-major scan order.
    #[instrument(level = "debug", skip(self))]
    pub fn decode(&self, threshold: f32, stride: f32) -> Vec<Candidate> {
        let top = self.geometry.index_axis(Axis(0), 0);
        let right = self.geometry.index_axis(Axis(0), 1);
        let bottom = self.geometry.index_axis(Axis(0), 2);
        let left = self.geometry.index_axis(Axis(0), 3);
        let angles = self.geometry.index_axis(Axis(0), 4);

        let candidates = self
            .scores
            .indexed_iter()
            .filter(|(_, score)| **score >= threshold)
            .map(|((row, col), score)| {
                let offset_x = col as f32 * stride;
                let offset_y = row as f32 * stride;
                let idx = (row, col);
                let (sin, cos) = angles[idx].sin_cos();

                let h = top[idx] + bottom[idx];
                let w = right[idx] + left[idx];

                let end_x = offset_x + (cos * right[idx] + sin * bottom[idx]).round();
                let end_y = offset_y - (sin * right[idx]).round() + (cos * bottom[idx]).round();

                Candidate {
                    start_x: end_x - w,
                    start_y: end_y - h,
                    end_x,
                    end_y,
                    confidence: *score,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "{} of {} cells passed the score threshold {threshold}",
            candidates.len(),
            self.scores.len()
        );
        candidates
    }
}
