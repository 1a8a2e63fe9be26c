use std::cmp::Reverse;

use float_ord::FloatOrd;
use geo::Rect;
use tracing::instrument;

use crate::Candidate;

/// How the overlap between a selected box and a remaining box is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMetric {
    /// Intersection divided by the remaining box's own area. This is what the
    /// classic greedy text-box suppression uses, so a small box sitting inside
    /// a stronger one is always dropped.
    #[default]
    Coverage,
    /// Intersection over union.
    Iou,
}

/// Boxes are treated as inclusive pixel ranges, so a box spanning
/// `x1..=x2` is `x2 - x1 + 1` wide.
fn pixel_area(rect: &Rect<f32>) -> f32 {
    (rect.width() + 1.0) * (rect.height() + 1.0)
}

fn intersection_area(a: &Rect<f32>, b: &Rect<f32>) -> f32 {
    let w = a.max().x.min(b.max().x) - a.min().x.max(b.min().x) + 1.0;
    let h = a.max().y.min(b.max().y) - a.min().y.max(b.min().y) + 1.0;
    w.max(0.0) * h.max(0.0)
}

pub fn overlap(selected: &Rect<f32>, other: &Rect<f32>, metric: OverlapMetric) -> f32 {
    let intersection = intersection_area(selected, other);
    let denominator = match metric {
        OverlapMetric::Coverage => pixel_area(other),
        OverlapMetric::Iou => pixel_area(selected) + pixel_area(other) - intersection,
    };
    if denominator <= 0.0 {
        0.0
    } else {
        intersection / denominator
    }
}

/// Greedy non-maximum suppression.
///
/// Keeps the most confident remaining candidate, drops every other candidate
/// overlapping it by more than `threshold`, and repeats. The result is in
/// selection order; equal confidences keep their input order.
#[instrument(level = "debug", skip(candidates), fields(count = candidates.len()))]
pub fn suppress(candidates: &[Candidate], threshold: f32, metric: OverlapMetric) -> Vec<Candidate> {
    let mut order = (0..candidates.len()).collect::<Vec<_>>();
    order.sort_by_key(|&i| Reverse(FloatOrd(candidates[i].confidence)));

    let rects = candidates.iter().map(Candidate::rect).collect::<Vec<_>>();
    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i]);

        for &j in &order[pos + 1..] {
            if !suppressed[j] && overlap(&rects[i], &rects[j], metric) > threshold {
                suppressed[j] = true;
            }
        }
    }

    log::debug!("{} of {} candidates survived suppression", keep.len(), candidates.len());
    keep
}
