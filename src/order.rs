use std::cmp::Ordering;

use tracing::instrument;

use crate::{util::Scale, Candidate, Region};

/// Pixels added on each side of a region; negative values shrink it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub width: i32,
    pub height: i32,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            width: 3,
            height: 3,
        }
    }
}

/// Reading order: text line first, then left to right.
///
/// Lines are assigned before sorting, so this is a total order even when
/// regions chain together (`a` near `b`, `b` near `c`, but `a` far from `c`).
pub fn reading_order(a: &Region, b: &Region) -> Ordering {
    a.line
        .cmp(&b.line)
        .then(a.start_x.cmp(&b.start_x))
        .then(a.start_y.cmp(&b.start_y))
        .then(a.end_x.cmp(&b.end_x))
        .then(a.end_y.cmp(&b.end_y))
}

/// Maps suppressed candidates back to source-image pixels, pads them and sorts
/// them into reading order.
///
/// Regions whose `start_y` lies within `row_tolerance` pixels of the first
/// region of the current line join that line; anything further down opens a
/// new one. The returned regions are numbered from 1.
#[instrument(level = "debug", skip(candidates), fields(count = candidates.len()))]
pub fn order_regions(
    candidates: &[Candidate],
    scale: Scale,
    padding: Padding,
    row_tolerance: i32,
) -> Vec<Region> {
    let mut regions = candidates
        .iter()
        .map(|c| Region {
            index: 0,
            line: 0,
            start_x: (c.start_x * scale.factor_x).round() as i32 - padding.width,
            start_y: (c.start_y * scale.factor_y).round() as i32 - padding.height,
            end_x: (c.end_x * scale.factor_x).round() as i32 + padding.width,
            end_y: (c.end_y * scale.factor_y).round() as i32 + padding.height,
        })
        .collect::<Vec<_>>();

    regions.sort_by_key(|region| region.start_y);
    let mut line = 0;
    let mut line_top = regions.first().map(|region| region.start_y);
    for region in regions.iter_mut() {
        if let Some(top) = line_top {
            if (region.start_y - top).abs() > row_tolerance {
                line += 1;
                line_top = Some(region.start_y);
            }
        }
        region.line = line;
    }

    regions.sort_by(reading_order);
    for (i, region) in regions.iter_mut().enumerate() {
        region.index = i + 1;
    }

    log::debug!(
        "Ordered {} regions into {} lines",
        regions.len(),
        regions.last().map_or(0, |region| region.line + 1)
    );
    regions
}
