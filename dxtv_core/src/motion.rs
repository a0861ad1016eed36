//! Brute-force block motion search over a codebook.
//!
//! Two windows exist. Searches into the previous frame use a symmetric
//! window. Searches into the current frame use a window that never reaches
//! below the block, and is further restricted to pixels a decoder has already
//! reconstructed when it reaches this block (see [`CausalRegion`]).

use crate::block::{BlockView, PixelPlane};
use crate::format::{
    BlockDim, CURR_SEARCH_X, CURR_SEARCH_Y, MACROBLOCK_DIM, MIN_BLOCK_DIM, PREV_SEARCH_X,
    PREV_SEARCH_Y,
};
use crate::pixel::Rgb;

/// What part of the current frame is final at the time a block is coded.
///
/// Decode order is macroblock by macroblock, left to right within a
/// macroblock row; inside a split macroblock the quadrants follow in the
/// order top-left, top-right, bottom-left, bottom-right. Only the current
/// macroblock row is ever considered, so rows stay independent of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CausalRegion {
    /// Top-left corner of the macroblock being coded.
    pub macroblock_x: usize,
    pub macroblock_y: usize,
    /// Quadrants of that macroblock already final (0..=4).
    pub finished_quadrants: usize,
}

impl CausalRegion {
    pub fn new(macroblock: &BlockView) -> Self {
        Self {
            macroblock_x: macroblock.x(),
            macroblock_y: macroblock.y(),
            finished_quadrants: 0,
        }
    }

    pub fn with_finished_quadrants(mut self, finished: usize) -> Self {
        self.finished_quadrants = finished;
        self
    }

    /// True if every pixel of the `dim × dim` block at `(x, y)` is final.
    pub fn contains(&self, dim: BlockDim, x: i64, y: i64) -> bool {
        let d = dim.pixels() as i64;
        let mx = self.macroblock_x as i64;
        let my = self.macroblock_y as i64;
        let m = MACROBLOCK_DIM as i64;
        if x < 0 || y < my || y + d > my + m {
            return false;
        }
        if x + d <= mx {
            return true;
        }
        // The part right of the macroblock's left edge must sit in finished quadrants.
        let left = x.max(mx);
        let right = x + d;
        if right > mx + m {
            return false;
        }
        let q = MIN_BLOCK_DIM as i64;
        (0..4).all(|quadrant| {
            let qx = mx + (quadrant as i64 % 2) * q;
            let qy = my + (quadrant as i64 / 2) * q;
            let overlaps = left < qx + q && qx < right && y < qy + q && qy < y + d;
            !overlaps || quadrant < self.finished_quadrants
        })
    }
}

/// Which frame a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    Previous,
    Current(CausalRegion),
}

/// Best candidate found by [`find_best_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub error: f64,
    pub dx: i32,
    pub dy: i32,
}

/// Inclusive candidate position range `(x0, x1, y0, y1)` for `block`, or
/// `None` if no candidate fits.
pub fn search_window(
    plane: &impl PixelPlane,
    block: &BlockView,
    target: SearchTarget,
) -> Option<(i64, i64, i64, i64)> {
    let d = block.dimension().pixels() as i64;
    let bx = block.x() as i64;
    let by = block.y() as i64;
    let (range_x, range_y) = match target {
        SearchTarget::Previous => (PREV_SEARCH_X, PREV_SEARCH_Y),
        SearchTarget::Current(_) => (CURR_SEARCH_X, CURR_SEARCH_Y),
    };
    let rows = plane.rows();
    let (mut top, mut bottom) = (rows.start as i64, rows.end as i64 - d);
    if let SearchTarget::Current(region) = target {
        // Stay inside the macroblock row being decoded.
        let my = region.macroblock_y as i64;
        top = top.max(my);
        bottom = bottom.min(my + MACROBLOCK_DIM as i64 - d);
    }
    let x0 = (bx + range_x.0 as i64).max(0);
    let x1 = (bx + range_x.1 as i64).min(plane.width() as i64 - d);
    let y0 = (by + range_y.0 as i64).max(top);
    let y1 = (by + range_y.1 as i64).min(bottom);
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some((x0, x1, y0, y1))
}

/// Find the offset whose block in `plane` is closest to `pixels`.
///
/// `pixels` are the target pixels of `block`. Candidates are scanned in raster
/// order and only a strictly lower error replaces the current best, so ties go
/// to the first candidate found. Returns `None` unless the best error is below
/// `max_error`.
pub fn find_best_match(
    plane: &impl PixelPlane,
    block: &BlockView,
    pixels: &[Rgb],
    max_error: f64,
    target: SearchTarget,
) -> Option<Match> {
    let dim = block.dimension();
    let (x0, x1, y0, y1) = search_window(plane, block, target)?;
    let mut best: Option<Match> = None;
    for y in y0..=y1 {
        for x in x0..=x1 {
            if let SearchTarget::Current(region) = target {
                if !region.contains(dim, x, y) {
                    continue;
                }
            }
            let error = plane.error_at(dim, pixels, x as usize, y as usize);
            if best.map_or(true, |b| error < b.error) {
                best = Some(Match {
                    error,
                    dx: (x - block.x() as i64) as i32,
                    dy: (y - block.y() as i64) as i32,
                });
            }
        }
    }
    best.filter(|b| b.error < max_error)
}
