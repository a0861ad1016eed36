use std::ops::Range;

use crate::format::BlockDim;
use crate::pixel::Rgb;

/// A rectangular window of full-width pixel rows.
///
/// Implemented by whole frames ([`Codebook`]) and by the single macroblock
/// rows an encoder works on ([`MacroblockRow`]). Coordinates are always frame
/// coordinates; a plane only answers for the rows in [`rows`].
///
/// [`Codebook`]: crate::codebook::Codebook
/// [`MacroblockRow`]: crate::codebook::MacroblockRow
/// [`rows`]: PixelPlane::rows
pub trait PixelPlane {
    /// Frame width in pixels.
    fn width(&self) -> usize;

    /// Frame rows this plane holds.
    fn rows(&self) -> Range<usize>;

    /// Pixels of frame row `y`.
    fn line(&self, y: usize) -> &[Rgb];

    /// True if a `dim × dim` block at `(x, y)` lies entirely inside this plane.
    fn contains(&self, dim: BlockDim, x: i64, y: i64) -> bool {
        let d = dim.pixels() as i64;
        let rows = self.rows();
        x >= 0
            && y >= rows.start as i64
            && x + d <= self.width() as i64
            && y + d <= rows.end as i64
    }

    /// Copy of the `dim × dim` block at an arbitrary pixel position.
    fn block_at(&self, dim: BlockDim, x: usize, y: usize) -> Vec<Rgb> {
        let d = dim.pixels();
        let mut out = Vec::with_capacity(dim.area());
        for row in y..y + d {
            out.extend_from_slice(&self.line(row)[x..x + d]);
        }
        out
    }

    /// Mean squared error between `pixels` and the `dim × dim` block at `(x, y)`.
    fn error_at(&self, dim: BlockDim, pixels: &[Rgb], x: usize, y: usize) -> f64 {
        let d = dim.pixels();
        debug_assert_eq!(pixels.len(), dim.area());
        let mut sum = 0.0;
        for (row, expected) in (y..y + d).zip(pixels.chunks_exact(d)) {
            sum += self.line(row)[x..x + d]
                .iter()
                .zip(expected)
                .map(|(a, b)| a.error(b))
                .sum::<f64>();
        }
        sum / dim.area() as f64
    }
}

/// A plane whose pixels can be overwritten.
pub trait PixelPlaneMut: PixelPlane {
    fn line_mut(&mut self, y: usize) -> &mut [Rgb];
}

/// Window `(x, y, dim)` into a pixel plane.
///
/// The view owns nothing: reads borrow the plane shared, [`commit`] borrows it
/// mutably. Any number of views may address overlapping regions.
///
/// [`commit`]: BlockView::commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockView {
    x: usize,
    y: usize,
    dim: BlockDim,
}

impl BlockView {
    pub fn new(x: usize, y: usize, dim: BlockDim) -> Self {
        Self { x, y, dim }
    }

    #[inline]
    pub fn position(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    #[inline]
    pub fn x(&self) -> usize {
        self.x
    }

    #[inline]
    pub fn y(&self) -> usize {
        self.y
    }

    #[inline]
    pub fn dimension(&self) -> BlockDim {
        self.dim
    }

    /// Pixel count, `dimension²`.
    #[inline]
    pub fn size(&self) -> usize {
        self.dim.area()
    }

    /// Dense row-major copy of the addressed pixels.
    pub fn pixels(&self, plane: &impl PixelPlane) -> Vec<Rgb> {
        plane.block_at(self.dim, self.x, self.y)
    }

    /// Deep-copy `source` into the addressed pixels.
    pub fn commit(&self, plane: &mut impl PixelPlaneMut, source: &[Rgb]) -> anyhow::Result<()> {
        if source.len() != self.size() {
            anyhow::bail!(
                "cannot commit {} pixels into a {}x{} block",
                source.len(),
                self.dim.pixels(),
                self.dim.pixels()
            );
        }
        if !plane.contains(self.dim, self.x as i64, self.y as i64) {
            anyhow::bail!(
                "block at ({}, {}) is outside the target plane",
                self.x,
                self.y
            );
        }
        let d = self.dim.pixels();
        for (row, src) in (self.y..self.y + d).zip(source.chunks_exact(d)) {
            plane.line_mut(row)[self.x..self.x + d].copy_from_slice(src);
        }
        Ok(())
    }

    /// Quadrant `index` (0 = top-left, 1 = top-right, 2 = bottom-left,
    /// 3 = bottom-right) at half this view's dimension.
    pub fn child(&self, index: usize) -> Option<BlockView> {
        let half = self.dim.half()?;
        let h = half.pixels();
        let (cx, cy) = match index {
            0 => (self.x, self.y),
            1 => (self.x + h, self.y),
            2 => (self.x, self.y + h),
            3 => (self.x + h, self.y + h),
            _ => return None,
        };
        Some(BlockView::new(cx, cy, half))
    }

    /// All four quadrants in decode order; empty at the minimum dimension.
    pub fn children(&self) -> impl Iterator<Item = BlockView> {
        let parent = *self;
        (0..4).filter_map(move |i| parent.child(i))
    }
}
