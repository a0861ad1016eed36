use std::ops::Range;

use rayon::prelude::*;

use crate::block::{BlockView, PixelPlane, PixelPlaneMut};
use crate::format::{uncompressed_size, BlockDim, MACROBLOCK_DIM};
use crate::pixel::{self, Rgb};

/// Check that `width × height` is a frame geometry the codec accepts.
pub fn validate_geometry(width: usize, height: usize) -> anyhow::Result<()> {
    if width == 0 || height == 0 {
        anyhow::bail!("frame size {}x{} is empty", width, height);
    }
    if width % MACROBLOCK_DIM != 0 {
        anyhow::bail!(
            "frame width {} must be a multiple of {}",
            width,
            MACROBLOCK_DIM
        );
    }
    if height % MACROBLOCK_DIM != 0 {
        anyhow::bail!(
            "frame height {} must be a multiple of {}",
            height,
            MACROBLOCK_DIM
        );
    }
    if uncompressed_size(width, height).is_none() {
        anyhow::bail!(
            "frame size {}x{} exceeds the 32-bit uncompressed size",
            width,
            height
        );
    }
    Ok(())
}

/// One frame's pixels, addressable as a macroblock grid or at arbitrary offsets.
///
/// The encoder commits each block's final reconstruction into the current
/// frame's codebook as soon as it is decided, so later searches only ever see
/// what a decoder will have at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Codebook {
    /// Take ownership of a row-major frame.
    pub fn new(pixels: Vec<Rgb>, width: usize, height: usize) -> anyhow::Result<Self> {
        validate_geometry(width, height)?;
        if pixels.len() != width * height {
            anyhow::bail!(
                "pixel count {} does not match frame size {}x{}",
                pixels.len(),
                width,
                height
            );
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_slice(pixels: &[Rgb], width: usize, height: usize) -> anyhow::Result<Self> {
        Self::new(pixels.to_vec(), width, height)
    }

    /// A black frame.
    pub fn blank(width: usize, height: usize) -> anyhow::Result<Self> {
        Self::new(vec![Rgb::BLACK; width * height], width, height)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn macroblock_columns(&self) -> usize {
        self.width / MACROBLOCK_DIM
    }

    #[inline]
    pub fn macroblock_rows(&self) -> usize {
        self.height / MACROBLOCK_DIM
    }

    #[inline]
    pub fn macroblock_count(&self) -> usize {
        self.macroblock_columns() * self.macroblock_rows()
    }

    /// The `index`-th macroblock in row-major order.
    pub fn block(&self, index: usize) -> Option<BlockView> {
        if index >= self.macroblock_count() {
            return None;
        }
        let columns = self.macroblock_columns();
        Some(BlockView::new(
            (index % columns) * MACROBLOCK_DIM,
            (index / columns) * MACROBLOCK_DIM,
            BlockDim::Eight,
        ))
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<Rgb> {
        self.pixels
    }

    /// Mean squared error between two frames of the same geometry.
    pub fn mse(&self, other: &Codebook) -> anyhow::Result<f64> {
        if self.width != other.width || self.height != other.height {
            anyhow::bail!(
                "cannot compare {}x{} frame with {}x{} frame",
                self.width,
                self.height,
                other.width,
                other.height
            );
        }
        Ok(pixel::mse(&self.pixels, &other.pixels))
    }

    /// Disjoint mutable macroblock rows, top to bottom.
    pub fn rows_mut(&mut self) -> impl Iterator<Item = MacroblockRow<'_>> {
        let width = self.width;
        self.pixels
            .chunks_mut(width * MACROBLOCK_DIM)
            .enumerate()
            .map(move |(index, pixels)| MacroblockRow {
                index,
                width,
                pixels,
            })
    }

    /// Disjoint mutable macroblock rows for parallel processing.
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = MacroblockRow<'_>> {
        let width = self.width;
        self.pixels
            .par_chunks_mut(width * MACROBLOCK_DIM)
            .enumerate()
            .map(move |(index, pixels)| MacroblockRow {
                index,
                width,
                pixels,
            })
    }
}

impl PixelPlane for Codebook {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn rows(&self) -> Range<usize> {
        0..self.height
    }

    #[inline]
    fn line(&self, y: usize) -> &[Rgb] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }
}

impl PixelPlaneMut for Codebook {
    #[inline]
    fn line_mut(&mut self, y: usize) -> &mut [Rgb] {
        &mut self.pixels[y * self.width..(y + 1) * self.width]
    }
}

/// Exclusive borrow of one 8-pixel-high band of a [`Codebook`].
///
/// Frame coordinates stay frame coordinates: row `index` answers for frame
/// rows `index * 8 .. index * 8 + 8`.
#[derive(Debug)]
pub struct MacroblockRow<'a> {
    index: usize,
    width: usize,
    pixels: &'a mut [Rgb],
}

impl MacroblockRow<'_> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// First frame row of this band.
    #[inline]
    pub fn top(&self) -> usize {
        self.index * MACROBLOCK_DIM
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.width / MACROBLOCK_DIM
    }

    /// The macroblock in column `column` of this band.
    pub fn macroblock(&self, column: usize) -> BlockView {
        BlockView::new(column * MACROBLOCK_DIM, self.top(), BlockDim::Eight)
    }
}

impl PixelPlane for MacroblockRow<'_> {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn rows(&self) -> Range<usize> {
        self.top()..self.top() + MACROBLOCK_DIM
    }

    #[inline]
    fn line(&self, y: usize) -> &[Rgb] {
        let local = y - self.top();
        &self.pixels[local * self.width..(local + 1) * self.width]
    }
}

impl PixelPlaneMut for MacroblockRow<'_> {
    #[inline]
    fn line_mut(&mut self, y: usize) -> &mut [Rgb] {
        let local = y - self.top();
        &mut self.pixels[local * self.width..(local + 1) * self.width]
    }
}
