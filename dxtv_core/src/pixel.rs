use serde::{Deserialize, Serialize};

/// One truecolor sample. The codec never looks at alpha.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Squared distance to `other`, normalized so that black vs. white is 1.0.
    #[inline]
    pub fn error(&self, other: &Rgb) -> f64 {
        let dr = self.r as f64 - other.r as f64;
        let dg = self.g as f64 - other.g as f64;
        let db = self.b as f64 - other.b as f64;
        (dr * dr + dg * dg + db * db) / (3.0 * 255.0 * 255.0)
    }
}

/// Channel order the block codec stores its endpoint colors in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    /// Red and blue swapped, as expected by BGR555 display hardware.
    Bgr,
}

/// Mean squared error between two equally sized pixel runs, in `[0, 1]`.
///
/// Returns 0.0 for empty input.
pub fn mse(a: &[Rgb], b: &[Rgb]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| x.error(y)).sum();
    sum / a.len() as f64
}

/// Bytes one pixel occupies in an uncompressed frame.
pub const BYTES_PER_PIXEL: usize = 3;
