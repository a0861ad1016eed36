use dxtv_core::codec::BlockCodec;
use dxtv_core::format::{BlockDim, CODEC_DXT};
use dxtv_core::pixel::{ChannelOrder, Rgb};

use crate::linefit::{line_fit, project, Vec3};

/// Two RGB555 endpoints, one u16 each.
const ENDPOINT_BYTES: usize = 4;
const INDEX_BITS: usize = 2;
const INDICES_PER_WORD: usize = 16 / INDEX_BITS;
const MAX_555: u32 = 31;

/// DXT1-style endpoint + index block codec.
///
/// # Record layout
/// ```text
/// [c0: u16] [c1: u16] [indices: u16 × area/8]
/// ```
/// Endpoints are RGB555 with the first channel in bits 0..5 and bit 15 clear.
/// With [`ChannelOrder::Bgr`] the red and blue fields trade places. The
/// palette is `c0, c1, (2·c0 + c1) / 3, (c0 + 2·c1) / 3`, evaluated per 5-bit
/// component with rounding. Each pixel stores a 2-bit palette index; pixel
/// `i` sits at bit `2 · (i % 8)` of index word `i / 8`.
///
/// Endpoints come from a line fit: the two block colors lying furthest apart
/// along the principal axis of the block's colors.
///
/// 4×4 → 8 bytes (4 bpp), 8×8 → 20 bytes (2.5 bpp).
#[derive(Debug, Default, Clone, Copy)]
pub struct DxtCodec;

impl DxtCodec {
    pub fn new() -> Self {
        Self
    }
}

/// 5-bit color components `[r, g, b]`.
type Color555 = [u8; 3];

fn to_555(c: Rgb) -> Color555 {
    let q = |v: u8| ((v as u32 * MAX_555 + 127) / 255) as u8;
    [q(c.r), q(c.g), q(c.b)]
}

fn expand(c: Color555) -> Rgb {
    let e = |v: u8| (v << 3) | (v >> 2);
    Rgb::new(e(c[0]), e(c[1]), e(c[2]))
}

fn pack(c: Color555, order: ChannelOrder) -> u16 {
    let (low, high) = match order {
        ChannelOrder::Rgb => (c[0], c[2]),
        ChannelOrder::Bgr => (c[2], c[0]),
    };
    low as u16 | (c[1] as u16) << 5 | (high as u16) << 10
}

fn unpack(word: u16, order: ChannelOrder) -> Color555 {
    let field = |shift: u16| ((word >> shift) & MAX_555 as u16) as u8;
    match order {
        ChannelOrder::Rgb => [field(0), field(5), field(10)],
        ChannelOrder::Bgr => [field(10), field(5), field(0)],
    }
}

fn palette(c0: Color555, c1: Color555) -> [Rgb; 4] {
    let mix = |a: Color555, b: Color555| -> Color555 {
        let m = |x: u8, y: u8| ((2 * x as u16 + y as u16 + 1) / 3) as u8;
        [m(a[0], b[0]), m(a[1], b[1]), m(a[2], b[2])]
    };
    [expand(c0), expand(c1), expand(mix(c0, c1)), expand(mix(c1, c0))]
}

fn distance(a: Rgb, b: Rgb) -> u32 {
    let d = |x: u8, y: u8| (x as i32 - y as i32).pow(2) as u32;
    d(a.r, b.r) + d(a.g, b.g) + d(a.b, b.b)
}

/// Palette entry closest to `c`; the first one wins ties.
fn nearest(colors: &[Rgb; 4], c: Rgb) -> u16 {
    let mut best = 0;
    let mut best_distance = u32::MAX;
    for (i, p) in colors.iter().enumerate() {
        let d = distance(*p, c);
        if d < best_distance {
            best_distance = d;
            best = i as u16;
        }
    }
    best
}

fn check_pixel_count(pixels: usize, dim: BlockDim) -> anyhow::Result<()> {
    if pixels != dim.area() {
        anyhow::bail!(
            "dxt: {} pixels given for a {}x{} block",
            pixels,
            dim.pixels(),
            dim.pixels()
        );
    }
    Ok(())
}

impl BlockCodec for DxtCodec {
    fn id(&self) -> u16 {
        CODEC_DXT
    }

    fn name(&self) -> &'static str {
        "dxt"
    }

    fn encoded_size(&self, dim: BlockDim) -> usize {
        ENDPOINT_BYTES + dim.area() * INDEX_BITS / 8
    }

    fn encode_block(
        &self,
        pixels: &[Rgb],
        dim: BlockDim,
        order: ChannelOrder,
    ) -> anyhow::Result<Vec<u8>> {
        check_pixel_count(pixels.len(), dim)?;

        let points: Vec<Vec3> = pixels
            .iter()
            .map(|p| [p.r as f64, p.g as f64, p.b as f64])
            .collect();
        let (_, axis) = line_fit(&points);
        let mut low = 0;
        let mut high = 0;
        let mut low_distance = f64::INFINITY;
        let mut high_distance = f64::NEG_INFINITY;
        for (i, p) in points.iter().enumerate() {
            let d = project(*p, axis);
            if d < low_distance {
                low_distance = d;
                low = i;
            }
            if d > high_distance {
                high_distance = d;
                high = i;
            }
        }

        let c0 = to_555(pixels[low]);
        let c1 = to_555(pixels[high]);
        let colors = palette(c0, c1);

        let mut out = Vec::with_capacity(self.encoded_size(dim));
        out.extend_from_slice(&pack(c0, order).to_le_bytes());
        out.extend_from_slice(&pack(c1, order).to_le_bytes());
        for (chunk_index, chunk) in pixels.chunks(INDICES_PER_WORD).enumerate() {
            let mut word = 0u16;
            for (j, p) in chunk.iter().enumerate() {
                let i = chunk_index * INDICES_PER_WORD + j;
                // The extreme pixels map onto their own endpoints.
                let index = if i == low {
                    0
                } else if i == high {
                    1
                } else {
                    nearest(&colors, *p)
                };
                word |= index << (j * INDEX_BITS);
            }
            out.extend_from_slice(&word.to_le_bytes());
        }
        Ok(out)
    }

    fn decode_block(
        &self,
        data: &[u8],
        dim: BlockDim,
        order: ChannelOrder,
    ) -> anyhow::Result<Vec<Rgb>> {
        let expected = self.encoded_size(dim);
        if data.len() != expected {
            anyhow::bail!(
                "dxt: {} bytes given for a {}x{} block, expected {}",
                data.len(),
                dim.pixels(),
                dim.pixels(),
                expected
            );
        }
        let c0 = unpack(u16::from_le_bytes([data[0], data[1]]), order);
        let c1 = unpack(u16::from_le_bytes([data[2], data[3]]), order);
        let colors = palette(c0, c1);

        let mut pixels = Vec::with_capacity(dim.area());
        for bytes in data[ENDPOINT_BYTES..].chunks_exact(2) {
            let mut word = u16::from_le_bytes([bytes[0], bytes[1]]);
            for _ in 0..INDICES_PER_WORD {
                pixels.push(colors[(word & 0b11) as usize]);
                word >>= INDEX_BITS;
            }
        }
        Ok(pixels)
    }
}
