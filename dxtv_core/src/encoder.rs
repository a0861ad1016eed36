use std::sync::Arc;

use log::{debug, trace};
use rayon::prelude::*;

use crate::block::{BlockView, PixelPlane};
use crate::codebook::{validate_geometry, Codebook, MacroblockRow};
use crate::codec::BlockCodec;
use crate::config::EncoderConfig;
use crate::format::{
    BlockDim, BlockRef, FlagWriter, FrameHeader, RefSource, BLOCK_IS_REF, FLAGS_PER_WORD,
    FRAME_IS_PFRAME, FRAME_REPEATED, FRAME_SWAP_CHANNELS, HEADER_SIZE, REPEAT_EPSILON,
};
use crate::motion::{find_best_match, CausalRegion, SearchTarget};
use crate::pixel::{self, ChannelOrder, Rgb};
use crate::stats::Statistics;

/// Output of one [`FrameEncoder::encode`] call.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Compressed frame, header included.
    pub data: Vec<u8>,
    /// What a decoder reconstructs from `data`. Pass this, never the input
    /// frame, as the previous frame of the next call.
    pub reconstructed: Vec<Rgb>,
}

/// Everything a block decision reads besides the current row.
struct BlockContext<'a> {
    previous: Option<&'a Codebook>,
    codec: &'a dyn BlockCodec,
    order: ChannelOrder,
    max_error: f64,
}

/// Stateless single-frame encoder.
///
/// # Frame layout written
/// ```text
/// [HEADER: 8 bytes]
/// per macroblock row, per run of up to 16 macroblocks:
///   [split flags: u16] [macroblock payloads ...]
/// ```
/// A frame that matches the previous one to within [`REPEAT_EPSILON`] is
/// written as a bare header flagged [`FRAME_REPEATED`].
pub struct FrameEncoder {
    codec: Arc<dyn BlockCodec>,
    config: EncoderConfig,
}

impl FrameEncoder {
    pub fn new(codec: Arc<dyn BlockCodec>, config: EncoderConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { codec, config })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `frame`, predicting from `previous` when given.
    ///
    /// `previous` must be the `reconstructed` output of the preceding call.
    /// Without it the frame is a key frame. Counters for this frame are added
    /// to `stats` if supplied.
    pub fn encode(
        &self,
        frame: &[Rgb],
        previous: Option<&[Rgb]>,
        width: usize,
        height: usize,
        stats: Option<&mut Statistics>,
    ) -> anyhow::Result<EncodedFrame> {
        validate_geometry(width, height)?;
        let mut current = Codebook::from_slice(frame, width, height)?;
        let previous = previous
            .map(|p| Codebook::from_slice(p, width, height))
            .transpose()?;

        let mut frame_stats = Statistics {
            frames: 1,
            ..Statistics::default()
        };

        let mut flags = 0;
        if let Some(prev) = &previous {
            let frame_error = current.mse(prev)?;
            if frame_error < REPEAT_EPSILON {
                let header = FrameHeader::new(FRAME_REPEATED, self.codec.id(), width, height)?;
                frame_stats.repeated_frames = 1;
                frame_stats.bytes = HEADER_SIZE as u64;
                debug!("frame repeated (error {:.2e}), {} bytes", frame_error, HEADER_SIZE);
                if let Some(stats) = stats {
                    stats.merge(&frame_stats);
                }
                return Ok(EncodedFrame {
                    data: header.to_bytes().to_vec(),
                    reconstructed: prev.pixels().to_vec(),
                });
            }
            flags |= FRAME_IS_PFRAME;
        } else {
            frame_stats.key_frames = 1;
        }
        if self.config.swap_channels {
            flags |= FRAME_SWAP_CHANNELS;
        }

        let ctx = BlockContext {
            previous: previous.as_ref(),
            codec: self.codec.as_ref(),
            order: self.config.channel_order(),
            max_error: self.config.allowed_error(),
        };
        let rows: Vec<anyhow::Result<(Vec<u8>, Statistics)>> = if self.config.parallel {
            current
                .par_rows_mut()
                .map(|mut row| encode_row(&ctx, &mut row))
                .collect()
        } else {
            current
                .rows_mut()
                .map(|mut row| encode_row(&ctx, &mut row))
                .collect()
        };

        let header = FrameHeader::new(flags, self.codec.id(), width, height)?;
        let mut data = header.to_bytes().to_vec();
        for row in rows {
            let (bytes, row_stats) = row?;
            data.extend_from_slice(&bytes);
            frame_stats.merge(&row_stats);
        }
        frame_stats.bytes = data.len() as u64;
        log_frame(&frame_stats, header.is_predicted());

        if let Some(stats) = stats {
            stats.merge(&frame_stats);
        }
        Ok(EncodedFrame {
            data,
            reconstructed: current.into_pixels(),
        })
    }
}

fn log_frame(stats: &Statistics, predicted: bool) {
    let (current, previous, codec) = stats.area_percentages();
    debug!(
        "{} frame, {} bytes | curr {}/{} {:.1}% | prev {}/{} {:.1}% | codec {}/{} {:.1}%",
        if predicted { "P" } else { "key" },
        stats.bytes,
        stats.references_current[0],
        stats.references_current[1],
        current,
        stats.references_previous[0],
        stats.references_previous[1],
        previous,
        stats.codec_blocks[0],
        stats.codec_blocks[1],
        codec,
    );
}

/// Encode one macroblock row into its flag words and payloads.
fn encode_row(
    ctx: &BlockContext<'_>,
    row: &mut MacroblockRow<'_>,
) -> anyhow::Result<(Vec<u8>, Statistics)> {
    let mut out = Vec::new();
    let mut stats = Statistics::new();
    let mut flags = FlagWriter::new();
    let mut chunk = Vec::new();
    let columns = row.columns();
    for column in 0..columns {
        let macroblock = row.macroblock(column);
        let region = CausalRegion::new(&macroblock);
        let split = encode_block(ctx, row, &macroblock, region, &mut chunk, &mut stats)?;
        let mut word = flags.push(split);
        if word.is_none() && column + 1 == columns {
            word = flags.flush();
        }
        if let Some(word) = word {
            out.extend_from_slice(&word.to_le_bytes());
            out.append(&mut chunk);
        }
    }
    debug_assert_eq!(flags.pending(), 0);
    trace!(
        "row {}: {} macroblocks, {} bytes, {} flag words",
        row.index(),
        columns,
        out.len(),
        columns.div_ceil(FLAGS_PER_WORD)
    );
    Ok((out, stats))
}

/// Decide how `block` is coded, append its payload to `out` and commit its
/// final pixels into `row`. Returns whether the block was split.
fn encode_block(
    ctx: &BlockContext<'_>,
    row: &mut MacroblockRow<'_>,
    block: &BlockView,
    region: CausalRegion,
    out: &mut Vec<u8>,
    stats: &mut Statistics,
) -> anyhow::Result<bool> {
    let dim = block.dimension();
    let target = block.pixels(&*row);

    let prev_match = ctx.previous.and_then(|prev| {
        find_best_match(prev, block, &target, ctx.max_error, SearchTarget::Previous)
    });
    let curr_match = find_best_match(
        &*row,
        block,
        &target,
        ctx.max_error,
        SearchTarget::Current(region),
    );
    let chosen = match (prev_match, curr_match) {
        (Some(p), Some(c)) if p.error <= c.error => Some((RefSource::Previous, p)),
        (Some(p), None) => Some((RefSource::Previous, p)),
        (_, Some(c)) => Some((RefSource::Current, c)),
        (None, None) => None,
    };

    if let Some((source, m)) = chosen {
        let x = (block.x() as i64 + m.dx as i64) as usize;
        let y = (block.y() as i64 + m.dy as i64) as usize;
        let pixels = match (source, ctx.previous) {
            (RefSource::Previous, Some(prev)) => prev.block_at(dim, x, y),
            _ => row.block_at(dim, x, y),
        };
        block.commit(row, &pixels)?;
        let reference = BlockRef {
            source,
            dx: m.dx,
            dy: m.dy,
        };
        out.extend_from_slice(&reference.to_bytes()?);
        stats.record_reference(dim, source);
        return Ok(false);
    }

    let encoded = ctx.codec.encode_block(&target, dim, ctx.order)?;
    check_codec_record(ctx.codec, dim, &encoded)?;
    let decoded = ctx.codec.decode_block(&encoded, dim, ctx.order)?;

    if dim.half().is_some() && pixel::mse(&target, &decoded) >= ctx.max_error {
        for (index, child) in block.children().enumerate() {
            encode_block(
                ctx,
                row,
                &child,
                region.with_finished_quadrants(index),
                out,
                stats,
            )?;
        }
        return Ok(true);
    }

    block.commit(row, &decoded)?;
    out.extend_from_slice(&encoded);
    stats.record_codec_block(dim);
    Ok(false)
}

/// A codec record must have its fixed size and must not look like a reference.
fn check_codec_record(
    codec: &dyn BlockCodec,
    dim: BlockDim,
    encoded: &[u8],
) -> anyhow::Result<()> {
    let expected = codec.encoded_size(dim);
    if encoded.len() != expected {
        anyhow::bail!(
            "codec {} produced {} bytes for a {}x{} block, expected {}",
            codec.name(),
            encoded.len(),
            dim.pixels(),
            dim.pixels(),
            expected
        );
    }
    if encoded.len() < 2 || u16::from_le_bytes([encoded[0], encoded[1]]) & BLOCK_IS_REF != 0 {
        anyhow::bail!(
            "codec {} produced a record with the reference bit set",
            codec.name()
        );
    }
    Ok(())
}

/// Encoder for a sequence of frames of one size.
///
/// Keeps the reconstruction of the last frame as the prediction source of the
/// next one. The first frame, and every `key_frame_interval`-th frame when the
/// interval is non-zero, is encoded without prediction.
pub struct VideoEncoder {
    encoder: FrameEncoder,
    width: usize,
    height: usize,
    previous: Option<Vec<Rgb>>,
    frame_index: u64,
    stats: Statistics,
}

impl VideoEncoder {
    pub fn new(
        codec: Arc<dyn BlockCodec>,
        config: EncoderConfig,
        width: usize,
        height: usize,
    ) -> anyhow::Result<Self> {
        validate_geometry(width, height)?;
        Ok(Self {
            encoder: FrameEncoder::new(codec, config)?,
            width,
            height,
            previous: None,
            frame_index: 0,
            stats: Statistics::new(),
        })
    }

    /// True if the next frame will be encoded without prediction.
    pub fn next_is_key_frame(&self) -> bool {
        let interval = self.encoder.config().key_frame_interval as u64;
        self.previous.is_none() || (interval > 0 && self.frame_index % interval == 0)
    }

    /// Encode the next frame and return its compressed bytes.
    pub fn encode_frame(&mut self, frame: &[Rgb]) -> anyhow::Result<Vec<u8>> {
        let previous = if self.next_is_key_frame() {
            None
        } else {
            self.previous.as_deref()
        };
        let encoded = self.encoder.encode(
            frame,
            previous,
            self.width,
            self.height,
            Some(&mut self.stats),
        )?;
        self.previous = Some(encoded.reconstructed);
        self.frame_index += 1;
        Ok(encoded.data)
    }

    /// Reconstruction of the last encoded frame.
    pub fn previous_frame(&self) -> Option<&[Rgb]> {
        self.previous.as_deref()
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frame_index
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Finish the sequence and return its accumulated statistics.
    pub fn finish(self) -> Statistics {
        let (current, previous, codec) = self.stats.area_percentages();
        debug!(
            "{} frames ({} key, {} repeated), {} bytes | curr {:.1}% | prev {:.1}% | codec {:.1}%",
            self.stats.frames,
            self.stats.key_frames,
            self.stats.repeated_frames,
            self.stats.bytes,
            current,
            previous,
            codec
        );
        self.stats
    }
}
