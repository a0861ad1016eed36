/// Integration tests: encode frames with the DXT block codec, decode them
/// again and check that the decoder lands on exactly the encoder's
/// reconstruction.
///
/// Most scenarios use "tile" frames: every 8×8 macroblock is one flat color
/// that RGB555 represents exactly, so reconstruction is lossless and block
/// decisions are fully predictable.
use std::sync::Arc;

use dxtv_codecs::{codec_by_id, DxtCodec};
use dxtv_core::format::{
    BlockRef, FrameHeader, RefSource, CODEC_DXT, FRAME_IS_PFRAME, FRAME_REPEATED,
    FRAME_SWAP_CHANNELS, HEADER_SIZE,
};
use dxtv_core::{
    EncoderConfig, FrameDecoder, FrameEncoder, Rgb, Statistics, VideoDecoder, VideoEncoder,
};

/// Generate a `width × height` frame of deterministic noise using a simple LCG.
fn noise_frame(width: usize, height: usize, seed: u64) -> Vec<Rgb> {
    let mut rng = seed;
    (0..width * height)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            Rgb::new((rng >> 56) as u8, (rng >> 48) as u8, (rng >> 40) as u8)
        })
        .collect()
}

/// 8-bit value of a 5-bit component, as the DXT codec expands it.
fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

fn tile_color(column: usize, row: usize) -> Rgb {
    Rgb::new(
        expand5((column * 4) as u8),
        expand5((row * 8) as u8),
        expand5(((column + row) % 32) as u8),
    )
}

/// Flat 8×8 tiles with distinct colors, moved `shift` tiles to the right.
/// Columns uncovered by the shift are white.
fn tile_frame(width: usize, height: usize, shift: usize) -> Vec<Rgb> {
    (0..width * height)
        .map(|i| {
            let column = (i % width) / 8;
            let row = (i / width) / 8;
            if column < shift {
                Rgb::new(255, 255, 255)
            } else {
                tile_color(column - shift, row)
            }
        })
        .collect()
}

/// Every macroblock carries the same two-color pattern.
fn repeating_pattern_frame(width: usize, height: usize) -> Vec<Rgb> {
    let a = Rgb::new(expand5(3), expand5(28), expand5(9));
    let b = Rgb::new(expand5(30), expand5(1), expand5(17));
    let mut rng = 7u64;
    let pattern: Vec<bool> = (0..64)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            rng >> 63 == 1
        })
        .collect();
    (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            if pattern[(y % 8) * 8 + x % 8] {
                a
            } else {
                b
            }
        })
        .collect()
}

fn encoder(quality: f64) -> FrameEncoder {
    let config = EncoderConfig::new().with_quality(quality);
    FrameEncoder::new(Arc::new(DxtCodec), config).unwrap()
}

fn decoder() -> FrameDecoder {
    FrameDecoder::new(Arc::new(DxtCodec))
}

// ── round trips ───────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_key_frame() {
    let frame = noise_frame(64, 48, 1);
    let encoded = encoder(90.0).encode(&frame, None, 64, 48, None).unwrap();

    let header = FrameHeader::from_bytes(&encoded.data).unwrap();
    assert_eq!(header.codec_id, CODEC_DXT);
    assert_eq!(header.uncompressed_size, 64 * 48 * 3);
    assert!(!header.is_predicted());

    let decoded = decoder().decode(&encoded.data, None, 64, 48).unwrap();
    assert_eq!(decoded, encoded.reconstructed);
}

#[test]
fn test_roundtrip_predicted_frame() {
    let first = noise_frame(64, 64, 2);
    let mut second = first.clone();
    second.rotate_right(5);

    let enc = encoder(80.0);
    let e1 = enc.encode(&first, None, 64, 64, None).unwrap();
    let e2 = enc
        .encode(&second, Some(e1.reconstructed.as_slice()), 64, 64, None)
        .unwrap();
    assert!(FrameHeader::from_bytes(&e2.data).unwrap().is_predicted());

    let dec = decoder();
    let d1 = dec.decode(&e1.data, None, 64, 64).unwrap();
    let d2 = dec.decode(&e2.data, Some(d1.as_slice()), 64, 64).unwrap();
    assert_eq!(d1, e1.reconstructed);
    assert_eq!(d2, e2.reconstructed);
}

#[test]
fn test_tiles_reconstruct_exactly() {
    let frame = tile_frame(64, 32, 0);
    let mut stats = Statistics::new();
    let encoded = encoder(99.0)
        .encode(&frame, None, 64, 32, Some(&mut stats))
        .unwrap();

    assert_eq!(encoded.reconstructed, frame);
    // 4 rows × (flag word + 8 × 20-byte codec blocks)
    assert_eq!(encoded.data.len(), HEADER_SIZE + 4 * (2 + 8 * 20));
    assert_eq!(stats.codec_blocks, [32, 0]);
    assert_eq!(stats.references_current, [0, 0]);
    assert_eq!(stats.key_frames, 1);
}

#[test]
fn test_moved_tiles_reference_previous_frame() {
    let enc = encoder(99.0);
    let first = enc
        .encode(&tile_frame(64, 32, 0), None, 64, 32, None)
        .unwrap();

    let moved = tile_frame(64, 32, 1);
    let mut stats = Statistics::new();
    let second = enc
        .encode(&moved, Some(first.reconstructed.as_slice()), 64, 32, Some(&mut stats))
        .unwrap();

    assert_eq!(second.reconstructed, moved);
    assert_eq!(stats.references_previous, [28, 0]);
    assert_eq!(stats.codec_blocks, [4, 0]);
    assert_eq!(stats.references_current, [0, 0]);
    // 4 rows × (flag word + white codec block + 7 references)
    assert_eq!(second.data.len(), HEADER_SIZE + 4 * (2 + 20 + 7 * 2));

    let decoded = decoder()
        .decode(&second.data, Some(first.reconstructed.as_slice()), 64, 32)
        .unwrap();
    assert_eq!(decoded, moved);
}

#[test]
fn test_current_frame_references_are_causal() {
    let frame = repeating_pattern_frame(64, 16);
    let mut stats = Statistics::new();
    let encoded = encoder(90.0)
        .encode(&frame, None, 64, 16, Some(&mut stats))
        .unwrap();
    assert_eq!(encoded.reconstructed, frame);
    assert_eq!(stats.codec_blocks, [2, 0]);
    assert_eq!(stats.references_current, [14, 0]);

    // Per row: flag word, one codec block, then seven references to the left.
    let mut pos = HEADER_SIZE;
    for _ in 0..2 {
        assert_eq!(&encoded.data[pos..pos + 2], &[0, 0]);
        pos += 2 + 20;
        for _ in 0..7 {
            let word = u16::from_le_bytes([encoded.data[pos], encoded.data[pos + 1]]);
            let r = BlockRef::from_word(word).unwrap();
            assert_eq!(r.source, RefSource::Current);
            assert_eq!(r.dy, 0);
            assert!(r.dx == -8 || r.dx == -16, "dx {}", r.dx);
            pos += 2;
        }
    }
    assert_eq!(pos, encoded.data.len());

    let decoded = decoder().decode(&encoded.data, None, 64, 16).unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn test_swapped_channels_roundtrip() {
    let frame = noise_frame(32, 32, 3);
    let plain = encoder(85.0).encode(&frame, None, 32, 32, None).unwrap();
    let config = EncoderConfig::new()
        .with_quality(85.0)
        .with_swap_channels(true);
    let swapped = FrameEncoder::new(Arc::new(DxtCodec), config)
        .unwrap()
        .encode(&frame, None, 32, 32, None)
        .unwrap();

    let header = FrameHeader::from_bytes(&swapped.data).unwrap();
    assert!(header.has_flag(FRAME_SWAP_CHANNELS));
    assert_eq!(swapped.reconstructed, plain.reconstructed);
    assert_ne!(swapped.data, plain.data);

    let decoded = decoder().decode(&swapped.data, None, 32, 32).unwrap();
    assert_eq!(decoded, swapped.reconstructed);
}

#[test]
fn test_parallel_and_sequential_output_match() {
    let first = noise_frame(128, 64, 4);
    let mut second = first.clone();
    second.rotate_left(3 * 128 + 2);

    let outputs: Vec<Vec<u8>> = [true, false]
        .into_iter()
        .map(|parallel| {
            let config = EncoderConfig::new().with_quality(70.0).with_parallel(parallel);
            let enc = FrameEncoder::new(Arc::new(DxtCodec), config).unwrap();
            let e1 = enc.encode(&first, None, 128, 64, None).unwrap();
            let e2 = enc
                .encode(&second, Some(e1.reconstructed.as_slice()), 128, 64, None)
                .unwrap();
            [e1.data, e2.data].concat()
        })
        .collect();
    assert_eq!(outputs[0], outputs[1]);
}

// ── frame-level behavior ──────────────────────────────────────────────────

#[test]
fn test_identical_frame_is_repeated() {
    let enc = encoder(90.0);
    let first = enc.encode(&noise_frame(64, 64, 5), None, 64, 64, None).unwrap();

    let mut almost = first.reconstructed.clone();
    almost[100].g ^= 1;
    let mut stats = Statistics::new();
    let repeated = enc
        .encode(&almost, Some(first.reconstructed.as_slice()), 64, 64, Some(&mut stats))
        .unwrap();

    assert_eq!(repeated.data.len(), HEADER_SIZE);
    let header = FrameHeader::from_bytes(&repeated.data).unwrap();
    assert!(header.has_flag(FRAME_REPEATED));
    assert!(!header.has_flag(FRAME_IS_PFRAME));
    assert_eq!(repeated.reconstructed, first.reconstructed);
    assert_eq!(stats.repeated_frames, 1);
    assert_eq!(stats.bytes, HEADER_SIZE as u64);

    let decoded = decoder()
        .decode(&repeated.data, Some(first.reconstructed.as_slice()), 64, 64)
        .unwrap();
    assert_eq!(decoded, first.reconstructed);
}

#[test]
fn test_solid_macroblock_repeat_is_header_only() {
    let solid = vec![Rgb::new(40, 90, 200); 64];
    let enc = encoder(90.0);
    let first = enc.encode(&solid, None, 8, 8, None).unwrap();
    assert_eq!(first.data.len(), HEADER_SIZE + 2 + 20);

    let second = enc
        .encode(&first.reconstructed, Some(first.reconstructed.as_slice()), 8, 8, None)
        .unwrap();
    assert_eq!(second.data.len(), HEADER_SIZE);
}

#[test]
fn test_single_macroblock_key_frame_is_one_codec_block() {
    // No previous frame and nothing decoded before the only macroblock, so
    // the codec is the sole option.
    let frame = noise_frame(8, 8, 6);
    let mut stats = Statistics::new();
    let encoded = encoder(0.0)
        .encode(&frame, None, 8, 8, Some(&mut stats))
        .unwrap();

    assert_eq!(stats.codec_blocks, [1, 0]);
    assert_eq!(stats.references_current, [0, 0]);
    assert_eq!(stats.key_frames, 1);
    assert_eq!(encoded.data.len(), HEADER_SIZE + 2 + 20);
    assert_eq!(&encoded.data[HEADER_SIZE..HEADER_SIZE + 2], &[0, 0]);

    let decoded = decoder().decode(&encoded.data, None, 8, 8).unwrap();
    assert_eq!(decoded, encoded.reconstructed);
}

#[test]
fn test_full_quality_splits_every_macroblock() {
    // 17 macroblocks: one full flag word and one with a single flag.
    let frame = noise_frame(136, 8, 7);
    let mut stats = Statistics::new();
    let encoded = encoder(100.0)
        .encode(&frame, None, 136, 8, Some(&mut stats))
        .unwrap();

    assert_eq!(stats.codec_blocks, [0, 68]);
    let data = &encoded.data;
    assert_eq!(data.len(), HEADER_SIZE + 2 + 16 * 4 * 8 + 2 + 4 * 8);
    assert_eq!(&data[HEADER_SIZE..HEADER_SIZE + 2], &[0xFF, 0xFF]);
    let second_word = HEADER_SIZE + 2 + 16 * 4 * 8;
    assert_eq!(&data[second_word..second_word + 2], &[0x01, 0x00]);

    let decoded = decoder().decode(data, None, 136, 8).unwrap();
    assert_eq!(decoded, encoded.reconstructed);
}

#[test]
fn test_lower_quality_is_smaller() {
    let frame = noise_frame(64, 64, 8);
    let low = encoder(0.0).encode(&frame, None, 64, 64, None).unwrap();
    let high = encoder(100.0).encode(&frame, None, 64, 64, None).unwrap();
    assert!(low.data.len() < high.data.len());
    assert_eq!(high.data.len(), HEADER_SIZE + 8 * (2 + 8 * 32));
}

// ── sequences ─────────────────────────────────────────────────────────────

#[test]
fn test_sequence_with_key_frames() {
    let frames = [
        tile_frame(64, 32, 0),
        tile_frame(64, 32, 0),
        tile_frame(64, 32, 1),
        tile_frame(64, 32, 1),
        tile_frame(64, 32, 0),
    ];
    let config = EncoderConfig::new()
        .with_quality(99.0)
        .with_key_frame_interval(2);
    let mut enc = VideoEncoder::new(Arc::new(DxtCodec), config, 64, 32).unwrap();
    let mut dec = VideoDecoder::new(codec_by_id(CODEC_DXT).unwrap(), 64, 32).unwrap();

    let mut kinds = Vec::new();
    for frame in &frames {
        let key = enc.next_is_key_frame();
        let data = enc.encode_frame(frame).unwrap();
        let header = FrameHeader::from_bytes(&data).unwrap();
        kinds.push((key, header.is_repeated()));

        let decoded = dec.decode_frame(&data).unwrap().to_vec();
        assert_eq!(Some(decoded.as_slice()), enc.previous_frame());
        assert_eq!(Some(decoded.as_slice()), dec.current_frame());
        assert_eq!(decoded, frame.as_slice());
    }
    assert_eq!(
        kinds,
        vec![
            (true, false),
            (false, true),
            (true, false),
            (false, true),
            (true, false)
        ]
    );
    assert_eq!(dec.frames_decoded(), 5);
    assert_eq!(enc.frames_encoded(), 5);
    assert_eq!(enc.statistics().frames, 5);

    let stats = enc.finish();
    assert_eq!(stats.frames, 5);
    assert_eq!(stats.key_frames, 3);
    assert_eq!(stats.repeated_frames, 2);
}

#[test]
fn test_statistics_serialize() {
    let mut enc = VideoEncoder::new(Arc::new(DxtCodec), EncoderConfig::default(), 64, 32).unwrap();
    enc.encode_frame(&tile_frame(64, 32, 0)).unwrap();
    enc.encode_frame(&tile_frame(64, 32, 1)).unwrap();
    let stats = enc.finish();

    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"frames\":2"), "got: {json}");
    let back: Statistics = serde_json::from_str(&json).unwrap();
    assert_eq!(back, stats);

    let (current, previous, codec) = stats.area_percentages();
    assert!((current + previous + codec - 100.0).abs() < 1e-9);
}

#[test]
fn test_config_deserializes_with_defaults() {
    let config: EncoderConfig = serde_json::from_str(r#"{"quality": 75.0}"#).unwrap();
    assert_eq!(config.quality, 75.0);
    assert!(config.parallel);
    assert_eq!(config.key_frame_interval, 0);
}

// ── errors ────────────────────────────────────────────────────────────────

#[test]
fn test_error_bad_geometry() {
    let err = encoder(90.0)
        .encode(&noise_frame(12, 8, 1), None, 12, 8, None)
        .unwrap_err();
    assert!(err.to_string().contains("multiple of 8"), "got: {err}");

    let err = encoder(90.0)
        .encode(&noise_frame(8, 8, 1), None, 16, 8, None)
        .unwrap_err();
    assert!(err.to_string().contains("does not match"), "got: {err}");
}

#[test]
fn test_error_bad_config() {
    let config = EncoderConfig::new().with_quality(101.0);
    let err = FrameEncoder::new(Arc::new(DxtCodec), config)
        .err()
        .unwrap();
    assert!(err.to_string().contains("quality"), "got: {err}");

    let config = EncoderConfig::new().with_key_frame_interval(61);
    assert!(VideoEncoder::new(Arc::new(DxtCodec), config, 8, 8).is_err());
}

#[test]
fn test_error_missing_previous_frame() {
    let repeated = FrameHeader::new(FRAME_REPEATED, CODEC_DXT, 8, 8).unwrap().to_bytes();
    let err = decoder().decode(&repeated, None, 8, 8).unwrap_err();
    assert!(err.to_string().contains("needs a previous frame"), "got: {err}");

    let enc = encoder(90.0);
    let first = enc.encode(&noise_frame(16, 16, 9), None, 16, 16, None).unwrap();
    let second = enc
        .encode(&noise_frame(16, 16, 10), Some(first.reconstructed.as_slice()), 16, 16, None)
        .unwrap();
    let err = decoder().decode(&second.data, None, 16, 16).unwrap_err();
    assert!(err.to_string().contains("predicted"), "got: {err}");
}

#[test]
fn test_error_wrongly_sized_previous_frame() {
    let previous = noise_frame(8, 8, 11);

    let repeated = FrameHeader::new(FRAME_REPEATED, CODEC_DXT, 8, 8).unwrap().to_bytes();
    let err = decoder()
        .decode(&repeated, Some(&previous[..32]), 8, 8)
        .unwrap_err();
    assert!(err.to_string().contains("pixel count 32"), "got: {err}");

    let enc = encoder(90.0);
    let first = enc.encode(&previous, None, 8, 8, None).unwrap();
    let second = enc
        .encode(&noise_frame(8, 8, 12), Some(first.reconstructed.as_slice()), 8, 8, None)
        .unwrap();
    assert!(FrameHeader::from_bytes(&second.data).unwrap().is_predicted());
    let longer = noise_frame(16, 8, 13);
    let err = decoder()
        .decode(&second.data, Some(longer.as_slice()), 8, 8)
        .unwrap_err();
    assert!(err.to_string().contains("pixel count 128"), "got: {err}");
}

#[test]
fn test_error_codec_and_size_mismatch() {
    let encoded = encoder(90.0)
        .encode(&noise_frame(16, 16, 11), None, 16, 16, None)
        .unwrap();

    let mut foreign = encoded.data.clone();
    foreign[2] = 9;
    let err = decoder().decode(&foreign, None, 16, 16).unwrap_err();
    assert!(err.to_string().contains("codec mismatch"), "got: {err}");

    let err = decoder().decode(&encoded.data, None, 16, 8).unwrap_err();
    assert!(err.to_string().contains("uncompressed size"), "got: {err}");
}

#[test]
fn test_error_truncated_and_trailing_data() {
    let encoded = encoder(90.0)
        .encode(&noise_frame(16, 16, 12), None, 16, 16, None)
        .unwrap();

    let short = &encoded.data[..encoded.data.len() - 1];
    let err = decoder().decode(short, None, 16, 16).unwrap_err();
    assert!(err.to_string().contains("truncated"), "got: {err}");

    let err = decoder().decode(&encoded.data[..4], None, 16, 16).unwrap_err();
    assert!(err.to_string().contains("truncated"), "got: {err}");

    let mut long = encoded.data.clone();
    long.push(0);
    let err = decoder().decode(&long, None, 16, 16).unwrap_err();
    assert!(err.to_string().contains("trailing"), "got: {err}");
}

#[test]
fn test_error_invalid_references() {
    let header = FrameHeader::new(0, CODEC_DXT, 16, 8).unwrap().to_bytes();
    let reference = |source, dx, dy| {
        let mut data = header.to_vec();
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&BlockRef { source, dx, dy }.to_bytes().unwrap());
        data.extend_from_slice(&BlockRef { source, dx, dy }.to_bytes().unwrap());
        data
    };

    let err = decoder()
        .decode(&reference(RefSource::Current, 8, 0), None, 16, 8)
        .unwrap_err();
    assert!(err.to_string().contains("not decoded yet"), "got: {err}");

    let err = decoder()
        .decode(&reference(RefSource::Previous, 0, 0), Some(&[Rgb::BLACK; 128][..]), 16, 8)
        .unwrap_err();
    assert!(err.to_string().contains("key frame"), "got: {err}");

    let predicted = FrameHeader::new(FRAME_IS_PFRAME, CODEC_DXT, 16, 8).unwrap().to_bytes();
    let mut data = predicted.to_vec();
    data.extend_from_slice(&0u16.to_le_bytes());
    for dx in [-1, 0] {
        let r = BlockRef {
            source: RefSource::Previous,
            dx,
            dy: 0,
        };
        data.extend_from_slice(&r.to_bytes().unwrap());
    }
    let err = decoder()
        .decode(&data, Some(&[Rgb::BLACK; 128][..]), 16, 8)
        .unwrap_err();
    assert!(err.to_string().contains("outside the previous frame"), "got: {err}");
}

#[test]
fn test_error_stray_split_flags() {
    let mut data = FrameHeader::new(0, CODEC_DXT, 8, 8).unwrap().to_bytes().to_vec();
    data.extend_from_slice(&0b10u16.to_le_bytes());
    data.extend_from_slice(&[0; 20]);
    let err = decoder().decode(&data, None, 8, 8).unwrap_err();
    assert!(err.to_string().contains("beyond"), "got: {err}");
}
