//! End-to-end tests over hand-assembled GIF byte streams, exercising the
//! whole reader → pump → compositor pipeline.

use gifsplit::{Error, GifReader, Palette, Raster, Repeat, SplitImage, Splitter};
use rgb::{RGB8, RGBA8};

const OPAQUE_BLACK: RGBA8 = RGBA8 { r: 0, g: 0, b: 0, a: 255 };

/// Fixed-width GIF LZW: a clear code before every literal keeps the
/// dictionary from growing, so the code width never changes.
fn lzw_fixed(min_code: u8, data: &[u8]) -> Vec<u8> {
    let clear = 1u16 << min_code;
    let end = clear + 1;
    let width = u32::from(min_code) + 1;
    let mut out = Vec::new();
    let (mut acc, mut bits) = (0u32, 0u32);
    let mut push = |code: u16| {
        acc |= u32::from(code) << bits;
        bits += width;
        while bits >= 8 {
            out.push((acc & 0xFF) as u8);
            acc >>= 8;
            bits -= 8;
        }
    };
    for &byte in data {
        push(clear);
        push(u16::from(byte));
    }
    push(end);
    if bits > 0 {
        out.push((acc & 0xFF) as u8);
    }
    out
}

/// Smallest wire color-table size exponent covering `len` entries.
fn color_table_bits(len: usize) -> u8 {
    let mut bits = 0u8;
    while (2usize << bits) < len {
        bits += 1;
    }
    bits
}

fn push_color_table(bytes: &mut Vec<u8>, colors: &[[u8; 3]]) {
    let bits = color_table_bits(colors.len());
    for color in colors {
        bytes.extend_from_slice(color);
    }
    for _ in colors.len()..(2 << bits) {
        bytes.extend_from_slice(&[0, 0, 0]);
    }
}

struct GifBuilder {
    bytes: Vec<u8>,
}

impl GifBuilder {
    fn new(width: u16, height: u16, global_palette: Option<&[[u8; 3]]>) -> Self {
        let mut bytes = b"GIF89a".to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        match global_palette {
            Some(colors) => {
                bytes.push(0x80 | color_table_bits(colors.len()));
                bytes.extend_from_slice(&[0, 0]);
                push_color_table(&mut bytes, colors);
            },
            None => bytes.extend_from_slice(&[0, 0, 0]),
        }
        Self { bytes }
    }

    fn graphics_control(&mut self, disposal: u8, delay: u16, transparent: Option<u8>) -> &mut Self {
        self.bytes.extend_from_slice(&[0x21, 0xF9, 4]);
        self.bytes.push((disposal << 2) | u8::from(transparent.is_some()));
        self.bytes.extend_from_slice(&delay.to_le_bytes());
        self.bytes.push(transparent.unwrap_or(0));
        self.bytes.push(0);
        self
    }

    fn netscape(&mut self, loops: u16) -> &mut Self {
        self.bytes.extend_from_slice(&[0x21, 0xFF, 11]);
        self.bytes.extend_from_slice(b"NETSCAPE2.0");
        self.bytes.extend_from_slice(&[3, 1]);
        self.bytes.extend_from_slice(&loops.to_le_bytes());
        self.bytes.push(0);
        self
    }

    fn comment(&mut self, text: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(&[0x21, 0xFE]);
        self.bytes.push(text.len() as u8);
        self.bytes.extend_from_slice(text);
        self.bytes.push(0);
        self
    }

    fn image(
        &mut self,
        (left, top): (u16, u16),
        (width, height): (u16, u16),
        local_palette: Option<&[[u8; 3]]>,
        interlaced: bool,
        pixels: &[u8],
    ) -> &mut Self {
        assert_eq!(pixels.len(), usize::from(width) * usize::from(height));
        self.bytes.push(0x2C);
        for value in [left, top, width, height] {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
        let mut flags = 0u8;
        if local_palette.is_some() {
            flags |= 0x80 | color_table_bits(local_palette.unwrap().len());
        }
        if interlaced {
            flags |= 0x40;
        }
        self.bytes.push(flags);
        if let Some(colors) = local_palette {
            push_color_table(&mut self.bytes, colors);
        }

        let min_code = (2u8..=8)
            .find(|&n| pixels.iter().all(|&p| u16::from(p) < (1 << n)))
            .expect("pixel indices fit in 8 bits");
        self.bytes.push(min_code);
        for chunk in lzw_fixed(min_code, pixels).chunks(255) {
            self.bytes.push(chunk.len() as u8);
            self.bytes.extend_from_slice(chunk);
        }
        self.bytes.push(0);
        self
    }

    fn finish(&mut self) -> Vec<u8> {
        let mut bytes = std::mem::take(&mut self.bytes);
        bytes.push(0x3B);
        bytes
    }
}

fn split_all(bytes: &[u8]) -> (Vec<SplitImage>, gifsplit::Info) {
    let mut splitter = Splitter::new(GifReader::new(bytes).unwrap()).unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = splitter.next_frame() {
        check_invariants(frame);
        frames.push(frame.clone());
    }
    (frames, splitter.info().clone())
}

fn check_invariants(frame: &SplitImage) {
    match frame.raster() {
        Raster::Indexed { pixels, palette, transparent } => {
            assert_eq!(pixels.buf().len(), frame.width() * frame.height());
            for &index in pixels.buf().iter() {
                assert!(
                    usize::from(index) < palette.len() || Some(index) == *transparent,
                    "index {index} outside palette of {} with transparent {transparent:?}",
                    palette.len()
                );
            }
        },
        Raster::Rgba(pixels) => {
            assert_eq!(pixels.buf().len(), frame.width() * frame.height());
            for pixel in pixels.buf().iter() {
                assert!(pixel.a == 0 || pixel.a == 255);
            }
        },
    }
}

fn expect_indexed(frame: &SplitImage) -> (&[u8], &Palette, Option<u8>) {
    match frame.raster() {
        Raster::Indexed { pixels, palette, transparent } => (pixels.buf(), palette, *transparent),
        Raster::Rgba(_) => panic!("expected an indexed frame"),
    }
}

fn expect_rgba(frame: &SplitImage) -> &[RGBA8] {
    match frame.raster() {
        Raster::Rgba(pixels) => pixels.buf(),
        Raster::Indexed { .. } => panic!("expected a truecolor frame"),
    }
}

fn rgb(colors: &[[u8; 3]]) -> Vec<RGB8> {
    colors.iter().map(|c| RGB8::new(c[0], c[1], c[2])).collect()
}

#[test]
fn single_full_screen_palette_frame() {
    let bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 0, 0]]))
        .image((0, 0), (2, 2), None, false, &[1, 1, 0, 0])
        .finish();
    let (frames, info) = split_all(&bytes);
    assert_eq!(frames.len(), 1);
    let (raster, palette, transparent) = expect_indexed(&frames[0]);
    assert_eq!(raster, &[1, 1, 0, 0]);
    assert_eq!(palette.colors(), rgb(&[[0, 0, 0], [255, 0, 0]]));
    assert_eq!(transparent, None);
    assert_eq!(frames[0].delay(), 0);
    assert!(!frames[0].used_local_palette());
    assert_eq!(info.loop_count, 1);
    assert!(!info.has_errors);
}

#[test]
fn opaque_overlay_keeps_palette_representation() {
    let bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 0, 0], [0, 255, 0]]))
        .image((0, 0), (2, 2), None, false, &[0, 0, 0, 0])
        .graphics_control(1, 0, None)
        .image((1, 0), (1, 2), None, false, &[2, 2])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 2);
    let (raster, _, _) = expect_indexed(&frames[1]);
    assert_eq!(raster, &[0, 2, 0, 2]);
}

#[test]
fn full_frame_palette_swap_stays_indexed() {
    let bytes = GifBuilder::new(1, 2, None)
        .image((0, 0), (1, 2), Some(&[[10, 20, 30]]), false, &[0, 0])
        .image((0, 0), (1, 2), Some(&[[40, 50, 60]]), false, &[0, 0])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 2);
    let (_, palette, _) = expect_indexed(&frames[0]);
    assert_eq!(palette.colors()[0], RGB8::new(10, 20, 30));
    assert!(frames[0].used_local_palette());
    let (raster, palette, _) = expect_indexed(&frames[1]);
    assert_eq!(raster, &[0, 0]);
    assert_eq!(palette.colors()[0], RGB8::new(40, 50, 60));
}

#[test]
fn partial_frame_palette_mismatch_upgrades_to_truecolor() {
    let bytes = GifBuilder::new(1, 2, None)
        .image((0, 0), (1, 2), Some(&[[10, 20, 30]]), false, &[0, 0])
        .image((0, 0), (1, 1), Some(&[[40, 50, 60]]), false, &[0])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 2);
    assert_eq!(
        expect_rgba(&frames[1]),
        &[RGBA8::new(40, 50, 60, 255), RGBA8::new(10, 20, 30, 255)]
    );
}

#[test]
fn restore_background_disposal() {
    let bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 255, 255]]))
        .graphics_control(2, 0, Some(0))
        .image((0, 0), (2, 2), None, false, &[1, 1, 1, 1])
        .graphics_control(0, 0, Some(0))
        .image((0, 0), (2, 2), None, false, &[1, 0, 0, 1])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 2);
    let (raster, _, transparent) = expect_indexed(&frames[1]);
    assert_eq!(raster, &[1, 0, 0, 1]);
    assert_eq!(transparent, Some(0));
}

#[test]
fn restore_previous_disposal() {
    let bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 255, 255]]))
        .graphics_control(0, 0, None)
        .image((0, 0), (2, 2), None, false, &[0, 0, 0, 0])
        .graphics_control(3, 0, Some(1))
        .image((1, 0), (1, 1), None, false, &[0])
        .image((0, 0), (2, 2), None, false, &[1, 1, 1, 1])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 3);
    // the mismatched transparent index forces a truecolor merge of frame 2
    assert_eq!(expect_rgba(&frames[1]), &[OPAQUE_BLACK; 4]);
    // frame 3 composites on the restored frame-1 canvas and replaces it
    let (raster, _, _) = expect_indexed(&frames[2]);
    assert_eq!(raster, &[1, 1, 1, 1]);
}

#[test]
fn netscape_loop_count() {
    let bytes = GifBuilder::new(1, 1, Some(&[[0, 0, 0]]))
        .netscape(0)
        .image((0, 0), (1, 1), None, false, &[0])
        .finish();
    let (frames, info) = split_all(&bytes);
    assert_eq!(frames.len(), 1);
    assert_eq!(info.loop_count, 0);
    assert_eq!(info.repeat(), Repeat::Infinite);
}

#[test]
fn comments_are_skipped_and_delay_is_sticky() {
    let bytes = GifBuilder::new(1, 1, Some(&[[0, 0, 0]]))
        .comment(b"made by hand")
        .graphics_control(0, 7, None)
        .image((0, 0), (1, 1), None, false, &[0])
        .comment(b"between frames")
        .image((0, 0), (1, 1), None, false, &[0])
        .finish();
    let (frames, info) = split_all(&bytes);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].delay(), 7);
    assert_eq!(frames[1].delay(), 7);
    assert_eq!(info.loop_count, 1);
}

#[test]
fn interlaced_frame_is_deinterlaced() {
    let colors: Vec<[u8; 3]> = (0u8..8).map(|n| [n, n, n]).collect();
    let bytes = GifBuilder::new(1, 8, Some(&colors))
        .image((0, 0), (1, 8), None, true, &[0, 1, 2, 3, 4, 5, 6, 7])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 1);
    let (raster, _, _) = expect_indexed(&frames[0]);
    // pass order 0,4,2,6,1,3,5,7 mapped back to the screen rows
    assert_eq!(raster, &[0, 4, 2, 5, 1, 6, 3, 7]);
}

#[test]
fn partial_first_frame_has_transparent_padding() {
    let bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 255, 255]]))
        .graphics_control(0, 0, Some(0))
        .image((1, 0), (1, 1), None, false, &[1])
        .finish();
    let (frames, _) = split_all(&bytes);
    let (raster, _, transparent) = expect_indexed(&frames[0]);
    assert_eq!(raster, &[0, 1, 0, 0]);
    assert_eq!(transparent, Some(0));
}

#[test]
fn truncated_image_data_latches_the_error_flag() {
    let mut bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 255, 255]]))
        .image((0, 0), (2, 2), None, false, &[1, 1, 0, 0])
        .finish();
    bytes.truncate(bytes.len() - 6);
    let mut splitter = Splitter::new(GifReader::new(&bytes[..]).unwrap()).unwrap();
    assert!(splitter.next_frame().is_none());
    assert!(splitter.info().has_errors);
    assert!(splitter.last_error().is_some());
    // errors are sticky
    assert!(splitter.next_frame().is_none());
    assert!(splitter.info().has_errors);
}

#[test]
fn out_of_bounds_subframe_is_fatal() {
    let bytes = GifBuilder::new(2, 2, Some(&[[0, 0, 0], [255, 255, 255]]))
        .image((1, 0), (2, 2), None, false, &[0, 0, 0, 0])
        .finish();
    let mut splitter = Splitter::new(GifReader::new(&bytes[..]).unwrap()).unwrap();
    assert!(splitter.next_frame().is_none());
    assert!(splitter.info().has_errors);
    assert!(matches!(splitter.last_error(), Some(Error::Geometry(_))));
}

#[test]
fn oversized_screen_is_rejected_at_open() {
    let bytes = GifBuilder::new(5000, 5000, Some(&[[0, 0, 0]])).finish();
    let reader = GifReader::new(&bytes[..]).unwrap();
    assert!(matches!(Splitter::new(reader), Err(Error::Geometry(_))));
}

#[test]
fn missing_signature_is_rejected() {
    assert!(matches!(
        GifReader::new(&b"JIF89a"[..]),
        Err(Error::Format(_))
    ));
}

#[test]
fn frame_dimensions_always_match_the_screen() {
    let bytes = GifBuilder::new(3, 2, Some(&[[0, 0, 0], [9, 9, 9]]))
        .graphics_control(1, 5, Some(0))
        .image((0, 0), (3, 2), None, false, &[1, 1, 1, 1, 1, 1])
        .graphics_control(1, 5, Some(0))
        .image((1, 1), (2, 1), None, false, &[0, 1])
        .finish();
    let (frames, _) = split_all(&bytes);
    assert_eq!(frames.len(), 2);
    for frame in &frames {
        assert_eq!((frame.width(), frame.height()), (3, 2));
    }
    let (raster, _, _) = expect_indexed(&frames[1]);
    // transparent source pixels leave the canvas untouched
    assert_eq!(raster, &[1, 1, 1, 1, 1, 1]);
}
