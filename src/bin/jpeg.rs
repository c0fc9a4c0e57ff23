//! JPEG output. JPEG has no alpha channel, so frames are flattened to RGB
//! with transparent pixels rendered white.

use crate::BinResult;
use gifsplit::{Raster, SplitImage};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use std::path::Path;

pub struct Options {
    pub quality: u8,
    /// 0 = 4:4:4, 1 = 4:2:2, 2 = 4:2:0; `None` picks by quality.
    pub sampling: Option<u8>,
    pub optimize_huffman: bool,
}

pub fn write(image: &SplitImage, path: &Path, options: &Options) -> BinResult<()> {
    let mut rgb = Vec::with_capacity(image.width() * image.height() * 3);
    match image.raster() {
        Raster::Indexed { pixels, palette, transparent } => {
            for &index in pixels.buf().iter() {
                if *transparent == Some(index) {
                    rgb.extend_from_slice(&[255, 255, 255]);
                } else {
                    let color = palette.get(index).unwrap_or_default();
                    rgb.extend_from_slice(&[color.r, color.g, color.b]);
                }
            }
        },
        Raster::Rgba(pixels) => {
            for pixel in pixels.buf().iter() {
                if pixel.a == 0 {
                    rgb.extend_from_slice(&[255, 255, 255]);
                } else {
                    rgb.extend_from_slice(&[pixel.r, pixel.g, pixel.b]);
                }
            }
        },
    }

    let mut encoder = Encoder::new_file(path, options.quality)?;
    let sampling = options
        .sampling
        .unwrap_or(if options.quality < 90 { 2 } else { 0 });
    encoder.set_sampling_factor(match sampling {
        0 => SamplingFactor::F_1_1,
        1 => SamplingFactor::F_2_1,
        _ => SamplingFactor::F_2_2,
    });
    if options.optimize_huffman {
        encoder.set_optimized_huffman_tables(true);
    }
    encoder.encode(
        &rgb,
        image.width() as u16,
        image.height() as u16,
        ColorType::Rgb,
    )?;
    Ok(())
}
