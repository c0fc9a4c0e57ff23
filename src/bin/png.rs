//! PNG output. Indexed canvases stay palettized (with a tRNS entry when the
//! frame has a transparent index), truecolor canvases are written as RGBA.

use crate::BinResult;
use gifsplit::{Raster, SplitImage};
use rgb::ComponentBytes;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub fn write(image: &SplitImage, path: &Path) -> BinResult<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, image.width() as u32, image.height() as u32);
    encoder.set_depth(png::BitDepth::Eight);

    match image.raster() {
        Raster::Indexed { pixels, palette, transparent } => {
            encoder.set_color(png::ColorType::Indexed);
            encoder.set_palette(palette.colors().as_bytes().to_vec());
            if let Some(hole) = *transparent {
                // opaque up to the transparent entry, which gets alpha 0
                let mut trns = vec![255u8; usize::from(hole) + 1];
                trns[usize::from(hole)] = 0;
                encoder.set_trns(trns);
            }
            let mut writer = encoder.write_header()?;
            writer.write_image_data(pixels.buf())?;
            writer.finish()?;
        },
        Raster::Rgba(pixels) => {
            encoder.set_color(png::ColorType::Rgba);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(pixels.buf().as_bytes())?;
            writer.finish()?;
        },
    }
    Ok(())
}
