//! The frame compositor.
//!
//! A GIF frame is not a standalone picture: it is a patch blitted onto a
//! persistent canvas, after the previous frame's disposal has been applied.
//! [`Screen`] owns that canvas and turns each image record into the full
//! picture a viewer would show, keeping the indexed representation for as
//! long as GIF semantics allow and switching to RGBA only when forced
//! (palette mismatch, transparent hole with no transparent index).

use crate::error::{CatResult, Error};
use crate::records::{Disposal, GraphicsControl, Subframe};
use crate::{Palette, MAX_SCREEN_PIXELS};
use imgref::ImgVec;
use rgb::{RGB8, RGBA8};

const INTERLACE_OFFSETS: [usize; 4] = [0, 4, 2, 1];
const INTERLACE_JUMPS: [usize; 4] = [8, 8, 4, 2];

const TRANSPARENT_RGBA: RGBA8 = RGBA8 { r: 0, g: 0, b: 0, a: 0 };

/// Pixel storage of one composited canvas.
#[derive(Debug, Clone)]
pub enum Raster {
    /// One palette index per pixel.
    Indexed {
        pixels: ImgVec<u8>,
        palette: Palette,
        /// Index whose pixels are transparent holes.
        transparent: Option<u8>,
    },
    /// 8-bit RGBA; alpha is strictly 0 or 255, not premultiplied.
    Rgba(ImgVec<RGBA8>),
}

impl Raster {
    /// Converts an indexed raster to RGBA in place.
    ///
    /// Out-of-range indices become opaque black; the transparent index
    /// becomes alpha 0. Idempotent.
    fn to_truecolor(&mut self) {
        if let Self::Indexed { pixels, palette, transparent } = self {
            let rgba = pixels
                .as_ref()
                .pixels()
                .map(|index| {
                    if *transparent == Some(index) {
                        TRANSPARENT_RGBA
                    } else {
                        let color = palette.get(index).unwrap_or(RGB8::new(0, 0, 0));
                        RGBA8::new(color.r, color.g, color.b, 255)
                    }
                })
                .collect();
            *self = Self::Rgba(ImgVec::new(rgba, pixels.width(), pixels.height()));
        }
    }
}

/// One fully composited animation frame, sized to the logical screen.
#[derive(Debug, Clone)]
pub struct SplitImage {
    raster: Raster,
    delay: u16,
    used_local_palette: bool,
}

impl SplitImage {
    #[must_use]
    pub fn width(&self) -> usize {
        match &self.raster {
            Raster::Indexed { pixels, .. } => pixels.width(),
            Raster::Rgba(pixels) => pixels.width(),
        }
    }

    #[must_use]
    pub fn height(&self) -> usize {
        match &self.raster {
            Raster::Indexed { pixels, .. } => pixels.height(),
            Raster::Rgba(pixels) => pixels.height(),
        }
    }

    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    #[must_use]
    pub fn is_truecolor(&self) -> bool {
        matches!(self.raster, Raster::Rgba(_))
    }

    /// Delay before the next frame, in 1/100 s.
    #[must_use]
    pub fn delay(&self) -> u16 {
        self.delay
    }

    /// Whether this frame's subframe declared its own color table.
    #[must_use]
    pub fn used_local_palette(&self) -> bool {
        self.used_local_palette
    }

    fn try_clone(&self) -> CatResult<Self> {
        let raster = match &self.raster {
            Raster::Indexed { pixels, palette, transparent } => Raster::Indexed {
                pixels: ImgVec::new(
                    try_copied(pixels.buf())?,
                    pixels.width(),
                    pixels.height(),
                ),
                palette: palette.clone(),
                transparent: *transparent,
            },
            Raster::Rgba(pixels) => Raster::Rgba(ImgVec::new(
                try_copied(pixels.buf())?,
                pixels.width(),
                pixels.height(),
            )),
        };
        Ok(Self { raster, delay: self.delay, used_local_palette: self.used_local_palette })
    }
}

#[derive(Debug, Copy, Clone, Default)]
struct Rect {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

/// The persistent compositing state.
pub struct Screen {
    width: usize,
    height: usize,
    canvas: SplitImage,
    /// Snapshot kept iff the frame just emitted asked for `Previous`
    /// disposal.
    previous: Option<SplitImage>,
    prev_rect: Rect,
    prev_full: bool,
    prev_disposal: Disposal,
    /// Scratch for the decoded (and deinterlaced) subframe indices.
    read_buf: Vec<u8>,
}

impl Screen {
    pub fn new(width: u16, height: u16) -> CatResult<Self> {
        let (width, height) = (usize::from(width), usize::from(height));
        if width == 0 || height == 0 {
            return Err(Error::Geometry("zero-sized logical screen"));
        }
        if width * height > MAX_SCREEN_PIXELS {
            return Err(Error::Geometry("logical screen exceeds 10 megapixels"));
        }
        let canvas = SplitImage {
            raster: Raster::Indexed {
                pixels: ImgVec::new(try_filled(width * height, 0u8)?, width, height),
                palette: Palette::default(),
                transparent: None,
            },
            delay: 0,
            used_local_palette: false,
        };
        Ok(Self {
            width,
            height,
            canvas,
            previous: None,
            // The first image normally replaces the canvas wholesale, but if
            // it is partial the uncovered pixels must come out transparent.
            // The transparent index is not known yet, so pretend the whole
            // screen was just disposed to background; blit() then takes the
            // clear-to-transparent path on its own.
            prev_rect: Rect { left: 0, top: 0, width, height },
            prev_full: true,
            prev_disposal: Disposal::Background,
            read_buf: try_filled(width * height, 0u8)?,
        })
    }

    #[must_use]
    pub fn canvas(&self) -> &SplitImage {
        &self.canvas
    }

    /// Applies one image record to the canvas.
    ///
    /// `read_row` must yield the subframe's rows in decode order; it is
    /// called exactly `subframe.height` times with slices of
    /// `subframe.width` bytes (in interlace pass order for interlaced
    /// subframes).
    pub fn blit<F>(
        &mut self,
        control: &GraphicsControl,
        subframe: &Subframe,
        global_palette: Option<&Palette>,
        mut read_row: F,
    ) -> CatResult<()>
    where
        F: FnMut(&mut [u8]) -> CatResult<()>,
    {
        let rect = Rect {
            left: usize::from(subframe.left),
            top: usize::from(subframe.top),
            width: usize::from(subframe.width),
            height: usize::from(subframe.height),
        };
        if rect.width == 0 || rect.height == 0 {
            return Err(Error::Geometry("empty subframe"));
        }
        if rect.left + rect.width > self.width || rect.top + rect.height > self.height {
            return Err(Error::Geometry("subframe outside the screen"));
        }

        let transparent = control.transparent;
        let mut disposal = control.disposal;
        let is_full = rect.left == 0
            && rect.top == 0
            && rect.width == self.width
            && rect.height == self.height;
        // Merging is needed if the image does not cover the whole canvas, or
        // if it has transparent holes.
        let mut needs_merge = !is_full || transparent.is_some();

        match self.prev_disposal {
            Disposal::Previous => {
                // The snapshot becomes the canvas; without one (first frame)
                // this degrades to Keep.
                if let Some(previous) = self.previous.take() {
                    self.canvas = previous;
                }
            },
            Disposal::Background => {
                // Background means clear to transparent, these days.
                if self.prev_full {
                    // The incoming image replaces the entire canvas,
                    // transparency included.
                    needs_merge = false;
                    // A Previous disposal of the incoming frame would
                    // snapshot an all-transparent canvas; Background is
                    // equivalent and avoids a pointless truecolor switch.
                    if disposal == Disposal::Previous {
                        disposal = Disposal::Background;
                    }
                }
                // Only clear if someone will see the result: a merge below,
                // or the snapshot taken for the incoming frame.
                if needs_merge || disposal == Disposal::Previous {
                    self.clear_to_transparent(self.prev_rect);
                }
            },
            Disposal::None | Disposal::Keep => {},
        }

        if disposal == Disposal::Previous {
            // drop any stale snapshot before allocating the new one
            self.previous = None;
            self.previous = Some(self.canvas.try_clone()?);
        }

        // Decode the subframe, reordering interlaced rows into place.
        let buf = &mut self.read_buf[..rect.width * rect.height];
        if subframe.interlaced {
            for (offset, jump) in INTERLACE_OFFSETS.iter().zip(&INTERLACE_JUMPS) {
                let mut y = *offset;
                while y < rect.height {
                    read_row(&mut buf[y * rect.width..(y + 1) * rect.width])?;
                    y += jump;
                }
            }
        } else {
            for row in buf.chunks_exact_mut(rect.width) {
                read_row(row)?;
            }
        }

        let effective = subframe
            .palette
            .as_ref()
            .or(global_palette)
            .ok_or(Error::NoPalette)?;
        self.canvas.used_local_palette = subframe.palette.is_some();

        let area = self.width * self.height;
        let buf = &self.read_buf[..rect.width * rect.height];

        if !needs_merge {
            if is_full {
                // The easy case: replace everything.
                match &mut self.canvas.raster {
                    Raster::Indexed { pixels, palette, transparent: canvas_ti } => {
                        pixels.buf_mut().copy_from_slice(buf);
                        *palette = effective.clone();
                        *canvas_ti = transparent;
                    },
                    Raster::Rgba(_) => {
                        let mut fresh = try_filled(area, 0u8)?;
                        fresh.copy_from_slice(buf);
                        self.canvas.raster = Raster::Indexed {
                            pixels: ImgVec::new(fresh, self.width, self.height),
                            palette: effective.clone(),
                            transparent,
                        };
                    },
                }
            } else if let Some(hole) = transparent {
                // Reset the canvas to transparent and copy the subframe in.
                match &mut self.canvas.raster {
                    Raster::Indexed { pixels, palette, transparent: canvas_ti } => {
                        pixels.buf_mut().fill(hole);
                        copy_rect(pixels.buf_mut(), self.width, rect, buf);
                        *palette = effective.clone();
                        *canvas_ti = Some(hole);
                    },
                    Raster::Rgba(_) => {
                        let mut fresh = try_filled(area, hole)?;
                        copy_rect(&mut fresh, self.width, rect, buf);
                        self.canvas.raster = Raster::Indexed {
                            pixels: ImgVec::new(fresh, self.width, self.height),
                            palette: effective.clone(),
                            transparent: Some(hole),
                        };
                    },
                }
            } else {
                // Transparent padding is needed but there is no transparent
                // index: start from an all-transparent RGBA canvas and merge.
                match &mut self.canvas.raster {
                    Raster::Rgba(pixels) => pixels.buf_mut().fill(TRANSPARENT_RGBA),
                    Raster::Indexed { .. } => {
                        self.canvas.raster = Raster::Rgba(ImgVec::new(
                            try_filled(area, TRANSPARENT_RGBA)?,
                            self.width,
                            self.height,
                        ));
                    },
                }
                needs_merge = true;
            }
        }

        if needs_merge {
            let same_palette = match &self.canvas.raster {
                Raster::Indexed { palette, transparent: canvas_ti, .. } => {
                    palette == effective && *canvas_ti == transparent
                },
                Raster::Rgba(_) => false,
            };
            match &mut self.canvas.raster {
                Raster::Indexed { pixels, .. } if same_palette => {
                    // Same color table, so indices can be merged directly.
                    let rows = pixels.rows_mut().skip(rect.top).take(rect.height);
                    for (dst_row, src_row) in rows.zip(buf.chunks_exact(rect.width)) {
                        let dst_row = &mut dst_row[rect.left..rect.left + rect.width];
                        for (dst, &src) in dst_row.iter_mut().zip(src_row) {
                            if transparent != Some(src) {
                                *dst = src;
                            }
                        }
                    }
                },
                // Color tables differ. They could be merged when compatible,
                // but for now punt to truecolor.
                raster @ Raster::Indexed { .. } => raster.to_truecolor(),
                Raster::Rgba(_) => {},
            }
            if let Raster::Rgba(pixels) = &mut self.canvas.raster {
                let rows = pixels.rows_mut().skip(rect.top).take(rect.height);
                for (dst_row, src_row) in rows.zip(buf.chunks_exact(rect.width)) {
                    let dst_row = &mut dst_row[rect.left..rect.left + rect.width];
                    for (dst, &src) in dst_row.iter_mut().zip(src_row) {
                        if transparent != Some(src) {
                            let color = effective.get(src).unwrap_or(RGB8::new(0, 0, 0));
                            *dst = RGBA8::new(color.r, color.g, color.b, 255);
                        }
                    }
                }
            }
        }

        self.canvas.delay = control.delay;
        self.prev_disposal = disposal;
        self.prev_rect = rect;
        self.prev_full = is_full;
        Ok(())
    }

    /// Clears `rect` to transparent, switching to RGBA first when the
    /// indexed canvas has no transparent index to clear with.
    fn clear_to_transparent(&mut self, rect: Rect) {
        if matches!(self.canvas.raster, Raster::Indexed { transparent: None, .. }) {
            self.canvas.raster.to_truecolor();
        }
        match &mut self.canvas.raster {
            Raster::Indexed { pixels, transparent: Some(hole), .. } => {
                let hole = *hole;
                for row in pixels.rows_mut().skip(rect.top).take(rect.height) {
                    row[rect.left..rect.left + rect.width].fill(hole);
                }
            },
            Raster::Indexed { transparent: None, .. } => unreachable!(),
            Raster::Rgba(pixels) => {
                for row in pixels.rows_mut().skip(rect.top).take(rect.height) {
                    row[rect.left..rect.left + rect.width].fill(TRANSPARENT_RGBA);
                }
            },
        }
    }
}

/// Copies `src` (rows of `rect.width`) into the rectangle `rect` of a
/// row-major buffer with row stride `stride`.
fn copy_rect(dst: &mut [u8], stride: usize, rect: Rect, src: &[u8]) {
    for (y, src_row) in src.chunks_exact(rect.width).enumerate() {
        let offset = (rect.top + y) * stride + rect.left;
        dst[offset..offset + rect.width].copy_from_slice(src_row);
    }
}

fn try_filled<T: Clone>(len: usize, value: T) -> CatResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
    buf.resize(len, value);
    Ok(buf)
}

fn try_copied<T: Copy>(src: &[T]) -> CatResult<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len()).map_err(|_| Error::OutOfMemory)?;
    buf.extend_from_slice(src);
    Ok(buf)
}
