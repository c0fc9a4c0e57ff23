/*
 gifsplit — splits animated GIFs into correctly composited still frames

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.
*/

#[macro_use]
extern crate quick_error;

use rgb::RGB8;

mod error;
pub use crate::error::*;
mod records;
pub use crate::records::{Disposal, GraphicsControl, Record, RecordSource, Subframe};
use crate::records::RecordPump;
mod reader;
pub use crate::reader::GifReader;
mod screen;
pub use crate::screen::{Raster, Screen, SplitImage};

/// Sanity/safety limit: no screens larger than 10 megapixels.
pub const MAX_SCREEN_PIXELS: usize = 10_000_000;

/// Number of repetitions requested by the GIF.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Repeat {
    Finite(u16),
    Infinite,
}

/// Global facts accumulated while walking the file.
///
/// Most informative after the last frame has been read.
#[derive(Debug, Clone)]
pub struct Info {
    /// Number of times the animation should play. 0 means loop forever.
    pub loop_count: u16,
    /// Latched on the first decode or compositing failure.
    pub has_errors: bool,
}

impl Default for Info {
    fn default() -> Self {
        Self { loop_count: 1, has_errors: false }
    }
}

impl Info {
    #[must_use]
    pub fn repeat(&self) -> Repeat {
        match self.loop_count {
            0 => Repeat::Infinite,
            n => Repeat::Finite(n),
        }
    }
}

/// An ordered list of opaque RGB colors from a GIF color table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Palette {
    colors: Vec<RGB8>,
}

impl Palette {
    #[must_use]
    pub fn new(colors: Vec<RGB8>) -> Self {
        Self { colors }
    }

    /// Packed `R,G,B,R,G,B,…` bytes as stored in the file.
    #[must_use]
    pub fn from_rgb_bytes(raw: &[u8]) -> Self {
        Self {
            colors: raw.chunks_exact(3).map(|c| RGB8::new(c[0], c[1], c[2])).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// `None` for indices past the end of the table.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<RGB8> {
        self.colors.get(usize::from(index)).copied()
    }

    #[must_use]
    pub fn colors(&self) -> &[RGB8] {
        &self.colors
    }

    /// Smallest k with 2^k entries covering the table, clamped to 1..=8.
    #[must_use]
    pub fn bit_depth(&self) -> u8 {
        let mut k = 1u8;
        while k < 8 && (1usize << k) < self.colors.len() {
            k += 1;
        }
        k
    }
}

/// Pull-driven GIF splitting engine.
///
/// Every call to [`next_frame`](Self::next_frame) consumes records up to and
/// including the next image descriptor and returns the full composited canvas
/// for that frame. The returned view borrows the engine's internal buffer and
/// is invalidated by the next call; copy it if you need to keep it.
pub struct Splitter<S> {
    pump: RecordPump<S>,
    screen: Screen,
    global_palette: Option<Palette>,
    info: Info,
    error: Option<Error>,
    ended: bool,
}

impl<S: RecordSource> Splitter<S> {
    /// Validates the logical screen geometry and allocates the canvas.
    pub fn new(source: S) -> CatResult<Self> {
        let screen = Screen::new(source.screen_width(), source.screen_height())?;
        let global_palette = source.global_palette().cloned();
        Ok(Self {
            pump: RecordPump::new(source),
            screen,
            global_palette,
            info: Info::default(),
            error: None,
            ended: false,
        })
    }

    /// Composites and returns the next frame, or `None` at end of stream.
    ///
    /// On any failure this latches [`Info::has_errors`] and returns `None`
    /// from here on; inspect [`last_error`](Self::last_error) for the cause.
    pub fn next_frame(&mut self) -> Option<&SplitImage> {
        if self.ended || self.info.has_errors {
            return None;
        }
        match self.advance() {
            Ok(true) => Some(self.screen.canvas()),
            Ok(false) => {
                self.ended = true;
                None
            },
            Err(e) => {
                self.info.has_errors = true;
                self.error = Some(e);
                None
            },
        }
    }

    fn advance(&mut self) -> CatResult<bool> {
        let Some((control, subframe)) = self.pump.pull_until_image(&mut self.info)? else {
            return Ok(false);
        };
        let pump = &mut self.pump;
        self.screen.blit(&control, &subframe, self.global_palette.as_ref(), |row| {
            pump.read_row(row)
        })?;
        Ok(true)
    }

    #[must_use]
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// The failure that latched `has_errors`, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}
