//! Record-level view of a GIF stream and the pump that walks it.
//!
//! The pump classifies records, folds graphics-control and NETSCAPE2.0
//! extensions into per-frame metadata, and stops on each image descriptor.
//! Everything below the record level (block framing, LZW) lives behind
//! [`RecordSource`].

use crate::error::CatResult;
use crate::{Info, Palette};

pub const GRAPHICS_CONTROL_LABEL: u8 = 0xF9;
pub const APPLICATION_LABEL: u8 = 0xFF;

/// What the viewer does to the previous frame's pixels before drawing the
/// next frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disposal {
    /// No disposal specified.
    None,
    /// Leave the canvas as is.
    Keep,
    /// Clear the frame's rectangle to transparent.
    Background,
    /// Restore the canvas to its state before the frame was drawn.
    Previous,
}

impl Disposal {
    /// Bits 2..5 of the graphics-control flag byte. Unrecognized values
    /// behave like `Keep`.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::None,
            1 => Self::Keep,
            2 => Self::Background,
            3 => Self::Previous,
            _ => Self::Keep,
        }
    }
}

/// Folded graphics-control state applied to the next image record.
#[derive(Debug, Clone)]
pub struct GraphicsControl {
    pub disposal: Disposal,
    /// Delay before the next frame, in 1/100 s.
    pub delay: u16,
    /// Palette index treated as a transparent hole, if any.
    pub transparent: Option<u8>,
}

/// One image descriptor: a rectangular patch of the logical screen.
#[derive(Debug, Clone)]
pub struct Subframe {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub interlaced: bool,
    /// Local color table; `None` means the global one applies.
    pub palette: Option<Palette>,
}

#[derive(Debug)]
pub enum Record {
    /// An extension block; pull its payload via
    /// [`RecordSource::next_sub_block`].
    Extension(u8),
    Image(Subframe),
    /// The trailer was reached.
    Done,
}

/// Pull-style access to the records of one GIF stream.
///
/// Modeled on giflib's `DGifGetRecordType`/`DGifGetExtension`/`DGifGetLine`
/// troika: after an `Extension` record, `next_sub_block` walks its data
/// sub-blocks; after an `Image` record, `read_row` yields exactly
/// `height` rows of `width` palette indices in decode order (interlaced
/// files arrive in pass order — reordering is the compositor's job).
pub trait RecordSource {
    fn screen_width(&self) -> u16;
    fn screen_height(&self) -> u16;
    fn global_palette(&self) -> Option<&Palette>;
    fn next_record(&mut self) -> CatResult<Record>;
    /// Next data sub-block of the current extension, `None` once drained.
    fn next_sub_block(&mut self) -> CatResult<Option<&[u8]>>;
    /// Fills `row` with the next `row.len()` pixel indices of the current
    /// image.
    fn read_row(&mut self, row: &mut [u8]) -> CatResult<()>;
}

/// Walks records until the next image descriptor, folding extensions.
pub struct RecordPump<S> {
    source: S,
    /// Delay is sticky: a frame without its own graphics-control extension
    /// inherits the last one seen.
    delay: u16,
}

impl<S: RecordSource> RecordPump<S> {
    pub fn new(source: S) -> Self {
        Self { source, delay: 0 }
    }

    /// Consumes records up to the next image descriptor.
    ///
    /// Returns `None` at the trailer. Loop-count updates land directly in
    /// `info`.
    pub fn pull_until_image(
        &mut self,
        info: &mut Info,
    ) -> CatResult<Option<(GraphicsControl, Subframe)>> {
        let mut control = GraphicsControl {
            disposal: Disposal::None,
            delay: self.delay,
            transparent: None,
        };
        loop {
            match self.source.next_record()? {
                Record::Done => return Ok(None),
                Record::Image(subframe) => return Ok(Some((control, subframe))),
                Record::Extension(GRAPHICS_CONTROL_LABEL) => {
                    if let Some(block) = self.source.next_sub_block()? {
                        if block.len() == 4 {
                            let flags = block[0];
                            control.disposal = Disposal::from_bits((flags >> 2) & 0b111);
                            control.delay = u16::from_le_bytes([block[1], block[2]]);
                            control.transparent =
                                if flags & 1 != 0 { Some(block[3]) } else { None };
                        }
                    }
                    self.delay = control.delay;
                    self.drain_sub_blocks()?;
                },
                Record::Extension(APPLICATION_LABEL) => {
                    let is_netscape = self
                        .source
                        .next_sub_block()?
                        .map_or(false, |block| block == b"NETSCAPE2.0");
                    if is_netscape {
                        if let Some(block) = self.source.next_sub_block()? {
                            if block.len() == 3 && block[0] == 1 {
                                info.loop_count = u16::from_le_bytes([block[1], block[2]]);
                            }
                        }
                    }
                    self.drain_sub_blocks()?;
                },
                Record::Extension(_) => self.drain_sub_blocks()?,
            }
        }
    }

    pub fn read_row(&mut self, row: &mut [u8]) -> CatResult<()> {
        self.source.read_row(row)
    }

    fn drain_sub_blocks(&mut self) -> CatResult<()> {
        while self.source.next_sub_block()?.is_some() {}
        Ok(())
    }
}
