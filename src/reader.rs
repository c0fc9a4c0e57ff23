//! Wire-format record reader.
//!
//! Splits a raw GIF byte stream into the records [`RecordSource`] promises:
//! header and logical screen descriptor up front, then extension blocks,
//! image descriptors with row-at-a-time pixel data, and the trailer. LZW
//! decompression is delegated to `weezl`; rows come out in decode order
//! (no deinterlacing here).

use crate::error::{CatResult, Error};
use crate::records::{Record, RecordSource, Subframe};
use crate::Palette;
use std::io::Read;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

const BLOCK_IMAGE: u8 = 0x2C;
const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_TRAILER: u8 = 0x3B;

pub struct GifReader<R> {
    input: R,
    width: u16,
    height: u16,
    global_palette: Option<Palette>,
    /// LZW state of the image record being read, if any.
    lzw: Option<LzwDecoder>,
    /// Current image-data sub-block, partially consumed.
    chunk: [u8; 255],
    chunk_len: usize,
    chunk_pos: usize,
    /// The 0-length terminator of the image data has been consumed.
    data_done: bool,
    /// Inside an extension whose sub-blocks have not been drained yet.
    in_extension: bool,
    /// Scratch for the extension sub-block handed out by `next_sub_block`.
    block: Vec<u8>,
    ended: bool,
}

impl<R: Read> GifReader<R> {
    /// Reads the header, logical screen descriptor and global color table.
    pub fn new(mut input: R) -> CatResult<Self> {
        let mut header = [0u8; 6];
        input.read_exact(&mut header)?;
        if &header[..3] != b"GIF" {
            return Err(Error::Format("missing GIF signature"));
        }
        if &header[3..] != b"87a" && &header[3..] != b"89a" {
            return Err(Error::Format("unsupported GIF version"));
        }

        let mut screen = [0u8; 7];
        input.read_exact(&mut screen)?;
        let width = u16::from_le_bytes([screen[0], screen[1]]);
        let height = u16::from_le_bytes([screen[2], screen[3]]);
        let flags = screen[4];
        // screen[5] is the background color index and screen[6] the pixel
        // aspect ratio; neither affects composition.
        let global_palette = if flags & 0x80 != 0 {
            Some(read_color_table(&mut input, flags & 0b111)?)
        } else {
            None
        };

        Ok(Self {
            input,
            width,
            height,
            global_palette,
            lzw: None,
            chunk: [0; 255],
            chunk_len: 0,
            chunk_pos: 0,
            data_done: false,
            in_extension: false,
            block: Vec::with_capacity(256),
            ended: false,
        })
    }

    fn read_u8(&mut self) -> CatResult<u8> {
        let mut byte = [0u8; 1];
        self.input.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Consumes any image data the caller left unread, through the
    /// 0-length terminator.
    fn finish_image(&mut self) -> CatResult<()> {
        if self.lzw.is_none() {
            return Ok(());
        }
        self.lzw = None;
        self.chunk_pos = 0;
        self.chunk_len = 0;
        while !self.data_done {
            let len = self.read_u8()? as usize;
            if len == 0 {
                break;
            }
            self.input.read_exact(&mut self.chunk[..len])?;
        }
        self.data_done = false;
        Ok(())
    }

    fn drain_extension(&mut self) -> CatResult<()> {
        while self.in_extension {
            self.next_sub_block()?;
        }
        Ok(())
    }

    fn read_image_descriptor(&mut self) -> CatResult<Subframe> {
        let mut desc = [0u8; 9];
        self.input.read_exact(&mut desc)?;
        let left = u16::from_le_bytes([desc[0], desc[1]]);
        let top = u16::from_le_bytes([desc[2], desc[3]]);
        let width = u16::from_le_bytes([desc[4], desc[5]]);
        let height = u16::from_le_bytes([desc[6], desc[7]]);
        let flags = desc[8];
        let palette = if flags & 0x80 != 0 {
            Some(read_color_table(&mut self.input, flags & 0b111)?)
        } else {
            None
        };

        let min_code_size = self.read_u8()?;
        if min_code_size >= 12 {
            return Err(Error::Format("invalid LZW minimum code size"));
        }
        self.lzw = Some(LzwDecoder::new(BitOrder::Lsb, min_code_size));
        self.chunk_pos = 0;
        self.chunk_len = 0;
        self.data_done = false;

        Ok(Subframe {
            left,
            top,
            width,
            height,
            interlaced: flags & 0x40 != 0,
            palette,
        })
    }
}

fn read_color_table<R: Read>(input: &mut R, size_bits: u8) -> CatResult<Palette> {
    let entries = 2usize << size_bits;
    let mut raw = Vec::new();
    raw.try_reserve_exact(entries * 3).map_err(|_| Error::OutOfMemory)?;
    raw.resize(entries * 3, 0);
    input.read_exact(&mut raw)?;
    Ok(Palette::from_rgb_bytes(&raw))
}

impl<R: Read> RecordSource for GifReader<R> {
    fn screen_width(&self) -> u16 {
        self.width
    }

    fn screen_height(&self) -> u16 {
        self.height
    }

    fn global_palette(&self) -> Option<&Palette> {
        self.global_palette.as_ref()
    }

    fn next_record(&mut self) -> CatResult<Record> {
        if self.ended {
            return Ok(Record::Done);
        }
        self.drain_extension()?;
        self.finish_image()?;

        match self.read_u8()? {
            BLOCK_IMAGE => Ok(Record::Image(self.read_image_descriptor()?)),
            BLOCK_EXTENSION => {
                let label = self.read_u8()?;
                self.in_extension = true;
                Ok(Record::Extension(label))
            },
            BLOCK_TRAILER => {
                self.ended = true;
                Ok(Record::Done)
            },
            _ => Err(Error::Format("unknown block introducer")),
        }
    }

    fn next_sub_block(&mut self) -> CatResult<Option<&[u8]>> {
        if !self.in_extension {
            return Ok(None);
        }
        let len = self.read_u8()? as usize;
        if len == 0 {
            self.in_extension = false;
            return Ok(None);
        }
        self.block.resize(len, 0);
        self.input.read_exact(&mut self.block)?;
        Ok(Some(&self.block))
    }

    fn read_row(&mut self, row: &mut [u8]) -> CatResult<()> {
        let mut filled = 0;
        while filled < row.len() {
            if self.chunk_pos >= self.chunk_len && !self.data_done {
                let len = self.read_u8()? as usize;
                if len == 0 {
                    self.data_done = true;
                } else {
                    self.input.read_exact(&mut self.chunk[..len])?;
                    self.chunk_len = len;
                    self.chunk_pos = 0;
                }
            }
            let lzw = self.lzw.as_mut().ok_or(Error::Format("no image data to read"))?;
            let result =
                lzw.decode_bytes(&self.chunk[self.chunk_pos..self.chunk_len], &mut row[filled..]);
            self.chunk_pos += result.consumed_in;
            filled += result.consumed_out;
            if result.status.is_err() {
                return Err(Error::Format("corrupt LZW image data"));
            }
            if result.consumed_in == 0 && result.consumed_out == 0 {
                // decoder is stalled: either the stream ended early or the
                // end code came before all rows were delivered
                return Err(Error::Format("image data ended prematurely"));
            }
        }
        Ok(())
    }
}
