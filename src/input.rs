
//! Read any image file without knowing in advance
//! whether it stores tiles or scan line blocks.

use crate::error::{Error, Result, UnitResult};
use crate::frame_buffer::FrameBuffer;
use crate::io::{Read, Tracking};
use crate::meta::{Header, MetaData};
use crate::scanline::ScanlineReader;
use crate::tiled::TileCoordinates;
use crate::tiled::reader::TiledReader;
use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::{Path, PathBuf};

/// Reads pixels from an image file of either flavour.
///
/// The version word of the file decides whether a tiled reader or a
/// scan line reader processes the stream. Pixels are always served
/// as horizontal strips of scan lines; for tiled files, the strips
/// are assembled from the tiles of the full resolution level.
#[derive(Debug)]
pub struct Input<R> {
    reader: Flavor<R>,
}

#[derive(Debug)]
enum Flavor<R> {
    Tiled(TiledReader<R>),
    ScanLines(ScanlineReader<R>),
}

impl Input<BufReader<File>> {

    /// Open the image file at the specified path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let attach_name = |error: Error| error.while_processing_file(path);
        let file = File::open(path).map_err(|error| attach_name(error.into()))?;

        Self::read_tracked(BufReader::new(file), Some(path.to_path_buf())).map_err(attach_name)
    }
}

impl<R: Read + Seek> Input<R> {

    /// Read the meta data from the stream and prepare to read pixels.
    /// The stream must be buffered and must start at the magic number.
    pub fn read_from_buffered(read: R) -> Result<Self> {
        Self::read_tracked(read, None)
    }

    fn read_tracked(read: R, file_name: Option<PathBuf>) -> Result<Self> {
        let mut stream = Tracking::new(read);
        let meta = MetaData::read_from_buffered(&mut stream)?;

        let reader = if meta.requirements.is_tiled {
            Flavor::Tiled(TiledReader::new(stream, meta.requirements, meta.header, file_name)?)
        }
        else {
            Flavor::ScanLines(ScanlineReader::new(stream, meta.requirements, meta.header, file_name)?)
        };

        Ok(Input { reader })
    }

    /// Whether the file stores tiles instead of scan line blocks.
    pub fn is_tiled(&self) -> bool {
        matches!(self.reader, Flavor::Tiled(_))
    }

    /// The header of the file.
    pub fn header(&self) -> &Header {
        match &self.reader {
            Flavor::Tiled(reader) => reader.header(),
            Flavor::ScanLines(reader) => reader.header(),
        }
    }

    /// Declare where the pixels of subsequently read scan lines
    /// are stored. Matching behaves identically for both flavours.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        match &mut self.reader {
            Flavor::Tiled(reader) => reader.set_frame_buffer(frame_buffer),
            Flavor::ScanLines(reader) => reader.set_frame_buffer(frame_buffer),
        }
    }

    /// The current frame buffer.
    pub fn frame_buffer(&self) -> &FrameBuffer {
        match &self.reader {
            Flavor::Tiled(reader) => reader.frame_buffer(),
            Flavor::ScanLines(reader) => reader.frame_buffer(),
        }
    }

    /// Remove and return the current frame buffer,
    /// for example to inspect the pixels that were read into it.
    pub fn take_frame_buffer(&mut self) -> FrameBuffer {
        match &mut self.reader {
            Flavor::Tiled(reader) => reader.take_frame_buffer(),
            Flavor::ScanLines(reader) => reader.take_frame_buffer(),
        }
    }

    /// Read all scan lines from `min(y1, y2)` to `max(y1, y2)`,
    /// inclusively, into the frame buffer.
    pub fn read_pixels(&mut self, scan_line_1: i32, scan_line_2: i32) -> UnitResult {
        match &mut self.reader {
            Flavor::Tiled(reader) => reader.read_pixels(scan_line_1, scan_line_2),
            Flavor::ScanLines(reader) => reader.read_pixels(scan_line_1, scan_line_2),
        }
    }

    /// Read a single scan line into the frame buffer.
    pub fn read_pixel_line(&mut self, scan_line: i32) -> UnitResult {
        self.read_pixels(scan_line, scan_line)
    }

    /// Read the next tile block without decompressing it.
    /// Only valid for tiled files.
    pub fn raw_tile_data(&mut self) -> Result<(TileCoordinates, &[u8])> {
        match &mut self.reader {
            Flavor::Tiled(reader) => reader.raw_tile_data(),

            Flavor::ScanLines(_) =>
                Err(Error::argument("tried to read a raw tile from a scan line image")),
        }
    }

    /// Read the compressed block containing the specified scan line
    /// without decompressing it. Only valid for scan line files.
    pub fn raw_pixel_data(&mut self, scan_line: i32) -> Result<(i32, &[u8])> {
        match &mut self.reader {
            Flavor::ScanLines(reader) => reader.raw_pixel_data(scan_line),

            Flavor::Tiled(_) =>
                Err(Error::argument("tried to read raw scan lines from a tiled image")),
        }
    }

    /// The tiled reader processing the file, for tile-level access.
    /// Only valid for tiled files.
    pub fn tiles(&mut self) -> Result<&mut TiledReader<R>> {
        match &mut self.reader {
            Flavor::Tiled(reader) => Ok(reader),
            Flavor::ScanLines(_) => Err(Error::argument("the file is not tiled")),
        }
    }
}
