
//! Write the tiles of a tiled image file.
//!
//! Files with increasing or decreasing line order store their tiles
//! in a fixed sequence, but the caller may still supply tiles in any
//! order: tiles that arrive too early wait in memory until all of
//! their predecessors have been written.

use crate::compression::{BlockCompressor, Format, block_compressor};
use crate::convert::{OutputSlice, convert_block_to_xdr, output_slice_table, write_block_from_frame_buffer};
use crate::error::{Error, Result, UnitResult, usize_to_i64};
use crate::frame_buffer::FrameBuffer;
use crate::io::{Data, Read, Tracking, Write};
use crate::meta::{Header, MetaData};
use crate::meta::attribute::{IntegerBounds, LevelMode, LineOrder};
use crate::tiled::{BlockHeader, TileCoordinates};
use crate::tiled::geometry::TileGeometry;
use crate::tiled::offsets::TileOffsets;
use crate::tiled::reader::TiledReader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek};
use std::path::{Path, PathBuf};

/// Writes the tiles of a tiled image file.
///
/// Creating the writer stores the header and a zeroed tile index.
/// Every tile of every level must then be written exactly once.
/// Closing the writer overwrites the zeroed index with the real
/// tile positions; a file whose writer was never closed is
/// incomplete, but can still be partially read thanks to tile
/// index reconstruction.
pub struct TiledWriter<W: Write + Seek> {
    stream: Tracking<W>,
    header: Header,
    geometry: TileGeometry,
    offsets: TileOffsets,
    tile_offsets_position: usize,
    compressor: Option<Box<dyn BlockCompressor>>,
    format: Format,
    frame_buffer: FrameBuffer,
    slices: Vec<OutputSlice>,
    tile_buffer: Vec<u8>,
    pending: BTreeMap<TileCoordinates, Vec<u8>>,
    next_tile: Option<TileCoordinates>,
    finished: bool,
    file_name: Option<PathBuf>,
}

impl TiledWriter<BufWriter<File>> {

    /// Create a tiled image file at the specified path.
    /// The header must be tiled and is validated before
    /// anything is written.
    pub fn create(path: impl AsRef<Path>, header: Header) -> Result<Self> {
        let path = path.as_ref();

        let attach_name = |error: Error| error.while_processing_file(path);
        let file = File::create(path).map_err(|error| attach_name(error.into()))?;

        let mut writer = Self::write_to_buffered(BufWriter::new(file), header).map_err(attach_name)?;
        writer.file_name = Some(path.to_path_buf());
        Ok(writer)
    }
}

impl<W: Write + Seek> TiledWriter<W> {

    /// Validate the header and write it to the stream, followed by
    /// the zeroed tile index that reserves space for the real one.
    /// The stream should be buffered.
    pub fn write_to_buffered(write: W, header: Header) -> Result<Self> {
        let mut stream = Tracking::new(write);
        MetaData::write_to_buffered(&mut stream, &header, true)?;

        let tiles = header.tile_description()?;
        let geometry = TileGeometry::new(tiles, header.data_window);

        // reserve space for the tile index at a known position
        let offsets = TileOffsets::new(&geometry);
        let tile_offsets_position = offsets.write_to(&mut stream)?;

        // the first tile that can go to the file without buffering
        let next_tile = match header.line_order {
            LineOrder::Increasing =>
                Some(TileCoordinates::new((0, 0), (0, 0))),

            LineOrder::Decreasing =>
                Some(TileCoordinates::new((0, geometry.num_y_tiles(0)? - 1), (0, 0))),

            LineOrder::Random => None,
        };

        let max_bytes_per_tile_line = header.channels.bytes_per_pixel * tiles.tile_size.width();

        let compressor = block_compressor(
            header.compression, max_bytes_per_tile_line, tiles.tile_size.height()
        );

        let format = compressor.as_ref().map_or(Format::Xdr, |compressor| compressor.format());

        Ok(TiledWriter {
            stream, header, geometry, offsets, tile_offsets_position,
            compressor, format,
            frame_buffer: FrameBuffer::new(),
            slices: Vec::new(),
            tile_buffer: Vec::with_capacity(max_bytes_per_tile_line * tiles.tile_size.height()),
            pending: BTreeMap::new(),
            next_tile,
            finished: false,
            file_name: None,
        })
    }

    fn attach_file_name(&self, error: Error) -> Error {
        match &self.file_name {
            Some(path) => error.while_processing_file(path),
            None => error,
        }
    }

    /// The header of the file.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The level sizes and tile counts of the file.
    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    /// Width of each tile in pixels.
    pub fn tile_x_size(&self) -> usize { self.geometry.tiles.tile_size.width() }

    /// Height of each tile in pixels.
    pub fn tile_y_size(&self) -> usize { self.geometry.tiles.tile_size.height() }

    /// The level mode of the file.
    pub fn level_mode(&self) -> LevelMode { self.geometry.level_mode() }

    /// Declare where the pixels of subsequently written tiles come from.
    ///
    /// Every channel of the file takes its pixels from the slice of
    /// the same name, which must have exactly the sample type of the
    /// channel; the writer does not convert. Channels without a slice
    /// are written as all zeroes.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        let slices = frame_buffer.validate_no_subsampling()
            .and_then(|_| output_slice_table(&self.header.channels, &frame_buffer));

        match slices {
            Ok(slices) => {
                self.frame_buffer = frame_buffer;
                self.slices = slices;
                Ok(())
            }

            Err(error) => Err(self.attach_file_name(error)),
        }
    }

    /// The current frame buffer.
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame_buffer
    }

    /// Mutable access to the current frame buffer,
    /// for example to update the pixels between tiles.
    pub fn frame_buffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.frame_buffer
    }

    /// Encode one tile of the specified level from the frame buffer
    /// and store it in the file. Every tile must be written exactly
    /// once. Unless the line order is random, tiles that arrive out
    /// of order wait in memory until their predecessors are written.
    pub fn write_tile(
        &mut self,
        tile_x: usize, tile_y: usize,
        level_x: usize, level_y: usize,
    ) -> UnitResult {
        self.write_tile_from_frame_buffer(TileCoordinates::new((tile_x, tile_y), (level_x, level_y)))
            .map_err(|error| self.attach_file_name(error))
    }

    /// Write one tile of a level with equal x and y index,
    /// which is every level of images without rip maps.
    pub fn write_tile_level(&mut self, tile_x: usize, tile_y: usize, level: usize) -> UnitResult {
        self.write_tile(tile_x, tile_y, level, level)
    }

    fn write_tile_from_frame_buffer(&mut self, tile: TileCoordinates) -> UnitResult {
        if self.slices.is_empty() {
            return Err(Error::logic("no frame buffer specified as pixel data source"));
        }

        let tile_window = self.geometry.data_window_for_tile(
            tile.tile_index.x(), tile.tile_index.y(),
            tile.level_index.x(), tile.level_index.y(),
        )?;

        let already_written = self.offsets.get(
            tile.tile_index.x(), tile.tile_index.y(),
            tile.level_index.x(), tile.level_index.y(),
        )? != 0;

        if already_written || self.pending.contains_key(&tile) {
            return Err(Error::logic("each tile must be written exactly once"));
        }

        // encode the pixels in the byte layout the compressor wants
        let mut buffer = std::mem::take(&mut self.tile_buffer);
        buffer.clear();

        let encoded = write_block_from_frame_buffer(
            &mut buffer, self.format, tile_window, &self.slices, &self.frame_buffer
        );

        let result = match encoded {
            Ok(()) => self.compress_and_store(tile, &mut buffer, tile_window),
            Err(error) => Err(error),
        };

        self.tile_buffer = buffer;
        result
    }

    fn compress_and_store(
        &mut self,
        tile: TileCoordinates,
        buffer: &mut Vec<u8>,
        tile_window: IntegerBounds,
    ) -> UnitResult {
        let compressed = match &mut self.compressor {
            None => None,

            Some(compressor) => {
                let compressed = compressor.compress(buffer, tile_window)?;

                if compressed.len() < buffer.len() {
                    Some(compressed)
                }
                else {
                    // the pixels did not shrink, so the uncompressed bytes
                    // are stored. stored uncompressed bytes must be in the
                    // wire representation, which the buffer is not yet if
                    // the compressor asked for native byte order
                    if self.format == Format::Native {
                        convert_block_to_xdr(buffer, tile_window.size.area(), &self.header.channels)?;
                    }

                    None
                }
            }
        };

        match &compressed {
            Some(compressed) => self.buffered_tile_write(tile, compressed),
            None => self.buffered_tile_write(tile, buffer),
        }
    }

    /// Store a tile block in the file, or keep it in memory until all
    /// tiles before it have been written.
    ///
    /// With random line order, every block goes to the file directly.
    /// Otherwise, a block is written immediately exactly if it is the
    /// next one in line; afterwards, all buffered successors that are
    /// now in line follow it.
    fn buffered_tile_write(&mut self, tile: TileCoordinates, data: &[u8]) -> UnitResult {
        if self.header.line_order == LineOrder::Random {
            return self.write_tile_data(tile, data);
        }

        if self.next_tile == Some(tile) {
            self.write_tile_data(tile, data)?;
            self.next_tile = self.next_tile_coordinates(tile);

            // drain every buffered tile that continues the sequence
            while let Some(next) = self.next_tile {
                match self.pending.remove(&next) {
                    None => break,

                    Some(buffered) => {
                        self.write_tile_data(next, &buffered)?;
                        self.next_tile = self.next_tile_coordinates(next);
                    }
                }
            }

            Ok(())
        }
        else {
            self.pending.insert(tile, data.to_vec());
            Ok(())
        }
    }

    /// The tile that the file stores directly after the specified one,
    /// or nothing after the last tile of the image.
    fn next_tile_coordinates(&self, current: TileCoordinates) -> Option<TileCoordinates> {
        let mut tile_x = current.tile_index.x();
        let mut tile_y = current.tile_index.y();
        let mut level_x = current.level_index.x();
        let mut level_y = current.level_index.y();

        match self.header.line_order {
            LineOrder::Increasing => {
                tile_x += 1;

                if tile_x >= self.geometry.num_x_tiles(level_x).ok()? {
                    tile_x = 0;
                    tile_y += 1;

                    if tile_y >= self.geometry.num_y_tiles(level_y).ok()? {
                        tile_y = 0;

                        let (next_x, next_y) = self.next_level(level_x, level_y)?;
                        level_x = next_x;
                        level_y = next_y;
                    }
                }
            }

            LineOrder::Decreasing => {
                tile_x += 1;

                if tile_x >= self.geometry.num_x_tiles(level_x).ok()? {
                    tile_x = 0;

                    if tile_y == 0 {
                        let (next_x, next_y) = self.next_level(level_x, level_y)?;
                        level_x = next_x;
                        level_y = next_y;
                        tile_y = self.geometry.num_y_tiles(level_y).ok()? - 1;
                    }
                    else {
                        tile_y -= 1;
                    }
                }
            }

            LineOrder::Random => return None,
        }

        Some(TileCoordinates::new((tile_x, tile_y), (level_x, level_y)))
    }

    fn next_level(&self, level_x: usize, level_y: usize) -> Option<(usize, usize)> {
        match self.geometry.level_mode() {
            // levels of these images always have equal x and y indices
            LevelMode::Singular | LevelMode::MipMap => {
                if level_x + 1 < self.geometry.num_x_levels() {
                    Some((level_x + 1, level_y + 1))
                }
                else { None }
            }

            LevelMode::RipMap => {
                if level_x + 1 < self.geometry.num_x_levels() {
                    Some((level_x + 1, level_y))
                }
                else if level_y + 1 < self.geometry.num_y_levels() {
                    Some((0, level_y + 1))
                }
                else { None }
            }
        }
    }

    /// Append one tile block at the current end of the file
    /// and record its position in the tile index.
    fn write_tile_data(&mut self, tile: TileCoordinates, data: &[u8]) -> UnitResult {
        let position = self.stream.byte_position();
        debug_assert!(position > 0, "tile would overwrite the file header");

        self.offsets.set(
            tile.tile_index.x(), tile.tile_index.y(),
            tile.level_index.x(), tile.level_index.y(),
            usize_to_i64(position, "file position")?,
        )?;

        BlockHeader::for_tile(tile, data.len())?.write(&mut self.stream)?;
        u8::write_slice(&mut self.stream, data)?;
        Ok(())
    }

    /// Copy all tiles from the source file into this file without
    /// decompressing them.
    ///
    /// Both files must store the same channels with the same tile
    /// description, data window, line order and compression, and
    /// this file must not contain any tiles yet.
    pub fn copy_pixels<R: Read + Seek>(&mut self, source: &mut TiledReader<R>) -> UnitResult {
        self.copy_all_raw_tiles(source)
            .map_err(|error| self.attach_file_name(error))
    }

    fn copy_all_raw_tiles<R: Read + Seek>(&mut self, source: &mut TiledReader<R>) -> UnitResult {
        let source_header = source.header();

        if self.header.tiles != source_header.tiles {
            return Err(Error::argument("the files have different tile descriptions"));
        }

        if self.header.data_window != source_header.data_window {
            return Err(Error::argument("the files have different data windows"));
        }

        if self.header.line_order != source_header.line_order {
            return Err(Error::argument("the files have different line orders"));
        }

        if self.header.compression != source_header.compression {
            return Err(Error::argument("the files use different compression methods"));
        }

        if self.header.channels != source_header.channels {
            return Err(Error::argument("the files have different channel lists"));
        }

        if !self.offsets.is_empty() || !self.pending.is_empty() {
            return Err(Error::logic("this file already contains pixel data"));
        }

        for _ in 0 .. self.geometry.total_tile_count() {
            let (tile, data) = source.raw_tile_data()?;
            self.write_tile_data(tile, data)?;
        }

        Ok(())
    }

    /// Overwrite the zeroed tile index with the recorded tile
    /// positions and flush the stream. Consumes the writer;
    /// a writer that is dropped without being closed rewrites
    /// the index as well, but has to swallow any errors.
    pub fn close(mut self) -> UnitResult {
        self.finished = true;

        let result = self.rewrite_tile_offsets();
        result.map_err(|error| self.attach_file_name(error))
    }

    fn rewrite_tile_offsets(&mut self) -> UnitResult {
        self.stream.seek_write_to(self.tile_offsets_position)?;
        self.offsets.write_to(&mut self.stream)?;
        self.stream.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for TiledWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            // a destructor cannot surface errors
            let _ = self.rewrite_tile_offsets();
        }
    }
}

impl<W: Write + Seek> std::fmt::Debug for TiledWriter<W> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("TiledWriter")
            .field("file_name", &self.file_name)
            .field("header", &self.header)
            .field("next_tile", &self.next_tile)
            .finish()
    }
}
