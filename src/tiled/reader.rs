
//! Read tiles from a tiled image file in any order.

use crate::compression::{BlockCompressor, Format, block_compressor};
use crate::convert::{InputSlice, input_slice_table, read_block_into_frame_buffer};
use crate::error::{Error, Result, UnitResult};
use crate::frame_buffer::{FrameBuffer, Slice};
use crate::io::{Data, Read, Tracking};
use crate::meta::{Header, MetaData, Requirements};
use crate::meta::attribute::{LevelMode, LineOrder};
use crate::tiled::{BlockHeader, TileCoordinates};
use crate::tiled::geometry::TileGeometry;
use crate::tiled::offsets::TileOffsets;
use std::fs::File;
use std::io::{BufReader, Seek};
use std::path::{Path, PathBuf};

/// Reads the tiles of a tiled image file into a frame buffer.
///
/// Tiles can be requested in any order; the reader seeks to the
/// requested tile using the tile index of the file. Strictly
/// sequential requests do not seek at all.
pub struct TiledReader<R> {
    stream: Tracking<R>,
    header: Header,
    geometry: TileGeometry,
    offsets: TileOffsets,
    complete_offsets: bool,
    compressor: Option<Box<dyn BlockCompressor>>,
    frame_buffer: FrameBuffer,
    slices: Vec<InputSlice>,
    tile_buffer: Vec<u8>,
    current_position: usize,
    file_name: Option<PathBuf>,
}

impl TiledReader<BufReader<File>> {

    /// Open the tiled image file at the specified path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let attach_name = |error: Error| error.while_processing_file(path);
        let file = File::open(path).map_err(|error| attach_name(error.into()))?;

        let mut reader = Self::read_from_buffered(BufReader::new(file)).map_err(attach_name)?;
        reader.file_name = Some(path.to_path_buf());
        Ok(reader)
    }
}

impl<R: Read + Seek> TiledReader<R> {

    /// Read the meta data from the stream and prepare to read tiles.
    /// The stream must be buffered and must start at the magic number.
    pub fn read_from_buffered(read: R) -> Result<Self> {
        let mut stream = Tracking::new(read);
        let meta = MetaData::read_from_buffered(&mut stream)?;
        Self::new(stream, meta.requirements, meta.header, None)
    }

    /// Prepare to read tiles from a stream whose meta data
    /// was already read, for example by the unified input.
    pub(crate) fn new(
        mut stream: Tracking<R>,
        requirements: Requirements,
        header: Header,
        file_name: Option<PathBuf>,
    ) -> Result<Self> {
        if !requirements.is_tiled {
            return Err(Error::argument("the file is not tiled"));
        }

        header.sanity_check(true)?;

        let tiles = header.tile_description()?;
        let geometry = TileGeometry::new(tiles, header.data_window);

        let max_bytes_per_tile_line = header.channels.bytes_per_pixel * tiles.tile_size.width();
        let tile_buffer_size = max_bytes_per_tile_line * tiles.tile_size.height();

        let compressor = block_compressor(
            header.compression, max_bytes_per_tile_line, tiles.tile_size.height()
        );

        let mut offsets = TileOffsets::new(&geometry);
        offsets.read_from(&mut stream)?;
        let complete_offsets = offsets.is_complete();

        let current_position = stream.byte_position();

        Ok(TiledReader {
            stream, header, geometry, offsets, complete_offsets,
            compressor,
            frame_buffer: FrameBuffer::new(),
            slices: Vec::new(),
            tile_buffer: vec![0_u8; tile_buffer_size],
            current_position, file_name,
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

    /// Whether every tile of the file is present. False if the file
    /// was truncated and the tile index could only partially be
    /// reconstructed.
    pub fn all_tiles_are_present(&self) -> bool {
        self.complete_offsets
    }

    /// Declare where the pixels of subsequently read tiles are stored.
    ///
    /// The slices are matched to the channels of the file by name.
    /// A slice whose channel is missing from the file is filled with
    /// its fill value, channels without a slice are skipped, and
    /// matched pairs convert from the stored sample type to the
    /// sample type of the slice.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        let slices = frame_buffer.validate_no_subsampling()
            .and_then(|_| input_slice_table(&self.header.channels, &frame_buffer));

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

    /// Remove and return the current frame buffer,
    /// for example to inspect the pixels that were read into it.
    pub fn take_frame_buffer(&mut self) -> FrameBuffer {
        self.slices.clear();
        std::mem::take(&mut self.frame_buffer)
    }

    /// Read one tile of the specified level into the frame buffer.
    ///
    /// The tile is located using the tile index of the file.
    /// Requesting the tiles in the order in which they appear
    /// in the file avoids seeking entirely.
    pub fn read_tile(
        &mut self,
        tile_x: usize, tile_y: usize,
        level_x: usize, level_y: usize,
    ) -> UnitResult {
        self.read_tile_to_frame_buffer(TileCoordinates::new((tile_x, tile_y), (level_x, level_y)))
            .map_err(|error| self.attach_file_name(error))
    }

    /// Read one tile of a level with equal x and y index,
    /// which is every level of images without rip maps.
    pub fn read_tile_level(&mut self, tile_x: usize, tile_y: usize, level: usize) -> UnitResult {
        self.read_tile(tile_x, tile_y, level, level)
    }

    fn read_tile_to_frame_buffer(&mut self, tile: TileCoordinates) -> UnitResult {
        if self.slices.is_empty() {
            return Err(Error::logic("no frame buffer specified as pixel data source"));
        }

        let tile_window = self.geometry.data_window_for_tile(
            tile.tile_index.x(), tile.tile_index.y(),
            tile.level_index.x(), tile.level_index.y(),
        )?;

        let (data_size, tile_offset) = self.read_tile_block(tile)?;

        let uncompressed_size = self.header.channels.bytes_per_pixel * tile_window.size.area();

        // decompress, unless the stored block is not smaller than its
        // pixels, which means the uncompressed bytes were stored.
        // stored uncompressed bytes are always in the wire representation,
        // even where the compressor would have produced native byte order
        let decompressed;
        let (data, format): (&[u8], Format) = match &mut self.compressor {
            Some(compressor) if data_size < uncompressed_size => {
                decompressed = compressor.decompress(
                    &self.tile_buffer[.. data_size], tile_window, uncompressed_size
                )?;

                (decompressed.as_slice(), compressor.format())
            }

            _ => (&self.tile_buffer[.. data_size], Format::Xdr),
        };

        if data.len() != uncompressed_size {
            return Err(Error::corrupt("tile data does not contain the pixels of its tile"));
        }

        read_block_into_frame_buffer(
            data, format, tile_window,
            tile_window.position.y(), tile_window.max().y(),
            &self.slices, &mut self.frame_buffer,
        )?;

        self.current_position = tile_offset + BlockHeader::BYTE_SIZE + data_size;
        Ok(())
    }

    /// Locate the specified tile, seek to it if necessary, check its
    /// stored block header, and read its payload into the tile buffer.
    fn read_tile_block(&mut self, tile: TileCoordinates) -> Result<(usize, usize)> {
        let tile_offset = self.offsets.get_present(tile)?;

        if self.current_position != tile_offset {
            self.stream.seek_read_to(tile_offset)?;
        }

        let block = BlockHeader::read(&mut self.stream)?;
        block.validate_coordinates(tile)?;

        let data_size = block.payload_size()?;
        if data_size > self.tile_buffer.len() {
            return Err(Error::corrupt("tile block length exceeds the maximum tile size"));
        }

        u8::read_slice(&mut self.stream, &mut self.tile_buffer[.. data_size])?;
        Ok((data_size, tile_offset))
    }

    /// Read a horizontal strip of scan lines of the full resolution
    /// level into the frame buffer, as if this were a scan line file.
    ///
    /// Reads all tiles of level (0, 0) that overlap the scan lines
    /// `min(y1, y2) ..= max(y1, y2)` and stores the overlapping rows.
    /// The frame buffer slices must cover these rows.
    pub fn read_pixels(&mut self, scan_line_1: i32, scan_line_2: i32) -> UnitResult {
        if self.slices.is_empty() {
            return Err(self.attach_file_name(
                Error::logic("no frame buffer specified as pixel data source")
            ));
        }

        let min_y = scan_line_1.min(scan_line_2);
        let max_y = scan_line_1.max(scan_line_2);

        let window = self.header.data_window;
        if min_y < window.position.y() || max_y > window.max().y() {
            return Err(self.attach_file_name(
                Error::argument("scan line outside of the data window")
            ));
        }

        // the range of tile rows that intersect the requested strip,
        // iterated in the order in which the file stores them
        let min_tile_y = (min_y - window.position.y()) as usize / self.tile_y_size();
        let max_tile_y = (max_y - window.position.y()) as usize / self.tile_y_size();

        let tile_rows: Vec<usize> =
            if self.header.line_order == LineOrder::Decreasing {
                (min_tile_y ..= max_tile_y).rev().collect()
            }
            else {
                (min_tile_y ..= max_tile_y).collect()
            };

        // the requested strip is assembled tile by tile, so the user
        // frame buffer steps aside for a per-tile scratch buffer
        let mut user_buffer = self.take_frame_buffer();
        let result = self.read_pixels_via_tiles(&mut user_buffer, min_y, max_y, &tile_rows);

        let restored = self.set_frame_buffer(user_buffer);
        result.and(restored)
    }

    fn read_pixels_via_tiles(
        &mut self,
        user_buffer: &mut FrameBuffer,
        min_y: i32, max_y: i32,
        tile_rows: &[usize],
    ) -> UnitResult {
        let num_tiles_x = self.geometry.num_x_tiles(0)?;

        for &tile_y in tile_rows {
            for tile_x in 0 .. num_tiles_x {
                let tile_window = self.geometry.data_window_for_tile(tile_x, tile_y, 0, 0)?;

                // a scratch buffer holding one tile,
                // with a slice for each slice of the user buffer
                let mut scratch = FrameBuffer::new();
                for (name, slice) in user_buffer.iter() {
                    scratch.insert(
                        name.clone(),
                        Slice::new(slice.sample_type(), tile_window)
                            .with_fill_value(slice.fill_value()),
                    );
                }

                self.set_frame_buffer(scratch)?;
                self.read_tile(tile_x, tile_y, 0, 0)?;
                let scratch = self.take_frame_buffer();

                // move the rows that intersect the requested strip
                // from the scratch buffer to the user buffer
                let first_row = tile_window.position.y().max(min_y);
                let last_row = tile_window.max().y().min(max_y);

                for (name, source) in scratch.iter() {
                    let target = user_buffer.expect_mut(name)?;

                    for y in first_row ..= last_row {
                        target.copy_row_from(source, y, tile_window.position.x(), tile_window.max().x());
                    }
                }
            }
        }

        Ok(())
    }

    /// Read the tile block at the current stream position without
    /// decompressing it. Returns which tile the block belongs to,
    /// and its compressed payload.
    ///
    /// Used to copy tiles between files without recompressing them.
    /// Only available while the tile index of the file is complete;
    /// a partially reconstructed index cannot guarantee that
    /// sequential reads visit every tile.
    pub fn raw_tile_data(&mut self) -> Result<(TileCoordinates, &[u8])> {
        match self.read_next_raw_block() {
            Ok((tile, data_size)) => Ok((tile, &self.tile_buffer[.. data_size])),
            Err(error) => Err(self.attach_file_name(error)),
        }
    }

    fn read_next_raw_block(&mut self) -> Result<(TileCoordinates, usize)> {
        if !self.complete_offsets {
            return Err(Error::logic(
                "the tile index of this file is incomplete, raw tiles cannot be read sequentially"
            ));
        }

        let block = BlockHeader::read(&mut self.stream)?;
        let tile = block.coordinates()?;

        let valid = self.geometry.is_valid_tile(
            tile.tile_index.x(), tile.tile_index.y(),
            tile.level_index.x(), tile.level_index.y(),
        );

        if !valid {
            return Err(Error::corrupt("tile block addresses no tile of this image"));
        }

        let data_size = block.payload_size()?;
        if data_size > self.tile_buffer.len() {
            return Err(Error::corrupt("tile block length exceeds the maximum tile size"));
        }

        u8::read_slice(&mut self.stream, &mut self.tile_buffer[.. data_size])?;

        self.current_position = self.stream.byte_position();
        Ok((tile, data_size))
    }
}

impl<R> std::fmt::Debug for TiledReader<R> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("TiledReader")
            .field("file_name", &self.file_name)
            .field("header", &self.header)
            .field("current_position", &self.current_position)
            .finish()
    }
}
