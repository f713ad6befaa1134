
//! Read and write images whose pixels are stored as horizontal blocks
//! of scan lines instead of tiles.
//!
//! Scan line files share the overall layout of tiled files: meta data,
//! an offset table with one entry per block, and the blocks themselves.
//! Each block stores the `i32` y coordinate of its first scan line and
//! an `i32` byte count, followed by the compressed pixels. How many
//! scan lines one block covers depends on the compression method.

use crate::compression::{BlockCompressor, Format, block_compressor};
use crate::convert::{
    InputSlice, OutputSlice, convert_block_to_xdr, input_slice_table,
    output_slice_table, read_block_into_frame_buffer, write_block_from_frame_buffer,
};
use crate::error::{Error, Result, UnitResult, i64_to_usize, usize_to_i64};
use crate::frame_buffer::FrameBuffer;
use crate::io::{Data, Read, Tracking, Write};
use crate::math::{Vec2, ceil_div};
use crate::meta::{Header, MetaData, Requirements};
use crate::meta::attribute::{IntegerBounds, LineOrder};
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek};
use std::path::{Path, PathBuf};

/// The pixels that the scan line block with the specified index covers.
/// Blocks are indexed from the top of the data window, regardless
/// of the line order of the file.
fn block_window(header: &Header, lines_per_block: usize, block_index: usize) -> IntegerBounds {
    let window = header.data_window;
    let min_y = window.position.y() + (block_index * lines_per_block) as i32;
    let height = lines_per_block.min((window.max().y() - min_y + 1) as usize);

    IntegerBounds::new(
        Vec2(window.position.x(), min_y),
        Vec2(window.size.width(), height),
    )
}

fn block_count(header: &Header, lines_per_block: usize) -> usize {
    ceil_div(header.data_window.size.height(), lines_per_block)
}

/// The index of the block containing the specified scan line.
/// The scan line must be inside the data window.
fn block_index_of_line(header: &Header, lines_per_block: usize, scan_line: i32) -> usize {
    (scan_line - header.data_window.position.y()) as usize / lines_per_block
}

fn validate_no_subsampled_channels(header: &Header) -> UnitResult {
    let all_samplings_are_one = header.channels.list.iter()
        .all(|channel| channel.sampling == Vec2(1, 1));

    if all_samplings_are_one { Ok(()) }
    else { Err(Error::argument("subsampled channels are not supported")) }
}


/// Reads horizontal strips of scan lines from a scan line image file.
pub struct ScanlineReader<R> {
    stream: Tracking<R>,
    header: Header,
    lines_per_block: usize,
    offsets: Vec<i64>,
    compressor: Option<Box<dyn BlockCompressor>>,
    frame_buffer: FrameBuffer,
    slices: Vec<InputSlice>,
    block_buffer: Vec<u8>,
    current_position: usize,
    file_name: Option<PathBuf>,
}

impl ScanlineReader<BufReader<File>> {

    /// Open the scan line image file at the specified path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let attach_name = |error: Error| error.while_processing_file(path);
        let file = File::open(path).map_err(|error| attach_name(error.into()))?;

        let mut reader = Self::read_from_buffered(BufReader::new(file)).map_err(attach_name)?;
        reader.file_name = Some(path.to_path_buf());
        Ok(reader)
    }
}

impl<R: Read + Seek> ScanlineReader<R> {

    /// Read the meta data from the stream and prepare to read pixels.
    /// The stream must be buffered and must start at the magic number.
    pub fn read_from_buffered(read: R) -> Result<Self> {
        let mut stream = Tracking::new(read);
        let meta = MetaData::read_from_buffered(&mut stream)?;
        Self::new(stream, meta.requirements, meta.header, None)
    }

    /// Prepare to read pixels from a stream whose meta data
    /// was already read, for example by the unified input.
    pub(crate) fn new(
        mut stream: Tracking<R>,
        requirements: Requirements,
        header: Header,
        file_name: Option<PathBuf>,
    ) -> Result<Self> {
        if requirements.is_tiled {
            return Err(Error::argument("the file is tiled"));
        }

        header.sanity_check(false)?;
        validate_no_subsampled_channels(&header)?;

        let lines_per_block = header.compression.scan_lines_per_block();

        let mut offsets = vec![0_i64; block_count(&header, lines_per_block)];
        i64::read_slice(&mut stream, &mut offsets)?;

        let bytes_per_line = header.channels.bytes_per_pixel * header.data_window.size.width();

        let compressor = block_compressor(header.compression, bytes_per_line, lines_per_block);

        let current_position = stream.byte_position();

        Ok(ScanlineReader {
            stream, header, lines_per_block, offsets, compressor,
            frame_buffer: FrameBuffer::new(),
            slices: Vec::new(),
            block_buffer: vec![0_u8; bytes_per_line * lines_per_block],
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

    /// Declare where the pixels of subsequently read scan lines are
    /// stored. Matching works exactly as for tiled files: missing
    /// channels fill, missing slices skip, matched pairs convert.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        match input_slice_table(&self.header.channels, &frame_buffer) {
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

    /// Read all scan lines from `min(y1, y2)` to `max(y1, y2)`,
    /// inclusively, into the frame buffer.
    pub fn read_pixels(&mut self, scan_line_1: i32, scan_line_2: i32) -> UnitResult {
        self.read_pixel_strip(scan_line_1, scan_line_2)
            .map_err(|error| self.attach_file_name(error))
    }

    fn read_pixel_strip(&mut self, scan_line_1: i32, scan_line_2: i32) -> UnitResult {
        if self.slices.is_empty() {
            return Err(Error::logic("no frame buffer specified as pixel data source"));
        }

        let min_y = scan_line_1.min(scan_line_2);
        let max_y = scan_line_1.max(scan_line_2);

        let window = self.header.data_window;
        if min_y < window.position.y() || max_y > window.max().y() {
            return Err(Error::argument("scan line outside of the data window"));
        }

        let first_block = block_index_of_line(&self.header, self.lines_per_block, min_y);
        let last_block = block_index_of_line(&self.header, self.lines_per_block, max_y);

        // visit the blocks in the order in which the file stores them
        let blocks: Vec<usize> =
            if self.header.line_order == LineOrder::Decreasing {
                (first_block ..= last_block).rev().collect()
            }
            else {
                (first_block ..= last_block).collect()
            };

        for block_index in blocks {
            self.read_block(block_index, min_y, max_y)?;
        }

        Ok(())
    }

    fn read_block(&mut self, block_index: usize, clip_min_y: i32, clip_max_y: i32) -> UnitResult {
        let window = block_window(&self.header, self.lines_per_block, block_index);

        let offset = self.offsets[block_index];
        if offset <= 0 {
            return Err(Error::corrupt("scan line block is missing from the file"));
        }

        let offset = i64_to_usize(offset, "scan line block position")?;
        if self.current_position != offset {
            self.stream.seek_read_to(offset)?;
        }

        let stored_y = i32::read(&mut self.stream)?;
        if stored_y != window.position.y() {
            return Err(Error::corrupt("scan line block does not match its offset table entry"));
        }

        let data_size = i32::read(&mut self.stream)?;
        if data_size < 0 || data_size as usize > self.block_buffer.len() {
            return Err(Error::corrupt("scan line block length exceeds the maximum block size"));
        }

        let data_size = data_size as usize;
        u8::read_slice(&mut self.stream, &mut self.block_buffer[.. data_size])?;

        let uncompressed_size = self.header.channels.bytes_per_pixel * window.size.area();

        // stored uncompressed bytes are always in the wire representation
        let decompressed;
        let (data, format): (&[u8], Format) = match &mut self.compressor {
            Some(compressor) if data_size < uncompressed_size => {
                decompressed = compressor.decompress(
                    &self.block_buffer[.. data_size], window, uncompressed_size
                )?;

                (decompressed.as_slice(), compressor.format())
            }

            _ => (&self.block_buffer[.. data_size], Format::Xdr),
        };

        if data.len() != uncompressed_size {
            return Err(Error::corrupt("scan line block does not contain the pixels of its lines"));
        }

        read_block_into_frame_buffer(
            data, format, window,
            clip_min_y, clip_max_y,
            &self.slices, &mut self.frame_buffer,
        )?;

        self.current_position = offset + 2 * i32::BYTE_SIZE + data_size;
        Ok(())
    }

    /// Read the block containing the specified scan line without
    /// decompressing it. Returns the y coordinate of the first line
    /// of the block and its compressed payload.
    pub fn raw_pixel_data(&mut self, scan_line: i32) -> Result<(i32, &[u8])> {
        match self.read_raw_block(scan_line) {
            Ok((stored_y, data_size)) => Ok((stored_y, &self.block_buffer[.. data_size])),
            Err(error) => Err(self.attach_file_name(error)),
        }
    }

    fn read_raw_block(&mut self, scan_line: i32) -> Result<(i32, usize)> {
        let window = self.header.data_window;
        if scan_line < window.position.y() || scan_line > window.max().y() {
            return Err(Error::argument("scan line outside of the data window"));
        }

        let block_index = block_index_of_line(&self.header, self.lines_per_block, scan_line);

        let offset = self.offsets[block_index];
        if offset <= 0 {
            return Err(Error::corrupt("scan line block is missing from the file"));
        }

        self.stream.seek_read_to(i64_to_usize(offset, "scan line block position")?)?;

        let stored_y = i32::read(&mut self.stream)?;
        let data_size = i32::read(&mut self.stream)?;

        if data_size < 0 || data_size as usize > self.block_buffer.len() {
            return Err(Error::corrupt("scan line block length exceeds the maximum block size"));
        }

        let data_size = data_size as usize;
        u8::read_slice(&mut self.stream, &mut self.block_buffer[.. data_size])?;

        self.current_position = self.stream.byte_position();
        Ok((stored_y, data_size))
    }
}

impl<R> std::fmt::Debug for ScanlineReader<R> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ScanlineReader")
            .field("file_name", &self.file_name)
            .field("header", &self.header)
            .field("current_position", &self.current_position)
            .finish()
    }
}


/// Writes a scan line image file in one pass over the image.
pub struct ScanlineWriter<W: Write + Seek> {
    stream: Tracking<W>,
    header: Header,
    lines_per_block: usize,
    offsets: Vec<i64>,
    offsets_position: usize,
    compressor: Option<Box<dyn BlockCompressor>>,
    format: Format,
    frame_buffer: FrameBuffer,
    slices: Vec<OutputSlice>,
    finished: bool,
    file_name: Option<PathBuf>,
}

impl ScanlineWriter<BufWriter<File>> {

    /// Create a scan line image file at the specified path.
    /// The header must not be tiled and is validated
    /// before anything is written.
    pub fn create(path: impl AsRef<Path>, header: Header) -> Result<Self> {
        let path = path.as_ref();

        let attach_name = |error: Error| error.while_processing_file(path);
        let file = File::create(path).map_err(|error| attach_name(error.into()))?;

        let mut writer = Self::write_to_buffered(BufWriter::new(file), header).map_err(attach_name)?;
        writer.file_name = Some(path.to_path_buf());
        Ok(writer)
    }
}

impl<W: Write + Seek> ScanlineWriter<W> {

    /// Validate the header and write it to the stream, followed by
    /// the zeroed offset table that reserves space for the real one.
    /// The stream should be buffered.
    pub fn write_to_buffered(write: W, header: Header) -> Result<Self> {
        validate_no_subsampled_channels(&header)?;

        let mut stream = Tracking::new(write);
        MetaData::write_to_buffered(&mut stream, &header, false)?;

        let lines_per_block = header.compression.scan_lines_per_block();
        let offsets = vec![0_i64; block_count(&header, lines_per_block)];

        let offsets_position = stream.byte_position();
        i64::write_slice(&mut stream, &offsets)?;

        let bytes_per_line = header.channels.bytes_per_pixel * header.data_window.size.width();

        let compressor = block_compressor(header.compression, bytes_per_line, lines_per_block);
        let format = compressor.as_ref().map_or(Format::Xdr, |compressor| compressor.format());

        Ok(ScanlineWriter {
            stream, header, lines_per_block, offsets, offsets_position,
            compressor, format,
            frame_buffer: FrameBuffer::new(),
            slices: Vec::new(),
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

    /// Declare where the pixels of the image come from.
    /// Matching works exactly as for tiled files: every channel
    /// requires a slice of exactly its sample type, and channels
    /// without a slice are written as all zeroes.
    pub fn set_frame_buffer(&mut self, frame_buffer: FrameBuffer) -> UnitResult {
        match output_slice_table(&self.header.channels, &frame_buffer) {
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

    /// Encode all scan lines of the data window from the frame buffer
    /// and store them in the file, in the line order of the file.
    pub fn write_pixels(&mut self) -> UnitResult {
        self.write_all_blocks()
            .map_err(|error| self.attach_file_name(error))
    }

    fn write_all_blocks(&mut self) -> UnitResult {
        if self.slices.is_empty() {
            return Err(Error::logic("no frame buffer specified as pixel data source"));
        }

        let count = self.offsets.len();

        // blocks are indexed from the top of the image, but a file
        // with decreasing line order stores the bottom block first
        let blocks: Vec<usize> =
            if self.header.line_order == LineOrder::Decreasing {
                (0 .. count).rev().collect()
            }
            else {
                (0 .. count).collect()
            };

        for block_index in blocks {
            self.write_block(block_index)?;
        }

        Ok(())
    }

    fn write_block(&mut self, block_index: usize) -> UnitResult {
        let window = block_window(&self.header, self.lines_per_block, block_index);

        let mut buffer = Vec::new();
        write_block_from_frame_buffer(
            &mut buffer, self.format, window, &self.slices, &self.frame_buffer
        )?;

        let compressed = match &mut self.compressor {
            None => None,

            Some(compressor) => {
                let compressed = compressor.compress(&buffer, window)?;

                if compressed.len() < buffer.len() {
                    Some(compressed)
                }
                else {
                    // stored uncompressed bytes must be in the wire representation
                    if self.format == Format::Native {
                        convert_block_to_xdr(&mut buffer, window.size.area(), &self.header.channels)?;
                    }

                    None
                }
            }
        };

        let data = compressed.as_deref().unwrap_or(&buffer);

        let position = self.stream.byte_position();
        self.offsets[block_index] = usize_to_i64(position, "file position")?;

        window.position.y().write(&mut self.stream)?;
        i32::try_from(data.len())
            .map_err(|_| Error::argument("scan line block too large for file"))?
            .write(&mut self.stream)?;

        u8::write_slice(&mut self.stream, data)?;
        Ok(())
    }

    /// Overwrite the zeroed offset table with the recorded block
    /// positions and flush the stream. Consumes the writer;
    /// a writer that is dropped without being closed rewrites
    /// the table as well, but has to swallow any errors.
    pub fn close(mut self) -> UnitResult {
        self.finished = true;

        let result = self.rewrite_offsets();
        result.map_err(|error| self.attach_file_name(error))
    }

    fn rewrite_offsets(&mut self) -> UnitResult {
        self.stream.seek_write_to(self.offsets_position)?;
        i64::write_slice(&mut self.stream, &self.offsets)?;
        self.stream.flush()?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for ScanlineWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            // a destructor cannot surface errors
            let _ = self.rewrite_offsets();
        }
    }
}

impl<W: Write + Seek> std::fmt::Debug for ScanlineWriter<W> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("ScanlineWriter")
            .field("file_name", &self.file_name)
            .field("header", &self.header)
            .finish()
    }
}

use std::convert::TryFrom;
