
//! Contains the compression attribute definition
//! and the compressors that encode and decode blocks of pixel data.
//!
//! The readers and writers in this crate treat a compressor as an opaque
//! collaborator: bytes go in, bytes come out, and the compressor states
//! whether its output is in the machine-independent wire representation
//! or in the byte order of the current machine.

use crate::error::{Error, Result};
use crate::io::Data;
use crate::meta::attribute::IntegerBounds;

/// A byte vector.
pub type ByteVec = Vec<u8>;

/// Specifies which compression method to use.
/// Use uncompressed data for fastest loading and writing speeds.
/// Use RLE compression for fast loading and writing with slight memory savings.
/// Use ZIP compression for slow processing with large memory savings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    Uncompressed,

    /// Produces slightly smaller files that can still be
    /// read and written rather quickly.
    /// Works best for images with large flat areas.
    /// This compression method is lossless.
    Rle,

    /// Uses ZIP compression to compress each scan line block of one line,
    /// or each tile, individually. This compression method is lossless.
    ZipSingle,

    /// Uses ZIP compression to compress blocks of 16 scan lines,
    /// or each tile, individually. This compression method is lossless.
    Zip16,
}

impl Compression {

    /// For scan line images, one or more scan lines may be stored
    /// together as a scan line block. For tiled images, the tile
    /// size determines the block height instead.
    pub fn scan_lines_per_block(self) -> usize {
        match self {
            Compression::Uncompressed => 1,
            Compression::Rle => 1,
            Compression::ZipSingle => 1,
            Compression::Zip16 => 16,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: std::io::Write>(self, write: &mut W) -> crate::error::UnitResult {
        let id: u8 = match self {
            Compression::Uncompressed => 0,
            Compression::Rle => 1,
            Compression::ZipSingle => 2,
            Compression::Zip16 => 3,
        };

        id.write(write)
    }

    /// Read the value without validating.
    pub fn read<R: std::io::Read>(read: &mut R) -> Result<Self> {
        match u8::read(read)? {
            0 => Ok(Compression::Uncompressed),
            1 => Ok(Compression::Rle),
            2 => Ok(Compression::ZipSingle),
            3 => Ok(Compression::Zip16),
            _ => Err(Error::corrupt("unknown compression method")),
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::Rle => "rle",
            Compression::ZipSingle => "zip line",
            Compression::Zip16 => "zip block",
        })
    }
}


/// The byte layout a compressor consumes and produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {

    /// The machine-independent big endian wire representation.
    Xdr,

    /// The byte order of the machine that is currently running.
    Native,
}

/// Compresses and decompresses the pixel bytes of a single block,
/// which is either one tile or one scan line block.
///
/// A compressor may produce output that is larger than its input.
/// In that case the writer stores the uncompressed bytes instead,
/// and the reader detects this by comparing the stored size
/// with the expected uncompressed size of the block.
pub trait BlockCompressor {

    /// The byte layout this compressor consumes when compressing
    /// and produces when decompressing.
    fn format(&self) -> Format { Format::Xdr }

    /// Compress one block of pixel bytes.
    fn compress(&mut self, uncompressed: &[u8], block: IntegerBounds) -> Result<ByteVec>;

    /// Decompress one block of pixel bytes.
    /// The result must have exactly `expected_byte_size` bytes.
    fn decompress(&mut self, compressed: &[u8], block: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec>;
}

/// Create the compressor for the specified compression method.
/// Returns nothing where the file stores uncompressed pixels.
///
/// The maximum number of bytes in one line of the block and the number
/// of lines in the block bound the uncompressed size of any block that
/// the returned compressor will ever see.
pub fn block_compressor(
    compression: Compression,
    max_bytes_per_line: usize,
    lines_per_block: usize,
) -> Option<Box<dyn BlockCompressor>> {
    let max_uncompressed_size = max_bytes_per_line * lines_per_block;

    match compression {
        Compression::Uncompressed => None,
        Compression::Rle => Some(Box::new(RleCompressor { max_uncompressed_size })),

        Compression::ZipSingle | Compression::Zip16 =>
            Some(Box::new(ZipCompressor { max_uncompressed_size })),
    }
}


/// Deflates each block with zlib.
/// The bytes are reordered and delta encoded before deflating,
/// which significantly improves the compression ratio for pixel data.
#[derive(Debug, Clone, Copy)]
struct ZipCompressor {
    max_uncompressed_size: usize,
}

impl BlockCompressor for ZipCompressor {

    fn compress(&mut self, uncompressed: &[u8], _block: IntegerBounds) -> Result<ByteVec> {
        let mut reordered = uncompressed.to_vec();
        separate_bytes_fragments(&mut reordered);
        samples_to_differences(&mut reordered);

        Ok(miniz_oxide::deflate::compress_to_vec_zlib(&reordered, 4))
    }

    fn decompress(&mut self, compressed: &[u8], _block: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
        if expected_byte_size > self.max_uncompressed_size {
            return Err(Error::corrupt("block larger than maximum block size"));
        }

        let options = zune_inflate::DeflateOptions::default()
            .set_limit(expected_byte_size)
            .set_size_hint(expected_byte_size);

        let mut decoder = zune_inflate::DeflateDecoder::new_with_options(compressed, options);
        let mut decompressed = decoder.decode_zlib()
            .map_err(|_| Error::compression("zlib-compressed data malformed"))?;

        if decompressed.len() != expected_byte_size {
            return Err(Error::compression("zlib-decompressed data has wrong length"));
        }

        differences_to_samples(&mut decompressed);
        interleave_byte_blocks(&mut decompressed);
        Ok(decompressed)
    }
}


const MIN_RUN_LENGTH: usize = 3;
const MAX_RUN_LENGTH: usize = 127;

/// Encodes each block with byte-level run length encoding.
/// Uses the same reordering and delta encoding as the zip compressor.
#[derive(Debug, Clone, Copy)]
struct RleCompressor {
    max_uncompressed_size: usize,
}

impl BlockCompressor for RleCompressor {

    fn compress(&mut self, uncompressed: &[u8], _block: IntegerBounds) -> Result<ByteVec> {
        let mut data = uncompressed.to_vec();
        separate_bytes_fragments(&mut data);
        samples_to_differences(&mut data);

        let mut compressed = Vec::with_capacity(data.len());
        let mut run_start = 0;
        let mut run_end = 1;

        while run_start < data.len() {
            while run_end < data.len()
                && data[run_start] == data[run_end]
                && run_end - run_start < MAX_RUN_LENGTH
            {
                run_end += 1;
            }

            if run_end - run_start >= MIN_RUN_LENGTH {
                // a run of equal bytes: store the repetition count and one value
                compressed.push((run_end - run_start - 1) as u8);
                compressed.push(data[run_start]);
                run_start = run_end;
            }
            else {
                // a literal sequence: extend it until the next run of three starts
                while run_end < data.len()
                    && ((run_end + 1 >= data.len() || data[run_end] != data[run_end + 1])
                        || (run_end + 2 >= data.len() || data[run_end + 1] != data[run_end + 2]))
                    && run_end - run_start < MAX_RUN_LENGTH
                {
                    run_end += 1;
                }

                compressed.push((run_start as i32 - run_end as i32) as u8);
                compressed.extend_from_slice(&data[run_start .. run_end]);

                run_start = run_end;
                run_end += 1;
            }
        }

        Ok(compressed)
    }

    fn decompress(&mut self, compressed: &[u8], _block: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
        if expected_byte_size > self.max_uncompressed_size {
            return Err(Error::corrupt("block larger than maximum block size"));
        }

        let mut remaining = compressed;
        let mut decompressed = Vec::with_capacity(expected_byte_size);

        while !remaining.is_empty() && decompressed.len() != expected_byte_size {
            let count = take_1(&mut remaining)? as i8 as i32;

            if count < 0 {
                // take the next `-count` bytes as they are
                let values = take_n(&mut remaining, (-count) as usize)?;

                if decompressed.len() + values.len() > expected_byte_size {
                    return Err(Error::compression("rle data exceeds expected size"));
                }

                decompressed.extend_from_slice(values);
            }
            else {
                // repeat the next value `count + 1` times
                let value = take_1(&mut remaining)?;

                if decompressed.len() + count as usize + 1 > expected_byte_size {
                    return Err(Error::compression("rle data exceeds expected size"));
                }

                decompressed.resize(decompressed.len() + count as usize + 1, value);
            }
        }

        if decompressed.len() != expected_byte_size {
            return Err(Error::compression("rle-decompressed data has wrong length"));
        }

        differences_to_samples(&mut decompressed);
        interleave_byte_blocks(&mut decompressed);
        Ok(decompressed)
    }
}

fn take_1(slice: &mut &[u8]) -> Result<u8> {
    if let Some((first, rest)) = slice.split_first() {
        *slice = rest;
        Ok(*first)
    }
    else {
        Err(Error::compression("compressed data ends unexpectedly"))
    }
}

fn take_n<'s>(slice: &mut &'s [u8], n: usize) -> Result<&'s [u8]> {
    if n <= slice.len() {
        let (front, back) = slice.split_at(n);
        *slice = back;
        Ok(front)
    }
    else {
        Err(Error::compression("compressed data ends unexpectedly"))
    }
}


/// Integrate over all differences to the previous value
/// in order to reconstruct the sample values.
fn differences_to_samples(buffer: &mut [u8]) {
    for index in 1 .. buffer.len() {
        buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
    }
}

/// Derive over all values in order to produce
/// differences to the previous value.
fn samples_to_differences(buffer: &mut [u8]) {
    for index in (1 .. buffer.len()).rev() {
        buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
    }
}

/// Interleave the bytes such that the second half of the array
/// provides each other byte.
fn interleave_byte_blocks(separated: &mut [u8]) {
    let mut interleaved = Vec::with_capacity(separated.len());
    let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

    let mut first = first_half.iter();
    let mut second = second_half.iter();

    while interleaved.len() < separated.len() {
        if let Some(byte) = first.next() { interleaved.push(*byte); }
        if let Some(byte) = second.next() { interleaved.push(*byte); }
    }

    separated.copy_from_slice(interleaved.as_slice())
}

/// Separate the bytes such that the second half of the array
/// contains each other byte.
fn separate_bytes_fragments(source: &mut [u8]) {
    let mut first_half = Vec::with_capacity((source.len() + 1) / 2);
    let mut second_half = Vec::with_capacity(source.len() / 2);

    for (index, byte) in source.iter().enumerate() {
        if index % 2 == 0 { first_half.push(*byte); }
        else { second_half.push(*byte); }
    }

    let mut result = first_half;
    result.append(&mut second_half);
    source.copy_from_slice(result.as_slice());
}
