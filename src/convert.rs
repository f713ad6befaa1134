
//! Moves sample values between the uncompressed bytes of a pixel data
//! block and the slices of a frame buffer, converting sample types
//! on the way in.
//!
//! Inside a block, the bytes of one channel are contiguous for the
//! whole block, and the channels follow each other alphabetically.
//! The conversions between the stored sample type and the sample type
//! of a frame buffer slice are defined by the [`Sample`] type; this
//! module only dispatches per slice.

use crate::compression::Format;
use crate::error::{Error, Result, UnitResult};
use crate::frame_buffer::{FrameBuffer, Sample};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType, Text};
use half::f16;

/// How one channel of a block is moved into the frame buffer when reading.
/// The entries of a slice table appear in the channel order of the file,
/// so that walking the table walks the bytes of a block front to back.
#[derive(Clone, Debug)]
pub(crate) enum InputSlice {

    /// The file stores this channel, but the frame buffer has no slice
    /// for it. The stored bytes are consumed and discarded.
    Skip {
        /// The sample type the file stores for this channel.
        file_type: SampleType,
    },

    /// The frame buffer has a slice for which the file stores no
    /// channel. Every pixel receives the fill value of the slice.
    Fill {
        /// The name of the frame buffer slice to fill.
        name: Text,
    },

    /// The file stores this channel and the frame buffer has a slice
    /// for it. Samples convert from the stored type to the slice type.
    Read {
        /// The name of the frame buffer slice to store into.
        name: Text,

        /// The sample type the file stores for this channel.
        file_type: SampleType,
    },
}

/// Match the slices of a frame buffer against the channels of a file
/// by walking both alphabetically ordered lists at once.
///
/// Channels without a slice become skips, slices without a channel
/// become fills, and matched pairs must agree on their sampling rates,
/// while their sample types may differ.
pub(crate) fn input_slice_table(
    channels: &ChannelList,
    frame_buffer: &FrameBuffer,
) -> Result<Vec<InputSlice>> {
    let mut table = Vec::with_capacity(channels.list.len() + frame_buffer.len());
    let mut remaining_channels = channels.list.iter().peekable();

    for (name, slice) in frame_buffer.iter() {

        // all channels named before this slice have no slice themselves
        while let Some(channel) = remaining_channels.peek() {
            if channel.name < *name {
                table.push(InputSlice::Skip { file_type: channel.sample_type });
                remaining_channels.next();
            }
            else { break; }
        }

        let matches_channel = remaining_channels.peek()
            .map_or(false, |channel| channel.name == *name);

        if matches_channel {
            let channel = remaining_channels.next().expect("peeked channel vanished");

            if channel.sampling != slice.sampling() {
                return Err(Error::argument(format!(
                    "sampling rates of channel \"{}\" are not compatible with the frame buffer",
                    channel.name
                )));
            }

            table.push(InputSlice::Read {
                name: name.clone(),
                file_type: channel.sample_type,
            });
        }
        else {
            // the file has no data for this slice, so it will be filled
            table.push(InputSlice::Fill { name: name.clone() });
        }
    }

    // all channels named after the last slice have no slice either
    for channel in remaining_channels {
        table.push(InputSlice::Skip { file_type: channel.sample_type });
    }

    Ok(table)
}

/// Decode one block of uncompressed bytes into the frame buffer.
///
/// The block rectangle states which pixels the bytes describe.
/// Only rows within `clip_min_y ..= clip_max_y` are stored into the
/// frame buffer; the bytes of other rows are still consumed, so the
/// clip range never desynchronizes the data cursor.
pub(crate) fn read_block_into_frame_buffer(
    data: &[u8],
    format: Format,
    block: IntegerBounds,
    clip_min_y: i32,
    clip_max_y: i32,
    table: &[InputSlice],
    frame_buffer: &mut FrameBuffer,
) -> UnitResult {
    let mut cursor = data;
    let max = block.max();
    let pixels_per_block = block.size.area();

    for entry in table {
        match entry {
            InputSlice::Skip { file_type } => {
                skip_bytes(&mut cursor, file_type.bytes_per_sample() * pixels_per_block)?;
            }

            InputSlice::Fill { name } => {
                let slice = frame_buffer.expect_mut(name)?;
                let fill = Sample::from_f64(slice.fill_value(), slice.sample_type());

                for y in block.position.y().max(clip_min_y) ..= max.y().min(clip_max_y) {
                    for x in block.position.x() ..= max.x() {
                        slice.set_sample(x, y, fill);
                    }
                }
            }

            InputSlice::Read { name, file_type } => {
                let slice = frame_buffer.expect_mut(name)?;
                let bytes_per_row = file_type.bytes_per_sample() * block.size.width();

                for y in block.position.y() ..= max.y() {
                    if y < clip_min_y || y > clip_max_y {
                        skip_bytes(&mut cursor, bytes_per_row)?;
                        continue;
                    }

                    for x in block.position.x() ..= max.x() {
                        let sample = read_sample(&mut cursor, *file_type, format)?;
                        slice.set_sample(x, y, sample);
                    }
                }
            }
        }
    }

    if !cursor.is_empty() {
        return Err(Error::corrupt("block contains more pixel data than expected"));
    }

    Ok(())
}


/// How one channel of a block is produced from the frame buffer when writing.
#[derive(Clone, Debug)]
pub(crate) enum OutputSlice {

    /// The frame buffer has no slice for this channel.
    /// The channel is stored as all zeroes.
    Zero {
        /// The sample type the file stores for this channel.
        file_type: SampleType,
    },

    /// The channel is stored from the frame buffer slice of the same name.
    Write {
        /// The name of the frame buffer slice to read from.
        name: Text,

        /// The sample type of the channel and the slice.
        #[allow(dead_code)]
        file_type: SampleType,
    },
}

/// Match the slices of a frame buffer against the channels of a file.
/// Every channel receives an entry. Writing does not convert,
/// so a matched slice must have exactly the sample type of its channel.
/// Slices without a matching channel are ignored.
pub(crate) fn output_slice_table(
    channels: &ChannelList,
    frame_buffer: &FrameBuffer,
) -> Result<Vec<OutputSlice>> {
    channels.list.iter()
        .map(|channel| match frame_buffer.get(&channel.name) {
            None => Ok(OutputSlice::Zero { file_type: channel.sample_type }),

            Some(slice) => {
                if slice.sample_type() != channel.sample_type {
                    return Err(Error::argument(format!(
                        "pixel type of channel \"{}\" is not compatible with the frame buffer",
                        channel.name
                    )));
                }

                Ok(OutputSlice::Write {
                    name: channel.name.clone(),
                    file_type: channel.sample_type,
                })
            },
        })
        .collect()
}

/// Encode one block of pixels from the frame buffer
/// into the specified byte format.
pub(crate) fn write_block_from_frame_buffer(
    out: &mut Vec<u8>,
    format: Format,
    block: IntegerBounds,
    table: &[OutputSlice],
    frame_buffer: &FrameBuffer,
) -> UnitResult {
    let max = block.max();
    let pixels_per_block = block.size.area();

    for entry in table {
        match entry {
            OutputSlice::Zero { file_type } => {
                // a zero sample consists of zero bytes in either byte order
                let byte_count = file_type.bytes_per_sample() * pixels_per_block;
                out.resize(out.len() + byte_count, 0);
            }

            OutputSlice::Write { name, .. } => {
                let slice = frame_buffer.expect(name)?;

                for y in block.position.y() ..= max.y() {
                    for x in block.position.x() ..= max.x() {
                        write_sample(out, slice.sample(x, y), format);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Rewrite the bytes of an encoded block from the byte order of this
/// machine to the wire representation, in place. Both representations
/// of every sample type have the same size, so no bytes move.
///
/// Called when a compressor wanted its input in native byte order,
/// but the compressed result was discarded for being too large:
/// uncompressed blocks are always stored in the wire representation.
pub(crate) fn convert_block_to_xdr(
    data: &mut [u8],
    pixels_per_block: usize,
    channels: &ChannelList,
) -> UnitResult {
    let mut position = 0;

    for channel in &channels.list {
        let bytes_per_sample = channel.sample_type.bytes_per_sample();

        for _ in 0 .. pixels_per_block {
            let bytes = data.get_mut(position .. position + bytes_per_sample)
                .ok_or_else(|| Error::logic("tile buffer shorter than its own pixels"))?;

            match channel.sample_type {
                SampleType::U32 => {
                    let value = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    bytes.copy_from_slice(&value.to_be_bytes());
                }

                SampleType::F16 => {
                    let value = u16::from_ne_bytes([bytes[0], bytes[1]]);
                    bytes.copy_from_slice(&value.to_be_bytes());
                }

                SampleType::F32 => {
                    let value = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    bytes.copy_from_slice(&value.to_be_bytes());
                }
            }

            position += bytes_per_sample;
        }
    }

    debug_assert_eq!(position, data.len(), "byte order conversion length bug");
    Ok(())
}


#[inline]
fn skip_bytes(cursor: &mut &[u8], count: usize) -> UnitResult {
    if count <= cursor.len() {
        *cursor = &cursor[count ..];
        Ok(())
    }
    else {
        Err(Error::corrupt("block contains less pixel data than expected"))
    }
}

#[inline]
fn read_sample(cursor: &mut &[u8], sample_type: SampleType, format: Format) -> Result<Sample> {
    let bytes_per_sample = sample_type.bytes_per_sample();

    if cursor.len() < bytes_per_sample {
        return Err(Error::corrupt("block contains less pixel data than expected"));
    }

    let (bytes, rest) = cursor.split_at(bytes_per_sample);
    *cursor = rest;

    Ok(match sample_type {
        SampleType::U32 => {
            let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
            Sample::U32(match format {
                Format::Xdr => u32::from_be_bytes(bytes),
                Format::Native => u32::from_ne_bytes(bytes),
            })
        }

        SampleType::F16 => {
            let bytes = [bytes[0], bytes[1]];
            Sample::F16(match format {
                Format::Xdr => f16::from_be_bytes(bytes),
                Format::Native => f16::from_ne_bytes(bytes),
            })
        }

        SampleType::F32 => {
            let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
            Sample::F32(match format {
                Format::Xdr => f32::from_be_bytes(bytes),
                Format::Native => f32::from_ne_bytes(bytes),
            })
        }
    })
}

#[inline]
fn write_sample(out: &mut Vec<u8>, sample: Sample, format: Format) {
    match (sample, format) {
        (Sample::U32(value), Format::Xdr) => out.extend_from_slice(&value.to_be_bytes()),
        (Sample::U32(value), Format::Native) => out.extend_from_slice(&value.to_ne_bytes()),
        (Sample::F16(value), Format::Xdr) => out.extend_from_slice(&value.to_be_bytes()),
        (Sample::F16(value), Format::Native) => out.extend_from_slice(&value.to_ne_bytes()),
        (Sample::F32(value), Format::Xdr) => out.extend_from_slice(&value.to_be_bytes()),
        (Sample::F32(value), Format::Native) => out.extend_from_slice(&value.to_ne_bytes()),
    }
}
