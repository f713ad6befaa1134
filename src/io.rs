
//! Read and write the machine-independent wire representation of primitives.
//! All multi-byte values in a file are stored in big endian form,
//! regardless of the byte order of the machine that wrote them.

pub use ::std::io::{Read, Write};

use crate::error::{Error, Result, UnitResult, IoResult};
use ::half::f16;
use ::half::slice::HalfFloatSliceExt;
use ::lebe::prelude::*;
use std::io::{Seek, SeekFrom};

/// Skip reading uninteresting bytes without allocating.
#[inline]
pub fn skip_bytes(read: &mut impl Read, count: u64) -> IoResult<()> {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count),
        &mut std::io::sink()
    )?;

    // the reader may have ended before the number of bytes was reached
    if skipped < count {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "cannot skip past the end of the stream"
        ));
    }

    debug_assert_eq!(skipped, count, "skip bytes bug");
    Ok(())
}

/// Keep track of what byte we are at.
/// Used to skip back to a previous place after writing some information.
#[derive(Debug)]
pub struct Tracking<T> {
    inner: T,
    position: usize,
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<T> Tracking<T> {

    /// Wrap the inner reader or writer, starting to count bytes at the current position.
    pub fn new(inner: T) -> Self {
        Tracking { inner, position: 0 }
    }

    /// The number of bytes read or written so far,
    /// which equals the stream position if the stream started at zero.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    /// Stop tracking and return the inner reader or writer.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> Tracking<T> {

    /// Go to the specified position in the stream.
    /// Skips small forward distances without an expensive seek operation.
    pub fn seek_read_to(&mut self, target_position: usize) -> std::io::Result<()> {
        let delta = target_position as i64 - self.position as i64;

        if delta > 0 && delta < 16 {
            skip_bytes(self, delta as u64)?;
        }
        else if delta != 0 {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Go to the specified position in the stream.
    /// Forward distances are filled with zero bytes.
    pub fn seek_write_to(&mut self, target_position: usize) -> std::io::Result<()> {
        if target_position < self.position {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }
        else if target_position > self.position {
            std::io::copy(
                &mut std::io::repeat(0).take((target_position - self.position) as u64),
                self
            )?;
        }

        debug_assert_eq!(self.position, target_position, "seek write bug");
        Ok(())
    }
}


/// Extension trait for reading and writing the wire representation
/// of primitive types like numbers and arrays of numbers.
pub trait Data: Sized + Default + Clone {

    /// Number of bytes this value occupies in a file.
    const BYTE_SIZE: usize = ::std::mem::size_of::<Self>();

    /// Read a value of this type from the byte stream.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Fill the existing slice with values from the byte stream.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Write this value to the byte stream.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values of the slice to the byte stream.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Read a vector of values from the byte stream.
    /// If a length greater than `hard_max` is requested,
    /// this does not try to allocate that much memory,
    /// but instead considers the decoded length to be malformed.
    /// Memory is allocated in chunks of `soft_max` to defend against
    /// allocating absurd amounts for a corrupt length field.
    #[inline]
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        if let Some(max) = hard_max {
            if data_size > max {
                return Err(Error::corrupt(purpose));
            }
        }

        let soft_max = hard_max.unwrap_or(soft_max).min(soft_max).max(1);
        let mut data = Vec::new();

        // allocate only a bounded amount of memory at once
        // (most of the time, this loop will run only once)
        while data.len() < data_size {
            let chunk_start = data.len();
            let chunk_end = (chunk_start + soft_max).min(data_size);

            data.resize(chunk_end, Self::default());
            Self::read_slice(read, &mut data[chunk_start .. chunk_end])?;
        }

        Ok(data)
    }

    /// Write the slice length as an `i32`, then the contents of the slice.
    #[inline]
    fn write_i32_sized_slice<W: Write>(write: &mut W, slice: &[Self]) -> UnitResult {
        i32::try_from(slice.len())
            .map_err(|_| Error::argument("slice too large for file"))?
            .write(write)?;

        Self::write_slice(write, slice)
    }

    /// Read an `i32` length prefix, then that many values.
    #[inline]
    fn read_i32_sized_vec(read: &mut impl Read, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        let size = i32::read(read)?;
        if size < 0 { return Err(Error::corrupt(purpose)); }
        Self::read_vec(read, size as usize, soft_max, hard_max, purpose)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            #[inline]
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_big_endian()?)
            }

            #[inline]
            fn write(self, write: &mut impl Write) -> UnitResult {
                write.write_as_big_endian(&self)?;
                Ok(())
            }

            #[inline]
            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_big_endian_into(slice)?;
                Ok(())
            }

            #[inline]
            fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
                write.write_as_big_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);


impl Data for f16 {
    #[inline]
    fn read(read: &mut impl Read) -> Result<Self> {
        u16::read(read).map(f16::from_bits)
    }

    #[inline]
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
        let bits = slice.reinterpret_cast_mut();
        u16::read_slice(read, bits)
    }

    #[inline]
    fn write(self, write: &mut impl Write) -> UnitResult {
        self.to_bits().write(write)
    }

    #[inline]
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
        let bits = slice.reinterpret_cast();
        u16::write_slice(write, bits)
    }
}

use std::convert::TryFrom;
