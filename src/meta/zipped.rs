
//! Attribute values that are stored deflate-compressed inside the file
//! and decompressed only when their contents are accessed.

use crate::error::{Error, Result, UnitResult, i32_to_usize, usize_to_i32};
use crate::io::{Data, Read, Write};
use crate::meta::attribute::Text;
use std::borrow::Cow;

/// The representation of one of the zipped attribute values:
/// either the plain contents, or the compressed bytes
/// together with the size that inflating them must produce.
#[derive(Clone, Debug)]
enum Zipped<T> {
    Inflated(T),
    Deflated {
        bytes: Vec<u8>,
        inflated_size: usize,
    },
}

fn deflate(bytes: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(bytes, 6)
}

fn inflate(bytes: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let options = zune_inflate::DeflateOptions::default()
        .set_limit(expected_size)
        .set_size_hint(expected_size);

    let inflated = zune_inflate::DeflateDecoder::new_with_options(bytes, options)
        .decode_zlib()
        .map_err(|_| Error::compression("zlib-compressed attribute malformed"))?;

    if inflated.len() != expected_size {
        return Err(Error::corrupt("compressed attribute size prefix mismatch"));
    }

    Ok(inflated)
}

/// Write an `i32` size prefix, then the compressed payload.
fn write_deflated<W: Write>(write: &mut W, inflated_size: usize, bytes: &[u8]) -> UnitResult {
    usize_to_i32(inflated_size, "attribute too large for file")?.write(write)?;
    u8::write_slice(write, bytes)
}

/// Read the `i32` size prefix and the remaining compressed payload
/// of an attribute record with the specified total payload size.
fn read_deflated<R: Read>(read: &mut R, total_size: usize) -> Result<(usize, Vec<u8>)> {
    if total_size < i32::BYTE_SIZE {
        return Err(Error::corrupt("compressed attribute shorter than its size prefix"));
    }

    let inflated_size = i32_to_usize(i32::read(read)?, "attribute size prefix")?;

    let bytes = u8::read_vec(
        read, total_size - i32::BYTE_SIZE,
        2048, Some(u16::MAX as usize), "attribute size"
    )?;

    Ok((inflated_size, bytes))
}


/// A piece of text that is stored deflate-compressed in the file.
/// Reading the attribute does not decompress it; the contents
/// are inflated lazily when they are accessed.
#[derive(Clone, Debug)]
pub struct ZippedString {
    state: Zipped<Vec<u8>>,
}

impl ZippedString {

    /// Create from plain text bytes. Compression happens when writing.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        ZippedString { state: Zipped::Inflated(bytes.into()) }
    }

    /// Whether the contents are currently stored in compressed form.
    pub fn is_deflated(&self) -> bool {
        matches!(self.state, Zipped::Deflated { .. })
    }

    /// The text bytes. Inflates into a temporary copy
    /// if the contents are currently compressed.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>> {
        match &self.state {
            Zipped::Inflated(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),

            Zipped::Deflated { bytes, inflated_size } =>
                Ok(Cow::Owned(inflate(bytes, *inflated_size)?)),
        }
    }

    /// The text bytes, for modification.
    /// Inflates the contents in place if they are currently compressed.
    pub fn bytes_mut(&mut self) -> Result<&mut Vec<u8>> {
        let inflated = match &self.state {
            Zipped::Inflated(_) => None,
            Zipped::Deflated { bytes, inflated_size } => Some(inflate(bytes, *inflated_size)?),
        };

        if let Some(bytes) = inflated {
            self.state = Zipped::Inflated(bytes);
        }

        match &mut self.state {
            Zipped::Inflated(bytes) => Ok(bytes),
            Zipped::Deflated { .. } => unreachable!("string was just inflated"),
        }
    }

    /// Write the size prefix and the compressed contents.
    /// Compresses on the fly if the contents are currently plain.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        match &self.state {
            Zipped::Deflated { bytes, inflated_size } =>
                write_deflated(write, *inflated_size, bytes),

            Zipped::Inflated(plain) =>
                write_deflated(write, plain.len(), &deflate(plain)),
        }
    }

    /// Read an attribute payload of the specified total size.
    /// Keeps the contents compressed until they are accessed.
    pub fn read<R: Read>(read: &mut R, total_size: usize) -> Result<Self> {
        let (inflated_size, bytes) = read_deflated(read, total_size)?;
        Ok(ZippedString { state: Zipped::Deflated { bytes, inflated_size } })
    }
}

impl<'s> From<&'s str> for ZippedString {
    fn from(string: &'s str) -> Self {
        ZippedString::new(string.as_bytes().to_vec())
    }
}

/// Two zipped strings are equal exactly if their inflated contents
/// are equal, regardless of whether either of them is currently
/// compressed. Contents that cannot be inflated compare as unequal.
impl PartialEq for ZippedString {
    fn eq(&self, other: &Self) -> bool {
        match (self.bytes(), other.bytes()) {
            (Ok(own), Ok(other)) => own == other,
            _ => false,
        }
    }
}


/// A sequence of texts that is stored deflate-compressed in the file.
/// Reading the attribute does not decompress it; the contents
/// are inflated lazily when they are accessed.
#[derive(Clone, Debug)]
pub struct ZippedStringVector {
    state: Zipped<Vec<Text>>,
}

impl ZippedStringVector {

    /// Create from plain texts. Compression happens when writing.
    pub fn new(texts: impl Into<Vec<Text>>) -> Self {
        ZippedStringVector { state: Zipped::Inflated(texts.into()) }
    }

    /// Whether the contents are currently stored in compressed form.
    pub fn is_deflated(&self) -> bool {
        matches!(self.state, Zipped::Deflated { .. })
    }

    /// The texts. Inflates into a temporary copy
    /// if the contents are currently compressed.
    pub fn texts(&self) -> Result<Cow<'_, [Text]>> {
        match &self.state {
            Zipped::Inflated(texts) => Ok(Cow::Borrowed(texts.as_slice())),

            Zipped::Deflated { bytes, inflated_size } =>
                Ok(Cow::Owned(unpack_texts(&inflate(bytes, *inflated_size)?)?)),
        }
    }

    /// The texts, for modification.
    /// Inflates the contents in place if they are currently compressed.
    pub fn texts_mut(&mut self) -> Result<&mut Vec<Text>> {
        let inflated = match &self.state {
            Zipped::Inflated(_) => None,

            Zipped::Deflated { bytes, inflated_size } =>
                Some(unpack_texts(&inflate(bytes, *inflated_size)?)?),
        };

        if let Some(texts) = inflated {
            self.state = Zipped::Inflated(texts);
        }

        match &mut self.state {
            Zipped::Inflated(texts) => Ok(texts),
            Zipped::Deflated { .. } => unreachable!("string vector was just inflated"),
        }
    }

    /// Write the size prefix and the compressed contents.
    /// Compresses on the fly if the contents are currently plain.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        match &self.state {
            Zipped::Deflated { bytes, inflated_size } =>
                write_deflated(write, *inflated_size, bytes),

            Zipped::Inflated(texts) => {
                let packed = pack_texts(texts)?;
                write_deflated(write, packed.len(), &deflate(&packed))
            },
        }
    }

    /// Read an attribute payload of the specified total size.
    /// Keeps the contents compressed until they are accessed.
    pub fn read<R: Read>(read: &mut R, total_size: usize) -> Result<Self> {
        let (inflated_size, bytes) = read_deflated(read, total_size)?;
        Ok(ZippedStringVector { state: Zipped::Deflated { bytes, inflated_size } })
    }
}

/// Two zipped string vectors are equal exactly if their inflated
/// contents are equal, regardless of whether either of them is
/// currently compressed.
impl PartialEq for ZippedStringVector {
    fn eq(&self, other: &Self) -> bool {
        match (self.texts(), other.texts()) {
            (Ok(own), Ok(other)) => own == other,
            _ => false,
        }
    }
}

/// The layout the compressor sees: the number of texts,
/// then for each text its length and its bytes.
fn pack_texts(texts: &[Text]) -> Result<Vec<u8>> {
    let mut packed = Vec::new();

    usize_to_i32(texts.len(), "too many texts")?.write(&mut packed)?;

    for text in texts {
        usize_to_i32(text.len(), "text too long")?.write(&mut packed)?;
        u8::write_slice(&mut packed, text.bytes())?;
    }

    Ok(packed)
}

fn unpack_texts(mut packed: &[u8]) -> Result<Vec<Text>> {
    let read = &mut packed;
    let count = i32_to_usize(i32::read(read)?, "text count")?;

    let mut texts = Vec::with_capacity(count.min(1024));
    for _ in 0 .. count {
        let length = i32_to_usize(i32::read(read)?, "text length")?;
        texts.push(Text::read_sized(read, length)?);
    }

    if !read.is_empty() {
        return Err(Error::corrupt("extraneous bytes after last text"));
    }

    Ok(texts)
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_round_trip_stays_equal() {
        let string = ZippedString::from("hello hello hello hello");

        let mut bytes = Vec::new();
        string.write(&mut bytes).unwrap();

        // the first four bytes state the inflated size, which is 23
        assert_eq!(i32::read(&mut bytes.as_slice()).unwrap(), 23);

        let decoded = ZippedString::read(&mut bytes.as_slice(), bytes.len()).unwrap();
        assert!(decoded.is_deflated());

        // equality must look through the compressed representation
        assert_eq!(decoded, string);
        assert_eq!(decoded.bytes().unwrap().as_ref(), b"hello hello hello hello");
    }

    #[test]
    fn accessing_mutably_inflates_in_place() {
        let mut bytes = Vec::new();
        ZippedString::from("some repetitive text, text, text").write(&mut bytes).unwrap();

        let mut decoded = ZippedString::read(&mut bytes.as_slice(), bytes.len()).unwrap();
        assert!(decoded.is_deflated());

        decoded.bytes_mut().unwrap().extend_from_slice(b", more text");
        assert!(!decoded.is_deflated());
        assert_eq!(
            decoded.bytes().unwrap().as_ref(),
            b"some repetitive text, text, text, more text".as_slice()
        );
    }

    #[test]
    fn wrong_size_prefix_is_detected() {
        let mut bytes = Vec::new();
        ZippedString::from("twenty three brown owls").write(&mut bytes).unwrap();

        bytes[3] = 99; // corrupt the inflated size prefix

        let decoded = ZippedString::read(&mut bytes.as_slice(), bytes.len()).unwrap();
        assert!(decoded.bytes().is_err());
    }

    #[test]
    fn undersized_attribute_is_corrupt() {
        let bytes = [0_u8, 0];
        assert!(ZippedString::read(&mut bytes.as_slice(), bytes.len()).is_err());
    }

    #[test]
    fn vector_round_trip_stays_equal() {
        let texts = ZippedStringVector::new(vec![
            Text::from("first"), Text::from(""), Text::from("third third third"),
        ]);

        let mut bytes = Vec::new();
        texts.write(&mut bytes).unwrap();

        let decoded = ZippedStringVector::read(&mut bytes.as_slice(), bytes.len()).unwrap();
        assert!(decoded.is_deflated());
        assert_eq!(decoded, texts);

        let contents = decoded.texts().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[2], *"third third third");
    }

    #[test]
    fn vector_layout_is_count_then_sized_entries() {
        let packed = pack_texts(&[Text::from("ab"), Text::from("c")]).unwrap();

        assert_eq!(packed, vec![
            0, 0, 0, 2, // two texts
            0, 0, 0, 2, b'a', b'b',
            0, 0, 0, 1, b'c',
        ]);

        assert_eq!(unpack_texts(&packed).unwrap(), vec![Text::from("ab"), Text::from("c")]);
    }
}
