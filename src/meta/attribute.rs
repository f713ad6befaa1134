
//! Contains all meta data attribute types that the file format defines
//! and that the tiled and scan line machinery consumes.

use crate::compression::Compression;
use crate::error::{Error, Result, UnitResult, i32_to_usize, usize_to_i32};
use crate::io::{Data, Read, Write};
use crate::math::Vec2;
use crate::meta::zipped::{ZippedString, ZippedStringVector};
use smallvec::SmallVec;


/// The raw bytes that make up a short text in a file.
/// Each `u8` is a single char.
// will mostly be "R", "G", "B" or "tiledesc"
pub type TextBytes = SmallVec<[u8; 24]>;

/// A byte slice, interpreted as text.
pub type TextSlice = [u8];

/// A short text with a byte per character,
/// used for attribute names, type names, and channel names.
/// Ordering is byte-wise, which sorts ASCII names alphabetically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Text {
    bytes: TextBytes,
}

impl Text {

    /// Create a `Text` from any byte sequence. Does not validate.
    pub fn from_bytes_unchecked(bytes: TextBytes) -> Self {
        Text { bytes }
    }

    /// The bytes of this text.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Number of characters in this text.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether this text contains no characters.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A text can only be stored in null terminated form
    /// if it is not empty and does not contain null bytes itself.
    pub fn validate(&self, null_terminated: bool) -> UnitResult {
        if null_terminated && self.bytes.is_empty() {
            return Err(Error::argument("text must not be empty"));
        }

        if null_terminated && self.bytes.contains(&0) {
            return Err(Error::argument("text must not contain null bytes"));
        }

        if self.bytes.len() > 255 {
            return Err(Error::argument("text too long"));
        }

        Ok(())
    }

    /// Without validation, write the characters and a trailing null byte.
    pub fn write_null_terminated<W: Write>(&self, write: &mut W) -> UnitResult {
        u8::write_slice(write, self.bytes())?;
        0_u8.write(write)?;
        Ok(())
    }

    /// Read until the next null byte, not including the null byte.
    /// Returns an empty text if the first byte is already the null byte.
    pub fn read_null_terminated<R: Read>(read: &mut R, max_len: usize) -> Result<Self> {
        let mut bytes = TextBytes::new();

        loop {
            let next = u8::read(read)?;
            if next == 0 { break; }

            if bytes.len() >= max_len {
                return Err(Error::corrupt("text too long"));
            }

            bytes.push(next);
        }

        Ok(Text { bytes })
    }

    /// Read a text of the exact specified byte length.
    pub fn read_sized<R: Read>(read: &mut R, size: usize) -> Result<Self> {
        let bytes = u8::read_vec(read, size, 1024, Some(u16::MAX as usize), "text length")?;
        Ok(Text { bytes: TextBytes::from_vec(bytes) })
    }
}

impl<'s> From<&'s str> for Text {
    fn from(string: &'s str) -> Self {
        Text { bytes: TextBytes::from_slice(string.as_bytes()) }
    }
}

impl PartialEq<str> for Text {
    fn eq(&self, other: &str) -> bool {
        self.bytes() == other.as_bytes()
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in self.bytes() {
            write!(formatter, "{}", byte as char)?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "\"{}\"", self)
    }
}


/// An integer rectangle in pixel space, for example the data window of an image.
/// The position is the top left corner, which is the smallest coordinate.
/// The largest contained coordinate is `position + size - 1`, inclusively.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle.
    /// The `x` coordinate grows to the right, the `y` coordinate grows downwards.
    pub position: Vec2<i32>,

    /// How many pixels to include in this rectangle.
    pub size: Vec2<usize>,
}

impl IntegerBounds {

    /// Create a rectangle with the specified corner position and size.
    pub fn new(position: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        IntegerBounds { position: position.into(), size: size.into() }
    }

    /// Create a rectangle at the origin of pixel space.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        IntegerBounds::new(Vec2(0, 0), size)
    }

    /// The largest coordinate still contained in this rectangle, inclusively.
    pub fn max(self) -> Vec2<i32> {
        self.position + self.size.to_i32() - Vec2(1, 1)
    }

    /// Rectangles with an area of zero are not valid in a file.
    pub fn validate(&self) -> UnitResult {
        if self.size.width() == 0 || self.size.height() == 0 {
            return Err(Error::argument("rectangle width and height must not be zero"));
        }

        // the max coordinate must not overflow an i32
        let max_x = i64::from(self.position.x()) + self.size.width() as i64 - 1;
        let max_y = i64::from(self.position.y()) + self.size.height() as i64 - 1;
        if max_x > i64::from(i32::MAX) || max_y > i64::from(i32::MAX) {
            return Err(Error::argument("rectangle size overflows the coordinate space"));
        }

        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let max = self.max();

        self.position.x().write(write)?;
        self.position.y().write(write)?;
        max.x().write(write)?;
        max.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let min_x = i32::read(read)?;
        let min_y = i32::read(read)?;
        let max_x = i32::read(read)?;
        let max_y = i32::read(read)?;

        if max_x < min_x || max_y < min_y {
            return Err(Error::corrupt("rectangle corners are in the wrong order"));
        }

        let width = i64::from(max_x) - i64::from(min_x) + 1;
        let height = i64::from(max_y) - i64::from(min_y) + 1;

        Ok(IntegerBounds {
            position: Vec2(min_x, min_y),
            size: Vec2(width as usize, height as usize),
        })
    }
}


/// The type of the samples in a specific channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

impl SampleType {

    /// How many bytes a single sample occupies, both in a file and in memory.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleType::U32 => u32::BYTE_SIZE,
            SampleType::F16 => u16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            SampleType::U32 => 0_i32.write(write),
            SampleType::F16 => 1_i32.write(write),
            SampleType::F32 => 2_i32.write(write),
        }
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        match i32::read(read)? {
            0 => Ok(SampleType::U32),
            1 => Ok(SampleType::F16),
            2 => Ok(SampleType::F32),
            _ => Err(Error::corrupt("unknown pixel data type")),
        }
    }
}


/// A single channel of an image, described by
/// its name, sample type and subsampling rates.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// The name of this channel, for example `R` or `depth`.
    pub name: Text,

    /// The type of the samples in this channel.
    pub sample_type: SampleType,

    /// Whether the samples in this channel should be
    /// quantized linearly by a lossy compressor.
    pub quantize_linearly: bool,

    /// How many pixels of the image correspond to one sample in this channel.
    /// A sampling rate of (2, 2) means that this channel stores
    /// one sample for each block of 2×2 pixels.
    /// Tiled images require a sampling rate of (1, 1) for all channels.
    pub sampling: Vec2<usize>,
}

impl ChannelDescription {

    /// Create a channel without subsampling.
    pub fn named(name: impl Into<Text>, sample_type: SampleType) -> Self {
        ChannelDescription {
            name: name.into(),
            sample_type,
            quantize_linearly: false,
            sampling: Vec2(1, 1),
        }
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;

        (self.quantize_linearly as u8).write(write)?;
        u8::write_slice(write, &[0_u8; 3])?; // reserved bytes

        usize_to_i32(self.sampling.x(), "x sampling rate")?.write(write)?;
        usize_to_i32(self.sampling.y(), "y sampling rate")?.write(write)?;
        Ok(())
    }

    /// Read a channel, whose name was already read from the byte stream.
    pub fn read_named<R: Read>(read: &mut R, name: Text) -> Result<Self> {
        let sample_type = SampleType::read(read)?;

        let quantize_linearly = match u8::read(read)? {
            0 => false,
            1 => true,
            _ => return Err(Error::corrupt("invalid linearity flag")),
        };

        let mut reserved = [0_u8; 3];
        u8::read_slice(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read(read)?, "x sampling rate")?;
        let y_sampling = i32_to_usize(i32::read(read)?, "y sampling rate")?;

        if x_sampling == 0 || y_sampling == 0 {
            return Err(Error::corrupt("zero sampling rate"));
        }

        Ok(ChannelDescription {
            name, sample_type, quantize_linearly,
            sampling: Vec2(x_sampling, y_sampling),
        })
    }
}


/// The list of all channels of an image, ordered alphabetically.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelList {

    /// The channels, ordered alphabetically by name.
    pub list: SmallVec<[ChannelDescription; 5]>,

    /// The number of bytes that one pixel of all channels combined
    /// occupies in a file, without compression and without subsampling.
    pub bytes_per_pixel: usize,
}

impl ChannelList {

    /// Create a channel list. The channels are sorted alphabetically by name.
    pub fn new(mut channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        channels.sort_by(|a, b| a.name.cmp(&b.name));

        let bytes_per_pixel = channels.iter()
            .map(|channel| channel.sample_type.bytes_per_sample())
            .sum();

        ChannelList { list: channels, bytes_per_pixel }
    }

    /// Channel names must be unique and sorted alphabetically.
    pub fn validate(&self) -> UnitResult {
        if self.list.is_empty() {
            return Err(Error::argument("at least one channel is required"));
        }

        for channel in &self.list {
            channel.name.validate(true)?;
        }

        let sorted = self.list.windows(2)
            .all(|pair| pair[0].name < pair[1].name);

        if !sorted {
            return Err(Error::argument("channel names must be unique and sorted"));
        }

        Ok(())
    }

    /// Without validation, write all channels and the trailing null byte.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        for channel in &self.list {
            channel.write(write)?;
        }

        0_u8.write(write)?; // an empty name terminates the list
        Ok(())
    }

    /// Read channels until the trailing null byte. Does not validate.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let mut channels = SmallVec::new();

        loop {
            let name = Text::read_null_terminated(read, 255)?;
            if name.is_empty() { break; } // the list ends with an empty name

            channels.push(ChannelDescription::read_named(read, name)?);
        }

        Ok(ChannelList::new(channels))
    }
}


/// In what order the blocks of pixel data appear in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// The blocks in the file are ordered from the top of the image
    /// to the bottom, left to right within one row of blocks.
    Increasing,

    /// The blocks in the file are ordered from the bottom of the image
    /// to the top, left to right within one row of blocks.
    Decreasing,

    /// The blocks appear in the file in the order in which they were
    /// produced. Only tiled files may use this order.
    Random,
}

impl LineOrder {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        match self {
            LineOrder::Increasing => 0_u8.write(write),
            LineOrder::Decreasing => 1_u8.write(write),
            LineOrder::Random => 2_u8.write(write),
        }
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        match u8::read(read)? {
            0 => Ok(LineOrder::Increasing),
            1 => Ok(LineOrder::Decreasing),
            2 => Ok(LineOrder::Random),
            _ => Err(Error::corrupt("unknown line order")),
        }
    }
}


/// Whether a tiled image stores smaller versions of itself,
/// and which aspect ratios those smaller versions cover.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelMode {

    /// Only the full resolution is stored.
    Singular,

    /// A pyramid of increasingly smaller levels,
    /// where width and height shrink together.
    MipMap,

    /// All combinations of separately halved width and height are stored.
    RipMap,
}

/// Describes how a tiled image is divided into tiles,
/// and whether it stores multiple resolution levels.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileDescription {

    /// The size of each tile in pixels.
    /// Stays the same number of pixels across all levels.
    pub tile_size: Vec2<usize>,

    /// Whether to also store smaller versions of the image.
    pub level_mode: LevelMode,
}

impl TileDescription {

    /// Tile sizes of zero pixels are not valid in a file.
    pub fn validate(&self) -> UnitResult {
        if self.tile_size.width() == 0 || self.tile_size.height() == 0 {
            return Err(Error::argument("tile width and height must not be zero"));
        }

        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        (self.tile_size.x() as u32).write(write)?;
        (self.tile_size.y() as u32).write(write)?;

        match self.level_mode {
            LevelMode::Singular => 0_u8.write(write)?,
            LevelMode::MipMap => 1_u8.write(write)?,
            LevelMode::RipMap => 2_u8.write(write)?,
        }

        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let x_size = u32::read(read)? as usize;
        let y_size = u32::read(read)? as usize;

        let level_mode = match u8::read(read)? {
            0 => LevelMode::Singular,
            1 => LevelMode::MipMap,
            2 => LevelMode::RipMap,
            _ => return Err(Error::corrupt("unknown level mode")),
        };

        Ok(TileDescription { tile_size: Vec2(x_size, y_size), level_mode })
    }
}


/// Contains the value of a single attribute in a file header.
/// Attribute types that this crate does not interpret
/// are kept as uninterpreted bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {

    /// The list of channels of the image.
    ChannelList(ChannelList),

    /// The compression method of the pixel data.
    Compression(Compression),

    /// A plain 32-bit float value.
    F32(f32),

    /// Two 32-bit float values, for example a screen window center.
    F32Vec2(Vec2<f32>),

    /// A plain 32-bit signed integer value.
    I32(i32),

    /// An integer rectangle, for example a data window.
    IntegerBounds(IntegerBounds),

    /// The order of the pixel data blocks in the file.
    LineOrder(LineOrder),

    /// A short piece of text.
    Text(Text),

    /// The tile layout of a tiled image.
    TileDescription(TileDescription),

    /// A piece of text that is stored deflate-compressed in the file.
    ZippedString(ZippedString),

    /// A sequence of texts that is stored deflate-compressed in the file.
    ZippedStringVector(ZippedStringVector),

    /// An attribute of a type that this crate does not interpret.
    /// The bytes are preserved so that copying a file keeps the attribute intact.
    Custom {

        /// The name of the type of this attribute.
        type_name: Text,

        /// The uninterpreted payload bytes of this attribute.
        bytes: Vec<u8>,
    },
}

/// The name of each attribute type, as it appears in a file.
pub mod type_names {

    /// The type name of a channel list attribute.
    pub const CHANNEL_LIST: &[u8] = b"chlist";

    /// The type name of a compression attribute.
    pub const COMPRESSION: &[u8] = b"compression";

    /// The type name of a float attribute.
    pub const F32: &[u8] = b"float";

    /// The type name of a float vector attribute.
    pub const F32_VEC2: &[u8] = b"v2f";

    /// The type name of an integer attribute.
    pub const I32: &[u8] = b"int";

    /// The type name of an integer rectangle attribute.
    pub const INTEGER_BOUNDS: &[u8] = b"box2i";

    /// The type name of a line order attribute.
    pub const LINE_ORDER: &[u8] = b"lineOrder";

    /// The type name of a text attribute.
    pub const TEXT: &[u8] = b"string";

    /// The type name of a tile description attribute.
    pub const TILES: &[u8] = b"tiledesc";

    /// The type name of a deflate-compressed text attribute.
    pub const ZIPPED_STRING: &[u8] = b"zstring";

    /// The type name of a deflate-compressed text sequence attribute.
    pub const ZIPPED_STRING_VECTOR: &[u8] = b"zstringvector";
}

impl AttributeValue {

    /// The name of the type of this value, as it appears in a file.
    pub fn type_name(&self) -> &[u8] {
        use AttributeValue::*;

        match self {
            ChannelList(_) => type_names::CHANNEL_LIST,
            Compression(_) => type_names::COMPRESSION,
            F32(_) => type_names::F32,
            F32Vec2(_) => type_names::F32_VEC2,
            I32(_) => type_names::I32,
            IntegerBounds(_) => type_names::INTEGER_BOUNDS,
            LineOrder(_) => type_names::LINE_ORDER,
            Text(_) => type_names::TEXT,
            TileDescription(_) => type_names::TILES,
            ZippedString(_) => type_names::ZIPPED_STRING,
            ZippedStringVector(_) => type_names::ZIPPED_STRING_VECTOR,
            Custom { type_name, .. } => type_name.bytes(),
        }
    }

    /// Write the payload of this attribute, without name, type and size.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        use AttributeValue::*;

        match self {
            ChannelList(value) => value.write(write),
            Compression(value) => value.write(write),
            F32(value) => value.write(write),
            F32Vec2(value) => { value.x().write(write)?; value.y().write(write) },
            I32(value) => value.write(write),
            IntegerBounds(value) => value.write(write),
            LineOrder(value) => value.write(write),
            Text(value) => u8::write_slice(write, value.bytes()),
            TileDescription(value) => value.write(write),
            ZippedString(value) => value.write(write),
            ZippedStringVector(value) => value.write(write),
            Custom { bytes, .. } => u8::write_slice(write, bytes),
        }
    }

    /// Read an attribute payload of the specified type and size.
    pub fn read<R: Read>(read: &mut R, type_name: &TextSlice, byte_size: usize) -> Result<Self> {
        use AttributeValue::*;

        Ok(match type_name {
            type_names::CHANNEL_LIST => ChannelList(self::ChannelList::read(read)?),
            type_names::COMPRESSION => Compression(crate::compression::Compression::read(read)?),
            type_names::F32 => F32(f32::read(read)?),
            type_names::F32_VEC2 => F32Vec2(Vec2(f32::read(read)?, f32::read(read)?)),
            type_names::I32 => I32(i32::read(read)?),
            type_names::INTEGER_BOUNDS => IntegerBounds(self::IntegerBounds::read(read)?),
            type_names::LINE_ORDER => LineOrder(self::LineOrder::read(read)?),
            type_names::TEXT => Text(self::Text::read_sized(read, byte_size)?),
            type_names::TILES => TileDescription(self::TileDescription::read(read)?),
            type_names::ZIPPED_STRING => ZippedString(self::ZippedString::read(read, byte_size)?),
            type_names::ZIPPED_STRING_VECTOR => ZippedStringVector(self::ZippedStringVector::read(read, byte_size)?),

            _ => Custom {
                type_name: self::Text::from_bytes_unchecked(TextBytes::from_slice(type_name)),
                bytes: u8::read_vec(read, byte_size, 2048, Some(u16::MAX as usize), "attribute size")?,
            },
        })
    }

    /// Return the tile description, or an error for other attribute types.
    pub fn to_tile_description(&self) -> Result<TileDescription> {
        match self {
            AttributeValue::TileDescription(value) => Ok(*value),
            _ => Err(Error::corrupt("attribute type mismatch")),
        }
    }
}
