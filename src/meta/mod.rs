
//! Describes the meta data that is stored at the beginning of a file:
//! the magic number, the version word, and the header attributes.

pub mod attribute;
pub mod zipped;

use crate::compression::Compression;
use crate::error::{Error, Result, UnitResult, i32_to_usize};
use crate::io::{Data, Read, Write};
use crate::math::Vec2;
use crate::meta::attribute::*;


/// The first four bytes of each file.
/// Used to abort reading files of other formats early.
pub mod magic_number {
    use super::*;

    /// The magic number `20000630`, encoded as a big endian `i32`.
    pub const BYTES: [u8; 4] = [0x01, 0x31, 0x2f, 0x76];

    /// Without validation, write the magic number to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consume four bytes from the reader and check that they are the magic number.
    pub fn validate(read: &mut impl Read) -> UnitResult {
        let mut magic = [0_u8; 4];
        u8::read_slice(read, &mut magic)?;

        if magic == self::BYTES { Ok(()) }
        else { Err(Error::corrupt("file identifier missing")) }
    }
}


/// The version number that this crate reads and writes.
pub const CURRENT_VERSION: i32 = 2;

/// The bits of the version word that contain the version number.
pub const VERSION_NUMBER_FIELD: i32 = 0x0000_00ff;

/// The bits of the version word that are treated as a set of flags.
pub const VERSION_FLAGS_FIELD: i32 = !VERSION_NUMBER_FIELD;

/// The flag that distinguishes tiled files from scan line files.
pub const TILED_FLAG: i32 = 0x0000_0100;

/// Extract the version number from a version word.
pub fn get_version(version_word: i32) -> i32 {
    version_word & VERSION_NUMBER_FIELD
}

/// Extract the flag bits from a version word.
pub fn get_flags(version_word: i32) -> i32 {
    version_word & VERSION_FLAGS_FIELD
}

/// Whether this crate knows all flags that are set in the specified flag bits.
pub fn supports_flags(flags: i32) -> bool {
    flags & !TILED_FLAG == 0
}


/// A summary of the requirements that must be met to read a file,
/// as stated by the version word at the beginning of the file.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Requirements {

    /// The file format version. This crate supports version 2.
    pub file_format_version: i32,

    /// Whether the pixels are stored as tiles instead of scan line blocks.
    pub is_tiled: bool,
}

impl Requirements {

    /// The version word for a new file of the current version.
    pub fn new(is_tiled: bool) -> Self {
        Requirements { file_format_version: CURRENT_VERSION, is_tiled }
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use ::bit_field::BitField;

        let version_word = i32::read(read)?;

        if !supports_flags(get_flags(version_word)) {
            return Err(Error::corrupt("unsupported version flags"));
        }

        Ok(Requirements {
            file_format_version: get_version(version_word),
            is_tiled: (version_word as u32).get_bit(8),
        })
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use ::bit_field::BitField;

        let mut version_word = self.file_format_version as u32;
        version_word.set_bit(8, self.is_tiled);

        (version_word as i32).write(write)
    }

    /// Check that a reader of this crate can process such a file.
    pub fn validate(&self) -> UnitResult {
        if self.file_format_version != CURRENT_VERSION {
            return Err(Error::corrupt("unsupported file format version"));
        }

        Ok(())
    }
}


/// The name of each attribute that this crate interprets,
/// as it appears in a file.
pub mod attribute_names {

    /// The name of the channel list attribute.
    pub const CHANNELS: &[u8] = b"channels";

    /// The name of the compression attribute.
    pub const COMPRESSION: &[u8] = b"compression";

    /// The name of the data window attribute.
    pub const DATA_WINDOW: &[u8] = b"dataWindow";

    /// The name of the display window attribute.
    pub const DISPLAY_WINDOW: &[u8] = b"displayWindow";

    /// The name of the line order attribute.
    pub const LINE_ORDER: &[u8] = b"lineOrder";

    /// The name of the pixel aspect ratio attribute.
    pub const PIXEL_ASPECT: &[u8] = b"pixelAspectRatio";

    /// The name of the screen window center attribute.
    pub const SCREEN_WINDOW_CENTER: &[u8] = b"screenWindowCenter";

    /// The name of the screen window width attribute.
    pub const SCREEN_WINDOW_WIDTH: &[u8] = b"screenWindowWidth";

    /// The name of the tile description attribute.
    pub const TILES: &[u8] = b"tiles";
}

fn missing_attribute(name: &str) -> Error {
    Error::corrupt(format!("missing or invalid {} attribute", name))
}


/// The header of an image file. Describes the pixel layout of the image,
/// and carries any number of additional attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {

    /// The list of channels of the image, ordered alphabetically.
    pub channels: ChannelList,

    /// How the pixel data blocks of the image are compressed.
    pub compression: Compression,

    /// In what order the pixel data blocks appear in the file.
    pub line_order: LineOrder,

    /// The rectangle of pixel space that the stored pixels cover.
    pub data_window: IntegerBounds,

    /// The rectangle of pixel space that a viewer should display.
    pub display_window: IntegerBounds,

    /// The width of one pixel divided by its height.
    pub pixel_aspect: f32,

    /// Part of the perspective projection. Default should be `(0, 0)`.
    pub screen_window_center: Vec2<f32>,

    /// Part of the perspective projection. Default should be `1`.
    pub screen_window_width: f32,

    /// The tile layout of the image. Present exactly if the image is tiled.
    pub tiles: Option<TileDescription>,

    /// All attributes that this crate does not interpret itself,
    /// in the order in which they appear in the file.
    pub custom: Vec<(Text, AttributeValue)>,
}

impl Header {

    /// Create a header with default display settings.
    pub fn new(
        channels: ChannelList,
        compression: Compression,
        line_order: LineOrder,
        data_window: IntegerBounds,
    ) -> Self {
        Header {
            channels, compression, line_order, data_window,
            display_window: data_window,
            pixel_aspect: 1.0,
            screen_window_center: Vec2(0.0, 0.0),
            screen_window_width: 1.0,
            tiles: None,
            custom: Vec::new(),
        }
    }

    /// Set the tile layout of this header, making the image tiled.
    pub fn with_tiles(mut self, tiles: TileDescription) -> Self {
        self.tiles = Some(tiles);
        self
    }

    /// Add a custom attribute to this header.
    pub fn with_attribute(mut self, name: impl Into<Text>, value: AttributeValue) -> Self {
        self.custom.push((name.into(), value));
        self
    }

    /// The tile layout of the image, or an error for scan line images.
    pub fn tile_description(&self) -> Result<TileDescription> {
        self.tiles.ok_or_else(|| missing_attribute("tiles"))
    }

    /// Look up a custom attribute by name.
    pub fn custom_attribute(&self, name: &TextSlice) -> Option<&AttributeValue> {
        self.custom.iter()
            .find(|(attribute_name, _)| attribute_name.bytes() == name)
            .map(|(_, value)| value)
    }

    /// Read all attribute records until the empty name that ends the header.
    /// Does not validate the resulting header.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let mut channels = None;
        let mut compression = None;
        let mut line_order = None;
        let mut data_window = None;
        let mut display_window = None;
        let mut pixel_aspect = None;
        let mut screen_window_center = None;
        let mut screen_window_width = None;
        let mut tiles = None;
        let mut custom = Vec::new();

        loop {
            let name = crate::meta::attribute::Text::read_null_terminated(read, 255)?;
            if name.is_empty() { break; } // an empty name ends the header

            let type_name = crate::meta::attribute::Text::read_null_terminated(read, 255)?;
            let byte_size = i32_to_usize(i32::read(read)?, "attribute size")?;

            // parse the payload from its own slice, so that a malformed
            // attribute cannot desynchronize the remaining header
            let payload = u8::read_vec(read, byte_size, 2048, Some(u16::MAX as usize), "attribute size")?;
            let mut payload_slice = payload.as_slice();

            let value = AttributeValue::read(&mut payload_slice, type_name.bytes(), byte_size)?;
            if !payload_slice.is_empty() {
                return Err(Error::corrupt("attribute size field mismatch"));
            }

            use crate::meta::attribute_names::*;
            use AttributeValue::*;

            match (name.bytes(), value) {
                (CHANNELS, ChannelList(value)) => channels = Some(value),
                (COMPRESSION, Compression(value)) => compression = Some(value),
                (LINE_ORDER, LineOrder(value)) => line_order = Some(value),
                (DATA_WINDOW, IntegerBounds(value)) => data_window = Some(value),
                (DISPLAY_WINDOW, IntegerBounds(value)) => display_window = Some(value),
                (PIXEL_ASPECT, F32(value)) => pixel_aspect = Some(value),
                (SCREEN_WINDOW_CENTER, F32Vec2(value)) => screen_window_center = Some(value),
                (SCREEN_WINDOW_WIDTH, F32(value)) => screen_window_width = Some(value),
                (TILES, TileDescription(value)) => tiles = Some(value),

                (CHANNELS, _) | (COMPRESSION, _) | (LINE_ORDER, _)
                | (DATA_WINDOW, _) | (DISPLAY_WINDOW, _) | (PIXEL_ASPECT, _)
                | (SCREEN_WINDOW_CENTER, _) | (SCREEN_WINDOW_WIDTH, _) | (TILES, _) =>
                    return Err(Error::corrupt("attribute type mismatch")),

                (_, value) => custom.push((name.clone(), value)),
            }
        }

        let data_window = data_window.ok_or_else(|| missing_attribute("dataWindow"))?;

        Ok(Header {
            channels: channels.ok_or_else(|| missing_attribute("channels"))?,
            compression: compression.ok_or_else(|| missing_attribute("compression"))?,
            line_order: line_order.ok_or_else(|| missing_attribute("lineOrder"))?,
            data_window,
            display_window: display_window.unwrap_or(data_window),
            pixel_aspect: pixel_aspect.unwrap_or(1.0),
            screen_window_center: screen_window_center.unwrap_or(Vec2(0.0, 0.0)),
            screen_window_width: screen_window_width.unwrap_or(1.0),
            tiles, custom,
        })
    }

    /// Without validation, write all attribute records
    /// and the empty name that ends the header.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        fn write_attribute<W: Write>(write: &mut W, name: &[u8], value: &AttributeValue) -> UnitResult {
            crate::meta::attribute::Text::from_bytes_unchecked(TextBytes::from_slice(name)).write_null_terminated(write)?;
            crate::meta::attribute::Text::from_bytes_unchecked(TextBytes::from_slice(value.type_name())).write_null_terminated(write)?;

            // the record states the payload size before the payload itself
            let mut payload = Vec::new();
            value.write(&mut payload)?;
            u8::write_i32_sized_slice(write, &payload)
        }

        use crate::meta::attribute_names::*;
        use AttributeValue::*;

        write_attribute(write, CHANNELS, &ChannelList(self.channels.clone()))?;
        write_attribute(write, COMPRESSION, &Compression(self.compression))?;
        write_attribute(write, DATA_WINDOW, &IntegerBounds(self.data_window))?;
        write_attribute(write, DISPLAY_WINDOW, &IntegerBounds(self.display_window))?;
        write_attribute(write, LINE_ORDER, &LineOrder(self.line_order))?;
        write_attribute(write, PIXEL_ASPECT, &F32(self.pixel_aspect))?;
        write_attribute(write, SCREEN_WINDOW_CENTER, &F32Vec2(self.screen_window_center))?;
        write_attribute(write, SCREEN_WINDOW_WIDTH, &F32(self.screen_window_width))?;

        if let Some(tiles) = self.tiles {
            write_attribute(write, TILES, &TileDescription(tiles))?;
        }

        for (name, value) in &self.custom {
            name.validate(true)?;
            write_attribute(write, name.bytes(), value)?;
        }

        0_u8.write(write)?; // an empty name ends the header
        Ok(())
    }

    /// Check that this header describes an image that can be stored in a file.
    /// Tiled images additionally require a tile description
    /// and forbid subsampled channels.
    pub fn sanity_check(&self, is_tiled: bool) -> UnitResult {
        self.channels.validate()?;
        self.data_window.validate()?;
        self.display_window.validate()?;

        if !(self.pixel_aspect > 0.0) || !self.pixel_aspect.is_finite() {
            return Err(Error::argument("pixel aspect ratio must be positive"));
        }

        if is_tiled {
            let tiles = self.tile_description()
                .map_err(|_| Error::argument("tiled images require a tile description"))?;

            tiles.validate()?;

            let all_samplings_are_one = self.channels.list.iter()
                .all(|channel| channel.sampling == Vec2(1, 1));

            if !all_samplings_are_one {
                return Err(Error::argument("all channels in a tiled image must have sampling (1,1)"));
            }
        }
        else if self.line_order == LineOrder::Random {
            return Err(Error::argument("scan line images cannot use random line order"));
        }

        Ok(())
    }
}


/// The complete meta data at the beginning of a file:
/// version requirements and the image header.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaData {

    /// The requirements stated by the version word of the file.
    pub requirements: Requirements,

    /// The header of the image.
    pub header: Header,
}

impl MetaData {

    /// Read the magic number, the version word and the header.
    /// The reader should be buffered. Validates the version word,
    /// but not the header.
    pub fn read_from_buffered(read: &mut impl Read) -> Result<Self> {
        magic_number::validate(read)?;

        let requirements = Requirements::read(read)?;
        requirements.validate()?;

        let header = Header::read(read)?;
        Ok(MetaData { requirements, header })
    }

    /// Validate the header, then write the magic number,
    /// the version word and the header.
    pub fn write_to_buffered(write: &mut impl Write, header: &Header, is_tiled: bool) -> UnitResult {
        header.sanity_check(is_tiled)?;

        magic_number::write(write)?;
        Requirements::new(is_tiled).write(write)?;
        header.write(write)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::zipped::ZippedString;
    use smallvec::smallvec;

    fn example_header() -> Header {
        Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::named("Y", SampleType::F32),
                ChannelDescription::named("A", SampleType::F16),
            ]),
            Compression::Zip16,
            LineOrder::Increasing,
            IntegerBounds::new(Vec2(0, 0), Vec2(11, 9)),
        )
    }

    #[test]
    fn version_word_round_trip() {
        let tiled = Requirements::new(true);

        let mut bytes = Vec::new();
        tiled.write(&mut bytes).unwrap();

        // version 2 in the low bits, the tiled flag at 0x100
        assert_eq!(bytes, vec![0x00, 0x00, 0x01, 0x02]);
        assert_eq!(Requirements::read(&mut bytes.as_slice()).unwrap(), tiled);

        assert_eq!(get_version(0x0102), 2);
        assert_eq!(get_flags(0x0102), 0x0100);
        assert!(supports_flags(0x0100));
        assert!(!supports_flags(0x0400));
    }

    #[test]
    fn unknown_version_flags_are_rejected() {
        let bytes = [0x00_u8, 0x00, 0x04, 0x02];
        assert!(Requirements::read(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn wrong_magic_number_is_rejected() {
        let mut bytes = Vec::new();
        MetaData::write_to_buffered(&mut bytes, &example_header(), false).unwrap();

        bytes[0] = 0x42;
        assert!(MetaData::read_from_buffered(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn round_trip_scan_line_header() {
        let header = example_header()
            .with_attribute("comment", AttributeValue::Text(Text::from("written by a test")))
            .with_attribute("note", AttributeValue::ZippedString(ZippedString::from("zipped note")));

        let mut bytes = Vec::new();
        MetaData::write_to_buffered(&mut bytes, &header, false).unwrap();

        let decoded = MetaData::read_from_buffered(&mut bytes.as_slice()).unwrap();
        assert!(!decoded.requirements.is_tiled);
        assert_eq!(decoded.header, header);

        assert_eq!(
            decoded.header.custom_attribute(b"comment"),
            Some(&AttributeValue::Text(Text::from("written by a test")))
        );
    }

    #[test]
    fn round_trip_tiled_header() {
        let header = example_header().with_tiles(TileDescription {
            tile_size: Vec2(32, 48),
            level_mode: LevelMode::MipMap,
        });

        let mut bytes = Vec::new();
        MetaData::write_to_buffered(&mut bytes, &header, true).unwrap();

        let decoded = MetaData::read_from_buffered(&mut bytes.as_slice()).unwrap();
        assert!(decoded.requirements.is_tiled);
        assert_eq!(decoded.header, header);
    }

    #[test]
    fn tiled_file_requires_tile_description() {
        let mut bytes = Vec::new();
        assert!(MetaData::write_to_buffered(&mut bytes, &example_header(), true).is_err());
    }
}
