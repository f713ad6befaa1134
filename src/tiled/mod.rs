
//! Read and write images whose pixels are stored as rectangular tiles,
//! optionally with multiple resolution levels.

pub mod geometry;
pub mod offsets;
pub mod reader;
pub mod writer;

use crate::error::{Error, Result, UnitResult, i32_to_usize, usize_to_i32};
use crate::io::{Data, Read, Write};
use crate::math::Vec2;
use std::cmp::Ordering;

/// Addresses one tile of a tiled image:
/// the index of the tile within its level, and the index of the level.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct TileCoordinates {

    /// The index of the tile within its level. Not a pixel position.
    pub tile_index: Vec2<usize>,

    /// The index of the resolution level.
    pub level_index: Vec2<usize>,
}

impl TileCoordinates {

    /// Address a tile of the specified level.
    pub fn new(tile_index: impl Into<Vec2<usize>>, level_index: impl Into<Vec2<usize>>) -> Self {
        TileCoordinates { tile_index: tile_index.into(), level_index: level_index.into() }
    }
}

/// Orders the tiles of one level row by row,
/// and whole levels one after another.
impl Ord for TileCoordinates {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level_index.y().cmp(&other.level_index.y())
            .then(self.level_index.x().cmp(&other.level_index.x()))
            .then(self.tile_index.y().cmp(&other.tile_index.y()))
            .then(self.tile_index.x().cmp(&other.tile_index.x()))
    }
}

impl PartialOrd for TileCoordinates {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}


/// The fixed-size header that precedes the compressed bytes
/// of every tile stored in a file.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct BlockHeader {

    /// The x index of the tile within its level.
    pub tile_x: i32,

    /// The y index of the tile within its level.
    pub tile_y: i32,

    /// The x index of the resolution level.
    pub level_x: i32,

    /// The y index of the resolution level.
    pub level_y: i32,

    /// Number of stored bytes following this header.
    pub data_size: i32,
}

impl BlockHeader {

    /// Number of bytes this header occupies in a file.
    pub const BYTE_SIZE: usize = 5 * i32::BYTE_SIZE;

    /// The header for the specified tile and payload size.
    pub fn for_tile(tile: TileCoordinates, data_size: usize) -> Result<Self> {
        Ok(BlockHeader {
            tile_x: usize_to_i32(tile.tile_index.x(), "tile x index")?,
            tile_y: usize_to_i32(tile.tile_index.y(), "tile y index")?,
            level_x: usize_to_i32(tile.level_index.x(), "level x index")?,
            level_y: usize_to_i32(tile.level_index.y(), "level y index")?,
            data_size: usize_to_i32(data_size, "tile data size")?,
        })
    }

    /// The tile these stored coordinates address,
    /// or a corruption error for negative coordinates.
    pub fn coordinates(&self) -> Result<TileCoordinates> {
        Ok(TileCoordinates {
            tile_index: Vec2(
                i32_to_usize(self.tile_x, "tile x index")?,
                i32_to_usize(self.tile_y, "tile y index")?,
            ),
            level_index: Vec2(
                i32_to_usize(self.level_x, "level x index")?,
                i32_to_usize(self.level_y, "level y index")?,
            ),
        })
    }

    /// The number of payload bytes, or a corruption error
    /// for a negative stored size.
    pub fn payload_size(&self) -> Result<usize> {
        i32_to_usize(self.data_size, "tile data size")
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.tile_x.write(write)?;
        self.tile_y.write(write)?;
        self.level_x.write(write)?;
        self.level_y.write(write)?;
        self.data_size.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(BlockHeader {
            tile_x: i32::read(read)?,
            tile_y: i32::read(read)?,
            level_x: i32::read(read)?,
            level_y: i32::read(read)?,
            data_size: i32::read(read)?,
        })
    }

    /// The coordinates must match the expected tile exactly.
    pub fn validate_coordinates(&self, expected: TileCoordinates) -> UnitResult {
        if self.coordinates().ok() != Some(expected) {
            return Err(Error::corrupt("tile header does not match the requested tile"));
        }

        Ok(())
    }
}
