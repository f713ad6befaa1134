
//! The tile index of a tiled image file: a table that maps every tile
//! of every resolution level to the position of its bytes in the file.
//!
//! The table is written to the file twice: once as a zeroed placeholder
//! before any tile, and once with the real positions after all tiles.
//! An entry of zero therefore means that its tile was never written.
//! Because the final table is the last thing written, a truncated file
//! may still contain complete tile bodies; the table can then be
//! reconstructed by scanning the file for them.

use crate::error::{Error, Result, UnitResult, i64_to_usize, usize_to_i64};
use crate::io::{Data, Read, Tracking, Write, skip_bytes};
use crate::meta::attribute::LevelMode;
use crate::tiled::geometry::TileGeometry;
use crate::tiled::{BlockHeader, TileCoordinates};
use std::io::Seek;

/// The tile index of one tiled image.
///
/// Shaped by the level mode of the image: images without rip maps
/// store one plane of offsets per level, rip map images store one
/// plane for every combination of an x level and a y level.
#[derive(Clone, Debug, PartialEq)]
pub struct TileOffsets {
    level_mode: LevelMode,
    num_x_levels: usize,
    num_y_levels: usize,
    planes: Vec<Plane>,
}

/// The offsets of all tiles of one resolution level,
/// row by row. An offset of zero marks a missing tile.
#[derive(Clone, Debug, PartialEq)]
struct Plane {
    tiles_x: usize,
    tiles_y: usize,
    offsets: Vec<i64>,
}

impl Plane {
    fn new(tiles_x: usize, tiles_y: usize) -> Self {
        Plane { tiles_x, tiles_y, offsets: vec![0; tiles_x * tiles_y] }
    }

    fn entry_index(&self, tile_x: usize, tile_y: usize) -> Option<usize> {
        if tile_x < self.tiles_x && tile_y < self.tiles_y {
            Some(tile_y * self.tiles_x + tile_x)
        }
        else { None }
    }
}

impl TileOffsets {

    /// Allocate a zeroed table for all tiles of the specified geometry.
    pub fn new(geometry: &TileGeometry) -> Self {
        let num_x_levels = geometry.num_x_levels();
        let num_y_levels = geometry.num_y_levels();

        let planes = match geometry.level_mode() {
            LevelMode::Singular | LevelMode::MipMap => {
                (0 .. num_x_levels)
                    .map(|level| Plane::new(
                        geometry.num_x_tiles(level).expect("level count bug"),
                        geometry.num_y_tiles(level).expect("level count bug"),
                    ))
                    .collect()
            }

            // all combinations of x and y levels, x levels varying faster
            LevelMode::RipMap => {
                (0 .. num_y_levels)
                    .flat_map(|level_y| (0 .. num_x_levels).map(move |level_x| (level_x, level_y)))
                    .map(|(level_x, level_y)| Plane::new(
                        geometry.num_x_tiles(level_x).expect("level count bug"),
                        geometry.num_y_tiles(level_y).expect("level count bug"),
                    ))
                    .collect()
            }
        };

        TileOffsets {
            level_mode: geometry.level_mode(),
            num_x_levels, num_y_levels, planes,
        }
    }

    fn plane_index(&self, level_x: usize, level_y: usize) -> Option<usize> {
        if level_x >= self.num_x_levels || level_y >= self.num_y_levels {
            return None;
        }

        match self.level_mode {
            LevelMode::Singular => Some(0),

            // mip map planes are indexed by the x level,
            // as both level indices are equal for every stored tile
            LevelMode::MipMap => Some(level_x),

            LevelMode::RipMap => Some(level_y * self.num_x_levels + level_x),
        }
    }

    /// Whether the tile and level indices address an entry of this table.
    pub fn is_valid_tile(&self, tile_x: usize, tile_y: usize, level_x: usize, level_y: usize) -> bool {
        self.plane_index(level_x, level_y)
            .and_then(|plane| self.planes[plane].entry_index(tile_x, tile_y))
            .is_some()
    }

    /// The file position of the specified tile.
    /// Zero means the tile was never written.
    pub fn get(&self, tile_x: usize, tile_y: usize, level_x: usize, level_y: usize) -> Result<i64> {
        let plane = self.plane_index(level_x, level_y)
            .ok_or_else(|| Error::argument("level index out of range"))?;

        let plane = &self.planes[plane];
        let entry = plane.entry_index(tile_x, tile_y)
            .ok_or_else(|| Error::argument("tile index out of range"))?;

        Ok(plane.offsets[entry])
    }

    /// Store the file position of the specified tile.
    pub fn set(&mut self, tile_x: usize, tile_y: usize, level_x: usize, level_y: usize, offset: i64) -> UnitResult {
        let plane = self.plane_index(level_x, level_y)
            .ok_or_else(|| Error::argument("level index out of range"))?;

        let plane = &mut self.planes[plane];
        let entry = plane.entry_index(tile_x, tile_y)
            .ok_or_else(|| Error::argument("tile index out of range"))?;

        plane.offsets[entry] = offset;
        Ok(())
    }

    /// True exactly if no entry of this table is filled in.
    pub fn is_empty(&self) -> bool {
        self.planes.iter()
            .all(|plane| plane.offsets.iter().all(|&offset| offset == 0))
    }

    /// True exactly if every entry of this table is filled in.
    pub fn is_complete(&self) -> bool {
        self.planes.iter()
            .all(|plane| plane.offsets.iter().all(|&offset| offset > 0))
    }

    /// Total number of entries in this table.
    pub fn entry_count(&self) -> usize {
        self.planes.iter().map(|plane| plane.offsets.len()).sum()
    }

    /// Number of bytes this table occupies in a file.
    pub fn byte_size(&self) -> usize {
        self.entry_count() * i64::BYTE_SIZE
    }

    /// Read all entries of this table from the file,
    /// planes in index order, each plane row by row.
    ///
    /// If any stored entry is missing or damaged afterwards,
    /// the file is probably incomplete, because the final table
    /// is the last thing written to a file. In that case, the tiles
    /// that did make it into the file are recovered by scanning it.
    pub fn read_from<R: Read + Seek>(&mut self, read: &mut Tracking<R>) -> UnitResult {
        for plane in &mut self.planes {
            i64::read_slice(read, &mut plane.offsets)?;
        }

        let any_entry_is_invalid = self.planes.iter()
            .any(|plane| plane.offsets.iter().any(|&offset| offset <= 0));

        if any_entry_is_invalid {
            self.reconstruct_from_file(read)?;
        }

        Ok(())
    }

    /// Scan the file for tile bodies, recording the position of every
    /// tile found. The scan starts at the current position, which must
    /// be the first byte after the stored table, and ends silently at
    /// the first unreadable or implausible block. The stream position
    /// is restored afterwards, so subsequent reads can proceed as if
    /// the scan never happened.
    fn reconstruct_from_file<R: Read + Seek>(&mut self, read: &mut Tracking<R>) -> UnitResult {
        let saved_position = read.byte_position();

        for _ in 0 .. self.entry_count() {
            let block_position = read.byte_position();

            let header = match BlockHeader::read(read) {
                Ok(header) => header,
                Err(_) => break,
            };

            let tile = match header.coordinates() {
                Ok(tile) => tile,
                Err(_) => break,
            };

            let payload_size = match header.payload_size() {
                Ok(size) => size,
                Err(_) => break,
            };

            if !self.is_valid_tile(
                tile.tile_index.x(), tile.tile_index.y(),
                tile.level_index.x(), tile.level_index.y(),
            ) { break; }

            let offset = match usize_to_i64(block_position, "file position") {
                Ok(offset) => offset,
                Err(_) => break,
            };

            self.set(
                tile.tile_index.x(), tile.tile_index.y(),
                tile.level_index.x(), tile.level_index.y(),
                offset,
            ).expect("tile was just validated");

            if skip_bytes(read, payload_size as u64).is_err() {
                break;
            }
        }

        read.seek_read_to(saved_position)?;
        Ok(())
    }

    /// Write all entries of this table to the file, in the same order
    /// in which they are read. Returns the position at which the table
    /// begins, so that the writer can come back and overwrite the
    /// table after all tiles have been appended.
    pub fn write_to<W: Write>(&self, write: &mut Tracking<W>) -> Result<usize> {
        let position = write.byte_position();

        for plane in &self.planes {
            i64::write_slice(write, &plane.offsets)?;
        }

        Ok(position)
    }

    /// Look up the offset of a tile block that was found
    /// in the file, returning a missing-tile error for zero entries.
    pub(crate) fn get_present(&self, tile: TileCoordinates) -> Result<usize> {
        let offset = self.get(
            tile.tile_index.x(), tile.tile_index.y(),
            tile.level_index.x(), tile.level_index.y(),
        )?;

        if offset <= 0 {
            return Err(Error::TileMissing {
                tile_x: tile.tile_index.x(),
                tile_y: tile.tile_index.y(),
                level_x: tile.level_index.x(),
                level_y: tile.level_index.y(),
            });
        }

        i64_to_usize(offset, "tile position")
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Vec2;
    use crate::meta::attribute::{IntegerBounds, TileDescription};
    use std::io::Cursor;

    fn geometry(size: Vec2<usize>, tile: Vec2<usize>, mode: LevelMode) -> TileGeometry {
        TileGeometry::new(
            TileDescription { tile_size: tile, level_mode: mode },
            IntegerBounds::from_dimensions(size),
        )
    }

    #[test]
    fn new_table_is_zeroed() {
        let table = TileOffsets::new(&geometry(Vec2(4, 4), Vec2(2, 2), LevelMode::Singular));

        assert!(table.is_empty());
        assert!(!table.is_complete());
        assert_eq!(table.entry_count(), 4);
        assert_eq!(table.get(1, 1, 0, 0).unwrap(), 0);
    }

    #[test]
    fn rip_map_planes_have_independent_shapes() {
        // 8x4 pixels with 2x2 tiles: x levels [8,4,2,1], y levels [4,2,1]
        let mut table = TileOffsets::new(&geometry(Vec2(8, 4), Vec2(2, 2), LevelMode::RipMap));

        // level (0,0) has 4x2 tiles, level (2,1) has 1x1 tiles
        table.set(3, 1, 0, 0, 77).unwrap();
        table.set(0, 0, 2, 1, 99).unwrap();

        assert_eq!(table.get(3, 1, 0, 0).unwrap(), 77);
        assert_eq!(table.get(0, 0, 2, 1).unwrap(), 99);

        assert!(table.get(0, 2, 2, 1).is_err());
        assert!(table.get(0, 0, 4, 0).is_err());
        assert!(!table.is_valid_tile(0, 0, 0, 3));
    }

    #[test]
    fn round_trip_via_stream() {
        let geometry = geometry(Vec2(5, 3), Vec2(2, 2), LevelMode::MipMap);
        let mut table = TileOffsets::new(&geometry);

        let mut position = 100;
        for level in 0 .. geometry.num_levels().unwrap() {
            for tile_y in 0 .. geometry.num_y_tiles(level).unwrap() {
                for tile_x in 0 .. geometry.num_x_tiles(level).unwrap() {
                    table.set(tile_x, tile_y, level, level, position).unwrap();
                    position += 31;
                }
            }
        }

        assert!(table.is_complete());

        let mut write = Tracking::new(Cursor::new(Vec::new()));
        let table_position = table.write_to(&mut write).unwrap();
        assert_eq!(table_position, 0);

        let bytes = write.into_inner().into_inner();
        assert_eq!(bytes.len(), table.byte_size());

        let mut decoded = TileOffsets::new(&geometry);
        decoded.read_from(&mut Tracking::new(Cursor::new(bytes))).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn reconstructs_after_zeroed_table() {
        let geometry = geometry(Vec2(4, 4), Vec2(2, 2), LevelMode::Singular);
        let table = TileOffsets::new(&geometry);

        // build a file region: zeroed table, then four tile bodies
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        table.write_to(&mut write).unwrap();

        let mut expected = TileOffsets::new(&geometry);
        for tile_y in 0 .. 2 {
            for tile_x in 0 .. 2 {
                let position = write.byte_position();
                expected.set(tile_x, tile_y, 0, 0, position as i64).unwrap();

                let payload = [0xab_u8; 13];
                BlockHeader::for_tile(TileCoordinates::new((tile_x, tile_y), (0, 0)), payload.len())
                    .unwrap().write(&mut write).unwrap();
                u8::write_slice(&mut write, &payload).unwrap();
            }
        }

        let bytes = write.into_inner().into_inner();

        // reading the zeroed table must recover all four offsets
        let mut read = Tracking::new(Cursor::new(bytes));
        let mut recovered = TileOffsets::new(&geometry);
        recovered.read_from(&mut read).unwrap();

        assert_eq!(recovered, expected);
        assert!(recovered.is_complete());

        // the stream position must be restored to just after the table
        assert_eq!(read.byte_position(), table.byte_size());
    }

    #[test]
    fn reconstruction_stops_at_garbage_but_keeps_earlier_tiles() {
        let geometry = geometry(Vec2(4, 4), Vec2(2, 2), LevelMode::Singular);
        let table = TileOffsets::new(&geometry);

        let mut write = Tracking::new(Cursor::new(Vec::new()));
        table.write_to(&mut write).unwrap();

        let first_tile_position = write.byte_position();
        BlockHeader::for_tile(TileCoordinates::new((0, 0), (0, 0)), 4).unwrap()
            .write(&mut write).unwrap();
        u8::write_slice(&mut write, &[1, 2, 3, 4]).unwrap();

        // an implausible tile header ends the scan
        BlockHeader { tile_x: -3, tile_y: 0, level_x: 0, level_y: 0, data_size: 4 }
            .write(&mut write).unwrap();
        u8::write_slice(&mut write, &[5, 6, 7, 8]).unwrap();

        let bytes = write.into_inner().into_inner();

        let mut recovered = TileOffsets::new(&geometry);
        recovered.read_from(&mut Tracking::new(Cursor::new(bytes))).unwrap();

        assert_eq!(recovered.get(0, 0, 0, 0).unwrap(), first_tile_position as i64);
        assert_eq!(recovered.get(1, 0, 0, 0).unwrap(), 0);
        assert!(!recovered.is_complete());
        assert!(!recovered.is_empty());
    }
}
