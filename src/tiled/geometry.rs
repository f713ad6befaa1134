
//! Computes the resolution levels of a tiled image,
//! how many tiles each level contains,
//! and which pixels each tile covers.
//!
//! The tiled reader and the tiled writer both consume the
//! precomputed [`TileGeometry`] so that level sizes and tile counts
//! are derived in exactly one place.

use crate::error::{Error, Result};
use crate::math::{Vec2, ceil_div, floor_log_2};
use crate::meta::attribute::{IntegerBounds, LevelMode, TileDescription};

/// The size of the specified resolution level along one dimension,
/// where `min` and `max` are the inclusive bounds of the data window
/// along that dimension. Each level halves the previous one,
/// but no level shrinks below one pixel.
pub fn level_size(min: i32, max: i32, level: usize) -> usize {
    debug_assert!(max >= min, "invalid data window bug");
    let full_size = (max - min + 1) as usize;
    (full_size >> level).max(1)
}

/// The precomputed level sizes and tile counts of one tiled image.
///
/// Tiles and levels are addressed by index: tile `(dx, dy)` of level
/// `(lx, ly)`. For images without rip maps, the x and y level indices
/// are always equal.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGeometry {

    /// The tile size and level mode of the image.
    pub tiles: TileDescription,

    /// The pixels that level (0, 0) covers.
    pub data_window: IntegerBounds,

    num_x_levels: usize,
    num_y_levels: usize,
    num_x_tiles: Vec<usize>,
    num_y_tiles: Vec<usize>,
}

impl TileGeometry {

    /// Precompute the geometry of a tiled image with the specified
    /// tile layout and data window. The data window and tile
    /// description must already be validated.
    pub fn new(tiles: TileDescription, data_window: IntegerBounds) -> Self {
        debug_assert!(tiles.validate().is_ok() && data_window.validate().is_ok(), "unvalidated geometry bug");

        let width = data_window.size.width();
        let height = data_window.size.height();

        let (num_x_levels, num_y_levels) = match tiles.level_mode {
            LevelMode::Singular => (1, 1),

            LevelMode::MipMap => {
                let count = floor_log_2(width.max(height)) + 1;
                (count, count)
            },

            LevelMode::RipMap => (
                floor_log_2(width) + 1,
                floor_log_2(height) + 1,
            ),
        };

        let max = data_window.max();

        let num_x_tiles = (0 .. num_x_levels)
            .map(|level| ceil_div(
                level_size(data_window.position.x(), max.x(), level),
                tiles.tile_size.width()
            ))
            .collect();

        let num_y_tiles = (0 .. num_y_levels)
            .map(|level| ceil_div(
                level_size(data_window.position.y(), max.y(), level),
                tiles.tile_size.height()
            ))
            .collect();

        TileGeometry {
            tiles, data_window,
            num_x_levels, num_y_levels,
            num_x_tiles, num_y_tiles,
        }
    }

    /// The level mode of the image.
    pub fn level_mode(&self) -> LevelMode {
        self.tiles.level_mode
    }

    /// Number of resolution levels in x direction.
    pub fn num_x_levels(&self) -> usize {
        self.num_x_levels
    }

    /// Number of resolution levels in y direction.
    pub fn num_y_levels(&self) -> usize {
        self.num_y_levels
    }

    /// Number of resolution levels of an image without rip maps.
    /// Rip map images have no single level count,
    /// so asking for one is an error.
    pub fn num_levels(&self) -> Result<usize> {
        match self.tiles.level_mode {
            LevelMode::RipMap => Err(Error::logic("rip map images have separate x and y level counts")),
            _ => Ok(self.num_x_levels),
        }
    }

    /// Number of tile columns in the specified x level.
    pub fn num_x_tiles(&self, level_x: usize) -> Result<usize> {
        self.num_x_tiles.get(level_x).copied()
            .ok_or_else(|| Error::argument("x level index out of range"))
    }

    /// Number of tile rows in the specified y level.
    pub fn num_y_tiles(&self, level_y: usize) -> Result<usize> {
        self.num_y_tiles.get(level_y).copied()
            .ok_or_else(|| Error::argument("y level index out of range"))
    }

    /// Width of the specified x level in pixels.
    pub fn level_width(&self, level_x: usize) -> Result<usize> {
        if level_x >= self.num_x_levels {
            return Err(Error::argument("x level index out of range"));
        }

        Ok(level_size(self.data_window.position.x(), self.data_window.max().x(), level_x))
    }

    /// Height of the specified y level in pixels.
    pub fn level_height(&self, level_y: usize) -> Result<usize> {
        if level_y >= self.num_y_levels {
            return Err(Error::argument("y level index out of range"));
        }

        Ok(level_size(self.data_window.position.y(), self.data_window.max().y(), level_y))
    }

    /// The pixels that the specified level covers.
    /// All levels share the position of the data window.
    pub fn data_window_for_level(&self, level_x: usize, level_y: usize) -> Result<IntegerBounds> {
        Ok(IntegerBounds::new(
            self.data_window.position,
            Vec2(self.level_width(level_x)?, self.level_height(level_y)?),
        ))
    }

    /// The pixels that the specified tile covers.
    /// Tiles at the right and bottom edge of a level may be
    /// smaller than the tile size of the image.
    pub fn data_window_for_tile(
        &self,
        tile_x: usize, tile_y: usize,
        level_x: usize, level_y: usize,
    ) -> Result<IntegerBounds> {
        if !self.is_valid_tile(tile_x, tile_y, level_x, level_y) {
            return Err(Error::argument("tile index out of range"));
        }

        let level = self.data_window_for_level(level_x, level_y)?;
        let tile_size = self.tiles.tile_size;

        let min = level.position + Vec2(
            (tile_x * tile_size.width()) as i32,
            (tile_y * tile_size.height()) as i32,
        );

        // the last tile of a row or column may stick out of the level
        let max_x = (min.x() + tile_size.width() as i32 - 1).min(level.max().x());
        let max_y = (min.y() + tile_size.height() as i32 - 1).min(level.max().y());

        Ok(IntegerBounds::new(min, Vec2(
            (max_x - min.x() + 1) as usize,
            (max_y - min.y() + 1) as usize,
        )))
    }

    /// Whether the tile and level indices address a tile of the image.
    pub fn is_valid_tile(&self, tile_x: usize, tile_y: usize, level_x: usize, level_y: usize) -> bool {
        level_x < self.num_x_levels && level_y < self.num_y_levels
            && tile_x < self.num_x_tiles[level_x]
            && tile_y < self.num_y_tiles[level_y]
    }

    /// The total number of tiles in the image, over all levels.
    pub fn total_tile_count(&self) -> usize {
        match self.tiles.level_mode {
            LevelMode::Singular | LevelMode::MipMap =>
                (0 .. self.num_x_levels)
                    .map(|level| self.num_x_tiles[level] * self.num_y_tiles[level])
                    .sum(),

            LevelMode::RipMap =>
                (0 .. self.num_y_levels)
                    .map(|level_y| self.num_x_tiles.iter().sum::<usize>() * self.num_y_tiles[level_y])
                    .sum(),
        }
    }
}
