
//! Read and write tiled high dynamic range images.
//! This library uses no foreign code or unsafe Rust.
//!
//! Pixels are stored as rectangular tiles, optionally with mip map or
//! rip map resolution levels, or as horizontal blocks of scan lines.
//! Tiles can be read and written in any order, and truncated files
//! remain partially readable because the tile index can be
//! reconstructed from the tile blocks themselves.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,

    clippy::all,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    trivial_numeric_casts,
    redundant_semicolons
)]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod io; // public to allow for custom attribute byte parsing

pub mod compression;
pub mod error;
pub mod frame_buffer;
pub mod input;
pub mod math;
pub mod meta;
pub mod scanline;
pub mod tiled;

mod convert;

/// Export the most important items of this crate.
/// _Note: This includes a type called `Result`, possibly overwriting the default `std::Result` type usage._
pub mod prelude {

    // the main entry points
    pub use crate::input::Input;
    pub use crate::scanline::{ScanlineReader, ScanlineWriter};
    pub use crate::tiled::TileCoordinates;
    pub use crate::tiled::geometry::TileGeometry;
    pub use crate::tiled::reader::TiledReader;
    pub use crate::tiled::writer::TiledWriter;

    // pixel memory
    pub use crate::frame_buffer::{FrameBuffer, Sample, Slice};

    // meta data
    pub use crate::compression::Compression;
    pub use crate::meta::{Header, MetaData, Requirements};
    pub use crate::meta::attribute::{
        AttributeValue, ChannelDescription, ChannelList, IntegerBounds,
        LevelMode, LineOrder, SampleType, Text, TileDescription,
    };
    pub use crate::meta::zipped::{ZippedString, ZippedStringVector};

    // common math
    pub use crate::math::Vec2;

    // error handling
    pub use crate::error::{Error, Result, UnitResult};

    // re-export external stuff
    pub use half::f16;
    pub use smallvec::SmallVec;
}
