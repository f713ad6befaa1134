
//! Error type definitions.

use std::borrow::Cow;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// A result that may contain an error from this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an error from this crate.
pub type UnitResult = Result<()>;

/// An error from the standard input/output machinery.
pub use std::io::Error as IoError;

/// A result from the standard input/output machinery.
pub use std::io::Result as IoResult;

/// All possible errors that the operations in this crate can produce.
#[derive(Debug)]
pub enum Error {

    /// The underlying byte stream could not be read or written.
    Io(IoError),

    /// The bytes in the file do not satisfy an invariant of the file format.
    /// This includes truncated files, wrong magic numbers,
    /// unsupported version flags, and contradictory block headers.
    Corrupt(Cow<'static, str>),

    /// A caller-supplied parameter is outside of its valid range,
    /// for example a tile coordinate outside of the level
    /// or a scan line outside of the data window.
    InvalidArgument(Cow<'static, str>),

    /// The library was used in a way that contradicts its own rules,
    /// for example writing the same tile twice.
    Logic(Cow<'static, str>),

    /// The compressor rejected its input or produced unusable output.
    Compression(Cow<'static, str>),

    /// A tile was requested whose entry in the offset table is still zero,
    /// meaning the tile was never written to the file.
    TileMissing {

        /// The x index of the missing tile inside its level.
        tile_x: usize,

        /// The y index of the missing tile inside its level.
        tile_y: usize,

        /// The x index of the resolution level.
        level_x: usize,

        /// The y index of the resolution level.
        level_y: usize,
    },
}

impl Error {

    /// Create an error describing on-disk bytes that violate the file format.
    pub fn corrupt(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Corrupt(message.into())
    }

    /// Create an error describing a caller-supplied parameter that is out of range.
    pub fn argument(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Create an error describing an operation that the current state forbids.
    pub fn logic(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Logic(message.into())
    }

    /// Create an error describing a compressor failure.
    pub fn compression(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Compression(message.into())
    }

    /// Prefix the error message with the name of the file being processed.
    /// The kind of the error is preserved.
    pub fn while_processing_file(self, path: &Path) -> Self {
        let prefix = |message: Cow<'static, str>| -> Cow<'static, str> {
            format!("{}: {}", path.display(), message).into()
        };

        match self {
            Error::Io(error) => Error::Io(IoError::new(
                error.kind(), format!("{}: {}", path.display(), error)
            )),

            Error::Corrupt(message) => Error::Corrupt(prefix(message)),
            Error::InvalidArgument(message) => Error::InvalidArgument(prefix(message)),
            Error::Logic(message) => Error::Logic(prefix(message)),
            Error::Compression(message) => Error::Compression(prefix(message)),
            other => other,
        }
    }
}

/// Enable using the `?` operator on `std::io::Result`.
/// An unexpected end of the stream means the file is incomplete, not that io failed.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::corrupt("unexpected end of file")
        }
        else {
            Error::Io(error)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(error) => write!(formatter, "io error: {}", error),
            Error::Corrupt(message) => write!(formatter, "invalid file contents: {}", message),
            Error::InvalidArgument(message) => write!(formatter, "invalid argument: {}", message),
            Error::Logic(message) => write!(formatter, "logic error: {}", message),
            Error::Compression(message) => write!(formatter, "compression error: {}", message),

            Error::TileMissing { tile_x, tile_y, level_x, level_y } => write!(
                formatter, "tile ({}, {}) of level ({}, {}) is missing from the file",
                tile_x, tile_y, level_x, level_y
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

#[inline]
pub(crate) fn i32_to_usize(value: i32, context: &'static str) -> Result<usize> {
    if value < 0 { Err(Error::corrupt(context)) }
    else { Ok(value as usize) }
}

#[inline]
pub(crate) fn usize_to_i32(value: usize, context: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::argument(context))
}

#[inline]
pub(crate) fn usize_to_i64(value: usize, context: &'static str) -> Result<i64> {
    i64::try_from(value).map_err(|_| Error::argument(context))
}

#[inline]
pub(crate) fn i64_to_usize(value: i64, context: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::corrupt(context))
}

use std::convert::TryFrom;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eof_is_corrupt_not_io() {
        let eof = IoError::new(ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from(eof), Error::Corrupt(_)));

        let other = IoError::new(ErrorKind::PermissionDenied, "nope");
        assert!(matches!(Error::from(other), Error::Io(_)));
    }

    #[test]
    fn file_context_preserves_kind() {
        let error = Error::corrupt("bad magic")
            .while_processing_file(Path::new("image.hdr"));

        match error {
            Error::Corrupt(message) => assert!(message.contains("image.hdr")),
            other => panic!("kind changed: {:?}", other),
        }
    }
}
