use thiserror::Error;

use crate::codec::Locator;

/// I/O errors that can occur when reading container bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the underlying file or storage
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.to_string())
    }
}

/// Errors raised by the TIFF directory codec
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The top-level directory chain has fewer entries than requested
    #[error("Directory {0} does not exist")]
    DirectoryNotFound(usize),

    /// Required tag is missing from the current directory
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Directory uses strips instead of tiles
    #[error("Unsupported organization: directory is not tiled")]
    NotTiled,

    /// Tile index beyond the tile count of the current directory
    #[error("Tile {index} out of range: directory has {count} tiles")]
    TileOutOfRange { index: u32, count: u32 },

    /// Decompression of a tile's bytes failed
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Moving the directory cursor failed
    #[error("Seek to {target} failed: {reason}")]
    SeekFailed { target: String, reason: String },
}

/// Errors surfaced by the pyramid engine to its callers.
///
/// Every kind is terminal for the failing call; nothing is retried.
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    /// Container cannot be opened or the handle is in the wrong state
    #[error("Resource error for {name}: {message}")]
    Resource { name: String, message: String },

    /// Expected tiling or sub-structure absent, directory seek failure,
    /// inconsistent tag values
    #[error("Structure error: {0}")]
    Structure(#[from] TiffError),

    /// Resolution, tile or layer index out of bounds
    #[error("Range error: {0}")]
    Range(String),

    /// Codec-level decode failure for a specific tile
    #[error("Decode error for {name}: {message}")]
    Decode { name: String, message: String },
}

impl PyramidError {
    /// Build a `Resource` error for a named container.
    pub fn resource(name: impl Into<String>, message: impl Into<String>) -> Self {
        PyramidError::Resource {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Build a `Decode` error for a named container.
    pub fn decode(name: impl Into<String>, message: impl Into<String>) -> Self {
        PyramidError::Decode {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Wrap a failed seek to `locator`.
    pub fn seek(locator: Locator, source: TiffError) -> Self {
        PyramidError::Structure(TiffError::SeekFailed {
            target: locator.to_string(),
            reason: source.to_string(),
        })
    }
}

/// Errors raised when writing a normalised tile to an image file format
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// Sample layout has no counterpart in the output format
    #[error("Cannot encode {channels}-channel {bits}-bit tile as {format}")]
    UnsupportedLayout {
        format: &'static str,
        channels: u32,
        bits: u32,
    },

    /// Data length does not match width, height and channels
    #[error("Tile holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The image encoder failed
    #[error("Encoding failed: {0}")]
    Encoder(String),
}
