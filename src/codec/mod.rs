//! Directory codec abstraction.
//!
//! The pyramid engine never touches file bytes directly. It drives a
//! [`DirectoryCodec`]: a cursor over the directories of a tiled container
//! that can read tag values and decode one tile at a time. [`tiff::TiffCodec`]
//! is the implementation for TIFF and BigTIFF files.

pub mod jpeg;
pub mod tiff;


use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::error::TiffError;
use tiff::TiffTag;

// =============================================================================
// Locator
// =============================================================================

/// Position of the directory cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// Top-level directory by position in the chain
    Directory(usize),

    /// Nested directory loaded from an absolute offset, reached from the
    /// top-level directory `parent`
    SubDirectory { parent: usize, offset: u64 },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Directory(index) => write!(f, "directory {}", index),
            Locator::SubDirectory { parent, offset } => {
                write!(f, "sub-directory at offset {} of directory {}", offset, parent)
            }
        }
    }
}

// =============================================================================
// TagValue
// =============================================================================

/// A decoded tag value.
///
/// BYTE and UNDEFINED values stay opaque; rationals are reduced to floats.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Unsigned(Vec<u64>),
    Signed(Vec<i64>),
    Float(Vec<f64>),
    Ascii(String),
    Bytes(Bytes),
}

impl TagValue {
    /// First value as u64, for any integer representation.
    pub fn first_u64(&self) -> Option<u64> {
        match self {
            TagValue::Unsigned(v) => v.first().copied(),
            TagValue::Signed(v) => v.first().and_then(|&x| u64::try_from(x).ok()),
            TagValue::Bytes(b) => b.first().map(|&x| x as u64),
            _ => None,
        }
    }

    /// First value as u32, if it fits.
    pub fn first_u32(&self) -> Option<u32> {
        self.first_u64().and_then(|v| u32::try_from(v).ok())
    }

    /// First value as u16, if it fits.
    pub fn first_u16(&self) -> Option<u16> {
        self.first_u64().and_then(|v| u16::try_from(v).ok())
    }

    /// All values as unsigned integers.
    pub fn as_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            TagValue::Unsigned(v) => Some(v.clone()),
            TagValue::Signed(v) => v.iter().map(|&x| u64::try_from(x).ok()).collect(),
            TagValue::Bytes(b) => Some(b.iter().map(|&x| x as u64).collect()),
            _ => None,
        }
    }

    /// Borrow the values as a slice when stored unsigned.
    pub fn as_u64_slice(&self) -> Option<&[u64]> {
        match self {
            TagValue::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    /// All values as floats, for any numeric representation.
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Unsigned(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::Signed(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::Float(v) => Some(v.clone()),
            TagValue::Bytes(b) => Some(b.iter().map(|&x| x as f64).collect()),
            TagValue::Ascii(_) => None,
        }
    }

    /// First value as a float.
    pub fn first_f64(&self) -> Option<f64> {
        self.as_f64_vec().and_then(|v| v.first().copied())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of an opaque value.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            TagValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        match self {
            TagValue::Unsigned(v) => v.len(),
            TagValue::Signed(v) => v.len(),
            TagValue::Float(v) => v.len(),
            TagValue::Ascii(s) => s.len(),
            TagValue::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// DecodeOption
// =============================================================================

/// Pseudo-options that change how the codec decodes tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOption {
    /// Convert YCbCr JPEG tiles to RGB while decoding
    JpegColourRgb,
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Sink for non-fatal codec warnings.
///
/// Warnings never alter results; they only report what was skipped.
pub trait Diagnostics: Send + Sync {
    fn warning(&self, module: &str, message: &str);
}

/// Forwards warnings to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn warning(&self, module: &str, message: &str) {
        tracing::warn!(module = module, "{}", message);
    }
}

// =============================================================================
// DirectoryCodec
// =============================================================================

/// Cursor over the directories of an open tiled container.
///
/// Every method that moves the cursor takes `&mut self`; tag reads and tile
/// geometry always refer to the current directory.
pub trait DirectoryCodec {
    /// Where the cursor currently points.
    fn current_directory(&self) -> Locator;

    /// Move to top-level directory `index`.
    fn set_directory(&mut self, index: usize) -> Result<(), TiffError>;

    /// Advance to the next top-level directory.
    ///
    /// Returns `Ok(false)` (cursor unchanged) when the current directory is
    /// the last one. From a sub-directory this moves to the top-level
    /// directory following the last top-level position.
    fn next_directory(&mut self) -> Result<bool, TiffError>;

    /// Move to the nested directory stored at `offset`.
    fn set_sub_directory(&mut self, offset: u64) -> Result<(), TiffError>;

    /// Value of `tag` in the current directory.
    fn tag(&self, tag: TiffTag) -> Option<&TagValue>;

    /// Enable a decode option for all following tile reads.
    fn set_decode_option(&mut self, option: DecodeOption);

    /// Bytes needed to hold one decoded tile of the current directory.
    fn tile_byte_size(&self) -> usize;

    /// Number of tiles in the current directory.
    fn tile_count(&self) -> u32;

    /// Decode tile `index` of the current directory into `buf`.
    ///
    /// Returns the number of bytes written.
    fn decode_tile(&mut self, index: u32, buf: &mut [u8]) -> Result<usize, TiffError>;

    /// Convenience: first value of `tag` as u32.
    fn tag_u32(&self, tag: TiffTag) -> Option<u32> {
        self.tag(tag).and_then(TagValue::first_u32)
    }

    /// Convenience: first value of `tag` as u16. Out-of-range values read as absent.
    fn tag_u16(&self, tag: TiffTag) -> Option<u16> {
        self.tag(tag).and_then(TagValue::first_u16)
    }

    /// Convenience: `tag` as a string.
    fn tag_str(&self, tag: TiffTag) -> Option<&str> {
        self.tag(tag).and_then(TagValue::as_str)
    }
}

impl<C: DirectoryCodec + ?Sized> DirectoryCodec for Box<C> {
    fn current_directory(&self) -> Locator {
        (**self).current_directory()
    }

    fn set_directory(&mut self, index: usize) -> Result<(), TiffError> {
        (**self).set_directory(index)
    }

    fn next_directory(&mut self) -> Result<bool, TiffError> {
        (**self).next_directory()
    }

    fn set_sub_directory(&mut self, offset: u64) -> Result<(), TiffError> {
        (**self).set_sub_directory(offset)
    }

    fn tag(&self, tag: TiffTag) -> Option<&TagValue> {
        (**self).tag(tag)
    }

    fn set_decode_option(&mut self, option: DecodeOption) {
        (**self).set_decode_option(option)
    }

    fn tile_byte_size(&self) -> usize {
        (**self).tile_byte_size()
    }

    fn tile_count(&self) -> u32 {
        (**self).tile_count()
    }

    fn decode_tile(&mut self, index: u32, buf: &mut [u8]) -> Result<usize, TiffError> {
        (**self).decode_tile(index, buf)
    }
}
