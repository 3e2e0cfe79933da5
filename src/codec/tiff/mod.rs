//! TIFF and BigTIFF directory codec.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Contains tags and pointers to image data.
//!   Pyramidal files hold one IFD per resolution level, either chained at the
//!   top level or nested under the first IFD's SubIFDs tag.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod decoder;
mod parser;
mod tags;
mod values;

pub use decoder::{unpack_bits, TiffCodec, MAX_DIRECTORIES};
pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES, TIFF_HEADER_SIZE,
};
pub use tags::{
    Compression, FieldType, Photometric, PlanarConfiguration, TiffTag, SUBFILE_PAGE,
    SUBFILE_REDUCED_IMAGE,
};
pub use values::{decode_value, ValueReader};
