//! JPEG tile handling.
//!
//! Tiled TIFFs with JPEG compression usually store "abbreviated" streams:
//! each tile carries only its scan data, and the quantization (DQT) and
//! Huffman (DHT) tables live once in the directory's `JPEGTables` tag. A
//! tile has to be spliced together with those tables before any standard
//! decoder accepts it.
//!
//! Splicing: tables are `SOI .. EOI`, the tile is `SOI .. EOI`; drop the
//! tables' EOI and the tile's SOI, then concatenate.

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ImageDecoder};

use crate::error::TiffError;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// Stream Analysis
// =============================================================================

/// Check if JPEG data is an abbreviated stream (scan without tables).
///
/// Walks marker segments after SOI; reaching SOS before any DQT or DHT
/// means the tables must come from elsewhere.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Standalone markers carry no length field
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Check if JPEG data carries its own quantization tables.
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    data[2..].windows(2).any(|w| w == DQT)
}

// =============================================================================
// Table Merging
// =============================================================================

/// Splice `JPEGTables` content in front of an abbreviated tile stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.len() >= 2 && tables[tables.len() - 2..] == EOI {
        tables.len() - 2
    } else {
        tables.len()
    };

    let tile_start = if tile_data.len() >= 2 && tile_data[0..2] == SOI {
        2
    } else {
        0
    };

    let mut result = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Make a tile's bytes decodable, merging tables only when needed.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    if is_complete_stream(tile_data) {
        return Bytes::copy_from_slice(tile_data);
    }

    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a complete JPEG stream into interleaved 8-bit samples.
///
/// `channels` selects the output layout: 1 yields luma, anything else RGB.
/// Colour conversion from YCbCr happens inside the decoder. Streams whose
/// frame would decode to more than `limit` bytes are rejected before any
/// pixel is decoded.
pub fn decode_jpeg(data: &[u8], channels: u16, limit: usize) -> Result<Vec<u8>, TiffError> {
    let jpeg_error = |e: image::ImageError| TiffError::Decompression(format!("JPEG: {}", e));

    let decoder = JpegDecoder::new(Cursor::new(data)).map_err(jpeg_error)?;
    let (width, height) = decoder.dimensions();
    let samples = if channels == 1 { 1 } else { 3 };
    let decoded_len = width as u64 * height as u64 * samples;
    if decoded_len > limit as u64 {
        return Err(TiffError::Decompression(format!(
            "JPEG: {}x{} frame exceeds the {}-byte tile buffer",
            width, height, limit
        )));
    }

    let image = DynamicImage::from_decoder(decoder).map_err(jpeg_error)?;

    Ok(if channels == 1 {
        image.into_luma8().into_raw()
    } else {
        image.into_rgb8().into_raw()
    })
}

// =============================================================================
// Tests
// =============================================================================
