//! Canonicalisation of decoded tile samples.
//!
//! The codec hands back whatever the directory stores. Downstream consumers
//! want interleaved samples of at least 8 bits, tightly packed to the tile's
//! true extent. This module:
//!
//! - classifies the colour space (palette indices are served as greyscale)
//! - keeps only the first plane of planar-separate images
//! - expands 1-bit bilevel samples to 8 bits
//! - crops boundary tiles in the last column and row

use tracing::debug;

use crate::codec::tiff::{Photometric, PlanarConfiguration, TiffTag};
use crate::codec::{DecodeOption, DirectoryCodec};
use crate::error::PyramidError;
use crate::pyramid::{ColourSpace, LocatedLevel};

// =============================================================================
// DirectoryFormat
// =============================================================================

/// Sample layout of the directory under the codec's cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryFormat {
    pub image_width: u32,
    pub image_height: u32,
    pub photometric: Photometric,
    pub samples_per_pixel: u32,
    pub bits_per_sample: u32,
    pub planar: PlanarConfiguration,
}

impl DirectoryFormat {
    /// Read the format tags of the current directory, with TIFF defaults.
    pub fn read<C: DirectoryCodec + ?Sized>(codec: &C) -> Self {
        DirectoryFormat {
            image_width: codec.tag_u32(TiffTag::ImageWidth).unwrap_or(0),
            image_height: codec.tag_u32(TiffTag::ImageLength).unwrap_or(0),
            photometric: Photometric::from_u16(codec.tag_u16(TiffTag::PhotometricInterpretation).unwrap_or(1)),
            samples_per_pixel: codec.tag_u32(TiffTag::SamplesPerPixel).unwrap_or(1).max(1),
            bits_per_sample: codec.tag_u32(TiffTag::BitsPerSample).unwrap_or(1).max(1),
            planar: PlanarConfiguration::from_u16(codec.tag_u16(TiffTag::PlanarConfiguration).unwrap_or(1)),
        }
    }

    /// Colour space and channel count callers will see.
    pub fn classify(&self) -> (ColourSpace, u32) {
        let colour_space = ColourSpace::classify(self.photometric, self.bits_per_sample);
        let channels = match self.photometric {
            Photometric::Palette => 1,
            _ => self.samples_per_pixel,
        };
        (colour_space, channels)
    }
}

// =============================================================================
// NormalizedTile
// =============================================================================

/// Tile samples after normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTile {
    /// Samples; `data.len() == data_length`
    pub data: Vec<u8>,

    /// Size of the buffer the samples were decoded or expanded into
    pub capacity: usize,
    pub data_length: usize,

    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub bits_per_channel: u32,
    pub colour_space: ColourSpace,
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode tile `tile_index` of the current directory and normalise it.
///
/// The cursor must already sit on `level`'s directory. `source` names the
/// container in error messages.
pub fn decode_normalized<C: DirectoryCodec + ?Sized>(
    codec: &mut C,
    level: &LocatedLevel,
    tile_index: u32,
    source: &str,
) -> Result<NormalizedTile, PyramidError> {
    let format = DirectoryFormat::read(codec);

    if format.photometric == Photometric::YCbCr {
        codec.set_decode_option(DecodeOption::JpegColourRgb);
    }

    let capacity = codec.tile_byte_size();
    let mut buf = vec![0u8; capacity];
    let written = codec.decode_tile(tile_index, &mut buf).map_err(|e| {
        PyramidError::decode(source, format!("tile {} of {}: {}", tile_index, level.locator, e))
    })?;
    buf.truncate(written);

    normalize(buf, capacity, &format, level, tile_index)
        .map_err(|message| PyramidError::decode(source, format!("tile {}: {}", tile_index, message)))
}

/// Normalise decoded samples of one tile.
///
/// `data` holds the populated bytes of a `capacity`-byte decode buffer.
pub fn normalize(
    data: Vec<u8>,
    capacity: usize,
    format: &DirectoryFormat,
    level: &LocatedLevel,
    tile_index: u32,
) -> Result<NormalizedTile, String> {
    let (mut colour_space, mut channels) = format.classify();
    let mut bits = format.bits_per_sample;
    let mut capacity = capacity;
    let mut data = data;

    if channels > 1 && format.planar == PlanarConfiguration::Separate {
        debug!(channels, "Separate image planes: extracting first plane only");
        channels = 1;
        colour_space = ColourSpace::Greyscale;
    }

    let nominal_width = level.tile_width;
    let nominal_height = level.tile_height;

    if bits == 1 && channels == 1 {
        let min_is_white = format.photometric == Photometric::MinIsWhite;
        data = unpack_bilevel(&data, nominal_width, nominal_height, min_is_white);
        capacity = nominal_width as usize * nominal_height as usize;
        bits = 8;
    }

    let (width, height) = boundary_tile_size(
        format.image_width,
        format.image_height,
        nominal_width,
        nominal_height,
        tile_index,
    );

    let bytes_per_pixel = (channels * bits).div_ceil(8) as usize;
    let src_row_bytes = nominal_width as usize * bytes_per_pixel;

    if width != nominal_width || height != nominal_height {
        data = crop(
            &data,
            src_row_bytes,
            width as usize * bytes_per_pixel,
            height as usize,
        )?;
    } else {
        let expected = src_row_bytes * height as usize;
        if data.len() < expected {
            return Err(format!(
                "decoded {} bytes, tile needs {}",
                data.len(),
                expected
            ));
        }
        data.truncate(expected);
    }

    Ok(NormalizedTile {
        data_length: data.len(),
        data,
        capacity,
        width,
        height,
        channels,
        bits_per_channel: bits,
        colour_space,
    })
}

// =============================================================================
// Sample transforms
// =============================================================================

/// Expand 1-bit samples to 8 bits, most significant bit first.
///
/// Rows are padded to whole bytes in the packed input. With `min_is_white`
/// a set bit becomes 0, otherwise 255. Only rows fully present in `packed`
/// are expanded.
pub fn unpack_bilevel(packed: &[u8], width: u32, height: u32, min_is_white: bool) -> Vec<u8> {
    let (set, unset) = if min_is_white { (0u8, 255u8) } else { (255u8, 0u8) };
    let width = width as usize;
    let stride = width.div_ceil(8);
    if stride == 0 {
        return Vec::new();
    }

    let rows = (height as usize).min(packed.len() / stride);
    let mut out = Vec::with_capacity(rows * width);

    for row in packed.chunks_exact(stride).take(rows) {
        out.extend((0..width).map(|x| {
            if row[x / 8] & (0x80 >> (x % 8)) != 0 {
                set
            } else {
                unset
            }
        }));
    }

    out
}

/// True size of a tile, narrowed in the last column and shortened in the
/// last row when the image size is not a multiple of the tile size.
pub fn boundary_tile_size(
    image_width: u32,
    image_height: u32,
    tile_width: u32,
    tile_height: u32,
    tile_index: u32,
) -> (u32, u32) {
    if tile_width == 0 || tile_height == 0 {
        return (tile_width, tile_height);
    }

    let rem_x = image_width % tile_width;
    let rem_y = image_height % tile_height;
    let tiles_across = image_width.div_ceil(tile_width).max(1);
    let tiles_down = image_height.div_ceil(tile_height).max(1);

    let width = if tile_index % tiles_across == tiles_across - 1 && rem_x != 0 {
        rem_x
    } else {
        tile_width
    };
    let height = if tile_index / tiles_across == tiles_down - 1 && rem_y != 0 {
        rem_y
    } else {
        tile_height
    };

    (width, height)
}

/// Repack the top-left `dst_row_bytes x rows` region of a buffer with
/// `src_row_bytes` per row.
pub fn crop(data: &[u8], src_row_bytes: usize, dst_row_bytes: usize, rows: usize) -> Result<Vec<u8>, String> {
    if rows == 0 || dst_row_bytes == 0 {
        return Ok(Vec::new());
    }

    let needed = (rows - 1) * src_row_bytes + dst_row_bytes;
    if data.len() < needed {
        return Err(format!(
            "decoded {} bytes, crop needs {}",
            data.len(),
            needed
        ));
    }

    let mut out = Vec::with_capacity(rows * dst_row_bytes);
    for row in 0..rows {
        let start = row * src_row_bytes;
        out.extend_from_slice(&data[start..start + dst_row_bytes]);
    }
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
