//! Image file encoding for normalised tiles.
//!
//! Tiles come out of the engine as raw samples. To look at one, the CLI
//! writes it as PNG (8- or 16-bit greyscale and RGB, with or without alpha)
//! or JPEG (8-bit greyscale and RGB only). Anything else, such as
//! floating-point or CIELAB samples, is written raw by the caller.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::error::EncodeError;
use crate::pyramid::{ColourSpace, SampleType};
use crate::tile::Tile;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Output image file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg { quality: u8 },
}

impl OutputFormat {
    /// Pick a format from a file extension (`png`, `jpg`, `jpeg`).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            }),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg { .. } => "JPEG",
        }
    }
}

// =============================================================================
// TileEncoder
// =============================================================================

/// Writes normalised tiles as PNG or JPEG.
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    format: OutputFormat,
}

impl TileEncoder {
    pub fn new(format: OutputFormat) -> Self {
        let format = match format {
            OutputFormat::Jpeg { quality } => OutputFormat::Jpeg {
                quality: clamp_quality(quality),
            },
            other => other,
        };
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Whether this encoder can represent the tile's sample layout.
    pub fn supports(&self, tile: &Tile) -> bool {
        self.colour_type(tile).is_some()
    }

    /// Encode the tile's samples.
    pub fn encode(&self, tile: &Tile) -> Result<Bytes, EncodeError> {
        let colour = self.colour_type(tile).ok_or(EncodeError::UnsupportedLayout {
            format: self.format.name(),
            channels: tile.channels,
            bits: tile.bits_per_channel,
        })?;

        let expected = tile.expected_length();
        if tile.data.len() != expected {
            return Err(EncodeError::SizeMismatch {
                expected,
                actual: tile.data.len(),
            });
        }

        let mut output = Vec::new();
        let result = match self.format {
            OutputFormat::Png => PngEncoder::new(&mut output).write_image(
                &tile.data,
                tile.width,
                tile.height,
                colour,
            ),
            OutputFormat::Jpeg { quality } => JpegEncoder::new_with_quality(&mut output, quality)
                .write_image(&tile.data, tile.width, tile.height, colour),
        };
        result.map_err(|e| EncodeError::Encoder(e.to_string()))?;

        Ok(Bytes::from(output))
    }

    fn colour_type(&self, tile: &Tile) -> Option<ExtendedColorType> {
        if tile.sample_type != SampleType::FixedPoint || tile.colour_space == ColourSpace::Cielab {
            return None;
        }

        let colour = match (tile.channels, tile.bits_per_channel) {
            (1, 8) => ExtendedColorType::L8,
            (2, 8) => ExtendedColorType::La8,
            (3, 8) => ExtendedColorType::Rgb8,
            (4, 8) => ExtendedColorType::Rgba8,
            (1, 16) => ExtendedColorType::L16,
            (2, 16) => ExtendedColorType::La16,
            (3, 16) => ExtendedColorType::Rgb16,
            (4, 16) => ExtendedColorType::Rgba16,
            _ => return None,
        };

        match self.format {
            OutputFormat::Png => Some(colour),
            OutputFormat::Jpeg { .. } => {
                matches!(colour, ExtendedColorType::L8 | ExtendedColorType::Rgb8).then_some(colour)
            }
        }
    }
}

/// Clamp quality to the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
