//! Decoded tiles and their normalisation.
//!
//! A [`Tile`] is what callers receive from
//! [`ImageHandle::get_tile`](crate::ImageHandle::get_tile): interleaved
//! samples of at least 8 bits, cropped to the tile's true extent, together
//! with the request that produced them and the container they came from.
//!
//! # Components
//!
//! - [`normalizer`]: colour classification, bilevel expansion, boundary cropping
//! - [`TileEncoder`]: writes 8- and 16-bit tiles as PNG or JPEG files

use std::time::SystemTime;

use bytes::Bytes;
use serde::Serialize;

use crate::pyramid::{ColourSpace, SampleType};

mod encoder;
pub mod normalizer;

pub use encoder::{
    clamp_quality, OutputFormat, TileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use normalizer::{decode_normalized, unpack_bilevel, DirectoryFormat, NormalizedTile};

/// One decoded, normalised tile.
#[derive(Debug, Clone, Serialize)]
pub struct Tile {
    /// Sequence position the tile was read from
    pub x: usize,
    pub y: usize,

    /// Protocol resolution (0 = smallest)
    pub resolution: usize,
    pub tile_index: u32,

    #[serde(skip)]
    pub data: Bytes,

    /// Size of the buffer the samples were produced in; never less than
    /// `data_length`
    pub capacity: usize,
    pub data_length: usize,

    /// Pixel extent after boundary cropping
    pub width: u32,
    pub height: u32,

    pub channels: u32,
    pub bits_per_channel: u32,
    pub sample_type: SampleType,
    pub colour_space: ColourSpace,

    /// Name of the container the tile came from
    pub source: String,

    /// Modification time of that container, when known
    #[serde(skip)]
    pub timestamp: Option<SystemTime>,
}

impl Tile {
    /// Assemble a tile from normalised samples and the request that produced them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: usize,
        y: usize,
        resolution: usize,
        tile_index: u32,
        samples: NormalizedTile,
        sample_type: SampleType,
        source: impl Into<String>,
        timestamp: Option<SystemTime>,
    ) -> Self {
        Tile {
            x,
            y,
            resolution,
            tile_index,
            capacity: samples.capacity.max(samples.data_length),
            data_length: samples.data_length,
            data: Bytes::from(samples.data),
            width: samples.width,
            height: samples.height,
            channels: samples.channels,
            bits_per_channel: samples.bits_per_channel,
            sample_type,
            colour_space: samples.colour_space,
            source: source.into(),
            timestamp,
        }
    }

    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.channels * self.bits_per_channel).div_ceil(8) as usize
    }

    /// Bytes the samples occupy when tightly packed.
    pub fn expected_length(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }
}
