//! Pyramid catalog: the resolution levels and stack layers of one container.
//!
//! A pyramidal TIFF stores its levels in one of two ways:
//!
//! - **Normal**: every level is a top-level directory, largest first.
//! - **SubIfd**: directory 0 holds full resolution and its SubIFDs tag lists
//!   the reduced-resolution levels (OME-TIFF and friends).
//!
//! A third layout looks like a Normal pyramid at first sight: a *stack* of
//! same-sized planes, each tagged as a page. Stacks are recognised by the
//! first two levels having identical dimensions.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::codec::tiff::{Photometric, TiffTag, SUBFILE_PAGE, SUBFILE_REDUCED_IMAGE};
use crate::codec::{DirectoryCodec, Locator, TagValue};
use crate::error::{PyramidError, TiffError};

// =============================================================================
// Enumerations
// =============================================================================

/// How resolution levels are laid out in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PyramidScheme {
    /// Levels are sibling top-level directories
    Normal,
    /// Levels 1..N are nested under directory 0's SubIFDs
    SubIfd,
}

/// Colour space of the samples handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColourSpace {
    Binary,
    Greyscale,
    Srgb,
    Cielab,
}

impl ColourSpace {
    /// Classify a photometric interpretation.
    ///
    /// Palette images are served as their raw indices, hence greyscale.
    pub fn classify(photometric: Photometric, bits_per_sample: u32) -> Self {
        match photometric {
            Photometric::CieLab => ColourSpace::Cielab,
            Photometric::MinIsBlack | Photometric::MinIsWhite => {
                if bits_per_sample == 1 {
                    ColourSpace::Binary
                } else {
                    ColourSpace::Greyscale
                }
            }
            Photometric::Palette => ColourSpace::Greyscale,
            _ => ColourSpace::Srgb,
        }
    }
}

/// Numeric domain of the samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    FixedPoint,
    FloatingPoint,
}

impl SampleType {
    /// SampleFormat 3 is IEEE floating point; everything else is integer.
    pub fn from_sample_format(value: u32) -> Self {
        if value == 3 {
            SampleType::FloatingPoint
        } else {
            SampleType::FixedPoint
        }
    }
}

/// Unit of the physical resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionUnit {
    Unknown,
    Inch,
    Centimetre,
}

impl ResolutionUnit {
    pub fn from_tiff(value: u32) -> Self {
        match value {
            2 => ResolutionUnit::Inch,
            3 => ResolutionUnit::Centimetre,
            _ => ResolutionUnit::Unknown,
        }
    }
}

// =============================================================================
// Catalog entries
// =============================================================================

/// One pyramid step in file-native order (index 0 = full resolution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionLevel {
    pub image_width: u32,
    pub image_height: u32,

    /// Nominal tile size; may differ between levels
    pub tile_width: u32,
    pub tile_height: u32,

    /// Where the level lives in the container
    pub locator: Locator,

    /// Position in directory 0's SubIFDs list, for nested levels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_ifd_slot: Option<usize>,
}

impl ResolutionLevel {
    /// Tiles per row, counting a partial last column.
    pub fn tiles_across(&self) -> u32 {
        self.image_width.div_ceil(self.tile_width.max(1))
    }

    /// Tiles per column, counting a partial last row.
    pub fn tiles_down(&self) -> u32 {
        self.image_height.div_ceil(self.tile_height.max(1))
    }
}

/// One plane of a multi-layer stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackLayer {
    /// Position in the layer ordering (0-based)
    pub sequence_index: usize,

    /// Top-level directory holding the layer
    pub directory: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

/// Physical pixel density.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhysicalResolution {
    pub x: f64,
    pub y: f64,
    pub unit: ResolutionUnit,
}

// =============================================================================
// PyramidCatalog
// =============================================================================

/// Everything known about an image after one walk of its directories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PyramidCatalog {
    pub scheme: PyramidScheme,

    /// Levels in file-native order, largest first
    pub levels: Vec<ResolutionLevel>,

    /// Stack layers; empty for ordinary pyramids
    pub stack: Vec<StackLayer>,

    pub channels: u32,
    pub bits_per_channel: u32,
    pub sample_type: SampleType,
    pub colour_space: ColourSpace,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<PhysicalResolution>,

    /// Per-channel sample range
    pub min_values: Vec<f32>,
    pub max_values: Vec<f32>,

    /// Descriptive metadata keyed by short names (creator, date, ...)
    pub metadata: BTreeMap<String, String>,

    #[serde(skip)]
    pub icc_profile: Option<Bytes>,
}

impl PyramidCatalog {
    /// Walk the container's directories and build the catalog.
    ///
    /// The codec's directory cursor is restored before returning.
    pub fn build<C: DirectoryCodec + ?Sized>(codec: &mut C) -> Result<Self, PyramidError> {
        let start = codec.current_directory();
        seek_directory(codec, 0)?;

        let mut catalog = read_global_tags(codec)?;

        let sub_ifds = codec
            .tag(TiffTag::SubIfds)
            .and_then(TagValue::as_u64_vec)
            .unwrap_or_default();

        if !sub_ifds.is_empty() {
            for (slot, &offset) in sub_ifds.iter().enumerate() {
                codec.set_sub_directory(offset).map_err(|e| {
                    PyramidError::seek(Locator::SubDirectory { parent: 0, offset }, e)
                })?;

                if codec.tag_u32(TiffTag::NewSubfileType) != Some(SUBFILE_REDUCED_IMAGE) {
                    debug!(slot, offset, "Skipping SubIFD that is not a reduced-resolution image");
                    continue;
                }

                match read_level(codec, Locator::SubDirectory { parent: 0, offset }) {
                    Some(mut level) => {
                        level.sub_ifd_slot = Some(slot);
                        catalog.levels.push(level);
                    }
                    None => debug!(slot, offset, "Skipping untiled SubIFD"),
                }
            }

            if catalog.levels.len() > 1 {
                catalog.scheme = PyramidScheme::SubIfd;
                catalog.stack = scan_stack_layers(codec)?;
            }

            seek_directory(codec, 0)?;
        }

        if catalog.scheme == PyramidScheme::Normal {
            while codec.next_directory()? {
                let locator = codec.current_directory();
                if let Some(level) = read_level(codec, locator) {
                    catalog.levels.push(level);
                }
            }

            if catalog.levels.len() >= 2
                && catalog.levels[0].image_width == catalog.levels[1].image_width
                && catalog.levels[0].image_height == catalog.levels[1].image_height
            {
                let stack = scan_stack_layers(codec)?;
                if !stack.is_empty() {
                    debug!(layers = stack.len(), "Equal-sized leading levels form a stack");
                    catalog.levels.truncate(1);
                    catalog.stack = stack;
                }
            }
        }

        restore_cursor(codec, start)?;

        debug!(
            scheme = ?catalog.scheme,
            levels = catalog.levels.len(),
            layers = catalog.stack.len(),
            "Built pyramid catalog"
        );

        Ok(catalog)
    }

    /// Number of resolution levels.
    pub fn num_resolutions(&self) -> usize {
        self.levels.len()
    }

    /// Native index for protocol resolution `res` (0 = smallest).
    pub fn native_index(&self, res: usize) -> Option<usize> {
        self.levels.len().checked_sub(1)?.checked_sub(res)
    }

    /// Level for protocol resolution `res`.
    pub fn level(&self, res: usize) -> Option<&ResolutionLevel> {
        self.native_index(res).map(|native| &self.levels[native])
    }

    /// Image dimensions in protocol order, smallest first.
    pub fn dimensions(&self) -> Vec<(u32, u32)> {
        self.levels
            .iter()
            .rev()
            .map(|l| (l.image_width, l.image_height))
            .collect()
    }

    /// Whether the image is a stack of equal-sized layers.
    pub fn is_stack(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Full-resolution tile size.
    pub fn tile_size(&self) -> (u32, u32) {
        self.levels
            .first()
            .map(|l| (l.tile_width, l.tile_height))
            .unwrap_or((0, 0))
    }
}

// =============================================================================
// Build steps
// =============================================================================

fn seek_directory<C: DirectoryCodec + ?Sized>(codec: &mut C, index: usize) -> Result<(), PyramidError> {
    codec
        .set_directory(index)
        .map_err(|e| PyramidError::seek(Locator::Directory(index), e))
}

fn restore_cursor<C: DirectoryCodec + ?Sized>(codec: &mut C, locator: Locator) -> Result<(), PyramidError> {
    if codec.current_directory() == locator {
        return Ok(());
    }
    match locator {
        Locator::Directory(index) => seek_directory(codec, index),
        Locator::SubDirectory { parent, offset } => {
            seek_directory(codec, parent)?;
            codec
                .set_sub_directory(offset)
                .map_err(|e| PyramidError::seek(locator, e))
        }
    }
}

/// Level geometry of the current directory, if it is tiled.
fn read_level<C: DirectoryCodec + ?Sized>(codec: &C, locator: Locator) -> Option<ResolutionLevel> {
    let tile_width = codec.tag_u32(TiffTag::TileWidth)?;
    let tile_height = codec.tag_u32(TiffTag::TileLength)?;

    Some(ResolutionLevel {
        image_width: codec.tag_u32(TiffTag::ImageWidth).unwrap_or(0),
        image_height: codec.tag_u32(TiffTag::ImageLength).unwrap_or(0),
        tile_width,
        tile_height,
        locator,
        sub_ifd_slot: None,
    })
}

/// Read image-wide properties from directory 0 (the cursor must be there).
fn read_global_tags<C: DirectoryCodec + ?Sized>(codec: &C) -> Result<PyramidCatalog, PyramidError> {
    let base = read_level(codec, Locator::Directory(0)).ok_or(TiffError::NotTiled)?;

    let bits_per_channel = codec.tag_u32(TiffTag::BitsPerSample).unwrap_or(1);
    let samples_per_pixel = codec.tag_u32(TiffTag::SamplesPerPixel).unwrap_or(1);
    let sample_type = SampleType::from_sample_format(codec.tag_u32(TiffTag::SampleFormat).unwrap_or(1));
    let photometric =
        Photometric::from_u16(codec.tag_u16(TiffTag::PhotometricInterpretation).unwrap_or(1));

    let colour_space = ColourSpace::classify(photometric, bits_per_channel);
    let channels = if photometric == Photometric::Palette {
        1
    } else {
        samples_per_pixel
    };

    let resolution = match (
        codec.tag(TiffTag::XResolution).and_then(TagValue::first_f64),
        codec.tag(TiffTag::YResolution).and_then(TagValue::first_f64),
    ) {
        (Some(x), Some(y)) => Some(PhysicalResolution {
            x,
            y,
            unit: ResolutionUnit::from_tiff(codec.tag_u32(TiffTag::ResolutionUnit).unwrap_or(2)),
        }),
        _ => None,
    };

    let (min_values, max_values) = sample_range(codec, channels, bits_per_channel, sample_type);

    Ok(PyramidCatalog {
        scheme: PyramidScheme::Normal,
        levels: vec![base],
        stack: Vec::new(),
        channels,
        bits_per_channel,
        sample_type,
        colour_space,
        resolution,
        min_values,
        max_values,
        metadata: read_metadata(codec),
        icc_profile: codec
            .tag(TiffTag::IccProfile)
            .and_then(TagValue::as_bytes)
            .cloned(),
    })
}

/// Full-scale maximum for a bit depth, used when the file gives none.
pub fn default_max_value(bits_per_channel: u32, sample_type: SampleType) -> f64 {
    match (bits_per_channel, sample_type) {
        (0..=8, _) => 255.0,
        (12, _) => 4095.0,
        (16, _) => 65535.0,
        (32, SampleType::FixedPoint) => 4_294_967_295.0,
        (32, SampleType::FloatingPoint) => 1.0,
        _ => 0.0,
    }
}

fn sample_range<C: DirectoryCodec + ?Sized>(
    codec: &C,
    channels: u32,
    bits_per_channel: u32,
    sample_type: SampleType,
) -> (Vec<f32>, Vec<f32>) {
    let per_channel = |tag: TiffTag| -> Vec<f64> {
        let values = codec
            .tag(tag)
            .and_then(TagValue::as_f64_vec)
            .unwrap_or_default();
        (0..channels as usize)
            .map(|i| match values.len() {
                0 => 0.0,
                1 => values[0],
                _ => values.get(i).copied().unwrap_or(0.0),
            })
            .collect()
    };

    let min = per_channel(TiffTag::SMinSampleValue);
    let max = per_channel(TiffTag::SMaxSampleValue)
        .into_iter()
        .map(|v| {
            if v == 0.0 {
                default_max_value(bits_per_channel, sample_type)
            } else {
                v
            }
        })
        .collect::<Vec<_>>();

    (
        min.into_iter().map(|v| v as f32).collect(),
        max.into_iter().map(|v| v as f32).collect(),
    )
}

fn read_metadata<C: DirectoryCodec + ?Sized>(codec: &C) -> BTreeMap<String, String> {
    const TEXT_TAGS: [(TiffTag, &str); 9] = [
        (TiffTag::Artist, "creator"),
        (TiffTag::Copyright, "rights"),
        (TiffTag::DateTime, "date"),
        (TiffTag::ImageDescription, "description"),
        (TiffTag::DocumentName, "title"),
        (TiffTag::PageName, "pagename"),
        (TiffTag::Software, "software"),
        (TiffTag::Make, "make"),
        (TiffTag::Model, "model"),
    ];

    let mut metadata = BTreeMap::new();
    for (tag, key) in TEXT_TAGS {
        if let Some(value) = codec.tag_str(tag) {
            metadata.insert(key.to_string(), value.to_string());
        }
    }

    let xmp = match codec.tag(TiffTag::XmlPacket) {
        Some(TagValue::Bytes(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Some(TagValue::Ascii(text)) => Some(text.clone()),
        _ => None,
    };
    if let Some(xmp) = xmp {
        metadata.insert("xmp".to_string(), xmp);
    }

    if let Some(scale) = codec.tag(TiffTag::StoNits).and_then(TagValue::first_f64) {
        metadata.insert("scale".to_string(), format!("{}", scale));
    }

    metadata
}

/// Collect every top-level directory tagged as a page.
///
/// Leaves the cursor on the last top-level directory.
fn scan_stack_layers<C: DirectoryCodec + ?Sized>(codec: &mut C) -> Result<Vec<StackLayer>, PyramidError> {
    seek_directory(codec, 0)?;

    let mut layers = Vec::new();
    loop {
        if codec.tag_u32(TiffTag::NewSubfileType) == Some(SUBFILE_PAGE) {
            let directory = match codec.current_directory() {
                Locator::Directory(index) => index,
                Locator::SubDirectory { parent, .. } => parent,
            };
            layers.push(StackLayer {
                sequence_index: layers.len(),
                directory,
                name: codec.tag_str(TiffTag::DocumentName).map(str::to_string),
                scale: codec
                    .tag(TiffTag::StoNits)
                    .and_then(TagValue::first_f64)
                    .map(|s| s as f32),
            });
        }

        if !codec.next_directory()? {
            break;
        }
    }

    Ok(layers)
}

// =============================================================================
// Tests
// =============================================================================
