//! Test utilities for integration tests.
//!
//! This module provides a TIFF byte builder covering classic TIFF and
//! BigTIFF in either byte order, nested SubIFDs and tiled image data, plus
//! helpers that compress tile payloads the way real writers do.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression as DeflateLevel;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

// =============================================================================
// Tag numbers
// =============================================================================

pub const NEW_SUBFILE_TYPE: u16 = 254;
pub const IMAGE_WIDTH: u16 = 256;
pub const IMAGE_LENGTH: u16 = 257;
pub const BITS_PER_SAMPLE: u16 = 258;
pub const COMPRESSION: u16 = 259;
pub const PHOTOMETRIC: u16 = 262;
pub const DOCUMENT_NAME: u16 = 269;
pub const IMAGE_DESCRIPTION: u16 = 270;
pub const SAMPLES_PER_PIXEL: u16 = 277;
pub const X_RESOLUTION: u16 = 282;
pub const Y_RESOLUTION: u16 = 283;
pub const PLANAR_CONFIGURATION: u16 = 284;
pub const PAGE_NAME: u16 = 285;
pub const RESOLUTION_UNIT: u16 = 296;
pub const SOFTWARE: u16 = 305;
pub const DATE_TIME: u16 = 306;
pub const ARTIST: u16 = 315;
pub const PREDICTOR: u16 = 317;
pub const TILE_WIDTH: u16 = 322;
pub const TILE_LENGTH: u16 = 323;
pub const TILE_OFFSETS: u16 = 324;
pub const TILE_BYTE_COUNTS: u16 = 325;
pub const SUB_IFDS: u16 = 330;
pub const SAMPLE_FORMAT: u16 = 339;
pub const S_MAX_SAMPLE_VALUE: u16 = 341;
pub const COPYRIGHT: u16 = 33432;
pub const ICC_PROFILE: u16 = 34675;

// =============================================================================
// TIFF File Builder
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

/// Value of one IFD entry.
#[derive(Clone, Debug)]
pub enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Ascii(String),
    Rational(Vec<(u32, u32)>),
    Undefined(Vec<u8>),
    Double(Vec<f64>),
    Long8(Vec<u64>),
}

/// One image file directory.
#[derive(Clone, Debug, Default)]
pub struct IfdBuilder {
    entries: Vec<(u16, Value)>,
    tiles: Option<Vec<Vec<u8>>>,
    sub_ifds: Vec<IfdBuilder>,
}

impl IfdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uncompressed tiled image directory with zero-filled tiles.
    pub fn tiled(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        let tiles = width.div_ceil(tile_width) * height.div_ceil(tile_height);
        let size = (tile_width * tile_height) as usize;
        Self::new()
            .long(IMAGE_WIDTH, width)
            .long(IMAGE_LENGTH, height)
            .short(BITS_PER_SAMPLE, 8)
            .short(COMPRESSION, 1)
            .short(PHOTOMETRIC, 1)
            .short(SAMPLES_PER_PIXEL, 1)
            .long(TILE_WIDTH, tile_width)
            .long(TILE_LENGTH, tile_height)
            .with_tiles((0..tiles).map(|_| vec![0u8; size]).collect())
    }

    /// Strip-organised directory (no tile tags).
    pub fn stripped(width: u32, height: u32) -> Self {
        Self::new()
            .long(IMAGE_WIDTH, width)
            .long(IMAGE_LENGTH, height)
            .short(BITS_PER_SAMPLE, 8)
            .short(COMPRESSION, 1)
            .short(PHOTOMETRIC, 1)
    }

    /// Set (or replace) a tag.
    pub fn tag(mut self, tag: u16, value: Value) -> Self {
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.push((tag, value));
        self
    }

    pub fn short(self, tag: u16, value: u16) -> Self {
        self.tag(tag, Value::Short(vec![value]))
    }

    pub fn long(self, tag: u16, value: u32) -> Self {
        self.tag(tag, Value::Long(vec![value]))
    }

    pub fn ascii(self, tag: u16, value: &str) -> Self {
        self.tag(tag, Value::Ascii(value.to_string()))
    }

    /// Tile payloads, already compressed as the Compression tag says.
    pub fn with_tiles(mut self, tiles: Vec<Vec<u8>>) -> Self {
        self.tiles = Some(tiles);
        self
    }

    pub fn with_sub_ifd(mut self, ifd: IfdBuilder) -> Self {
        self.sub_ifds.push(ifd);
        self
    }
}

/// Builder for complete TIFF files.
pub struct TiffBuilder {
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    ifds: Vec<IfdBuilder>,
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            ifds: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, is_bigtiff: bool) -> Self {
        self.is_bigtiff = is_bigtiff;
        self
    }

    pub fn add_ifd(mut self, ifd: IfdBuilder) -> Self {
        self.ifds.push(ifd);
        self
    }

    /// Serialize the file. Every directory is written after the data it
    /// points to, so no offset needs patching except the chain links.
    pub fn build(self) -> Vec<u8> {
        let mut w = Writer {
            data: Vec::new(),
            le: self.byte_order == ByteOrderType::LittleEndian,
            big: self.is_bigtiff,
        };

        w.data.extend_from_slice(if w.le { b"II" } else { b"MM" });
        if w.big {
            w.u16(43);
            w.u16(8);
            w.u16(0);
        } else {
            w.u16(42);
        }
        let mut link = w.data.len();
        w.offset(0);

        for ifd in &self.ifds {
            let (offset, next) = w.ifd(ifd);
            w.patch_offset(link, offset);
            link = next;
        }

        w.data
    }
}

struct Writer {
    data: Vec<u8>,
    le: bool,
    big: bool,
}

impl Writer {
    fn u16(&mut self, v: u16) {
        let b = if self.le { v.to_le_bytes() } else { v.to_be_bytes() };
        self.data.extend_from_slice(&b);
    }

    fn u32(&mut self, v: u32) {
        let b = if self.le { v.to_le_bytes() } else { v.to_be_bytes() };
        self.data.extend_from_slice(&b);
    }

    fn u64(&mut self, v: u64) {
        let b = if self.le { v.to_le_bytes() } else { v.to_be_bytes() };
        self.data.extend_from_slice(&b);
    }

    fn offset(&mut self, v: u64) {
        if self.big {
            self.u64(v)
        } else {
            self.u32(v as u32)
        }
    }

    fn patch_offset(&mut self, pos: usize, v: u64) {
        let bytes = self.offset_bytes(v);
        self.data[pos..pos + bytes.len()].copy_from_slice(&bytes);
    }

    fn align(&mut self) {
        if self.data.len() % 2 == 1 {
            self.data.push(0);
        }
    }

    /// Encode a value as (field type, count, bytes in file order).
    fn encode(&self, value: &Value) -> (u16, u64, Vec<u8>) {
        let mut tmp = Writer {
            data: Vec::new(),
            le: self.le,
            big: self.big,
        };
        let (field_type, count) = match value {
            Value::Short(v) => {
                v.iter().for_each(|&x| tmp.u16(x));
                (3, v.len())
            }
            Value::Long(v) => {
                v.iter().for_each(|&x| tmp.u32(x));
                (4, v.len())
            }
            Value::Ascii(s) => {
                tmp.data.extend_from_slice(s.as_bytes());
                tmp.data.push(0);
                (2, s.len() + 1)
            }
            Value::Rational(v) => {
                v.iter().for_each(|&(n, d)| {
                    tmp.u32(n);
                    tmp.u32(d);
                });
                (5, v.len())
            }
            Value::Undefined(v) => {
                tmp.data.extend_from_slice(v);
                (7, v.len())
            }
            Value::Double(v) => {
                v.iter().for_each(|&x| tmp.u64(x.to_bits()));
                (12, v.len())
            }
            Value::Long8(v) => {
                v.iter().for_each(|&x| tmp.u64(x));
                (16, v.len())
            }
        };
        (field_type, count as u64, tmp.data)
    }

    /// Write a directory with its sub-directories and data; returns the
    /// directory offset and the position of its next-IFD link.
    fn ifd(&mut self, ifd: &IfdBuilder) -> (u64, usize) {
        let mut entries = ifd.entries.clone();

        if !ifd.sub_ifds.is_empty() {
            let offsets: Vec<u64> = ifd.sub_ifds.iter().map(|sub| self.ifd(sub).0).collect();
            entries.push((SUB_IFDS, self.offset_value(&offsets)));
        }

        if let Some(tiles) = &ifd.tiles {
            let mut offsets = Vec::with_capacity(tiles.len());
            let mut counts = Vec::with_capacity(tiles.len());
            for tile in tiles {
                self.align();
                offsets.push(if tile.is_empty() { 0 } else { self.data.len() as u64 });
                counts.push(tile.len() as u64);
                self.data.extend_from_slice(tile);
            }
            entries.push((TILE_OFFSETS, self.offset_value(&offsets)));
            entries.push((TILE_BYTE_COUNTS, self.offset_value(&counts)));
        }

        entries.sort_by_key(|(tag, _)| *tag);

        let inline = if self.big { 8 } else { 4 };
        let mut encoded = Vec::with_capacity(entries.len());
        for (tag, value) in &entries {
            let (field_type, count, mut bytes) = self.encode(value);
            if bytes.len() > inline {
                self.align();
                let pos = self.data.len() as u64;
                self.data.extend_from_slice(&bytes);
                bytes = self.offset_bytes(pos);
            } else {
                bytes.resize(inline, 0);
            }
            encoded.push((*tag, field_type, count, bytes));
        }

        self.align();
        let ifd_offset = self.data.len() as u64;
        if self.big {
            self.u64(encoded.len() as u64);
        } else {
            self.u16(encoded.len() as u16);
        }
        for (tag, field_type, count, bytes) in encoded {
            self.u16(tag);
            self.u16(field_type);
            if self.big {
                self.u64(count);
            } else {
                self.u32(count as u32);
            }
            self.data.extend_from_slice(&bytes);
        }
        let next = self.data.len();
        self.offset(0);

        (ifd_offset, next)
    }

    fn offset_value(&self, values: &[u64]) -> Value {
        if self.big {
            Value::Long8(values.to_vec())
        } else {
            Value::Long(values.iter().map(|&v| v as u32).collect())
        }
    }

    fn offset_bytes(&self, v: u64) -> Vec<u8> {
        match (self.big, self.le) {
            (true, true) => v.to_le_bytes().to_vec(),
            (true, false) => v.to_be_bytes().to_vec(),
            (false, true) => (v as u32).to_le_bytes().to_vec(),
            (false, false) => (v as u32).to_be_bytes().to_vec(),
        }
    }
}

// =============================================================================
// Tile payloads
// =============================================================================

/// Deterministic single-channel tile: value = ((x + 2y) mod 256) xor seed.
pub fn gradient_tile(width: u32, height: u32, seed: u8) -> Vec<u8> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x + 2 * y) as u8 ^ seed))
        .collect()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), DeflateLevel::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn lzw(data: &[u8]) -> Vec<u8> {
    weezl::encode::Encoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
        .encode(data)
        .unwrap()
}

/// Literal-only PackBits encoding.
pub fn packbits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(128) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Solid-colour RGB JPEG, stored as YCbCr by the encoder.
pub fn rgb_jpeg(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(colour));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 95)
        .encode_image(&img)
        .unwrap();
    buf
}

// =============================================================================
// Fixtures
// =============================================================================

/// Three-level classic pyramid: 100x80, 50x40, 25x20 with 32x32 tiles.
///
/// Tile `i` of the full-resolution level is a gradient seeded with `i`.
pub fn classic_pyramid(byte_order: ByteOrderType, bigtiff: bool) -> Vec<u8> {
    let base_tiles = (0..12).map(|i| gradient_tile(32, 32, i as u8)).collect();
    TiffBuilder::new()
        .with_byte_order(byte_order)
        .with_bigtiff(bigtiff)
        .add_ifd(IfdBuilder::tiled(100, 80, 32, 32).with_tiles(base_tiles))
        .add_ifd(IfdBuilder::tiled(50, 40, 32, 32).long(NEW_SUBFILE_TYPE, 1))
        .add_ifd(IfdBuilder::tiled(25, 20, 32, 32).long(NEW_SUBFILE_TYPE, 1))
        .build()
}

/// Same levels as `classic_pyramid`, nested in directory 0's SubIFDs.
pub fn sub_ifd_pyramid(bigtiff: bool) -> Vec<u8> {
    TiffBuilder::new()
        .with_bigtiff(bigtiff)
        .add_ifd(
            IfdBuilder::tiled(100, 80, 32, 32)
                .with_sub_ifd(IfdBuilder::tiled(50, 40, 32, 32).long(NEW_SUBFILE_TYPE, 1))
                .with_sub_ifd(
                    IfdBuilder::tiled(25, 20, 32, 32)
                        .long(NEW_SUBFILE_TYPE, 1)
                        .with_tiles(vec![vec![7u8; 1024]]),
                ),
        )
        .build()
}

/// Stack of equal-sized page directories; layer `i` is filled with `10 * (i + 1)`.
pub fn page_stack(layers: usize) -> Vec<u8> {
    let mut builder = TiffBuilder::new();
    for i in 0..layers {
        let fill = 10 * (i as u8 + 1);
        builder = builder.add_ifd(
            IfdBuilder::tiled(64, 64, 32, 32)
                .long(NEW_SUBFILE_TYPE, 2)
                .ascii(DOCUMENT_NAME, &format!("layer {}", i))
                .with_tiles((0..4).map(|_| vec![fill; 1024]).collect()),
        );
    }
    builder.build()
}
