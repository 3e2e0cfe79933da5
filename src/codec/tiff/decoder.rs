//! `DirectoryCodec` implementation over TIFF and BigTIFF files.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use tracing::{debug, trace};

use crate::codec::jpeg::{decode_jpeg, prepare_tile_jpeg};
use crate::codec::{DecodeOption, Diagnostics, DirectoryCodec, Locator, TagValue, TracingDiagnostics};
use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES};
use super::tags::{Compression, Photometric, PlanarConfiguration, TiffTag};
use super::values::ValueReader;

/// Upper bound on the length of the top-level directory chain.
pub const MAX_DIRECTORIES: usize = 65_536;

const DIAGNOSTICS_MODULE: &str = "TiffCodec";

// =============================================================================
// Directory
// =============================================================================

/// Tags of the directory under the cursor, resolved eagerly on load.
#[derive(Debug, Default)]
struct Directory {
    tags: HashMap<u16, TagValue>,
}

impl Directory {
    fn get(&self, tag: TiffTag) -> Option<&TagValue> {
        self.tags.get(&tag.as_u16())
    }

    fn u32_or(&self, tag: TiffTag, default: u32) -> u32 {
        self.get(tag).and_then(TagValue::first_u32).unwrap_or(default)
    }

    /// First value as u16; absent and out-of-range values read as `default`.
    fn u16_or(&self, tag: TiffTag, default: u16) -> u16 {
        self.get(tag).and_then(TagValue::first_u16).unwrap_or(default)
    }

    fn is_tiled(&self) -> bool {
        self.get(TiffTag::TileWidth).is_some() && self.get(TiffTag::TileLength).is_some()
    }

    fn planar(&self) -> PlanarConfiguration {
        PlanarConfiguration::from_u16(self.u16_or(TiffTag::PlanarConfiguration, 1))
    }
}

// =============================================================================
// TiffCodec
// =============================================================================

/// Directory cursor over a TIFF or BigTIFF container.
///
/// The top-level IFD chain is discovered lazily: seeking to directory `n`
/// walks the chain only as far as `n`.
pub struct TiffCodec<R: RangeReader> {
    reader: R,
    header: TiffHeader,
    diagnostics: Arc<dyn Diagnostics>,

    /// Offsets of the top-level directories discovered so far
    chain: Vec<u64>,
    visited: HashSet<u64>,
    chain_complete: bool,

    current: Locator,
    last_top: usize,
    directory: Directory,

    jpeg_colour_rgb: bool,
}

impl<R: RangeReader> TiffCodec<R> {
    /// Open a container, warning through `tracing`.
    pub fn open(reader: R) -> Result<Self, TiffError> {
        Self::with_diagnostics(reader, Arc::new(TracingDiagnostics))
    }

    /// Open a container with an explicit warning sink.
    ///
    /// Parses the header and loads directory 0.
    pub fn with_diagnostics(reader: R, diagnostics: Arc<dyn Diagnostics>) -> Result<Self, TiffError> {
        let size = reader.size();
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, size)?;

        debug!(
            source = reader.identifier(),
            bigtiff = header.is_bigtiff,
            byte_order = ?header.byte_order,
            "Opened TIFF container"
        );

        let mut codec = TiffCodec {
            reader,
            header,
            diagnostics,
            chain: vec![header.first_ifd_offset],
            visited: HashSet::from([header.first_ifd_offset]),
            chain_complete: false,
            current: Locator::Directory(0),
            last_top: 0,
            directory: Directory::default(),
            jpeg_colour_rgb: false,
        };
        codec.directory = codec.load_directory(header.first_ifd_offset)?;

        Ok(codec)
    }

    /// Parsed file header.
    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    /// Underlying range reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    // -------------------------------------------------------------------------
    // Directory loading
    // -------------------------------------------------------------------------

    fn read_ifd(&self, offset: u64) -> Result<Ifd, TiffError> {
        let size = self.reader.size();
        let count_size = self.header.ifd_count_size();
        if offset.saturating_add(count_size as u64) > size {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let count_bytes = self.reader.read_exact_at(offset, count_size)?;
        let entry_count = if self.header.is_bigtiff {
            self.header.byte_order.read_u64(&count_bytes)
        } else {
            self.header.byte_order.read_u16(&count_bytes) as u64
        };
        if entry_count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        let ifd_size = Ifd::calculate_size(entry_count, &self.header);
        let bytes = self.reader.read_exact_at(offset, ifd_size)?;
        Ifd::parse(&bytes, &self.header)
    }

    fn load_directory(&self, offset: u64) -> Result<Directory, TiffError> {
        let ifd = self.read_ifd(offset)?;
        let values = ValueReader::new(&self.reader, &self.header);
        let mut tags = HashMap::with_capacity(ifd.entries.len());

        for entry in &ifd.entries {
            if entry.field_type.is_none() {
                self.diagnostics.warning(
                    DIAGNOSTICS_MODULE,
                    &format!(
                        "{}: unknown field type {} for tag {}, ignored",
                        self.reader.identifier(),
                        entry.field_type_raw,
                        entry.tag_id
                    ),
                );
                continue;
            }

            match values.read_value(entry) {
                Ok(value) => {
                    tags.insert(entry.tag_id, value);
                }
                Err(e) => self.diagnostics.warning(
                    DIAGNOSTICS_MODULE,
                    &format!(
                        "{}: unreadable value for tag {}: {}",
                        self.reader.identifier(),
                        entry.tag_id,
                        e
                    ),
                ),
            }
        }

        trace!(offset, tags = tags.len(), "Loaded directory");
        Ok(Directory { tags })
    }

    /// Offset of the directory following the one at `offset` (0 = none).
    fn read_next_offset(&self, offset: u64) -> Result<u64, TiffError> {
        Ok(self.read_ifd(offset)?.next_ifd_offset)
    }

    /// Walk the chain until directory `index` is known or the chain ends.
    fn discover(&mut self, index: usize) -> Result<(), TiffError> {
        while self.chain.len() <= index && !self.chain_complete {
            let last = self.chain[self.chain.len() - 1];
            let next = self.read_next_offset(last)?;

            if next == 0 {
                self.chain_complete = true;
            } else if next >= self.reader.size() || !self.visited.insert(next) {
                self.diagnostics.warning(
                    DIAGNOSTICS_MODULE,
                    &format!(
                        "{}: directory chain broken at offset {}",
                        self.reader.identifier(),
                        next
                    ),
                );
                self.chain_complete = true;
            } else if self.chain.len() >= MAX_DIRECTORIES {
                self.diagnostics.warning(
                    DIAGNOSTICS_MODULE,
                    &format!(
                        "{}: more than {} directories, chain truncated",
                        self.reader.identifier(),
                        MAX_DIRECTORIES
                    ),
                );
                self.chain_complete = true;
            } else {
                self.chain.push(next);
            }
        }
        Ok(())
    }

    /// Number of top-level directories (walks the whole chain).
    pub fn directory_count(&mut self) -> Result<usize, TiffError> {
        self.discover(usize::MAX)?;
        Ok(self.chain.len())
    }

    // -------------------------------------------------------------------------
    // Tile geometry
    // -------------------------------------------------------------------------

    fn samples_per_pixel(&self) -> u32 {
        self.directory.u32_or(TiffTag::SamplesPerPixel, 1).max(1)
    }

    fn bits_per_sample(&self) -> u32 {
        self.directory.u32_or(TiffTag::BitsPerSample, 1).max(1)
    }

    /// Samples interleaved in one decoded row.
    fn samples_per_row_pixel(&self) -> u32 {
        match self.directory.planar() {
            PlanarConfiguration::Separate => 1,
            PlanarConfiguration::Chunky => self.samples_per_pixel(),
        }
    }

    /// Bytes of one decoded row, padded to a byte boundary.
    fn tile_row_bytes(&self) -> usize {
        let width = self.directory.u32_or(TiffTag::TileWidth, 0) as usize;
        let bits = width * self.samples_per_row_pixel() as usize * self.bits_per_sample() as usize;
        bits.div_ceil(8)
    }

    // -------------------------------------------------------------------------
    // Decompression
    // -------------------------------------------------------------------------

    /// Decompress one tile, producing at most `limit` bytes.
    fn decompress(&self, compression: Compression, raw: &[u8], limit: usize) -> Result<Vec<u8>, TiffError> {
        match compression {
            Compression::None => Ok(raw[..raw.len().min(limit)].to_vec()),
            Compression::PackBits => unpack_bits(raw, limit),
            Compression::Lzw => decode_lzw(raw, limit),
            Compression::Deflate | Compression::AdobeDeflate => {
                let mut decoder = ZlibDecoder::new(raw).take(limit as u64);
                let mut out = Vec::with_capacity(limit);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| TiffError::Decompression(format!("Deflate: {}", e)))?;
                Ok(out)
            }
            Compression::Jpeg => {
                let photometric =
                    Photometric::from_u16(self.directory.u16_or(TiffTag::PhotometricInterpretation, 1));
                if photometric == Photometric::YCbCr && !self.jpeg_colour_rgb {
                    return Err(TiffError::Decompression(
                        "YCbCr JPEG tile needs RGB colour conversion enabled".to_string(),
                    ));
                }

                let tables = self
                    .directory
                    .get(TiffTag::JpegTables)
                    .and_then(TagValue::as_bytes)
                    .map(|b| b.as_ref());
                let stream = prepare_tile_jpeg(tables, raw);
                let channels = if self.samples_per_row_pixel() == 1 { 1 } else { 3 };
                decode_jpeg(&stream, channels, limit)
            }
            Compression::OldJpeg | Compression::Jpeg2000 => Err(
                TiffError::UnsupportedCompression(compression.name().to_string()),
            ),
        }
    }

    /// Convert multi-byte samples from file order to host order.
    fn to_host_order(&self, data: &mut [u8]) {
        let file_is_le = self.header.byte_order == ByteOrder::LittleEndian;
        if file_is_le == cfg!(target_endian = "little") {
            return;
        }
        match self.bits_per_sample() {
            16 => data.chunks_exact_mut(2).for_each(|c| c.reverse()),
            32 => data.chunks_exact_mut(4).for_each(|c| c.reverse()),
            64 => data.chunks_exact_mut(8).for_each(|c| c.reverse()),
            _ => {}
        }
    }

    /// Undo horizontal differencing (Predictor = 2).
    fn reverse_predictor(&self, data: &mut [u8]) {
        let stride = self.samples_per_row_pixel() as usize;
        let row_bytes = self.tile_row_bytes();
        if row_bytes == 0 {
            return;
        }

        match self.bits_per_sample() {
            8 => {
                for row in data.chunks_exact_mut(row_bytes) {
                    for i in stride..row.len() {
                        row[i] = row[i].wrapping_add(row[i - stride]);
                    }
                }
            }
            16 => {
                for row in data.chunks_exact_mut(row_bytes) {
                    for i in stride..row.len() / 2 {
                        let prev = u16::from_ne_bytes([row[(i - stride) * 2], row[(i - stride) * 2 + 1]]);
                        let cur = u16::from_ne_bytes([row[i * 2], row[i * 2 + 1]]);
                        let value = cur.wrapping_add(prev).to_ne_bytes();
                        row[i * 2] = value[0];
                        row[i * 2 + 1] = value[1];
                    }
                }
            }
            bits => self.diagnostics.warning(
                DIAGNOSTICS_MODULE,
                &format!("horizontal predictor not supported for {}-bit samples", bits),
            ),
        }
    }
}

impl<R: RangeReader> DirectoryCodec for TiffCodec<R> {
    fn current_directory(&self) -> Locator {
        self.current
    }

    fn set_directory(&mut self, index: usize) -> Result<(), TiffError> {
        self.discover(index)?;
        let offset = *self
            .chain
            .get(index)
            .ok_or(TiffError::DirectoryNotFound(index))?;

        self.directory = self.load_directory(offset)?;
        self.current = Locator::Directory(index);
        self.last_top = index;
        Ok(())
    }

    fn next_directory(&mut self) -> Result<bool, TiffError> {
        let next = self.last_top + 1;
        self.discover(next)?;
        if next >= self.chain.len() {
            return Ok(false);
        }
        self.set_directory(next)?;
        Ok(true)
    }

    fn set_sub_directory(&mut self, offset: u64) -> Result<(), TiffError> {
        if offset == 0 || offset >= self.reader.size() {
            return Err(TiffError::InvalidIfdOffset(offset));
        }

        self.directory = self.load_directory(offset)?;
        self.current = Locator::SubDirectory {
            parent: self.last_top,
            offset,
        };
        Ok(())
    }

    fn tag(&self, tag: TiffTag) -> Option<&TagValue> {
        self.directory.get(tag)
    }

    fn set_decode_option(&mut self, option: DecodeOption) {
        match option {
            DecodeOption::JpegColourRgb => self.jpeg_colour_rgb = true,
        }
    }

    fn tile_byte_size(&self) -> usize {
        if !self.directory.is_tiled() {
            return 0;
        }
        let height = self.directory.u32_or(TiffTag::TileLength, 0) as usize;
        self.tile_row_bytes() * height
    }

    fn tile_count(&self) -> u32 {
        if !self.directory.is_tiled() {
            return 0;
        }
        self.directory
            .get(TiffTag::TileOffsets)
            .map(|v| v.len() as u32)
            .unwrap_or(0)
    }

    fn decode_tile(&mut self, index: u32, buf: &mut [u8]) -> Result<usize, TiffError> {
        if !self.directory.is_tiled() {
            return Err(TiffError::NotTiled);
        }

        let count = self.tile_count();
        if index >= count {
            return Err(TiffError::TileOutOfRange { index, count });
        }

        let compression_raw = self.directory.u32_or(TiffTag::Compression, 1);
        let compression = u16::try_from(compression_raw)
            .ok()
            .and_then(Compression::from_u16)
            .ok_or_else(|| TiffError::UnsupportedCompression(format!("code {}", compression_raw)))?;

        let offsets = self
            .directory
            .get(TiffTag::TileOffsets)
            .and_then(TagValue::as_u64_slice)
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let byte_counts = self
            .directory
            .get(TiffTag::TileByteCounts)
            .and_then(TagValue::as_u64_slice)
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        let offset = offsets[index as usize];
        let byte_count = byte_counts.get(index as usize).copied().ok_or_else(|| {
            TiffError::InvalidTagValue {
                tag: "TileByteCounts",
                message: format!("{} entries for {} tiles", byte_counts.len(), count),
            }
        })?;

        let expected = self.tile_byte_size();
        let n = expected.min(buf.len());

        // Sparse tile
        if byte_count == 0 {
            buf[..n].fill(0);
            return Ok(n);
        }

        let raw = self.reader.read_exact_at(offset, byte_count as usize)?;
        let mut data = self.decompress(compression, &raw, expected)?;

        if compression != Compression::Jpeg {
            self.to_host_order(&mut data);
            if self.directory.u32_or(TiffTag::Predictor, 1) == 2 {
                self.reverse_predictor(&mut data);
            }
        }

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);

        trace!(tile = index, compressed = byte_count, decoded = n, "Decoded tile");
        Ok(n)
    }
}

// =============================================================================
// PackBits
// =============================================================================

/// Decode a PackBits run-length stream, stopping after `limit` bytes.
pub fn unpack_bits(input: &[u8], limit: usize) -> Result<Vec<u8>, TiffError> {
    let mut out = Vec::with_capacity(limit.min(input.len() * 2));
    let mut pos = 0;

    while pos < input.len() && out.len() < limit {
        let n = input[pos] as i8;
        pos += 1;

        if n >= 0 {
            let len = n as usize + 1;
            let literal = input
                .get(pos..pos + len)
                .ok_or_else(|| TiffError::Decompression("PackBits: truncated literal run".into()))?;
            out.extend_from_slice(literal);
            pos += len;
        } else if n != -128 {
            let len = (1 - n as isize) as usize;
            let byte = *input
                .get(pos)
                .ok_or_else(|| TiffError::Decompression("PackBits: truncated repeat run".into()))?;
            out.extend(std::iter::repeat(byte).take(len));
            pos += 1;
        }
    }

    out.truncate(limit);
    Ok(out)
}

// =============================================================================
// LZW
// =============================================================================

/// Decode a TIFF LZW stream into a buffer of at most `limit` bytes.
fn decode_lzw(input: &[u8], limit: usize) -> Result<Vec<u8>, TiffError> {
    let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
    let mut out = vec![0u8; limit];
    let mut consumed = 0;
    let mut filled = 0;

    while filled < limit {
        let result = decoder.decode_bytes(&input[consumed..], &mut out[filled..]);
        consumed += result.consumed_in;
        filled += result.consumed_out;

        match result.status {
            Ok(weezl::LzwStatus::Ok) => {
                if result.consumed_in == 0 && result.consumed_out == 0 {
                    break;
                }
            }
            Ok(weezl::LzwStatus::Done) | Ok(weezl::LzwStatus::NoProgress) => break,
            Err(e) => return Err(TiffError::Decompression(format!("LZW: {}", e))),
        }
    }

    out.truncate(filled);
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
