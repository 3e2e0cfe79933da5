//! TIFF tag value reading.
//!
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays). Either way
//! the whole value is fetched with a single range read and decoded into a
//! [`TagValue`].

use bytes::Bytes;

use crate::codec::TagValue;
use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file.
///
/// This struct combines a RangeReader with TIFF header information to
/// read values respecting the file's byte order and format.
pub struct ValueReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Get the byte order from the header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            if size > self.reader.size() {
                return Err(TiffError::InvalidTagValue {
                    tag: "IFD entry",
                    message: format!(
                        "tag {} claims {} bytes in a {} byte file",
                        entry.tag_id,
                        size,
                        self.reader.size()
                    ),
                });
            }
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size as usize)?)
        }
    }

    /// Read and decode an entry's value.
    pub fn read_value(&self, entry: &IfdEntry) -> Result<TagValue, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        let bytes = self.read_bytes(entry)?;
        Ok(decode_value(field_type, &bytes, self.header.byte_order))
    }
}

/// Decode the raw bytes of a value of `field_type`.
///
/// `bytes` must hold a whole number of elements; any trailing partial
/// element is ignored.
pub fn decode_value(field_type: FieldType, bytes: &Bytes, byte_order: ByteOrder) -> TagValue {
    let size = field_type.size_in_bytes();
    let chunks = bytes.chunks_exact(size);

    match field_type {
        FieldType::Byte | FieldType::Undefined => TagValue::Bytes(bytes.clone()),
        FieldType::Ascii => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            TagValue::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        FieldType::Short => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u16(c) as u64).collect())
        }
        FieldType::Long | FieldType::Ifd => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u32(c) as u64).collect())
        }
        FieldType::Long8 | FieldType::Ifd8 => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u64(c)).collect())
        }
        FieldType::SByte => TagValue::Signed(bytes.iter().map(|&b| b as i8 as i64).collect()),
        FieldType::SShort => TagValue::Signed(
            chunks
                .map(|c| byte_order.read_u16(c) as i16 as i64)
                .collect(),
        ),
        FieldType::SLong => TagValue::Signed(
            chunks
                .map(|c| byte_order.read_u32(c) as i32 as i64)
                .collect(),
        ),
        FieldType::SLong8 => {
            TagValue::Signed(chunks.map(|c| byte_order.read_u64(c) as i64).collect())
        }
        FieldType::Rational => TagValue::Float(
            chunks
                .map(|c| {
                    let num = byte_order.read_u32(&c[0..4]) as f64;
                    let den = byte_order.read_u32(&c[4..8]) as f64;
                    ratio(num, den)
                })
                .collect(),
        ),
        FieldType::SRational => TagValue::Float(
            chunks
                .map(|c| {
                    let num = byte_order.read_u32(&c[0..4]) as i32 as f64;
                    let den = byte_order.read_u32(&c[4..8]) as i32 as f64;
                    ratio(num, den)
                })
                .collect(),
        ),
        FieldType::Float => TagValue::Float(
            chunks
                .map(|c| f32::from_bits(byte_order.read_u32(c)) as f64)
                .collect(),
        ),
        FieldType::Double => TagValue::Float(
            chunks
                .map(|c| f64::from_bits(byte_order.read_u64(c)))
                .collect(),
        ),
    }
}

#[inline]
fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

// =============================================================================
// Tests
// =============================================================================
