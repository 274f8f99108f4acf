//! # Element Codec
//!
//! Encodes and decodes one schema-tagged data element: the flags byte,
//! optional name hash, optional version byte, 16-byte type uuid, and the
//! optional length-prefixed value bytes. A whole object stream is a
//! well-nested sequence of these records closed by end sentinels.
//!
//! ## Flags byte layout
//! ```text
//! bit 0-2  value size (< 8) or explicit size-field width (1/2/4)
//! bit 3    element header (unset only in the end sentinel)
//! bit 4    has value bytes
//! bit 5    uses explicit size field instead of inline size
//! bit 6    has a 32-bit name hash
//! bit 7    has a version byte
//! ```
//! The end sentinel is the all-zero flags byte. The common case of a
//! 4-byte value packs its size into bits 0-2 and needs no size field.

use bytes::{Buf, BufMut};
use uuid::Uuid;

use crate::core::schema::{ClassDescriptor, CodecKind};
use crate::core::value::Value;
use crate::error::{ProtocolError, Result};

/// Lower 3 bits: inline value size, or the width of the explicit size
/// field when [`FLAG_EXTRA_SIZE_FIELD`] is set.
pub const VALUE_SIZE_MASK: u8 = 0x07;
pub const FLAG_ELEMENT_HEADER: u8 = 1 << 3;
pub const FLAG_HAS_VALUE: u8 = 1 << 4;
pub const FLAG_EXTRA_SIZE_FIELD: u8 = 1 << 5;
pub const FLAG_HAS_NAME: u8 = 1 << 6;
pub const FLAG_HAS_VERSION: u8 = 1 << 7;
/// The end-of-element sentinel byte.
pub const ELEMENT_END: u8 = 0;

/// One decoded element record, before schema resolution of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataElement {
    pub name_crc: u32,
    pub version: u8,
    pub type_uuid: Uuid,
    /// Raw value bytes; `None` when the element carried no (or an empty)
    /// value chunk.
    pub data: Option<Vec<u8>>,
}

/// Write one element header (and, for leaf classes, its value bytes).
///
/// `name_crc` of zero means the element is anonymous (the root object);
/// everything else gets the name-hash field. Composites and containers
/// carry no inline value, only children, so `value` is ignored for them.
pub fn write_element(
    out: &mut Vec<u8>,
    class: &ClassDescriptor,
    name_crc: u32,
    value: Option<&Value>,
) -> Result<()> {
    let kind = class.codec_kind()?;

    let data_size = match kind {
        CodecKind::Primitive { byte_size } => Some(primitive_size(class, byte_size)?),
        CodecKind::StringLike => {
            let text = value.and_then(Value::as_str).ok_or_else(|| {
                ProtocolError::SerializeError(format!(
                    "class {} expects a string value",
                    class.name
                ))
            })?;
            Some(text.len())
        }
        CodecKind::Container | CodecKind::Composite => None,
    };

    let mut flags = FLAG_ELEMENT_HEADER;
    if name_crc != 0 {
        flags |= FLAG_HAS_NAME;
    }
    if let Some(size) = data_size {
        flags |= FLAG_HAS_VALUE;
        if size < 8 {
            flags |= size as u8;
        } else {
            flags |= FLAG_EXTRA_SIZE_FIELD;
            flags |= size_field_width(size)? as u8;
        }
    }
    if class.version != 0 {
        flags |= FLAG_HAS_VERSION;
    }

    out.put_u8(flags);
    if name_crc != 0 {
        out.put_u32(name_crc);
    }
    if class.version != 0 {
        out.put_u8(class.version);
    }
    out.put_slice(class.uuid.as_bytes());

    if let Some(size) = data_size {
        if flags & FLAG_EXTRA_SIZE_FIELD != 0 {
            match flags & VALUE_SIZE_MASK {
                1 => out.put_u8(size as u8),
                2 => out.put_u16(size as u16),
                4 => out.put_u32(size as u32),
                _ => unreachable!("size_field_width yields 1, 2 or 4"),
            }
        }
        match kind {
            CodecKind::Primitive { byte_size } => {
                let number = value.and_then(Value::as_u64).ok_or_else(|| {
                    ProtocolError::SerializeError(format!(
                        "class {} expects a numeric value",
                        class.name
                    ))
                })?;
                write_unsigned(out, number, byte_size)?;
            }
            CodecKind::StringLike => {
                // Checked above; an empty string writes no bytes at all.
                if let Some(text) = value.and_then(Value::as_str) {
                    out.put_slice(text.as_bytes());
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Write the end-of-element sentinel.
pub fn write_end(out: &mut Vec<u8>) {
    out.put_u8(ELEMENT_END);
}

/// Read one element record, advancing the cursor.
///
/// Returns `None` on the end sentinel. Fails `MalformedElement` when the
/// header bit is missing or the declared size-field width is not 1, 2
/// or 4.
pub fn read_element(cur: &mut &[u8]) -> Result<Option<DataElement>> {
    need(*cur, 1, "element flags")?;
    let flags = cur.get_u8();

    if flags == ELEMENT_END {
        return Ok(None);
    }
    if flags & FLAG_ELEMENT_HEADER == 0 {
        return Err(ProtocolError::MalformedElement(format!(
            "flags byte {flags:#04x} is not an element header"
        )));
    }

    let mut element = DataElement {
        name_crc: 0,
        version: 0,
        type_uuid: Uuid::nil(),
        data: None,
    };

    if flags & FLAG_HAS_NAME != 0 {
        need(*cur, 4, "name hash")?;
        element.name_crc = cur.get_u32();
    }
    if flags & FLAG_HAS_VERSION != 0 {
        need(*cur, 1, "version byte")?;
        element.version = cur.get_u8();
    }

    need(*cur, 16, "type uuid")?;
    let mut uuid_bytes = [0u8; 16];
    cur.copy_to_slice(&mut uuid_bytes);
    element.type_uuid = Uuid::from_bytes(uuid_bytes);

    if flags & FLAG_HAS_VALUE != 0 {
        let data_size = if flags & FLAG_EXTRA_SIZE_FIELD != 0 {
            match flags & VALUE_SIZE_MASK {
                1 => {
                    need(*cur, 1, "size field")?;
                    cur.get_u8() as usize
                }
                2 => {
                    need(*cur, 2, "size field")?;
                    cur.get_u16() as usize
                }
                4 => {
                    need(*cur, 4, "size field")?;
                    cur.get_u32() as usize
                }
                width => {
                    return Err(ProtocolError::MalformedElement(format!(
                        "invalid size-field width {width}"
                    )))
                }
            }
        } else {
            (flags & VALUE_SIZE_MASK) as usize
        };

        if data_size > 0 {
            need(*cur, data_size, "value bytes")?;
            element.data = Some(cur.copy_to_bytes(data_size).to_vec());
        }
    }

    Ok(Some(element))
}

/// Parse a numeric leaf's value bytes as an unsigned integer.
pub fn decode_primitive(class: &ClassDescriptor, data: Option<&[u8]>) -> Result<u64> {
    let data = data.unwrap_or_default();
    if data.len() != class.byte_size {
        return Err(ProtocolError::DeserializeError(format!(
            "class {} expects {} value bytes, got {}",
            class.name,
            class.byte_size,
            data.len()
        )));
    }
    let mut cur = data;
    match class.byte_size {
        1 => Ok(u64::from(cur.get_u8())),
        2 => Ok(u64::from(cur.get_u16())),
        4 => Ok(u64::from(cur.get_u32())),
        8 => Ok(cur.get_u64()),
        other => Err(ProtocolError::DeserializeError(format!(
            "class {} has unsupported primitive width {other}",
            class.name
        ))),
    }
}

/// Parse a string leaf's value bytes. An absent value is the empty string.
pub fn decode_string(data: Option<&[u8]>) -> Result<String> {
    match data {
        None => Ok(String::new()),
        Some(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|e| ProtocolError::DeserializeError(format!("invalid utf-8 string: {e}"))),
    }
}

fn primitive_size(class: &ClassDescriptor, byte_size: usize) -> Result<usize> {
    match byte_size {
        1 | 2 | 4 | 8 => Ok(byte_size),
        other => Err(ProtocolError::SerializeError(format!(
            "class {} has unsupported primitive width {other}",
            class.name
        ))),
    }
}

fn write_unsigned(out: &mut Vec<u8>, value: u64, byte_size: usize) -> Result<()> {
    // Truncation to the declared width mirrors the peer's own writes.
    match byte_size {
        1 => out.put_u8(value as u8),
        2 => out.put_u16(value as u16),
        4 => out.put_u32(value as u32),
        8 => out.put_u64(value),
        other => {
            return Err(ProtocolError::SerializeError(format!(
                "unsupported primitive width {other}"
            )))
        }
    }
    Ok(())
}

fn size_field_width(size: usize) -> Result<usize> {
    if size < 0x100 {
        Ok(1)
    } else if size < 0x1_0000 {
        Ok(2)
    } else if size <= u32::MAX as usize {
        Ok(4)
    } else {
        Err(ProtocolError::UnsupportedSize(size))
    }
}

fn need(cur: &[u8], bytes: usize, what: &str) -> Result<()> {
    if cur.remaining() < bytes {
        return Err(ProtocolError::DeserializeError(format!(
            "truncated stream while reading {what}"
        )));
    }
    Ok(())
}
