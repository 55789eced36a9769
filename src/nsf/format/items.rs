//! Note bodies and the per-item value decoder.
//!
//! # Note Body Structure
//! ```text
//! [10 bytes] Created (TIMEDATE)
//! [10 bytes] Modified (TIMEDATE)
//! [2 bytes]  Item count
//! [2 bytes]  Reserved
//! [12 bytes] per item: [2] type  [2] flags  [2] name length  [2] reserved  [4] value length
//! [..]       Data area: name then value of each item, in table order
//! ```

use chrono::{DateTime, FixedOffset};
use log::trace;

use crate::nsf::codec::bytes::ByteReader;
use crate::nsf::codec::lmbcs;
use crate::nsf::format::{richtext, timedate};
use crate::nsf::types::error::{NsfError, Result};
use crate::nsf::types::models::{FieldValue, Number};

pub const NOTE_HEADER_LEN: usize = 24;
pub const ITEM_ENTRY_LEN: usize = 12;

pub const TYPE_COMPOSITE: u16 = 0x0001;
pub const TYPE_NUMBER: u16 = 0x0300;
pub const TYPE_TIME: u16 = 0x0400;
pub const TYPE_TEXT: u16 = 0x0500;
pub const TYPE_TEXT_LIST: u16 = 0x0501;
pub const TYPE_BOOLEAN: u16 = 0x0A00;
pub const TYPE_FORMULA: u16 = 0x0600;
pub const TYPE_FIELD_DEF: u16 = 0x0800;
pub const TYPE_VIEW_COLUMN: u16 = 0x0801;
pub const TYPE_ACL_ENTRY: u16 = 0x0802;

const NUMBER_FLOAT: u8 = 0;
const NUMBER_I32: u8 = 1;
const NUMBER_I64: u8 = 2;
const NUMBER_FIXED: u8 = 3;
const MAX_FIXED_SCALE: u8 = 18;

/// Kind of an item, from its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Text,
    TextList,
    Number,
    Time,
    Boolean,
    Composite,
    Formula,
    FieldDefinition,
    ViewColumn,
    AclEntry,
}

impl ItemType {
    /// `None` for tags this reader does not know.
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            TYPE_TEXT => Some(Self::Text),
            TYPE_TEXT_LIST => Some(Self::TextList),
            TYPE_NUMBER => Some(Self::Number),
            TYPE_TIME => Some(Self::Time),
            TYPE_BOOLEAN => Some(Self::Boolean),
            TYPE_COMPOSITE => Some(Self::Composite),
            TYPE_FORMULA => Some(Self::Formula),
            TYPE_FIELD_DEF => Some(Self::FieldDefinition),
            TYPE_VIEW_COLUMN => Some(Self::ViewColumn),
            TYPE_ACL_ENTRY => Some(Self::AclEntry),
            _ => None,
        }
    }

    /// Design records describe forms, views and the ACL rather than data.
    pub fn is_design_record(&self) -> bool {
        matches!(self, Self::FieldDefinition | Self::ViewColumn | Self::AclEntry)
    }
}

/// One item as stored: decoded name, undecoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem<'a> {
    pub name: String,
    pub type_tag: u16,
    pub flags: u16,
    pub value: &'a [u8],
    /// File offset of `value[0]`.
    pub value_offset: u64,
}

impl RawItem<'_> {
    pub fn item_type(&self) -> Option<ItemType> {
        ItemType::from_tag(self.type_tag)
    }

    /// Preserve the value undecoded.
    pub fn to_unknown(&self) -> FieldValue {
        FieldValue::Unknown {
            type_tag: self.type_tag,
            raw: self.value.to_vec(),
        }
    }
}

/// A note's header fields plus its item table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteBody<'a> {
    pub created: DateTime<FixedOffset>,
    pub modified: DateTime<FixedOffset>,
    pub items: Vec<RawItem<'a>>,
}

/// Split one note into its items.
///
/// `base` is the note's absolute file offset. An item table or data area
/// that overruns the note is `Truncated`; a bad item name is `Encoding`.
/// Bad timestamps are `Corrupt`.
pub fn parse_note(bytes: &[u8], base: u64) -> Result<NoteBody<'_>> {
    let mut reader = ByteReader::with_base(bytes, base);

    let created = timedate::read(&mut reader)?;
    let modified = timedate::read(&mut reader)?;
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let type_tag = reader.read_u16()?;
        let flags = reader.read_u16()?;
        let name_len = reader.read_u16()? as usize;
        reader.skip(2)?;
        let value_len = reader.read_u32()? as usize;
        entries.push((type_tag, flags, name_len, value_len));
    }

    let mut items = Vec::with_capacity(count);
    for (type_tag, flags, name_len, value_len) in entries {
        let name_offset = reader.absolute_position();
        let name = lmbcs::decode_at(reader.read_bytes(name_len)?, name_offset)?;
        let value_offset = reader.absolute_position();
        let value = reader.read_bytes(value_len)?;
        trace!("Item '{}' type={:#06x} flags={:#06x} ({} bytes)", name, type_tag, flags, value_len);
        items.push(RawItem {
            name,
            type_tag,
            flags,
            value,
            value_offset,
        });
    }

    Ok(NoteBody {
        created,
        modified,
        items,
    })
}

/// Decode a data item into a typed value.
///
/// Unknown tags and design records come back as [`FieldValue::Unknown`].
/// A known item whose value has the wrong size or an illegal sub-tag is
/// `Corrupt`; undecodable text is `Encoding`.
pub fn decode_value(item: &RawItem<'_>) -> Result<FieldValue> {
    let Some(kind) = item.item_type() else {
        return Ok(item.to_unknown());
    };
    let bytes = item.value;
    let base = item.value_offset;

    let value = match kind {
        ItemType::Text => FieldValue::Text(lmbcs::decode_at(bytes, base)?),
        ItemType::Formula => FieldValue::Formula(lmbcs::decode_at(bytes, base)?),
        ItemType::TextList => FieldValue::TextList(decode_text_list(bytes, base)?),
        ItemType::Number => FieldValue::Number(decode_number(bytes)?),
        ItemType::Time => {
            expect_len(bytes, timedate::TIMEDATE_LEN, "time")?;
            FieldValue::DateTime(timedate::read(&mut ByteReader::new(bytes))?)
        }
        ItemType::Boolean => {
            expect_len(bytes, 1, "boolean")?;
            match bytes[0] {
                0 => FieldValue::Boolean(false),
                1 => FieldValue::Boolean(true),
                other => return Err(NsfError::corrupt(None, format!("Boolean byte {:#04x} is neither 0 nor 1", other))),
            }
        }
        ItemType::Composite => FieldValue::RichText(richtext::extract(bytes, base)?),
        ItemType::FieldDefinition | ItemType::ViewColumn | ItemType::AclEntry => item.to_unknown(),
    };
    Ok(value)
}

fn decode_number(bytes: &[u8]) -> Result<Number> {
    let mut reader = ByteReader::new(bytes);
    let sub_tag = reader.read_u8().map_err(|e| value_overrun(e, "number"))?;
    let expected = match sub_tag {
        NUMBER_I32 => 5,
        NUMBER_FLOAT | NUMBER_I64 => 9,
        NUMBER_FIXED => 10,
        other => return Err(NsfError::corrupt(None, format!("Unknown number sub-tag {}", other))),
    };
    expect_len(bytes, expected, "number")?;

    let number = match sub_tag {
        NUMBER_FLOAT => Number::Float(reader.read_f64()?),
        NUMBER_I32 => Number::Integer(reader.read_i32()? as i64),
        NUMBER_I64 => Number::Integer(reader.read_i64()?),
        _ => {
            let mantissa = reader.read_i64()?;
            let scale = reader.read_u8()?;
            if scale > MAX_FIXED_SCALE {
                return Err(NsfError::corrupt(None, format!("Fixed-point scale {} exceeds {}", scale, MAX_FIXED_SCALE)));
            }
            Number::Fixed { mantissa, scale }
        }
    };
    Ok(number)
}

/// `[2] count`, `count` x `[2] length`, then the strings back to back.
fn decode_text_list(bytes: &[u8], base: u64) -> Result<Vec<String>> {
    let mut reader = ByteReader::with_base(bytes, base);
    let count = reader.read_u16().map_err(|e| value_overrun(e, "text list"))? as usize;
    let mut lengths = Vec::with_capacity(count);
    for _ in 0..count {
        lengths.push(reader.read_u16().map_err(|e| value_overrun(e, "text list"))? as usize);
    }
    let mut values = Vec::with_capacity(count);
    for len in lengths {
        let at = reader.absolute_position();
        let raw = reader.read_bytes(len).map_err(|e| value_overrun(e, "text list"))?;
        values.push(lmbcs::decode_at(raw, at)?);
    }
    if !reader.is_empty() {
        return Err(NsfError::corrupt(None, format!("{} stray bytes after text list", reader.remaining())));
    }
    Ok(values)
}

fn expect_len(bytes: &[u8], expected: usize, what: &str) -> Result<()> {
    if bytes.len() != expected {
        return Err(NsfError::corrupt(
            None,
            format!("{} value is {} bytes, expected {}", what, bytes.len(), expected),
        ));
    }
    Ok(())
}

/// A read past the end of an already-bounded value means the value's own
/// length fields disagree with its size: corrupt, not truncated.
pub(crate) fn value_overrun(err: NsfError, what: &str) -> NsfError {
    match err {
        NsfError::Truncated { requested, available, .. } => NsfError::corrupt(
            None,
            format!("{} value needs {} more bytes, {} left", what, requested, available),
        ),
        other => other,
    }
}
