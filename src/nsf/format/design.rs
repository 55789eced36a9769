//! Design records: field definitions, view columns and ACL entries.
//!
//! The item name carries the field name, the column title or the ACL
//! principal; the value carries the rest. A record that does not match its
//! layout is `Corrupt` and the caller skips it. `base` is the value's file
//! offset, used to locate undecodable text.

use log::trace;

use crate::nsf::codec::bytes::ByteReader;
use crate::nsf::codec::lmbcs;
use crate::nsf::format::items::value_overrun;
use crate::nsf::types::error::{NsfError, Result};
use crate::nsf::types::models::{AclEntry, AclLevel, ColumnDefinition, FieldDefinition, FieldKind, SortDirection};

const FIELD_PREFIX_LEN: usize = 8;
const COLUMN_PREFIX_LEN: usize = 8;

const FIELD_REQUIRED: u8 = 0x01;
const COLUMN_CATEGORIZED: u8 = 0x01;
const COLUMN_HIDDEN: u8 = 0x02;

/// ```text
/// [1] kind  [1] flags  [2] default len  [2] validation len  [2] label len
/// then: default formula, validation formula, label (LMBCS)
/// ```
pub fn field_definition(name: &str, data: &[u8], base: u64) -> Result<FieldDefinition> {
    let mut reader = prefixed(data, base, FIELD_PREFIX_LEN, "field definition")?;
    let kind = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let default_len = reader.read_u16()? as usize;
    let validation_len = reader.read_u16()? as usize;
    let label_len = reader.read_u16()? as usize;

    let kind = FieldKind::try_from(kind)?;
    let default_formula = optional_text(&mut reader, default_len, "field definition")?;
    let validation_formula = optional_text(&mut reader, validation_len, "field definition")?;
    let label = optional_text(&mut reader, label_len, "field definition")?;
    expect_consumed(&reader, "field definition")?;

    trace!("Field '{}' ({:?}, flags={:#04x})", name, kind, flags);
    Ok(FieldDefinition {
        name: name.to_string(),
        kind,
        default_formula,
        validation_formula,
        required: flags & FIELD_REQUIRED != 0,
        label,
    })
}

/// ```text
/// [1] sort  [1] flags  [2] field len  [2] formula len  [2] width
/// then: source field name, column formula (LMBCS)
/// ```
pub fn column_definition(title: &str, data: &[u8], base: u64) -> Result<ColumnDefinition> {
    let mut reader = prefixed(data, base, COLUMN_PREFIX_LEN, "view column")?;
    let sort = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let field_len = reader.read_u16()? as usize;
    let formula_len = reader.read_u16()? as usize;
    let width = reader.read_u16()?;

    let sort = SortDirection::try_from(sort)?;
    let field = optional_text(&mut reader, field_len, "view column")?;
    let formula = optional_text(&mut reader, formula_len, "view column")?;
    expect_consumed(&reader, "view column")?;

    trace!("Column '{}' -> {:?} ({:?})", title, field, sort);
    Ok(ColumnDefinition {
        title: title.to_string(),
        field,
        sort,
        categorized: flags & COLUMN_CATEGORIZED != 0,
        formula,
        width,
        hidden: flags & COLUMN_HIDDEN != 0,
    })
}

/// A single level byte.
pub fn acl_entry(principal: &str, data: &[u8]) -> Result<AclEntry> {
    let [level] = data else {
        return Err(NsfError::corrupt(
            None,
            format!("ACL entry for '{}' is {} bytes, expected 1", principal, data.len()),
        ));
    };
    Ok(AclEntry {
        principal: principal.to_string(),
        level: AclLevel::try_from(*level)?,
    })
}

fn prefixed<'a>(data: &'a [u8], base: u64, prefix_len: usize, what: &str) -> Result<ByteReader<'a>> {
    if data.len() < prefix_len {
        return Err(NsfError::corrupt(
            None,
            format!("{} record is {} bytes, shorter than its {}-byte header", what, data.len(), prefix_len),
        ));
    }
    Ok(ByteReader::with_base(data, base))
}

fn optional_text(reader: &mut ByteReader<'_>, len: usize, what: &str) -> Result<Option<String>> {
    let at = reader.absolute_position();
    let bytes = reader.read_bytes(len).map_err(|e| value_overrun(e, what))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    lmbcs::decode_at(bytes, at).map(Some)
}

fn expect_consumed(reader: &ByteReader<'_>, what: &str) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(NsfError::corrupt(None, format!("{} stray bytes after {}", reader.remaining(), what)))
    }
}
