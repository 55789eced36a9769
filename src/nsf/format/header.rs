//! Container file header and database info buffer.
//!
//! This module handles:
//! - Validating the signature
//! - Rejecting containers this reader cannot handle, before any decoding
//! - Extracting database metadata (replica id, timestamps, title)

use chrono::{DateTime, FixedOffset};
use log::{debug, info, warn};

use crate::nsf::codec::bytes::ByteReader;
use crate::nsf::codec::lmbcs;
use crate::nsf::format::timedate;
use crate::nsf::types::error::{NsfError, Result};

pub const SIGNATURE: [u8; 2] = [0x1A, 0x00];
pub const HEADER_LEN: usize = 22;

/// Oldest and newest on-disk structure versions this reader understands.
pub const MIN_VERSION: u16 = 43;
pub const MAX_VERSION: u16 = 55;

pub const FLAG_ENCRYPTED: u32 = 0x0000_0001;
pub const FLAG_COMPRESSED: u32 = 0x0000_0002;
const KNOWN_FLAGS: u32 = FLAG_ENCRYPTED | FLAG_COMPRESSED;

/// Fixed-size header at the start of every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub info_len: u16,
    pub class: u16,
    pub flags: u32,
    pub root_offset: u32,
    pub root_len: u32,
}

/// Metadata from the info buffer that follows the header.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub replica_id: u64,
    pub created: DateTime<FixedOffset>,
    pub modified: DateTime<FixedOffset>,
    pub title: String,
}

/// Parses the file header from the beginning of the buffer.
///
/// # Header Structure
/// ```text
/// [2 bytes] Signature 1A 00
/// [2 bytes] Structure version
/// [2 bytes] Info buffer length
/// [2 bytes] Database class
/// [4 bytes] Flags
/// [4 bytes] Root directory offset
/// [4 bytes] Root directory length
/// [2 bytes] Reserved
/// ```
///
/// Encrypted or compressed containers and unknown versions fail here with
/// [`NsfError::Unsupported`], before any note is touched.
pub fn parse(reader: &mut ByteReader<'_>) -> Result<FileHeader> {
    info!("Parsing container header");

    let signature = reader.read_bytes(2)?;
    if signature != SIGNATURE {
        return Err(NsfError::corrupt(
            None,
            format!("Bad signature {:02x?}, not an NSF container", signature),
        ));
    }

    let header = FileHeader {
        version: reader.read_u16()?,
        info_len: reader.read_u16()?,
        class: reader.read_u16()?,
        flags: reader.read_u32()?,
        root_offset: reader.read_u32()?,
        root_len: reader.read_u32()?,
    };
    reader.skip(2)?;

    check_supported(&header)?;

    debug!(
        "Header: version={}, class={:#06x}, flags={:#010x}, root directory at {:#x} ({} bytes)",
        header.version, header.class, header.flags, header.root_offset, header.root_len
    );
    Ok(header)
}

fn check_supported(header: &FileHeader) -> Result<()> {
    if header.flags & FLAG_ENCRYPTED != 0 {
        return Err(NsfError::Unsupported("container is encrypted".to_string()));
    }
    if header.flags & FLAG_COMPRESSED != 0 {
        return Err(NsfError::Unsupported("compressed note bodies".to_string()));
    }
    if !(MIN_VERSION..=MAX_VERSION).contains(&header.version) {
        return Err(NsfError::Unsupported(format!(
            "structure version {} (supported: {}..={})",
            header.version, MIN_VERSION, MAX_VERSION
        )));
    }
    let unknown = header.flags & !KNOWN_FLAGS;
    if unknown != 0 {
        warn!("Ignoring unknown header flags {:#010x}", unknown);
    }
    Ok(())
}

/// Parses the info buffer that immediately follows the header.
///
/// # Info Buffer Structure
/// ```text
/// [8 bytes]  Replica id
/// [10 bytes] Created (TIMEDATE)
/// [10 bytes] Modified (TIMEDATE)
/// [2 bytes]  Title length
/// [N bytes]  Title (LMBCS)
/// ```
/// Bytes after the title are reserved and skipped.
pub fn parse_info(reader: &ByteReader<'_>, header: &FileHeader) -> Result<DatabaseInfo> {
    let mut info_reader = reader.sub_reader(HEADER_LEN, header.info_len as usize)?;

    let replica_id = info_reader.read_u64()?;
    let created = timedate::read(&mut info_reader)?;
    let modified = timedate::read(&mut info_reader)?;
    let title_len = info_reader.read_u16()? as usize;
    let title_offset = info_reader.absolute_position();
    let title = lmbcs::decode_at(info_reader.read_bytes(title_len)?, title_offset)?;

    info!("Database '{}' (replica {:016X})", title, replica_id);
    Ok(DatabaseInfo {
        replica_id,
        created,
        modified,
        title,
    })
}
