//! TIMEDATE values: an absolute instant plus the writer's UTC offset.
//!
//! ```text
//! [8 bytes] seconds since 1970-01-01T00:00:00Z (i64)
//! [2 bytes] offset in minutes east of UTC (i16), i16::MIN = none
//! ```

use chrono::{DateTime, FixedOffset, TimeDelta};

use crate::nsf::codec::bytes::ByteReader;
use crate::nsf::types::error::{NsfError, Result};

pub const TIMEDATE_LEN: usize = 10;

/// Offset value meaning "the writer recorded no zone".
pub const NO_OFFSET: i16 = i16::MIN;

const MAX_OFFSET_MINUTES: i16 = 24 * 60;

/// Read one TIMEDATE.
///
/// A stored offset is always honored; only a missing offset yields UTC.
/// Returns `Corrupt` (without a note id) for values chrono cannot represent,
/// including instants whose local time falls outside chrono's range.
pub fn read(reader: &mut ByteReader<'_>) -> Result<DateTime<FixedOffset>> {
    let seconds = reader.read_i64()?;
    let offset_minutes = reader.read_i16()?;
    from_parts(seconds, offset_minutes)
}

pub fn from_parts(seconds: i64, offset_minutes: i16) -> Result<DateTime<FixedOffset>> {
    let instant = DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| NsfError::corrupt(None, format!("Timestamp {} is out of range", seconds)))?;

    if offset_minutes == NO_OFFSET {
        return Ok(instant.fixed_offset());
    }
    if offset_minutes.abs() >= MAX_OFFSET_MINUTES {
        return Err(NsfError::corrupt(None, format!("UTC offset of {} minutes is out of range", offset_minutes)));
    }
    let offset = FixedOffset::east_opt(offset_minutes as i32 * 60)
        .ok_or_else(|| NsfError::corrupt(None, format!("Invalid UTC offset: {} minutes", offset_minutes)))?;
    if instant
        .naive_utc()
        .checked_add_signed(TimeDelta::minutes(offset_minutes as i64))
        .is_none()
    {
        return Err(NsfError::corrupt(
            None,
            format!("Timestamp {} with offset {} minutes has no local time", seconds, offset_minutes),
        ));
    }
    Ok(instant.with_timezone(&offset))
}
