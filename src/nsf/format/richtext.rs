//! Composite-data (CD) records of rich-text items.
//!
//! ```text
//! [2 bytes] Record signature
//! [2 bytes] Record length, header included
//! [N bytes] Body, then one pad byte if the length is odd
//! ```
//!
//! Only text runs and paragraph breaks reach the plain-text rendering.
//! Every other record (fonts, tables, images, hotspots...) is skipped and
//! marks the result lossy.

use log::trace;

use crate::nsf::codec::bytes::ByteReader;
use crate::nsf::codec::lmbcs;
use crate::nsf::format::items::value_overrun;
use crate::nsf::types::error::{NsfError, Result};
use crate::nsf::types::models::RichText;

pub const RECORD_HEADER_LEN: usize = 4;
pub const SIG_PARAGRAPH: u16 = 0x0081;
pub const SIG_TEXT: u16 = 0x0085;

/// Text run body: `[4] font id`, then LMBCS text.
const FONT_ID_LEN: usize = 4;

/// Best-effort plain text of a rich-text item stored at file offset `base`;
/// the raw bytes are kept.
pub fn extract(raw: &[u8], base: u64) -> Result<RichText> {
    let mut reader = ByteReader::with_base(raw, base);
    let mut plain_text = String::new();
    let mut lossy = false;

    while !reader.is_empty() {
        let at = reader.position();
        let signature = reader.read_u16().map_err(|e| value_overrun(e, "rich text"))?;
        let length = reader.read_u16().map_err(|e| value_overrun(e, "rich text"))? as usize;
        if length < RECORD_HEADER_LEN {
            return Err(NsfError::corrupt(
                None,
                format!("CD record at {} declares length {}", at, length),
            ));
        }
        let body = reader
            .read_bytes(length - RECORD_HEADER_LEN)
            .map_err(|e| value_overrun(e, "rich text"))?;

        match signature {
            SIG_TEXT => {
                let text = body.get(FONT_ID_LEN..).ok_or_else(|| {
                    NsfError::corrupt(None, format!("Text run at {} is shorter than its font id", at))
                })?;
                let text_offset = reader.absolute_position() - body.len() as u64 + FONT_ID_LEN as u64;
                plain_text.push_str(&lmbcs::decode_at(text, text_offset)?);
            }
            SIG_PARAGRAPH => plain_text.push('\n'),
            other => {
                trace!("Skipping CD record {:#06x} ({} bytes)", other, length);
                lossy = true;
            }
        }

        if length % 2 == 1 && !reader.is_empty() {
            reader.skip(1)?;
        }
    }

    let trimmed = plain_text.trim_end_matches('\n').len();
    plain_text.truncate(trimmed);

    Ok(RichText {
        raw: raw.to_vec(),
        plain_text,
        lossy,
    })
}
