//! LMBCS (Lotus Multi-Byte Character Set) to Unicode.
//!
//! LMBCS text is mostly ASCII. Characters outside ASCII are written as a
//! *group byte* (0x01..=0x14) followed by one or two bytes interpreted in that
//! group's character set. High bytes without a group prefix belong to the
//! default group, code page 850.
//!
//! | group | bytes | character set |
//! |-------|-------|---------------|
//! | 0x01 | 1 | code page 850 |
//! | 0x02 | 1 | Greek (windows-1253) |
//! | 0x03 | 1 | Hebrew (windows-1255) |
//! | 0x04 | 1 | Arabic (windows-1256) |
//! | 0x05 | 1 | Cyrillic (windows-1251) |
//! | 0x06 | 1 | Central European (windows-1250) |
//! | 0x08 | 1 | Turkish (windows-1254) |
//! | 0x0B | 1 | Thai (windows-874) |
//! | 0x0F | 1 | escaped C0 control |
//! | 0x10 | 2 | Japanese (Shift_JIS) |
//! | 0x11 | 2 | Korean (EUC-KR) |
//! | 0x12 | 2 | Traditional Chinese (Big5) |
//! | 0x13 | 2 | Simplified Chinese (GBK) |
//! | 0x14 | 2 | UCS-2, big-endian |
//!
//! Decoding carries no state between calls.

use encoding_rs::Encoding;

use crate::nsf::types::error::{NsfError, Result};

/// Code page 850, bytes 0x80..=0xFF.
#[rustfmt::skip]
static CP850_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐',
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤',
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀',
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´',
    '\u{AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{A0}',
];

const UCS2_GROUP: u8 = 0x14;

/// How the bytes after a group byte are interpreted.
#[derive(Clone, Copy)]
enum Group {
    Cp850,
    SingleByte(&'static Encoding),
    Control,
    DoubleByte(&'static Encoding),
    Ucs2,
}

fn group_for(byte: u8) -> Option<Group> {
    let group = match byte {
        0x01 => Group::Cp850,
        0x02 => Group::SingleByte(encoding_rs::WINDOWS_1253),
        0x03 => Group::SingleByte(encoding_rs::WINDOWS_1255),
        0x04 => Group::SingleByte(encoding_rs::WINDOWS_1256),
        0x05 => Group::SingleByte(encoding_rs::WINDOWS_1251),
        0x06 => Group::SingleByte(encoding_rs::WINDOWS_1250),
        0x08 => Group::SingleByte(encoding_rs::WINDOWS_1254),
        0x0B => Group::SingleByte(encoding_rs::WINDOWS_874),
        0x0F => Group::Control,
        0x10 => Group::DoubleByte(encoding_rs::SHIFT_JIS),
        0x11 => Group::DoubleByte(encoding_rs::EUC_KR),
        0x12 => Group::DoubleByte(encoding_rs::BIG5),
        0x13 => Group::DoubleByte(encoding_rs::GBK),
        UCS2_GROUP => Group::Ucs2,
        _ => return None,
    };
    Some(group)
}

/// Decode an LMBCS run into a `String`.
///
/// A NUL byte ends the run. Unknown group bytes, characters a group cannot
/// represent and sequences cut short by the end of input are errors; no
/// replacement characters are ever produced.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let byte = bytes[pos];
        match byte {
            0x00 => break,
            0x09 | 0x0A | 0x0D | 0x20..=0x7F => {
                out.push(byte as char);
                pos += 1;
            }
            0x80..=0xFF => {
                out.push(CP850_HIGH[(byte - 0x80) as usize]);
                pos += 1;
            }
            _ => {
                let group = group_for(byte)
                    .ok_or_else(|| encoding_error(pos, format!("unknown group byte {:#04x}", byte)))?;
                pos += decode_group(group, bytes, pos, &mut out)?;
            }
        }
    }

    Ok(out)
}

/// [`decode`] for a run stored at file offset `base`: an `Encoding` error
/// names the absolute position of the offending byte.
pub fn decode_at(bytes: &[u8], base: u64) -> Result<String> {
    decode(bytes).map_err(|e| match e {
        NsfError::Encoding { offset, reason } => NsfError::Encoding {
            offset: base.saturating_add(offset),
            reason,
        },
        other => other,
    })
}

/// Decode one grouped character starting at the group byte `bytes[start]`.
/// Returns the number of bytes consumed.
fn decode_group(group: Group, bytes: &[u8], start: usize, out: &mut String) -> Result<usize> {
    match group {
        Group::Cp850 => {
            let b = sequence(bytes, start, 1)?[0];
            if b < 0x20 {
                return Err(encoding_error(start, format!("control byte {:#04x} in group 0x01", b)));
            }
            out.push(if b < 0x80 { b as char } else { CP850_HIGH[(b - 0x80) as usize] });
            Ok(2)
        }
        Group::SingleByte(encoding) => {
            let b = sequence(bytes, start, 1)?;
            if b[0] < 0x20 {
                return Err(encoding_error(start, format!("control byte {:#04x} in {} group", b[0], encoding.name())));
            }
            push_decoded(encoding, b, start, out)?;
            Ok(2)
        }
        Group::Control => {
            let b = sequence(bytes, start, 1)?[0];
            if b >= 0x20 {
                return Err(encoding_error(start, format!("byte {:#04x} is not a control character", b)));
            }
            out.push(b as char);
            Ok(2)
        }
        Group::DoubleByte(encoding) => {
            let pair = sequence(bytes, start, 2)?;
            if pair[0] < 0x81 {
                return Err(encoding_error(start, format!("invalid lead byte {:#04x} in {} group", pair[0], encoding.name())));
            }
            push_decoded(encoding, pair, start, out)?;
            Ok(3)
        }
        Group::Ucs2 => decode_ucs2(bytes, start, out),
    }
}

fn decode_ucs2(bytes: &[u8], start: usize, out: &mut String) -> Result<usize> {
    let pair = sequence(bytes, start, 2)?;
    let unit = u16::from_be_bytes([pair[0], pair[1]]);

    match unit {
        0xD800..=0xDBFF => {
            // A high surrogate needs a second UCS-2 group carrying the low half.
            let next = start + 3;
            if bytes.get(next) != Some(&UCS2_GROUP) {
                return Err(encoding_error(start, "unpaired high surrogate".to_string()));
            }
            let low_pair = sequence(bytes, next, 2)?;
            let low = u16::from_be_bytes([low_pair[0], low_pair[1]]);
            let c = char::decode_utf16([unit, low])
                .next()
                .and_then(|r| r.ok())
                .ok_or_else(|| encoding_error(start, "invalid surrogate pair".to_string()))?;
            out.push(c);
            Ok(6)
        }
        0xDC00..=0xDFFF => Err(encoding_error(start, "unpaired low surrogate".to_string())),
        _ => {
            // Non-surrogate BMP units always map to a char.
            let c = char::from_u32(unit as u32)
                .ok_or_else(|| encoding_error(start, format!("invalid code unit {:#06x}", unit)))?;
            out.push(c);
            Ok(3)
        }
    }
}

/// The `len` bytes following the group byte at `start`.
fn sequence(bytes: &[u8], start: usize, len: usize) -> Result<&[u8]> {
    bytes
        .get(start + 1..start + 1 + len)
        .ok_or_else(|| encoding_error(start, format!("incomplete sequence: group {:#04x} needs {} more bytes", bytes[start], len)))
}

fn push_decoded(encoding: &'static Encoding, raw: &[u8], start: usize, out: &mut String) -> Result<()> {
    let decoded = encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .ok_or_else(|| encoding_error(start, format!("bytes {:02x?} are not valid {}", raw, encoding.name())))?;
    out.push_str(&decoded);
    Ok(())
}

fn encoding_error(offset: usize, reason: String) -> NsfError {
    NsfError::Encoding {
        offset: offset as u64,
        reason,
    }
}
