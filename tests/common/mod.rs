//! Synthetic container builder shared by the integration tests.
//!
//! Strings are written as plain ASCII, which LMBCS stores unchanged.

#![allow(dead_code)]

use adler2::adler32_slice;
use byteorder::{LittleEndian, WriteBytesExt};

pub const CLASS_DOCUMENT: u16 = 0x0001;
pub const CLASS_FORM: u16 = 0x0004;
pub const CLASS_VIEW: u16 = 0x0008;
pub const CLASS_ACL: u16 = 0x0040;

pub const TYPE_COMPOSITE: u16 = 0x0001;
pub const TYPE_NUMBER: u16 = 0x0300;
pub const TYPE_TIME: u16 = 0x0400;
pub const TYPE_TEXT: u16 = 0x0500;
pub const TYPE_TEXT_LIST: u16 = 0x0501;
pub const TYPE_FORMULA: u16 = 0x0600;
pub const TYPE_FIELD_DEF: u16 = 0x0800;
pub const TYPE_VIEW_COLUMN: u16 = 0x0801;
pub const TYPE_ACL_ENTRY: u16 = 0x0802;
pub const TYPE_BOOLEAN: u16 = 0x0A00;

pub const NO_OFFSET: i16 = i16::MIN;
pub const HEADER_LEN: usize = 22;

/// 2024-03-01T12:00:00Z
pub const T0: i64 = 1_709_294_400;

#[derive(Debug, Clone)]
pub struct Item {
    pub tag: u16,
    pub name: String,
    pub value: Vec<u8>,
}

impl Item {
    pub fn raw(name: &str, tag: u16, value: &[u8]) -> Self {
        Self {
            tag,
            name: name.to_string(),
            value: value.to_vec(),
        }
    }

    pub fn text(name: &str, value: &str) -> Self {
        Self::raw(name, TYPE_TEXT, value.as_bytes())
    }

    pub fn formula(name: &str, source: &str) -> Self {
        Self::raw(name, TYPE_FORMULA, source.as_bytes())
    }

    pub fn text_list(name: &str, values: &[&str]) -> Self {
        let mut out = Vec::new();
        out.write_u16::<LittleEndian>(values.len() as u16).unwrap();
        for v in values {
            out.write_u16::<LittleEndian>(v.len() as u16).unwrap();
        }
        for v in values {
            out.extend_from_slice(v.as_bytes());
        }
        Self::raw(name, TYPE_TEXT_LIST, &out)
    }

    pub fn integer(name: &str, value: i64) -> Self {
        let mut out = vec![2];
        out.write_i64::<LittleEndian>(value).unwrap();
        Self::raw(name, TYPE_NUMBER, &out)
    }

    pub fn float(name: &str, value: f64) -> Self {
        let mut out = vec![0];
        out.write_f64::<LittleEndian>(value).unwrap();
        Self::raw(name, TYPE_NUMBER, &out)
    }

    pub fn fixed(name: &str, mantissa: i64, scale: u8) -> Self {
        let mut out = vec![3];
        out.write_i64::<LittleEndian>(mantissa).unwrap();
        out.push(scale);
        Self::raw(name, TYPE_NUMBER, &out)
    }

    pub fn time(name: &str, seconds: i64, offset_minutes: i16) -> Self {
        Self::raw(name, TYPE_TIME, &timedate(seconds, offset_minutes))
    }

    pub fn boolean(name: &str, value: bool) -> Self {
        Self::raw(name, TYPE_BOOLEAN, &[value as u8])
    }

    /// Rich text from CD records built with [`cd_text`] / [`cd_paragraph`].
    pub fn rich_text(name: &str, records: &[Vec<u8>]) -> Self {
        Self::raw(name, TYPE_COMPOSITE, &records.concat())
    }

    pub fn field(name: &str, kind: u8, required: bool, default: &str, validation: &str, label: &str) -> Self {
        let mut out = vec![kind, required as u8];
        for s in [default, validation, label] {
            out.write_u16::<LittleEndian>(s.len() as u16).unwrap();
        }
        for s in [default, validation, label] {
            out.extend_from_slice(s.as_bytes());
        }
        Self::raw(name, TYPE_FIELD_DEF, &out)
    }

    /// `flags`: 0x1 categorized, 0x2 hidden.
    pub fn column(title: &str, sort: u8, flags: u8, field: &str, formula: &str, width: u16) -> Self {
        let mut out = vec![sort, flags];
        out.write_u16::<LittleEndian>(field.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(formula.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(width).unwrap();
        out.extend_from_slice(field.as_bytes());
        out.extend_from_slice(formula.as_bytes());
        Self::raw(title, TYPE_VIEW_COLUMN, &out)
    }

    pub fn acl(principal: &str, level: u8) -> Self {
        Self::raw(principal, TYPE_ACL_ENTRY, &[level])
    }
}

pub fn cd_text(text: &str) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0];
    body.extend_from_slice(text.as_bytes());
    cd_record(0x0085, &body)
}

pub fn cd_paragraph() -> Vec<u8> {
    cd_record(0x0081, &[])
}

pub fn cd_record(signature: u16, body: &[u8]) -> Vec<u8> {
    let length = 4 + body.len();
    let mut out = Vec::new();
    out.write_u16::<LittleEndian>(signature).unwrap();
    out.write_u16::<LittleEndian>(length as u16).unwrap();
    out.extend_from_slice(body);
    if length % 2 == 1 {
        out.push(0);
    }
    out
}

pub fn timedate(seconds: i64, offset_minutes: i16) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_i64::<LittleEndian>(seconds).unwrap();
    out.write_i16::<LittleEndian>(offset_minutes).unwrap();
    out
}

#[derive(Debug, Clone)]
pub struct Note {
    pub id: u32,
    pub class: u16,
    pub items: Vec<Item>,
    pub created: i64,
    pub modified: i64,
    /// Replaces the encoded body verbatim.
    pub raw: Option<Vec<u8>>,
}

impl Note {
    pub fn new(id: u32, class: u16, items: Vec<Item>) -> Self {
        Self {
            id,
            class,
            items,
            created: T0,
            modified: T0 + 3600,
            raw: None,
        }
    }

    pub fn form(id: u32, items: Vec<Item>) -> Self {
        Self::new(id, CLASS_FORM, items)
    }

    pub fn view(id: u32, items: Vec<Item>) -> Self {
        Self::new(id, CLASS_VIEW, items)
    }

    pub fn document(id: u32, items: Vec<Item>) -> Self {
        Self::new(id, CLASS_DOCUMENT, items)
    }

    pub fn acl(id: u32, items: Vec<Item>) -> Self {
        Self::new(id, CLASS_ACL, items)
    }

    pub fn raw(id: u32, class: u16, bytes: Vec<u8>) -> Self {
        Self {
            raw: Some(bytes),
            ..Self::new(id, class, Vec::new())
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut out = timedate(self.created, NO_OFFSET);
        out.extend(timedate(self.modified, NO_OFFSET));
        out.write_u16::<LittleEndian>(self.items.len() as u16).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        for item in &self.items {
            out.write_u16::<LittleEndian>(item.tag).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u16::<LittleEndian>(item.name.len() as u16).unwrap();
            out.write_u16::<LittleEndian>(0).unwrap();
            out.write_u32::<LittleEndian>(item.value.len() as u32).unwrap();
        }
        for item in &self.items {
            out.extend_from_slice(item.name.as_bytes());
            out.extend_from_slice(&item.value);
        }
        out
    }
}

struct Entry {
    id: u32,
    class: u16,
    kind: u16,
    offset: u32,
    length: u32,
    checksum: u32,
}

fn directory(entries: &[Entry]) -> Vec<u8> {
    let mut out = b"NDIR".to_vec();
    out.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
    for e in entries {
        out.write_u32::<LittleEndian>(e.id).unwrap();
        out.write_u16::<LittleEndian>(e.class).unwrap();
        out.write_u16::<LittleEndian>(e.kind).unwrap();
        out.write_u32::<LittleEndian>(e.offset).unwrap();
        out.write_u32::<LittleEndian>(e.length).unwrap();
        out.write_u32::<LittleEndian>(e.checksum).unwrap();
    }
    out
}

/// A whole container: header, info buffer, notes, directories.
#[derive(Debug, Clone)]
pub struct Container {
    pub version: u16,
    pub class: u16,
    pub flags: u32,
    pub replica_id: u64,
    pub title: String,
    pub notes: Vec<Note>,
    /// Move the second half of the notes into a nested directory.
    pub nested: bool,
    /// Note ids whose directory checksum is deliberately wrong.
    pub bad_checksums: Vec<u32>,
}

impl Container {
    pub fn new(title: &str) -> Self {
        Self {
            version: 51,
            class: 0xFF00,
            flags: 0,
            replica_id: 0x8525_7A3B_0012_ABCD,
            title: title.to_string(),
            notes: Vec::new(),
            nested: false,
            bad_checksums: Vec::new(),
        }
    }

    pub fn note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut info = Vec::new();
        info.write_u64::<LittleEndian>(self.replica_id).unwrap();
        info.extend(timedate(T0 - 86_400, 60));
        info.extend(timedate(T0, NO_OFFSET));
        info.write_u16::<LittleEndian>(self.title.len() as u16).unwrap();
        info.extend_from_slice(self.title.as_bytes());

        let mut out = vec![0u8; HEADER_LEN];
        out.extend_from_slice(&info);

        let mut entries = Vec::new();
        for note in &self.notes {
            let body = note.encode();
            let mut checksum = adler32_slice(&body);
            if self.bad_checksums.contains(&note.id) {
                checksum ^= 0x5A5A;
            }
            entries.push(Entry {
                id: note.id,
                class: note.class,
                kind: 0,
                offset: out.len() as u32,
                length: body.len() as u32,
                checksum,
            });
            out.extend_from_slice(&body);
        }

        if self.nested && entries.len() > 1 {
            let nested = entries.split_off(entries.len() / 2);
            let table = directory(&nested);
            entries.push(Entry {
                id: 0xFFFF_0001,
                class: 0,
                kind: 1,
                offset: out.len() as u32,
                length: table.len() as u32,
                checksum: adler32_slice(&table),
            });
            out.extend_from_slice(&table);
        }

        let root = directory(&entries);
        let root_offset = out.len() as u32;
        out.extend_from_slice(&root);

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(&[0x1A, 0x00]);
        header.write_u16::<LittleEndian>(self.version).unwrap();
        header.write_u16::<LittleEndian>(info.len() as u16).unwrap();
        header.write_u16::<LittleEndian>(self.class).unwrap();
        header.write_u32::<LittleEndian>(self.flags).unwrap();
        header.write_u32::<LittleEndian>(root_offset).unwrap();
        header.write_u32::<LittleEndian>(root.len() as u32).unwrap();
        header.write_u16::<LittleEndian>(0).unwrap();
        out[..HEADER_LEN].copy_from_slice(&header);
        out
    }
}

/// The blogging application used by several tests.
pub fn blog() -> Container {
    Container::new("Team Blog")
        .note(Note::form(
            0x10,
            vec![
                Item::text("$TITLE", "DefaultForm|Post"),
                Item::text("$Comment", "A blog post"),
                Item::field("title", 0, true, "", "@If(title = \"\"; @Failure(\"Title required\"); @Success)", "Title"),
                Item::field("content", 0, false, "", "", ""),
                Item::field("author", 0, false, "@UserName", "", "Author"),
                Item::field("created", 2, false, "@Created", "", ""),
            ],
        ))
        .note(Note::view(
            0x20,
            vec![
                Item::text("$TITLE", "AllDocuments|All"),
                Item::formula("$FORMULA", "SELECT Form = \"DefaultForm\""),
                Item::boolean("$DefaultView", true),
                Item::column("Title", 1, 0, "title", "", 200),
                Item::column("Author", 0, 1, "author", "", 120),
            ],
        ))
        .note(Note::document(
            0x30,
            vec![
                Item::integer("$FormRef", 0x10),
                Item::text("title", "Hello World"),
                Item::text("content", "First post"),
                Item::text("author", "Ann Lee"),
                Item::time("created", T0, 120),
            ],
        ))
        .note(Note::document(
            0x31,
            vec![
                Item::integer("$FormRef", 0x10),
                Item::text("title", "Second Post"),
                Item::text("content", "More words"),
                Item::text("author", "Bo Chen"),
                Item::time("created", T0 + 60, NO_OFFSET),
            ],
        ))
        .note(Note::acl(
            0x40,
            vec![Item::acl("-Default-", 2), Item::acl("Ann Lee", 6)],
        ))
}
