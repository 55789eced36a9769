//! Chunk walker: the directory-of-notes structure.
//!
//! A directory is a small table pointing at notes or at further directories:
//!
//! ```text
//! [4 bytes]  Magic "NDIR"
//! [4 bytes]  Entry count
//! [20 bytes] per entry:
//!            [4] id  [2] note class  [2] kind (0 note, 1 directory)
//!            [4] offset  [4] length  [4] adler32 of the referenced bytes
//! ```
//!
//! The root directory must be intact; every problem below it is reported
//! per entry so the caller can skip it and carry on.

use std::collections::HashSet;
use std::ops::Range;

use adler2::adler32_slice;
use log::{debug, info, trace};

use crate::nsf::codec::bytes::ByteReader;
use crate::nsf::types::error::{NsfError, Result};
use crate::nsf::types::models::{NoteClass, NoteId};
use crate::nsf::types::options::ParseOptions;

pub const DIRECTORY_MAGIC: [u8; 4] = *b"NDIR";
pub const DIRECTORY_HEADER_LEN: usize = 8;
pub const ENTRY_LEN: usize = 20;

const KIND_NOTE: u16 = 0;
const KIND_DIRECTORY: u16 = 1;

/// One note located by the walker. `range` is guaranteed to lie inside the
/// file and to match its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLocation {
    pub id: NoteId,
    pub class: NoteClass,
    pub range: Range<usize>,
}

/// A parsed directory table awaiting traversal.
#[derive(Debug)]
struct PendingDirectory {
    entries: Vec<RawEntry>,
    next: usize,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct RawEntry {
    id: u32,
    class: u16,
    kind: u16,
    offset: u32,
    length: u32,
    checksum: u32,
}

/// Lazy depth-first traversal of all directories.
///
/// Yields `Ok(NoteLocation)` for each note and `Err(NsfError::Corrupt)` for
/// each entry that had to be skipped. Each note id is yielded at most once.
pub struct NoteWalker<'a> {
    file: ByteReader<'a>,
    stack: Vec<PendingDirectory>,
    visited_directories: HashSet<u32>,
    seen_notes: HashSet<NoteId>,
    max_depth: usize,
    max_note_size: u32,
}

impl<'a> NoteWalker<'a> {
    /// Open the root directory. A root that cannot be read is fatal.
    pub fn new(file: &'a [u8], root_offset: u32, root_len: u32, options: &ParseOptions) -> Result<Self> {
        info!("Reading root directory at {:#x}", root_offset);
        let file = ByteReader::new(file);

        let root = read_directory(&file, root_offset, root_len, 0).map_err(|e| match e {
            NsfError::Corrupt { reason, .. } | NsfError::Encoding { reason, .. } => {
                NsfError::corrupt(None, format!("Root directory is corrupt: {}", reason))
            }
            NsfError::Truncated { offset, requested, available } => NsfError::corrupt(
                None,
                format!(
                    "Root directory is truncated: needed {} bytes at {:#x}, {} available",
                    requested, offset, available
                ),
            ),
            other => other,
        })?;
        debug!("Root directory: {} entries", root.entries.len());

        Ok(NoteWalker {
            file,
            stack: vec![root],
            visited_directories: HashSet::from([root_offset]),
            seen_notes: HashSet::new(),
            max_depth: options.max_directory_depth,
            max_note_size: options.max_note_size,
        })
    }

    fn visit(&mut self, entry: RawEntry, depth: usize) -> Option<Result<NoteLocation>> {
        let id = NoteId(entry.id);
        match entry.kind {
            KIND_NOTE => Some(self.locate_note(entry)),
            KIND_DIRECTORY => {
                if let Err(e) = self.descend(entry, depth) {
                    return Some(Err(e));
                }
                None
            }
            other => Some(Err(NsfError::corrupt(id, format!("Unknown directory entry kind {}", other)))),
        }
    }

    fn locate_note(&mut self, entry: RawEntry) -> Result<NoteLocation> {
        let id = NoteId(entry.id);
        if entry.length > self.max_note_size {
            return Err(NsfError::corrupt(
                id,
                format!("Note size {} exceeds the limit of {} bytes", entry.length, self.max_note_size),
            ));
        }
        let range = checked_range(&self.file, id, entry)?;
        if !self.seen_notes.insert(id) {
            return Err(NsfError::corrupt(id, "Duplicate directory entry for note"));
        }
        trace!("Note {} ({}) at {:?}", id, NoteClass::from(entry.class), range);
        Ok(NoteLocation {
            id,
            class: NoteClass::from(entry.class),
            range,
        })
    }

    fn descend(&mut self, entry: RawEntry, depth: usize) -> Result<()> {
        let id = NoteId(entry.id);
        let child_depth = depth + 1;
        if child_depth > self.max_depth {
            return Err(NsfError::corrupt(
                id,
                format!("Nested directory exceeds the depth limit of {}", self.max_depth),
            ));
        }
        if !self.visited_directories.insert(entry.offset) {
            return Err(NsfError::corrupt(
                id,
                format!("Directory at {:#x} is referenced twice", entry.offset),
            ));
        }
        checked_range(&self.file, id, entry)?;
        let directory = read_directory(&self.file, entry.offset, entry.length, child_depth).map_err(|e| match e {
            NsfError::Corrupt { reason, .. } => NsfError::corrupt(id, reason),
            NsfError::Truncated { offset, requested, .. } => NsfError::corrupt(
                id,
                format!("Directory table overruns its chunk: {} bytes at {:#x}", requested, offset),
            ),
            other => other,
        })?;
        debug!("Entering directory {} ({} entries, depth {})", id, directory.entries.len(), child_depth);
        self.stack.push(directory);
        Ok(())
    }
}

impl Iterator for NoteWalker<'_> {
    type Item = Result<NoteLocation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            if top.next >= top.entries.len() {
                self.stack.pop();
                continue;
            }
            let entry = top.entries[top.next];
            let depth = top.depth;
            top.next += 1;

            if let Some(item) = self.visit(entry, depth) {
                return Some(item);
            }
        }
    }
}

/// Validate an entry's byte range against the file and its checksum.
fn checked_range(file: &ByteReader<'_>, id: NoteId, entry: RawEntry) -> Result<Range<usize>> {
    let bytes = file.slice(entry.offset as usize, entry.length as usize).map_err(|_| {
        NsfError::corrupt(
            id,
            format!(
                "Range {:#x}+{} lies outside the file ({} bytes)",
                entry.offset,
                entry.length,
                file.len()
            ),
        )
    })?;
    let actual = adler32_slice(bytes);
    if actual != entry.checksum {
        return Err(NsfError::corrupt(
            id,
            format!("Checksum mismatch: expected {:#010x}, got {:#010x}", entry.checksum, actual),
        ));
    }
    let start = entry.offset as usize;
    Ok(start..start + entry.length as usize)
}

/// Read one directory table located at `offset`.
fn read_directory(file: &ByteReader<'_>, offset: u32, length: u32, depth: usize) -> Result<PendingDirectory> {
    let mut reader = file.sub_reader(offset as usize, length as usize)?;

    let magic = reader.read_bytes(4)?;
    if magic != DIRECTORY_MAGIC {
        return Err(NsfError::corrupt(None, format!("Bad directory magic {:02x?} at {:#x}", magic, offset)));
    }
    let count = reader.read_u32()? as usize;
    let needed = count
        .checked_mul(ENTRY_LEN)
        .filter(|&n| n <= reader.remaining())
        .ok_or_else(|| {
            NsfError::corrupt(
                None,
                format!("Directory at {:#x} declares {} entries but holds {} bytes", offset, count, reader.remaining()),
            )
        })?;
    trace!("Directory at {:#x}: {} entries ({} bytes)", offset, count, needed);

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(RawEntry {
            id: reader.read_u32()?,
            class: reader.read_u16()?,
            kind: reader.read_u16()?,
            offset: reader.read_u32()?,
            length: reader.read_u32()?,
            checksum: reader.read_u32()?,
        });
    }

    Ok(PendingDirectory {
        entries,
        next: 0,
        depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    struct Entry {
        id: u32,
        class: u16,
        kind: u16,
        offset: u32,
        length: u32,
        checksum: u32,
    }

    fn directory(entries: &[Entry]) -> Vec<u8> {
        let mut out = DIRECTORY_MAGIC.to_vec();
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

    fn note(id: u32, offset: usize, body: &[u8]) -> Entry {
        Entry {
            id,
            class: 0x0001,
            kind: KIND_NOTE,
            offset: offset as u32,
            length: body.len() as u32,
            checksum: adler32_slice(body),
        }
    }

    #[test]
    fn walks_nested_directories() {
        // Layout: [note A][note B][sub directory][root directory]
        let a = b"note-a".to_vec();
        let b = b"note-b!".to_vec();
        let mut file = Vec::new();
        file.extend_from_slice(&a);
        file.extend_from_slice(&b);

        let sub = directory(&[note(2, a.len(), &b)]);
        let sub_offset = file.len();
        file.extend_from_slice(&sub);

        let root = directory(&[
            note(1, 0, &a),
            Entry {
                id: 100,
                class: 0,
                kind: KIND_DIRECTORY,
                offset: sub_offset as u32,
                length: sub.len() as u32,
                checksum: adler32_slice(&sub),
            },
        ]);
        let root_offset = file.len();
        file.extend_from_slice(&root);

        let walker = NoteWalker::new(&file, root_offset as u32, root.len() as u32, &ParseOptions::default()).unwrap();
        let notes: Vec<NoteLocation> = walker.map(|r| r.unwrap()).collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, NoteId(1));
        assert_eq!(&file[notes[1].range.clone()], &b[..]);
        assert_eq!(notes[1].class, NoteClass::Document);
    }

    #[test]
    fn bad_entries_are_reported_and_skipped() {
        let body = b"body".to_vec();
        let mut file = body.clone();
        let mut bad_checksum = note(2, 0, &body);
        bad_checksum.checksum ^= 1;
        let root = directory(&[
            note(1, 0, &body),
            bad_checksum,
            note(3, 9_999, &body),
            note(1, 0, &body),
        ]);
        let root_offset = file.len();
        file.extend_from_slice(&root);

        let walker = NoteWalker::new(&file, root_offset as u32, root.len() as u32, &ParseOptions::default()).unwrap();
        let results: Vec<Result<NoteLocation>> = walker.collect();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        for (result, id) in results[1..].iter().zip([2, 3, 1]) {
            match result {
                Err(NsfError::Corrupt { note_id, .. }) => assert_eq!(*note_id, Some(NoteId(id))),
                other => panic!("expected corrupt entry for {}, got {:?}", id, other),
            }
        }
    }

    #[test]
    fn directory_cycles_terminate() {
        // The root lists itself as a nested directory.
        let len = (DIRECTORY_HEADER_LEN + ENTRY_LEN) as u32;
        let root = directory(&[Entry { id: 7, class: 0, kind: KIND_DIRECTORY, offset: 0, length: len, checksum: 0 }]);
        assert_eq!(root.len() as u32, len);

        let walker = NoteWalker::new(&root, 0, len, &ParseOptions::default()).unwrap();
        let results: Vec<Result<NoteLocation>> = walker.collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(NsfError::Corrupt { note_id: Some(NoteId(7)), .. })));
    }

    #[test]
    fn unknown_kinds_and_broken_subdirectories_are_skipped() {
        // Layout: [note][chunk without NDIR magic][root directory]
        let body = b"body".to_vec();
        let mut file = body.clone();
        let junk = b"JUNKJUNK".to_vec();
        let junk_offset = file.len();
        file.extend_from_slice(&junk);

        let subdirectory = |id, offset: usize, bytes: &[u8]| Entry {
            id,
            class: 0,
            kind: KIND_DIRECTORY,
            offset: offset as u32,
            length: bytes.len() as u32,
            checksum: adler32_slice(bytes),
        };
        let mut unknown_kind = note(2, 0, &body);
        unknown_kind.kind = 5;
        let root = directory(&[
            unknown_kind,
            subdirectory(3, junk_offset, &junk),
            Entry { offset: 9_999, ..subdirectory(4, 0, &junk) },
            note(1, 0, &body),
        ]);
        let root_offset = file.len();
        file.extend_from_slice(&root);

        let walker = NoteWalker::new(&file, root_offset as u32, root.len() as u32, &ParseOptions::default()).unwrap();
        let results: Vec<Result<NoteLocation>> = walker.collect();
        assert_eq!(results.len(), 4);
        for (result, id) in results[..3].iter().zip([2, 3, 4]) {
            match result {
                Err(NsfError::Corrupt { note_id, .. }) => assert_eq!(*note_id, Some(NoteId(id))),
                other => panic!("expected corrupt entry for {}, got {:?}", id, other),
            }
        }
        assert_eq!(results[3].as_ref().map(|n| n.id).ok(), Some(NoteId(1)));
    }

    #[test]
    fn oversized_notes_are_skipped() {
        let small = b"tiny".to_vec();
        let large = vec![0xAB; 64];
        let mut file = small.clone();
        file.extend_from_slice(&large);
        let root = directory(&[note(1, 0, &small), note(2, small.len(), &large)]);
        let root_offset = file.len();
        file.extend_from_slice(&root);

        let options = ParseOptions::default().with_max_note_size(16);
        let walker = NoteWalker::new(&file, root_offset as u32, root.len() as u32, &options).unwrap();
        let results: Vec<Result<NoteLocation>> = walker.collect();
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(NsfError::Corrupt { note_id: Some(NoteId(2)), .. })));
    }

    #[test]
    fn corrupt_root_is_fatal() {
        let file = b"XXXX\x00\x00\x00\x00".to_vec();
        assert!(matches!(
            NoteWalker::new(&file, 0, 8, &ParseOptions::default()),
            Err(NsfError::Corrupt { note_id: None, .. })
        ));
        let file = directory(&[]);
        assert!(matches!(
            NoteWalker::new(&file, 4, 100, &ParseOptions::default()),
            Err(NsfError::Corrupt { .. })
        ));
    }
}
