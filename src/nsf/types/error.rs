//! Custom error types for the nsf-reader crate.

use thiserror::Error;

use super::models::NoteId;

/// The primary error type for all operations in this crate.
///
/// Every variant is terminal: a parse that returns one of these never hands
/// out a model. Recoverable problems are reported as
/// [`Diagnostic`](super::diagnostics::Diagnostic)s instead.
#[derive(Debug, Error)]
pub enum NsfError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read requested more bytes than remain in the buffer.
    #[error("Truncated data: needed {requested} bytes at offset {offset:#x}, only {available} available")]
    Truncated {
        offset: u64,
        requested: u64,
        available: u64,
    },

    /// An invalid or incomplete LMBCS sequence. `offset` is the file
    /// offset of the offending byte when the text came from a container.
    #[error("Invalid LMBCS text at offset {offset:#x}: {reason}")]
    Encoding { offset: u64, reason: String },

    /// An out-of-range offset/length, a dangling reference or a cycle.
    ///
    /// Only fatal when it hits the root directory; everywhere else the
    /// assembler downgrades it to a diagnostic.
    #[error("Corrupt data{}: {reason}", note_label(.note_id))]
    Corrupt {
        note_id: Option<NoteId>,
        reason: String,
    },

    /// A structural invariant of the assembled model does not hold.
    #[error("Malformed form '{form}': {reason} '{name}'")]
    Malformed {
        form: String,
        name: String,
        reason: &'static str,
    },

    /// A recognized container feature this reader does not handle.
    #[error("Unsupported container: {0}")]
    Unsupported(String),

    /// An `NsfReader` was asked to parse after it already ran.
    #[error("Reader already used (state: {0:?})")]
    InvalidState(crate::nsf::reader::ParseState),
}

impl NsfError {
    /// Shorthand for a [`NsfError::Corrupt`] tied to a note.
    pub fn corrupt(note_id: impl Into<Option<NoteId>>, reason: impl Into<String>) -> Self {
        NsfError::Corrupt {
            note_id: note_id.into(),
            reason: reason.into(),
        }
    }
}

fn note_label(note_id: &Option<NoteId>) -> String {
    match note_id {
        Some(id) => format!(" in note {}", id),
        None => String::new(),
    }
}

/// A convenience `Result` type alias using the crate's `NsfError` type.
pub type Result<T> = std::result::Result<T, NsfError>;
