//! Non-fatal findings collected while parsing.

use std::fmt;

use log::{info, warn};
use serde::Serialize;

use super::models::NoteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A document's form reference names no form.
    UnresolvedFormRef,
    /// Rich text whose plain-text rendering dropped content.
    LossyRichText,
    /// An item with a type tag this reader does not know.
    UnknownItemType,
    /// A known item whose value could not be decoded.
    CorruptItem,
    /// A note or nested directory that was skipped.
    CorruptNote,
    /// A parent link that loops or names no form.
    BrokenInheritance,
}

impl DiagnosticKind {
    /// Whether this kind belongs to the `Corrupt` class of the error taxonomy.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::CorruptItem | DiagnosticKind::CorruptNote | DiagnosticKind::BrokenInheritance
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub note_id: NoteId,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}]: {}", level, self.note_id, self.message)
    }
}

/// Accumulates diagnostics during one parse.
///
/// Every entry is also forwarded to the `log` facade.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, kind: DiagnosticKind, note_id: NoteId, message: impl Into<String>) {
        let message = message.into();
        warn!("{}: {}", note_id, message);
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            note_id,
            message,
        });
    }

    pub fn info(&mut self, kind: DiagnosticKind, note_id: NoteId, message: impl Into<String>) {
        let message = message.into();
        info!("{}: {}", note_id, message);
        self.entries.push(Diagnostic {
            severity: Severity::Info,
            kind,
            note_id,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Final list, ordered by note id; entries for one note keep the order
    /// they were raised in.
    pub fn into_sorted(mut self) -> Vec<Diagnostic> {
        self.entries.sort_by_key(|d| d.note_id);
        self.entries
    }
}
