//! # nsf-reader
//!
//! A reader for NSF application containers: forms, views, documents and
//! the access control list, decoded into one immutable [`Application`].
//!
//! Non-fatal problems (unresolved form references, lossy rich text, unknown
//! item types, skipped notes, broken inheritance) are returned as
//! [`Diagnostic`]s next to the model instead of failing the parse.
pub mod nsf;

// Re-export the main types for convenience
pub use nsf::{
    NsfError, NsfReader, ParseOptions, ParseState, ParsedDatabase, Result,
    codec::lmbcs,
    parse_bytes, parse_file,
    types::{
        diagnostics::{Diagnostic, DiagnosticKind, Severity},
        models::{
            AclEntry, AclLevel, Application, ColumnDefinition, Document, FieldDefinition, FieldKind,
            FieldValue, Form, FormRef, NoteClass, NoteId, Number, RichText, SortDirection, View,
            DEFAULT_PRINCIPAL,
        },
    },
};
