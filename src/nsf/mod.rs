//! Core NSF reader module.
//!
//! The pipeline is strictly layered:
//!
//! - [`codec`]: bounds-checked byte reads and LMBCS text
//! - [`format`]: header, directories, note items and design records
//! - `assembler`: note classification and cross-note checks
//! - [`reader`]: the whole-file state machine

pub mod codec;
pub mod format;
pub mod reader;
pub mod types;

mod assembler;

use std::path::Path;

pub use reader::{NsfReader, ParseState, ParsedDatabase};
pub use types::error::{NsfError, Result};
pub use types::options::ParseOptions;

/// Parse a container file with default options.
pub fn parse_file(path: impl AsRef<Path>) -> Result<ParsedDatabase> {
    NsfReader::new(ParseOptions::default()).read_file(path)
}

/// Parse an in-memory container with default options.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedDatabase> {
    NsfReader::new(ParseOptions::default()).read_bytes(bytes)
}
