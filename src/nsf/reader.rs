use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;

use super::assembler;
use super::codec::bytes::ByteReader;
use super::format::header;
use super::types::diagnostics::Diagnostic;
use super::types::error::{NsfError, Result};
use super::types::models::Application;
use super::types::options::ParseOptions;

/// Progress of one whole-file parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Unopened,
    Reading,
    Assembling,
    Ready,
    Failed,
}

/// Result of a successful parse: the model plus everything that was
/// tolerated along the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDatabase {
    application: Application,
    diagnostics: Vec<Diagnostic>,
}

impl ParsedDatabase {
    pub fn application(&self) -> &Application {
        &self.application
    }

    /// Ordered by note id.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Application, Vec<Diagnostic>) {
        (self.application, self.diagnostics)
    }
}

/// Single-use reader for NSF containers.
///
/// Drives `Unopened -> Reading -> Assembling -> Ready`, or `Failed` on the
/// first fatal error. A failed parse never exposes a partial model, and a
/// reader cannot be run twice.
#[derive(Debug)]
pub struct NsfReader {
    options: ParseOptions,
    state: ParseState,
}

impl NsfReader {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            state: ParseState::Unopened,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Read a container from disk.
    ///
    /// The file is read in one go and closed before parsing starts. Without
    /// a name hint in the options, the file stem is used as the fallback
    /// application name.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The container is encrypted, compressed or of an unknown version
    /// - The header, root directory or a note's item table is damaged
    /// - A form declares the same field twice
    pub fn read_file(&mut self, path: impl AsRef<Path>) -> Result<ParsedDatabase> {
        let path = path.as_ref();
        self.begin()?;
        info!("Opening NSF file: {}", path.display());

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.transition(ParseState::Failed);
                return Err(NsfError::Io(e));
            }
        };
        debug!("Read {} bytes", bytes.len());

        if self.options.name_hint.is_none() {
            self.options.name_hint = path.file_stem().map(|stem| stem.to_string_lossy().into_owned());
        }
        self.finish(&bytes)
    }

    /// Parse a container already in memory.
    pub fn read_bytes(&mut self, bytes: &[u8]) -> Result<ParsedDatabase> {
        self.begin()?;
        self.finish(bytes)
    }

    fn begin(&mut self) -> Result<()> {
        if self.state != ParseState::Unopened {
            return Err(NsfError::InvalidState(self.state));
        }
        self.transition(ParseState::Reading);
        Ok(())
    }

    fn finish(&mut self, bytes: &[u8]) -> Result<ParsedDatabase> {
        match self.parse(bytes) {
            Ok(parsed) => {
                self.transition(ParseState::Ready);
                Ok(parsed)
            }
            Err(e) => {
                self.transition(ParseState::Failed);
                Err(e)
            }
        }
    }

    fn parse(&mut self, bytes: &[u8]) -> Result<ParsedDatabase> {
        let mut reader = ByteReader::new(bytes);
        let file_header = header::parse(&mut reader)?;
        let info = header::parse_info(&reader, &file_header)?;

        self.transition(ParseState::Assembling);
        let (application, diagnostics) = assembler::assemble(bytes, &file_header, info, &self.options)?;

        Ok(ParsedDatabase {
            application,
            diagnostics: diagnostics.into_sorted(),
        })
    }

    fn transition(&mut self, next: ParseState) {
        debug!("Parse state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
