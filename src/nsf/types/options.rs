//! Parser configuration.

/// Knobs for one parse. The defaults suit any well-formed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Nested directories deeper than this are skipped as corrupt.
    pub max_directory_depth: usize,
    /// Notes larger than this many bytes are skipped as corrupt.
    pub max_note_size: u32,
    /// When false, document notes are walked but not decoded.
    pub include_documents: bool,
    /// Application name used when the container has no title.
    pub name_hint: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_directory_depth: 16,
            max_note_size: 16 * 1024 * 1024,
            include_documents: true,
            name_hint: None,
        }
    }
}

impl ParseOptions {
    pub fn with_max_directory_depth(mut self, depth: usize) -> Self {
        self.max_directory_depth = depth;
        self
    }

    pub fn with_max_note_size(mut self, size: u32) -> Self {
        self.max_note_size = size;
        self
    }

    pub fn with_documents(mut self, include: bool) -> Self {
        self.include_documents = include;
        self
    }

    pub fn with_name_hint(mut self, name: impl Into<String>) -> Self {
        self.name_hint = Some(name.into());
        self
    }
}
