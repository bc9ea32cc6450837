//! The capability mounted archives expose to the resolver.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use stratum_io::File;
use thiserror::Error;

use crate::location::TypeFilter;

/// Why an archive could not be opened.
///
/// A signature mismatch is a recoverable failure: the stream simply is not
/// in the expected format, and the caller may try another reader.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unrecognized archive signature")]
    BadSignature,
    #[error("malformed archive: {0}")]
    Malformed(&'static str),
    #[error("archive member not found: {0}")]
    MissingMember(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A read-only archive format.
///
/// Implementations parse a table of contents once in [`open_archive`] and
/// answer every later query from it. Entry paths are archive-relative.
///
/// [`open_archive`]: ArchiveReader::open_archive
pub trait ArchiveReader: Send + Sync {
    /// Parses the table of contents from `source`. Called once, before the
    /// reader is shared.
    fn open_archive(&mut self, source: File) -> Result<(), ArchiveError>;

    /// Whether `path` names an entry accepted by `types`.
    fn exists(&self, path: &Path, types: TypeFilter) -> bool;

    /// Materializes the decoded contents of `path` into an in-memory file.
    /// `None` when the entry is absent or cannot be decoded.
    fn open_file(&self, path: &Path) -> Option<File>;

    /// The final-component names of the direct children of `path`.
    fn list_directory(&self, path: &Path) -> Vec<String>;
}

/// A shared handle to an opened archive.
///
/// The resolver holds these behind dynamic dispatch and never branches on
/// the concrete format.
#[derive(Clone)]
pub struct Archive {
    reader: Arc<dyn ArchiveReader>,
}

impl Archive {
    pub fn new(reader: impl ArchiveReader + 'static) -> Self {
        Self {
            reader: Arc::new(reader),
        }
    }

    pub(crate) fn from_boxed(reader: Box<dyn ArchiveReader>) -> Self {
        Self {
            reader: Arc::from(reader),
        }
    }

    pub fn exists(&self, path: &Path, types: TypeFilter) -> bool {
        self.reader.exists(path, types)
    }

    pub fn open_file(&self, path: &Path) -> Option<File> {
        self.reader.open_file(path)
    }

    pub fn list_directory(&self, path: &Path) -> Vec<String> {
        self.reader.list_directory(path)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive").finish_non_exhaustive()
    }
}
