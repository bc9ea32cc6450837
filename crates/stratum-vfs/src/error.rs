use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a resolver operation could not complete.
///
/// Resolution failures carry the path as the caller spelled it, not a
/// partially-resolved candidate.
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("not found: {0}")]
    NotFound(PathBuf),
    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("is a directory: {0}")]
    IsADirectory(PathBuf),
    #[error("mounted archives are read-only: {0}")]
    ReadOnlyArchive(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}
