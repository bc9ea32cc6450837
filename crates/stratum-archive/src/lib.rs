//! Archive-format readers for Stratum.
//!
//! Each reader parses its format's table of contents once at mount time
//! into a `stratum-vfs` [`PathIndex`](stratum_vfs::PathIndex) and
//! materializes entries on demand into in-memory files. Both plug into the
//! resolver through the [`ArchiveReader`](stratum_vfs::ArchiveReader)
//! capability; neither writes archives.

mod vpk;
mod zip;

pub use crate::zip::ZipReader;
pub use vpk::VpkReader;
