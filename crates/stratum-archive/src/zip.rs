//! ZIP central-directory reader.
//!
//! The whole central directory is read once at mount time; entry contents
//! are located through the per-entry local header and materialized on
//! demand. Only stored and DEFLATE entries are supported, and the
//! end-of-central-directory record must sit at the end of the stream
//! (trailing archive comments are not handled).

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;

use stratum_io::{File, MemFile};
use stratum_vfs::{Archive, ArchiveError, ArchiveReader, PathIndex, TypeFilter};

const END_OF_CENTRAL_DIRECTORY: u32 = 0x0605_4b50;
const CENTRAL_DIRECTORY_HEADER: u32 = 0x0201_4b50;
const LOCAL_HEADER: u32 = 0x0403_4b50;

const END_RECORD_LEN: u64 = 22;
const LOCAL_HEADER_LEN: u64 = 30;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

#[derive(Clone, Debug)]
struct ZipEntry {
    method: u16,
    compressed_size: u32,
    uncompressed_size: u32,
    data_offset: u64,
}

/// Reads `.zip`-format archives (and containers using the same layout,
/// such as `.pk3`/`.pk4` packs).
#[derive(Default)]
pub struct ZipReader {
    index: PathIndex<ZipEntry>,
    source: Option<File>,
}

impl ZipReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `source` and returns a mountable archive handle.
    pub fn open(source: File) -> Result<Archive, ArchiveError> {
        let mut reader = Self::new();
        reader.open_archive(source)?;
        Ok(Archive::new(reader))
    }

    fn parse(&mut self, source: &File) -> Result<u16, ArchiveError> {
        let len = source.len()?;
        if len < END_RECORD_LEN {
            return Err(ArchiveError::BadSignature);
        }

        let mut end = [0u8; END_RECORD_LEN as usize];
        source.read_exact_at(len - END_RECORD_LEN, &mut end)?;
        let mut cursor = Cursor::new(&end[..]);
        if cursor.read_u32::<LittleEndian>()? != END_OF_CENTRAL_DIRECTORY {
            return Err(ArchiveError::BadSignature);
        }
        cursor.set_position(10);
        let total_entries = cursor.read_u16::<LittleEndian>()?;
        let directory_size = cursor.read_u32::<LittleEndian>()?;
        let directory_offset = cursor.read_u32::<LittleEndian>()?;

        let mut directory = vec![0u8; directory_size as usize];
        source.read_exact_at(u64::from(directory_offset), &mut directory)?;
        let mut cursor = Cursor::new(&directory[..]);

        for _ in 0..total_entries {
            if cursor.read_u32::<LittleEndian>()? != CENTRAL_DIRECTORY_HEADER {
                return Err(ArchiveError::Malformed("central directory header signature"));
            }
            cursor.set_position(cursor.position() + 6);
            let method = cursor.read_u16::<LittleEndian>()?;
            cursor.set_position(cursor.position() + 8);
            let compressed_size = cursor.read_u32::<LittleEndian>()?;
            let uncompressed_size = cursor.read_u32::<LittleEndian>()?;
            let name_len = cursor.read_u16::<LittleEndian>()?;
            let extra_len = cursor.read_u16::<LittleEndian>()?;
            let comment_len = cursor.read_u16::<LittleEndian>()?;
            cursor.set_position(cursor.position() + 8);
            let local_offset = cursor.read_u32::<LittleEndian>()?;

            let mut name = vec![0u8; usize::from(name_len)];
            cursor.read_exact(&mut name)?;
            cursor.set_position(cursor.position() + u64::from(extra_len) + u64::from(comment_len));

            // The local header's own name/extra lengths decide where the
            // entry data starts; they can differ from the central copy.
            let mut local = [0u8; LOCAL_HEADER_LEN as usize];
            source.read_exact_at(u64::from(local_offset), &mut local)?;
            let mut local_cursor = Cursor::new(&local[..]);
            if local_cursor.read_u32::<LittleEndian>()? != LOCAL_HEADER {
                return Err(ArchiveError::Malformed("local header signature"));
            }
            local_cursor.set_position(26);
            let local_name_len = local_cursor.read_u16::<LittleEndian>()?;
            let local_extra_len = local_cursor.read_u16::<LittleEndian>()?;
            let data_offset = u64::from(local_offset)
                + LOCAL_HEADER_LEN
                + u64::from(local_name_len)
                + u64::from(local_extra_len);

            let name = String::from_utf8_lossy(&name).into_owned();
            self.index.add(
                ZipEntry {
                    method,
                    compressed_size,
                    uncompressed_size,
                    data_offset,
                },
                &name,
            );
        }

        Ok(total_entries)
    }
}

impl ArchiveReader for ZipReader {
    fn open_archive(&mut self, source: File) -> Result<(), ArchiveError> {
        let entries = self.parse(&source)?;
        tracing::debug!(
            target: "stratum.archive",
            entries = usize::from(entries),
            "zip table of contents parsed"
        );
        self.source = Some(source);
        Ok(())
    }

    fn exists(&self, path: &Path, types: TypeFilter) -> bool {
        let mut key = path.to_string_lossy().into_owned();
        if types == TypeFilter::DIRECTORY && !key.ends_with('/') {
            key.push('/');
        }
        self.index.find_exact(&key).is_some()
    }

    fn open_file(&self, path: &Path) -> Option<File> {
        let entry = self.index.find_exact(&path.to_string_lossy())?;
        let source = self.source.as_ref()?;

        let mut raw = vec![0u8; entry.compressed_size as usize];
        source.read_exact_at(entry.data_offset, &mut raw).ok()?;

        let contents = match entry.method {
            METHOD_STORED => raw,
            METHOD_DEFLATE => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(raw.as_slice()).read_to_end(&mut out).ok()?;
                out
            }
            method => {
                tracing::debug!(
                    target: "stratum.archive",
                    method = usize::from(method),
                    "unsupported compression method"
                );
                return None;
            }
        };
        Some(File::new(MemFile::from_vec(contents)))
    }

    fn list_directory(&self, path: &Path) -> Vec<String> {
        self.index.list_prefix(&path.to_string_lossy())
    }
}
