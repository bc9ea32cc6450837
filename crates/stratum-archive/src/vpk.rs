//! VPK (Valve pack) directory-tree reader.
//!
//! A pack is a `…_dir.vpk` index plus numbered `…_NNN.vpk` data files in
//! the same directory. The index carries a tree of extension → directory →
//! name triples; small entries embed preload bytes directly in the tree,
//! the rest point into a data file (or into the index's own data section
//! for entries tagged `0x7fff`). Pak files are opened on demand and cached;
//! all content reads are positioned, so concurrent opens of different
//! entries never fight over a shared cursor.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use byteorder::{LittleEndian, ReadBytesExt};

use stratum_io::{File, MemFile, OpenMode, OsFile};
use stratum_vfs::{Archive, ArchiveError, ArchiveReader, FileSystem, Location, PathIndex, TypeFilter};

const VPK_SIGNATURE: u32 = 0x55aa_1234;
const ENTRY_TERMINATOR: u16 = 0xffff;
/// Archive index meaning "the data lives in the index file itself".
const INDEX_RESIDENT: u16 = 0x7fff;

const ENTRY_HEADER_LEN: usize = 18;

#[derive(Clone)]
struct VpkEntry {
    preload: Arc<[u8]>,
    archive_index: u16,
    offset: u32,
    length: u32,
}

/// Reads VPK version 1 and 2 packs.
pub struct VpkReader {
    index: PathIndex<VpkEntry>,
    template: String,
    source: Option<File>,
    /// Offset of the data section inside the index file.
    data_offset: u64,
    /// Directory the numbered pak files live in.
    pak_dir: Option<PathBuf>,
    paks: Mutex<HashMap<u16, File>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

impl VpkReader {
    /// `template` names the pack members with a `{}` placeholder, e.g.
    /// `"pak01_{}.vpk"`; the index is the `dir` member.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            index: PathIndex::new(),
            template: template.into(),
            source: None,
            data_offset: 0,
            pak_dir: None,
            paks: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the index member of the pack under `directory` through the
    /// resolver, opens it, and returns a mountable archive handle.
    pub fn open(
        fs: &FileSystem,
        directory: impl Into<Location>,
        template: &str,
    ) -> Result<Archive, ArchiveError> {
        let directory = directory.into();
        let index_name = template.replace("{}", "dir");
        let source = fs
            .open(directory.join(&index_name).files(), OpenMode::Read)
            .map_err(|_| ArchiveError::MissingMember(index_name))?;

        let mut reader = Self::new(template);
        reader.open_archive(source)?;
        Ok(Archive::new(reader))
    }

    fn parse_tree(&mut self, tree: &[u8]) -> Result<(), ArchiveError> {
        let mut pos = 0usize;
        loop {
            let extension = read_cstr(tree, &mut pos)?;
            if extension.is_empty() {
                break;
            }
            loop {
                let directory = read_cstr(tree, &mut pos)?;
                if directory.is_empty() {
                    break;
                }
                // A single space names the pack root.
                let directory = if directory == " " { "" } else { directory };
                loop {
                    let name = read_cstr(tree, &mut pos)?;
                    if name.is_empty() {
                        break;
                    }

                    let header = tree
                        .get(pos..pos + ENTRY_HEADER_LEN)
                        .ok_or(ArchiveError::Malformed("truncated directory entry"))?;
                    let mut cursor = Cursor::new(header);
                    let _crc = cursor.read_u32::<LittleEndian>()?;
                    let preload_len = cursor.read_u16::<LittleEndian>()?;
                    let archive_index = cursor.read_u16::<LittleEndian>()?;
                    let offset = cursor.read_u32::<LittleEndian>()?;
                    let length = cursor.read_u32::<LittleEndian>()?;
                    if cursor.read_u16::<LittleEndian>()? != ENTRY_TERMINATOR {
                        return Err(ArchiveError::Malformed("directory entry terminator"));
                    }
                    pos += ENTRY_HEADER_LEN;

                    let preload = tree
                        .get(pos..pos + usize::from(preload_len))
                        .ok_or(ArchiveError::Malformed("truncated preload data"))?;
                    pos += usize::from(preload_len);

                    let full_path = if directory.is_empty() {
                        format!("{name}.{extension}")
                    } else {
                        format!("{directory}/{name}.{extension}")
                    };
                    self.index.add(
                        VpkEntry {
                            preload: preload.into(),
                            archive_index,
                            offset,
                            length,
                        },
                        &full_path,
                    );
                }
            }
        }
        Ok(())
    }

    fn pak(&self, index: u16) -> Option<File> {
        let mut paks = lock(&self.paks);
        if let Some(file) = paks.get(&index) {
            return Some(file.clone());
        }
        let dir = self.pak_dir.as_ref()?;
        let member = self.template.replace("{}", &format!("{index:03}"));
        let file = File::new(OsFile::open(dir.join(member), OpenMode::Read).ok()?);
        paks.insert(index, file.clone());
        Some(file)
    }
}

fn read_cstr<'a>(tree: &'a [u8], pos: &mut usize) -> Result<&'a str, ArchiveError> {
    let rest = &tree[*pos..];
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(ArchiveError::Malformed("unterminated string"))?;
    let text = std::str::from_utf8(&rest[..end])
        .map_err(|_| ArchiveError::Malformed("non-UTF-8 name"))?;
    *pos += end + 1;
    Ok(text)
}

impl ArchiveReader for VpkReader {
    fn open_archive(&mut self, source: File) -> Result<(), ArchiveError> {
        let mut header = [0u8; 12];
        source.read_exact_at(0, &mut header)?;
        let mut cursor = Cursor::new(&header[..]);
        if cursor.read_u32::<LittleEndian>()? != VPK_SIGNATURE {
            return Err(ArchiveError::BadSignature);
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        let tree_size = cursor.read_u32::<LittleEndian>()?;
        let header_len: u64 = match version {
            1 => 12,
            2 => 28,
            _ => return Err(ArchiveError::Malformed("unsupported version")),
        };

        let mut tree = vec![0u8; tree_size as usize];
        source.read_exact_at(header_len, &mut tree)?;
        self.parse_tree(&tree)?;

        self.data_offset = header_len + u64::from(tree_size);
        self.pak_dir = source
            .path()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        self.source = Some(source);
        tracing::debug!(
            target: "stratum.archive",
            version,
            entries = self.index.len(),
            "vpk directory tree parsed"
        );
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

        let mut contents = Vec::with_capacity(entry.preload.len() + entry.length as usize);
        contents.extend_from_slice(&entry.preload);
        if entry.length > 0 {
            let (source, offset) = if entry.archive_index == INDEX_RESIDENT {
                (self.source.clone()?, self.data_offset + u64::from(entry.offset))
            } else {
                (self.pak(entry.archive_index)?, u64::from(entry.offset))
            };
            let start = contents.len();
            contents.resize(start + entry.length as usize, 0);
            source.read_exact_at(offset, &mut contents[start..]).ok()?;
        }
        Some(File::new(MemFile::from_vec(contents)))
    }

    fn list_directory(&self, path: &Path) -> Vec<String> {
        self.index.list_prefix(&path.to_string_lossy())
    }
}
