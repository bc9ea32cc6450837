use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::file::{OpenMode, RandomAccess};

/// A host file opened through `std::fs`.
#[derive(Debug)]
pub struct OsFile {
    file: fs::File,
    path: PathBuf,
}

impl OsFile {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> io::Result<Self> {
        let path = path.as_ref();
        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::Read => {
                options.read(true);
            }
            OpenMode::Write => {
                options.write(true).create(true).truncate(true);
            }
            OpenMode::Append => {
                options.append(true).create(true);
            }
            OpenMode::ReadUpdate => {
                options.read(true).write(true);
            }
            OpenMode::WriteUpdate => {
                options.read(true).write(true).create(true).truncate(true);
            }
            OpenMode::AppendUpdate => {
                options.read(true).append(true).create(true);
            }
        }
        Ok(Self {
            file: options.open(path)?,
            path: path.to_path_buf(),
        })
    }
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for OsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for OsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl RandomAccess for OsFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
