use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a file should be opened.
///
/// The update variants additionally allow reading (for write modes) or
/// writing (for read mode).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    ReadUpdate,
    WriteUpdate,
    AppendUpdate,
}

impl OpenMode {
    /// Whether this mode can create or modify the target.
    pub fn writes(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// A positionable byte stream.
///
/// Backends implement the std I/O traits plus the two queries the virtual
/// file system needs and that std does not provide on trait objects.
pub trait RandomAccess: Read + Write + Seek + Send {
    /// Total length of the stream in bytes.
    fn len(&self) -> io::Result<u64>;

    /// The path this stream was opened from, when it has one.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// A cloneable handle to a shared byte stream.
///
/// All operations lock the backend for their duration, so the single cursor
/// shared by clones of one handle is never observed mid-operation. Callers
/// that need a read at a known position independent of the shared cursor
/// should use [`File::read_exact_at`], which holds the lock across the
/// seek and the read.
#[derive(Clone)]
pub struct File {
    inner: Arc<Mutex<dyn RandomAccess>>,
}

impl File {
    pub fn new(backend: impl RandomAccess + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(backend)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, dyn RandomAccess + 'static> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.lock().read(buf)
    }

    pub fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
        self.lock().read_exact(buf)
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    pub fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.lock().write_all(buf)
    }

    pub fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.lock().seek(pos)
    }

    /// Current position of the shared cursor.
    pub fn tell(&self) -> io::Result<u64> {
        self.lock().seek(SeekFrom::Current(0))
    }

    pub fn len(&self) -> io::Result<u64> {
        self.lock().len()
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path().map(Path::to_path_buf)
    }

    /// Fills `buf` from `offset`, holding the backend lock across the seek
    /// and the read so concurrent positioned reads never interleave.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut guard = self.lock();
        guard.seek(SeekFrom::Start(offset))?;
        guard.read_exact(buf)
    }

    /// Reads the whole stream into memory, from the beginning.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut guard = self.lock();
        guard.seek(SeekFrom::Start(0))?;
        let mut out = Vec::new();
        guard.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Reads the whole stream as UTF-8 text, from the beginning.
    pub fn read_to_string(&self) -> io::Result<String> {
        String::from_utf8(self.read_all()?)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("File");
        match self.inner.try_lock() {
            Ok(guard) => dbg.field("path", &guard.path()),
            Err(_) => dbg.field("path", &"<locked>"),
        };
        dbg.finish()
    }
}
