use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::file::RandomAccess;

/// An in-memory byte stream.
///
/// A growable `MemFile` owns its buffer and extends it on writes past the
/// end, rounding the reservation up to the next power of two so repeated
/// appends reallocate O(log n) times. A fixed `MemFile` has a hard capacity:
/// writes are clamped to the remaining space and a full buffer accepts zero
/// bytes, which makes `write_all` fail.
#[derive(Debug)]
pub struct MemFile {
    buf: Vec<u8>,
    fixed: bool,
    pos: u64,
}

impl MemFile {
    /// An empty, growable memory file.
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            fixed: false,
            pos: 0,
        }
    }

    /// A growable memory file over existing contents. The cursor starts at 0.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        Self {
            buf,
            fixed: false,
            pos: 0,
        }
    }

    /// A memory file over a buffer that must not grow.
    ///
    /// The buffer's current length is both its contents and its capacity.
    pub fn fixed(buf: Vec<u8>) -> Self {
        Self {
            buf,
            fixed: true,
            pos: 0,
        }
    }

    /// Consumes the file and returns the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn grow_to(&mut self, required: usize) {
        if required > self.buf.capacity() {
            let target = required.next_power_of_two();
            self.buf.reserve_exact(target - self.buf.len());
        }
        self.buf.resize(required, 0);
    }
}

impl Default for MemFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.buf.len() as u64;
        if self.pos >= len {
            return Ok(0);
        }
        let start = self.pos as usize;
        let n = buf.len().min(self.buf.len() - start);
        buf[..n].copy_from_slice(&self.buf[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "cursor out of range"))?;
        let n = if self.fixed {
            if start >= self.buf.len() {
                return Ok(0);
            }
            data.len().min(self.buf.len() - start)
        } else {
            let end = start
                .checked_add(data.len())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write too large"))?;
            if end > self.buf.len() {
                self.grow_to(end);
            }
            data.len()
        };
        self.buf[start..start + n].copy_from_slice(&data[..n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let next = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => (self.buf.len() as u64).checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match next {
            Some(next) => {
                self.pos = next;
                Ok(next)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of memory file",
            )),
        }
    }
}

impl RandomAccess for MemFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.buf.len() as u64)
    }
}
