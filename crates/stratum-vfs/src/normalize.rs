//! Lexical path canonicalization.
//!
//! [`normalize`] is the single entry point every other part of the crate
//! funnels paths through: the index keys entries by its output, and the
//! resolver canonicalizes search paths with it. It is a pure function over
//! the path text and never touches the file system.

/// A canonicalized path plus the two measurements derived alongside it.
///
/// `text` uses `/` as its only separator and contains no empty, `.`, or
/// resolved `..` components. `filename_offset` is the byte offset of the
/// final path component (which keeps its trailing separator for
/// directory-style paths). `depth` is the net number of tree levels the
/// path descends; absolute and relative spellings of the same path share
/// one depth, and root-level entries of an archive sit at depth 1.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedPath {
    pub text: String,
    pub filename_offset: usize,
    pub depth: i32,
}

impl NormalizedPath {
    /// The final path component, including a trailing separator when the
    /// path denotes a directory.
    pub fn file_name(&self) -> &str {
        &self.text[self.filename_offset..]
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Entry {
    Separator,
    Dot,
    DotDot,
    Name,
}

fn is_sep(b: u8) -> bool {
    b == b'/' || b == b'\\'
}

/// Canonicalizes `raw` in a single backward pass.
///
/// `/` and `\` are both accepted as separators; the output uses `/`.
/// Separator runs collapse, `.` components vanish, and `..` cancels the
/// nearest real component to its left. A `..` with nothing left to cancel
/// is dropped silently, so a path can normalize out of its intended root
/// (`../x` becomes `x`); callers that care must reject such inputs before
/// normalizing.
///
/// The scan keeps O(1) state besides the output buffer: a counter of
/// components still owed to `..` entries already seen.
pub fn normalize(raw: &str) -> NormalizedPath {
    let src = raw.as_bytes();
    let len = src.len();
    if len == 0 {
        return NormalizedPath {
            text: String::new(),
            filename_offset: 0,
            depth: 0,
        };
    }

    // Written back to front; NUL marks a slot whose component was cancelled.
    // The extra slot at `len` absorbs the write that a trailing `.`/`..`
    // entry cancels before it happens.
    let mut buf = vec![0u8; len + 1];
    let mut w = len as isize - 1;
    let mut r = len;
    let mut depth = 0i32;
    let mut pending = 0usize;
    let mut first: Option<Entry> = None;
    let mut last = Entry::Name;

    while r > 0 {
        let c = src[r - 1];
        let entry;
        if is_sep(c) {
            while r > 0 && is_sep(src[r - 1]) {
                r -= 1;
            }
            if (0..=len as isize).contains(&w) {
                buf[w as usize] = if pending == 0 { b'/' } else { 0 };
            }
            w -= 1;
            depth += 1;
            entry = Entry::Separator;
        } else if c == b'.' && (r == 1 || is_sep(src[r - 2])) {
            // A bare `.` cancels the separator to its right; a trailing `.`
            // has none, so it leaves the depth untouched.
            r -= 1;
            w += 1;
            if first.is_some() {
                depth -= 1;
            }
            entry = Entry::Dot;
        } else if c == b'.' && r >= 2 && src[r - 2] == b'.' && (r == 2 || is_sep(src[r - 3])) {
            // `..` cancels its own separator and the cancelled component's.
            r -= 2;
            w += 1;
            pending += 1;
            depth -= if first.is_some() { 2 } else { 1 };
            entry = Entry::DotDot;
        } else {
            while r > 0 && !is_sep(src[r - 1]) {
                if (0..=len as isize).contains(&w) {
                    buf[w as usize] = if pending == 0 { src[r - 1] } else { 0 };
                }
                w -= 1;
                r -= 1;
            }
            if pending > 0 {
                pending -= 1;
            }
            if first.is_none() {
                depth += 1;
            }
            entry = Entry::Name;
        }
        if first.is_none() {
            first = Some(entry);
        }
        last = entry;
    }

    // A leading separator spells the same path absolutely; its group must
    // not add a level.
    if last == Entry::Separator {
        depth -= 1;
    }

    let start = ((w + 1).max(0) as usize).min(len);
    let mut out = Vec::with_capacity(len - start);
    for &b in &buf[start..len] {
        if b != 0 {
            out.push(b);
        }
    }
    let text = String::from_utf8(out).unwrap_or_default();

    let bytes = text.as_bytes();
    let mut p = bytes.len();
    while p > 0 && bytes[p - 1] == b'/' {
        p -= 1;
    }
    while p > 0 && bytes[p - 1] != b'/' {
        p -= 1;
    }

    NormalizedPath {
        filename_offset: p,
        depth,
        text,
    }
}
