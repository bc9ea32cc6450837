//! The ordered path table behind every mounted archive.
//!
//! Entries accumulate in insertion order; the sorted view and its depth
//! table are rebuilt lazily on the first query after a mutation. Sorting is
//! keyed by depth first and text second, which groups each tree level into
//! one contiguous bucket so point lookups binary-search a single bucket and
//! directory listings scan one contiguous run.

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::normalize::{normalize, NormalizedPath};

/// One indexed path plus its caller-supplied payload.
///
/// Entries are immutable once added; the index never exposes removal.
#[derive(Clone, Debug)]
pub struct IndexEntry<T> {
    pub path: NormalizedPath,
    pub payload: T,
}

/// A depth-bucketed, lazily-sorted map from normalized paths to payloads.
pub struct PathIndex<T> {
    inner: RwLock<Inner<T>>,
}

struct Inner<T> {
    entries: Vec<IndexEntry<T>>,
    /// `depth_table[d]` is the first sorted index whose depth is `>= d`;
    /// the final element is `entries.len()`.
    depth_table: Vec<usize>,
    sorted: bool,
}

impl<T> Default for PathIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathIndex<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                depth_table: Vec::new(),
                sorted: false,
            }),
        }
    }

    /// Adds `payload` under the normalized form of `raw_path` and marks the
    /// sorted view dirty.
    pub fn add(&self, payload: T, raw_path: &str) {
        let path = normalize(raw_path);
        let mut inner = self.inner.write();
        inner.entries.push(IndexEntry { path, payload });
        inner.sorted = false;
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` against a sorted view, rebuilding it first if a mutation
    /// made it stale. The write guard is downgraded rather than released,
    /// so readers only ever observe a fully-built view.
    fn with_sorted<R>(&self, f: impl FnOnce(&Inner<T>) -> R) -> R {
        let read = self.inner.read();
        if read.sorted {
            f(&read)
        } else {
            drop(read);
            let mut write = self.inner.write();
            if !write.sorted {
                write.rebuild();
            }
            let read = RwLockWriteGuard::downgrade(write);
            f(&read)
        }
    }
}

impl<T: Clone> PathIndex<T> {
    /// Returns the payload stored under the exact normalized form of
    /// `raw_path`, if any. Of several entries with equal normalized text,
    /// the earliest added wins.
    pub fn find_exact(&self, raw_path: &str) -> Option<T> {
        let key = normalize(raw_path);
        self.with_sorted(|inner| {
            let (lo, hi) = inner.depth_bounds(key.depth)?;
            let bucket = &inner.entries[lo..hi];
            bucket
                .binary_search_by(|entry| entry.path.text.as_str().cmp(key.text.as_str()))
                .ok()
                .map(|at| {
                    let mut at = at;
                    while at > 0 && bucket[at - 1].path.text == key.text {
                        at -= 1;
                    }
                    bucket[at].payload.clone()
                })
        })
    }

    /// Lists the final-component names of the direct children of `raw_dir`.
    ///
    /// Children one level below the directory form a contiguous run inside
    /// the next depth bucket; the run is located with a sentinel that sorts
    /// before every real child. Names of nested-directory markers keep
    /// their trailing separator. A missing or childless directory yields an
    /// empty list; existence of the directory itself is not validated.
    pub fn list_prefix(&self, raw_dir: &str) -> Vec<String> {
        let dir = normalize(raw_dir);
        let mut prefix = dir.text;
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        let mut probe = prefix.clone();
        probe.push('\0');

        self.with_sorted(|inner| {
            let Some((lo, hi)) = inner.depth_bounds(dir.depth + 1) else {
                return Vec::new();
            };
            let bucket = &inner.entries[lo..hi];
            let start = bucket.partition_point(|entry| entry.path.text.as_str() < probe.as_str());

            let mut names = Vec::new();
            for entry in &bucket[start..] {
                if !entry.path.text.starts_with(&prefix) {
                    break;
                }
                names.push(entry.path.file_name().to_string());
            }
            names
        })
    }
}

impl<T> Inner<T> {
    fn rebuild(&mut self) {
        self.entries.sort_by(|a, b| {
            a.path
                .depth
                .cmp(&b.path.depth)
                .then_with(|| a.path.text.cmp(&b.path.text))
        });

        let max_depth = self
            .entries
            .last()
            .map(|entry| entry.path.depth.max(0) as usize)
            .unwrap_or(0);
        let mut table = Vec::with_capacity(max_depth + 2);
        for (at, entry) in self.entries.iter().enumerate() {
            if entry.path.depth < 0 {
                continue;
            }
            while table.len() <= entry.path.depth as usize {
                table.push(at);
            }
        }
        while table.len() <= max_depth + 1 {
            table.push(self.entries.len());
        }

        self.depth_table = table;
        self.sorted = true;
    }

    fn depth_bounds(&self, depth: i32) -> Option<(usize, usize)> {
        if depth < 0 {
            return None;
        }
        let depth = depth as usize;
        if depth + 1 >= self.depth_table.len() {
            return None;
        }
        Some((self.depth_table[depth], self.depth_table[depth + 1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PathIndex<u32> {
        let index = PathIndex::new();
        index.add(1, "readme.txt");
        index.add(2, "assets/");
        index.add(3, "assets/logo.png");
        index.add(4, "assets/sounds/");
        index.add(5, "assets/sounds/boom.wav");
        index.add(6, "assets/sounds/ui/");
        index.add(7, "assets/sounds/ui/click.wav");
        index
    }

    #[test]
    fn exact_lookup_matches_normalized_text() {
        let index = sample();
        assert_eq!(index.find_exact("assets/logo.png"), Some(3));
        assert_eq!(index.find_exact("./assets/x/../logo.png"), Some(3));
        assert_eq!(index.find_exact("assets\\logo.png"), Some(3));
        assert_eq!(index.find_exact("assets/sounds/"), Some(4));
        assert_eq!(index.find_exact("assets/missing.png"), None);
        assert_eq!(index.find_exact("logo.png"), None);
    }

    #[test]
    fn lookup_after_further_adds_sees_new_entries() {
        let index = sample();
        assert_eq!(index.find_exact("extra.txt"), None);
        index.add(8, "extra.txt");
        assert_eq!(index.find_exact("extra.txt"), Some(8));
        assert_eq!(index.find_exact("readme.txt"), Some(1));
    }

    #[test]
    fn duplicate_paths_resolve_to_the_first_added() {
        let index = PathIndex::new();
        index.add(1, "a/x");
        index.add(2, "a/x");
        assert_eq!(index.find_exact("a/x"), Some(1));
    }

    #[test]
    fn listing_returns_direct_children_only() {
        let index = sample();

        let mut names = index.list_prefix("assets");
        names.sort();
        assert_eq!(names, vec!["logo.png", "sounds/"]);

        let names = index.list_prefix("assets/sounds/");
        assert_eq!(names, vec!["boom.wav", "ui/"]);

        let names = index.list_prefix("assets/sounds/ui");
        assert_eq!(names, vec!["click.wav"]);
    }

    #[test]
    fn listing_the_root_sees_top_level_entries() {
        let index = sample();
        let mut names = index.list_prefix(".");
        names.sort();
        assert_eq!(names, vec!["assets/", "readme.txt"]);
    }

    #[test]
    fn listing_normalizes_the_directory_argument() {
        let index = sample();
        let names = index.list_prefix("./assets/x/../sounds/./");
        assert_eq!(names, vec!["boom.wav", "ui/"]);
    }

    #[test]
    fn listing_a_missing_directory_is_empty() {
        let index = sample();
        assert!(index.list_prefix("nope").is_empty());
        assert!(index.list_prefix("assets/sounds/ui/click.wav/x").is_empty());
    }

    #[test]
    fn sibling_prefixes_do_not_bleed_into_listings() {
        let index = PathIndex::new();
        index.add(1, "art/a.png");
        index.add(2, "artwork/b.png");
        let names = index.list_prefix("art");
        assert_eq!(names, vec!["a.png"]);
    }

    #[test]
    fn empty_index_answers_nothing() {
        let index = PathIndex::<u32>::new();
        assert_eq!(index.find_exact("x"), None);
        assert!(index.list_prefix("x").is_empty());
        assert!(index.is_empty());
    }
}
