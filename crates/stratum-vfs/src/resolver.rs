//! Path resolution over the host file system, search paths, and mounts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use stratum_io::{File, OpenMode, OsFile};

use crate::archive::{Archive, ArchiveReader};
use crate::error::VfsError;
use crate::location::{LinkFilter, Location, ResolveRoot, TypeFilter};
use crate::normalize::normalize;

/// Where a [`Location`] resolved to.
#[derive(Clone, Debug)]
pub struct Resolved {
    /// Absolute host path, or the archive-relative path for archive hits.
    pub absolute_path: PathBuf,
    /// `FILE` or `DIRECTORY` for host hits; the requested filter for
    /// archive hits, which do not distinguish further.
    pub kind: TypeFilter,
    /// The mounted archive that answered, if any.
    pub archive: Option<Archive>,
}

#[derive(Default)]
struct FsState {
    search_paths: Mutex<Vec<PathBuf>>,
    mounts: Mutex<Vec<Archive>>,
}

/// The resolver: a cheap-to-clone handle over shared search-path and mount
/// state.
///
/// Clones share one underlying state, so every handle observes mounts and
/// search paths pushed through any other. Independent states come from
/// separate [`FileSystem::new`] calls.
///
/// Resolution precedence is fixed: the host candidate first, then search
/// paths in push order, then mounted archives in mount order. Real
/// directories therefore always shadow archive content, like an overlay.
#[derive(Clone, Default)]
pub struct FileSystem {
    state: Arc<FsState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

/// Checks `path` on the host against the requested filters, following
/// symlinks for the file/directory test. `None` when the path is missing,
/// is a broken link, or fails a filter.
fn check_attributes(path: &Path, types: TypeFilter, links: LinkFilter) -> Option<TypeFilter> {
    let lstat = fs::symlink_metadata(path).ok()?;
    let is_symlink = lstat.file_type().is_symlink();
    let meta = if is_symlink {
        fs::metadata(path).ok()?
    } else {
        lstat
    };

    let kind = if meta.is_dir() {
        TypeFilter::DIRECTORY
    } else {
        TypeFilter::FILE
    };
    let type_ok = (types.accepts_files() && kind == TypeFilter::FILE)
        || (types.accepts_directories() && kind == TypeFilter::DIRECTORY);
    let link_ok = (links.accepts_symlinks() && is_symlink)
        || (links.accepts_non_symlinks() && !is_symlink);
    (type_ok && link_ok).then_some(kind)
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a search path. The path is canonicalized lexically; it does
    /// not need to exist yet.
    pub fn push_search_path(&self, location: impl Into<Location>) {
        let location = location.into();
        let full = location
            .host_candidate()
            .unwrap_or_else(|| location.path.clone());
        let normalized = PathBuf::from(normalize(&full.to_string_lossy()).text);
        lock(&self.state.search_paths).push(normalized);
    }

    /// Removes the most recently pushed search path. No-op when empty.
    pub fn pop_search_path(&self) {
        lock(&self.state.search_paths).pop();
    }

    pub fn clear_search_paths(&self) {
        lock(&self.state.search_paths).clear();
    }

    /// Opens `source` with `reader` and mounts it. Returns `false` without
    /// mounting when the reader rejects the stream.
    pub fn mount_archive(&self, mut reader: Box<dyn ArchiveReader>, source: File) -> bool {
        match reader.open_archive(source) {
            Ok(()) => {
                lock(&self.state.mounts).push(Archive::from_boxed(reader));
                true
            }
            Err(err) => {
                tracing::warn!(target: "stratum.vfs", error = %err, "archive mount failed");
                false
            }
        }
    }

    /// Mounts an archive that was opened out of band.
    pub fn mount(&self, archive: Archive) {
        lock(&self.state.mounts).push(archive);
    }

    /// Resolves `location` in fixed precedence order; the first source that
    /// answers wins.
    pub fn find(&self, location: &Location) -> Result<Resolved, VfsError> {
        if location.root == ResolveRoot::Absolute && !location.path.is_absolute() {
            return Err(VfsError::NotAbsolute(location.path.clone()));
        }

        if location.root != ResolveRoot::Archives {
            if let Some(candidate) = location.host_candidate() {
                if let Some(kind) = check_attributes(&candidate, location.types, location.links) {
                    return Ok(Resolved {
                        absolute_path: candidate,
                        kind,
                        archive: None,
                    });
                }
            }
        }

        if location.root.consults_search_paths() {
            let search_paths = lock(&self.state.search_paths).clone();
            for base in &search_paths {
                let candidate = base.join(&location.path);
                if let Some(kind) = check_attributes(&candidate, location.types, location.links) {
                    return Ok(Resolved {
                        absolute_path: candidate,
                        kind,
                        archive: None,
                    });
                }
            }
        }

        if location.root.consults_archives() {
            let mounts = lock(&self.state.mounts).clone();
            for archive in mounts {
                if archive.exists(&location.path, location.types) {
                    return Ok(Resolved {
                        absolute_path: location.path.clone(),
                        kind: location.types,
                        archive: Some(archive),
                    });
                }
            }
        }

        Err(VfsError::NotFound(location.path.clone()))
    }

    pub fn exists(&self, location: impl Into<Location>) -> bool {
        self.find(&location.into()).is_ok()
    }

    /// Resolves and opens `location`.
    ///
    /// A missing target opened for writing is retried through its parent
    /// directory: if the parent resolves, the file is created there.
    /// Directories and write-mode archive targets are refused.
    pub fn open(&self, location: impl Into<Location>, mode: OpenMode) -> Result<File, VfsError> {
        let location = location.into();
        let resolved = match self.find(&location) {
            Ok(resolved) => resolved,
            Err(err) if mode.writes() => self.resolve_through_parent(&location, err)?,
            Err(err) => return Err(err),
        };

        if resolved.kind == TypeFilter::DIRECTORY {
            return Err(VfsError::IsADirectory(resolved.absolute_path));
        }

        if let Some(archive) = resolved.archive {
            if mode.writes() {
                return Err(VfsError::ReadOnlyArchive(location.path));
            }
            return archive
                .open_file(&resolved.absolute_path)
                .ok_or(VfsError::NotFound(location.path));
        }

        Ok(File::new(OsFile::open(&resolved.absolute_path, mode)?))
    }

    /// The write-mode fallback of [`FileSystem::open`]: resolve the parent
    /// directory and aim at the missing file inside it.
    fn resolve_through_parent(
        &self,
        location: &Location,
        original: VfsError,
    ) -> Result<Resolved, VfsError> {
        let (parent, file_name) = split_target(location).ok_or(original)?;
        let resolved = self
            .find(&parent)
            .map_err(|_| VfsError::NotFound(location.path.clone()))?;
        Ok(Resolved {
            absolute_path: resolved.absolute_path.join(file_name),
            kind: location.types,
            archive: resolved.archive,
        })
    }

    /// Moves `src` to `dst`'s parent under `dst`'s final name. Both ends
    /// must resolve outside any mounted archive.
    pub fn rename(
        &self,
        src: impl Into<Location>,
        dst: impl Into<Location>,
    ) -> Result<(), VfsError> {
        let src = src.into();
        let dst = dst.into();
        if src.root == ResolveRoot::Absolute && !src.path.is_absolute() {
            return Err(VfsError::NotAbsolute(src.path));
        }
        if dst.root == ResolveRoot::Absolute && !dst.path.is_absolute() {
            return Err(VfsError::NotAbsolute(dst.path));
        }

        let resolved_src = self.find(&src)?;
        let (dst_parent, dst_name) = split_target(&dst).ok_or(VfsError::NotFound(dst.path.clone()))?;
        let resolved_parent = self.find(&dst_parent)?;

        if resolved_src.archive.is_some() {
            return Err(VfsError::ReadOnlyArchive(src.path));
        }
        if resolved_parent.archive.is_some() {
            return Err(VfsError::ReadOnlyArchive(dst.path.clone()));
        }

        fs::rename(
            &resolved_src.absolute_path,
            resolved_parent.absolute_path.join(dst_name),
        )?;
        Ok(())
    }

    /// Removes the resolved file, or the resolved directory recursively.
    pub fn remove(&self, location: impl Into<Location>) -> Result<(), VfsError> {
        let location = location.into();
        let resolved = self.find(&location)?;
        if resolved.archive.is_some() {
            return Err(VfsError::ReadOnlyArchive(location.path));
        }
        if resolved.kind == TypeFilter::DIRECTORY {
            fs::remove_dir_all(&resolved.absolute_path)?;
        } else {
            fs::remove_file(&resolved.absolute_path)?;
        }
        Ok(())
    }

    /// Creates the leaf directory under `location`'s resolved parent. The
    /// target itself must not resolve yet.
    pub fn create_directory(&self, location: impl Into<Location>) -> Result<(), VfsError> {
        let location = location.into();
        if self.find(&location).is_ok() {
            return Err(VfsError::AlreadyExists(location.path));
        }

        let (parent, name) =
            split_target(&location).ok_or(VfsError::NotFound(location.path.clone()))?;
        let resolved = self
            .find(&parent)
            .map_err(|_| VfsError::NotFound(location.path.clone()))?;
        if resolved.archive.is_some() {
            return Err(VfsError::ReadOnlyArchive(location.path.clone()));
        }

        fs::create_dir(resolved.absolute_path.join(name))?;
        Ok(())
    }
}

/// Splits a location into a directory-filtered parent location and the
/// final name. `None` when the path has no final component.
fn split_target(location: &Location) -> Option<(Location, &std::ffi::OsStr)> {
    let file_name = location.path.file_name()?;
    let parent = location.path.parent().unwrap_or(Path::new(""));
    Some((
        Location::new(parent, location.root).directories(),
        file_name,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveError;
    use crate::index::PathIndex;
    use stratum_io::MemFile;

    /// A minimal in-memory archive for resolver tests; the real formats
    /// live in `stratum-archive`.
    struct TableArchive {
        index: PathIndex<Vec<u8>>,
    }

    impl TableArchive {
        fn new(entries: &[(&str, &[u8])]) -> Archive {
            let index = PathIndex::new();
            for (path, contents) in entries {
                index.add(contents.to_vec(), path);
            }
            Archive::new(Self { index })
        }
    }

    impl ArchiveReader for TableArchive {
        fn open_archive(&mut self, _source: File) -> Result<(), ArchiveError> {
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
            let contents = self.index.find_exact(&path.to_string_lossy())?;
            Some(File::new(MemFile::from_vec(contents)))
        }

        fn list_directory(&self, path: &Path) -> Vec<String> {
            self.index.list_prefix(&path.to_string_lossy())
        }
    }

    fn write(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
    }

    fn read_via(fs: &FileSystem, location: Location) -> String {
        fs.open(location, OpenMode::Read)
            .unwrap()
            .read_to_string()
            .unwrap()
    }

    #[test]
    fn absolute_mode_rejects_relative_paths() {
        let fs = FileSystem::new();
        let err = fs
            .find(&Location::new("relative.txt", ResolveRoot::Absolute))
            .unwrap_err();
        assert!(matches!(err, VfsError::NotAbsolute(_)));
    }

    #[test]
    fn absolute_paths_resolve_without_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("data.txt"), "host");

        let fs = FileSystem::new();
        let loc = Location::new(dir.path().join("data.txt"), ResolveRoot::Absolute);
        let resolved = fs.find(&loc).unwrap();
        assert_eq!(resolved.kind, TypeFilter::FILE);
        assert!(resolved.archive.is_none());
        assert_eq!(read_via(&fs, loc), "host");
    }

    #[test]
    fn search_paths_resolve_in_push_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(&first.path().join("x.txt"), "first");
        write(&second.path().join("x.txt"), "second");

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(first.path(), ResolveRoot::Absolute));
        fs.push_search_path(Location::new(second.path(), ResolveRoot::Absolute));

        let loc = Location::new("x.txt", ResolveRoot::SearchPaths);
        assert_eq!(read_via(&fs, loc.clone()), "first");

        // Dropping the older path uncovers the newer one.
        let mut paths = lock(&fs.state.search_paths);
        paths.remove(0);
        drop(paths);
        assert_eq!(read_via(&fs, loc), "second");
    }

    #[test]
    fn pop_search_path_removes_most_recent_and_tolerates_empty() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(&first.path().join("x.txt"), "first");
        write(&second.path().join("x.txt"), "second");

        let fs = FileSystem::new();
        fs.pop_search_path();
        fs.push_search_path(Location::new(first.path(), ResolveRoot::Absolute));
        fs.push_search_path(Location::new(second.path(), ResolveRoot::Absolute));
        fs.pop_search_path();
        assert_eq!(
            read_via(&fs, Location::new("x.txt", ResolveRoot::SearchPaths)),
            "first"
        );

        fs.clear_search_paths();
        assert!(!fs.exists(Location::new("x.txt", ResolveRoot::SearchPaths)));
    }

    #[test]
    fn search_paths_shadow_archives() {
        let overlay = tempfile::tempdir().unwrap();
        write(&overlay.path().join("x.txt"), "disk");

        let fs = FileSystem::new();
        fs.mount(TableArchive::new(&[("x.txt", b"packed")]));
        let loc = Location::new("x.txt", ResolveRoot::SearchPathsAndArchives);
        assert_eq!(read_via(&fs, loc.clone()), "packed");

        fs.push_search_path(Location::new(overlay.path(), ResolveRoot::Absolute));
        assert_eq!(read_via(&fs, loc), "disk");
    }

    #[test]
    fn archives_resolve_in_mount_order() {
        let fs = FileSystem::new();
        fs.mount(TableArchive::new(&[("x.txt", b"first")]));
        fs.mount(TableArchive::new(&[("x.txt", b"second")]));

        let loc = Location::new("x.txt", ResolveRoot::Archives);
        let resolved = fs.find(&loc).unwrap();
        assert!(resolved.archive.is_some());
        assert_eq!(read_via(&fs, loc), "first");
    }

    #[test]
    fn archives_mode_skips_the_host() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("x.txt"), "host");

        let fs = FileSystem::new();
        assert!(!fs.exists(Location::new(
            dir.path().join("x.txt"),
            ResolveRoot::Archives
        )));
    }

    #[test]
    fn clones_share_mounts_and_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("x.txt"), "shared");

        let fs = FileSystem::new();
        let clone = fs.clone();
        clone.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));
        clone.mount(TableArchive::new(&[("only/in/pack.txt", b"p")]));

        assert!(fs.exists(Location::new("x.txt", ResolveRoot::SearchPaths)));
        assert!(fs.exists(Location::new(
            "only/in/pack.txt",
            ResolveRoot::Archives
        )));
    }

    #[test]
    fn type_filters_reject_mismatched_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("file.txt"), "f");
        fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = FileSystem::new();
        let file = Location::new(dir.path().join("file.txt"), ResolveRoot::Absolute);
        let sub = Location::new(dir.path().join("sub"), ResolveRoot::Absolute);

        assert!(fs.exists(file.clone().files()));
        assert!(!fs.exists(file.directories()));
        assert!(fs.exists(sub.clone().directories()));
        assert!(!fs.exists(sub.files()));
    }

    #[cfg(unix)]
    #[test]
    fn link_filters_distinguish_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("real.txt"), "r");
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let fs = FileSystem::new();
        let link = Location::new(dir.path().join("link.txt"), ResolveRoot::Absolute);
        let real = Location::new(dir.path().join("real.txt"), ResolveRoot::Absolute);

        assert!(fs.exists(link.clone().with_links(LinkFilter::SYMLINK)));
        assert!(!fs.exists(link.with_links(LinkFilter::NOT_SYMLINK)));
        assert!(fs.exists(real.clone().with_links(LinkFilter::NOT_SYMLINK)));
        assert!(!fs.exists(real.with_links(LinkFilter::SYMLINK)));
    }

    #[test]
    fn opening_a_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = FileSystem::new();
        let err = fs
            .open(
                Location::new(dir.path().join("sub"), ResolveRoot::Absolute),
                OpenMode::Read,
            )
            .unwrap_err();
        assert!(matches!(err, VfsError::IsADirectory(_)));
    }

    #[test]
    fn write_open_creates_through_a_resolved_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("newdir")).unwrap();

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));

        let target = Location::new("newdir/newfile.txt", ResolveRoot::SearchPaths);
        let file = fs.open(target.clone(), OpenMode::Write).unwrap();
        file.write_all(b"created").unwrap();
        file.flush().unwrap();

        assert_eq!(read_via(&fs, target), "created");
        assert_eq!(
            fs::read_to_string(dir.path().join("newdir/newfile.txt")).unwrap(),
            "created"
        );
    }

    #[test]
    fn write_open_fails_when_the_parent_is_missing() {
        let dir = tempfile::tempdir().unwrap();

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));

        let err = fs
            .open(
                Location::new("absent/newfile.txt", ResolveRoot::SearchPaths),
                OpenMode::Write,
            )
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[test]
    fn read_open_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));

        assert!(fs
            .open(
                Location::new("missing.txt", ResolveRoot::SearchPaths),
                OpenMode::Read
            )
            .is_err());
        assert!(!dir.path().join("missing.txt").exists());
    }

    #[test]
    fn write_open_into_an_archive_is_refused() {
        let fs = FileSystem::new();
        fs.mount(TableArchive::new(&[("pack/entry.txt", b"p"), ("pack/", b"")]));

        let err = fs
            .open(
                Location::new("pack/entry.txt", ResolveRoot::Archives),
                OpenMode::Write,
            )
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnlyArchive(_)));

        // The parent-directory fallback must not create into archives either.
        let err = fs
            .open(
                Location::new("pack/new.txt", ResolveRoot::Archives),
                OpenMode::Write,
            )
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnlyArchive(_)));
    }

    #[test]
    fn rename_moves_into_the_destination_parent() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.txt"), "payload");
        fs::create_dir(dir.path().join("sub")).unwrap();

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));
        fs.rename(
            Location::new("a.txt", ResolveRoot::SearchPaths),
            Location::new("sub/b.txt", ResolveRoot::SearchPaths),
        )
        .unwrap();

        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("sub/b.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn rename_refuses_archive_sources() {
        let dir = tempfile::tempdir().unwrap();

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));
        fs.mount(TableArchive::new(&[("packed.txt", b"p")]));

        let err = fs
            .rename(
                Location::new("packed.txt", ResolveRoot::SearchPathsAndArchives),
                Location::new("out.txt", ResolveRoot::SearchPaths),
            )
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnlyArchive(_)));
    }

    #[test]
    fn remove_deletes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.txt"), "x");
        fs::create_dir_all(dir.path().join("tree/leaf")).unwrap();
        write(&dir.path().join("tree/leaf/file.txt"), "x");

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));

        fs.remove(Location::new("a.txt", ResolveRoot::SearchPaths))
            .unwrap();
        assert!(!dir.path().join("a.txt").exists());

        fs.remove(Location::new("tree", ResolveRoot::SearchPaths))
            .unwrap();
        assert!(!dir.path().join("tree").exists());
    }

    #[test]
    fn remove_refuses_archive_entries() {
        let fs = FileSystem::new();
        fs.mount(TableArchive::new(&[("packed.txt", b"p")]));
        let err = fs
            .remove(Location::new("packed.txt", ResolveRoot::Archives))
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnlyArchive(_)));
    }

    #[test]
    fn create_directory_requires_a_missing_target_and_present_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("base")).unwrap();

        let fs = FileSystem::new();
        fs.push_search_path(Location::new(dir.path(), ResolveRoot::Absolute));

        fs.create_directory(Location::new("base/fresh", ResolveRoot::SearchPaths))
            .unwrap();
        assert!(dir.path().join("base/fresh").is_dir());

        let err = fs
            .create_directory(Location::new("base/fresh", ResolveRoot::SearchPaths))
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyExists(_)));

        let err = fs
            .create_directory(Location::new("absent/child", ResolveRoot::SearchPaths))
            .unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[test]
    fn create_directory_refuses_archive_parents() {
        let fs = FileSystem::new();
        fs.mount(TableArchive::new(&[("pack/", b""), ("pack/entry.txt", b"p")]));

        let err = fs
            .create_directory(Location::new("pack/newdir", ResolveRoot::Archives))
            .unwrap_err();
        assert!(matches!(err, VfsError::ReadOnlyArchive(_)));
    }
}
