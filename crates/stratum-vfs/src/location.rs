//! Resolution requests: a path plus where to look for it and what to accept.

use std::env;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, UserDirs};

/// Which base the resolver consults for a [`Location`]'s path.
///
/// The first five are the resolution modes proper; the rest name well-known
/// system folders resolved from a static per-platform table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveRoot {
    /// The path must already be absolute; resolution fails otherwise.
    Absolute,
    /// The current working directory, then the search-path stack.
    CurrentDirectory,
    /// The current working directory, then the search-path stack.
    ///
    /// Alias-like in effect to [`ResolveRoot::CurrentDirectory`] today;
    /// kept separate so callers state their intent.
    SearchPaths,
    /// Mounted archives only.
    Archives,
    /// The current working directory, the search-path stack, then mounted
    /// archives, in that order.
    SearchPathsAndArchives,

    Temp,
    Home,
    DataLocal,
    DataSynced,
    Cache,
    Documents,
    Downloads,
    Pictures,
    Music,
    Videos,
}

impl ResolveRoot {
    /// The base directory for a named-folder root, from the platform's
    /// well-known-directory table. `None` for the resolution modes proper
    /// and for folders the platform does not provide.
    pub fn base_dir(self) -> Option<PathBuf> {
        match self {
            ResolveRoot::Temp => Some(env::temp_dir()),
            ResolveRoot::Home => BaseDirs::new().map(|d| d.home_dir().to_path_buf()),
            ResolveRoot::DataLocal => BaseDirs::new().map(|d| d.data_local_dir().to_path_buf()),
            ResolveRoot::DataSynced => BaseDirs::new().map(|d| d.data_dir().to_path_buf()),
            ResolveRoot::Cache => BaseDirs::new().map(|d| d.cache_dir().to_path_buf()),
            ResolveRoot::Documents => {
                UserDirs::new().and_then(|d| d.document_dir().map(Path::to_path_buf))
            }
            ResolveRoot::Downloads => {
                UserDirs::new().and_then(|d| d.download_dir().map(Path::to_path_buf))
            }
            ResolveRoot::Pictures => {
                UserDirs::new().and_then(|d| d.picture_dir().map(Path::to_path_buf))
            }
            ResolveRoot::Music => {
                UserDirs::new().and_then(|d| d.audio_dir().map(Path::to_path_buf))
            }
            ResolveRoot::Videos => {
                UserDirs::new().and_then(|d| d.video_dir().map(Path::to_path_buf))
            }
            _ => None,
        }
    }

    pub fn is_named_folder(self) -> bool {
        !matches!(
            self,
            ResolveRoot::Absolute
                | ResolveRoot::CurrentDirectory
                | ResolveRoot::SearchPaths
                | ResolveRoot::Archives
                | ResolveRoot::SearchPathsAndArchives
        )
    }

    pub(crate) fn consults_search_paths(self) -> bool {
        matches!(
            self,
            ResolveRoot::CurrentDirectory
                | ResolveRoot::SearchPaths
                | ResolveRoot::SearchPathsAndArchives
        )
    }

    pub(crate) fn consults_archives(self) -> bool {
        matches!(
            self,
            ResolveRoot::Archives | ResolveRoot::SearchPathsAndArchives
        )
    }
}

/// Which kinds of directory entry a lookup accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeFilter(u8);

impl TypeFilter {
    pub const FILE: TypeFilter = TypeFilter(0b01);
    pub const DIRECTORY: TypeFilter = TypeFilter(0b10);
    pub const ANY: TypeFilter = TypeFilter(0b11);

    pub fn accepts_files(self) -> bool {
        self.0 & Self::FILE.0 != 0
    }

    pub fn accepts_directories(self) -> bool {
        self.0 & Self::DIRECTORY.0 != 0
    }
}

impl BitOr for TypeFilter {
    type Output = TypeFilter;

    fn bitor(self, rhs: TypeFilter) -> TypeFilter {
        TypeFilter(self.0 | rhs.0)
    }
}

/// Whether a lookup accepts symlinks, non-symlinks, or both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkFilter(u8);

impl LinkFilter {
    pub const SYMLINK: LinkFilter = LinkFilter(0b01);
    pub const NOT_SYMLINK: LinkFilter = LinkFilter(0b10);
    pub const ANY: LinkFilter = LinkFilter(0b11);

    pub fn accepts_symlinks(self) -> bool {
        self.0 & Self::SYMLINK.0 != 0
    }

    pub fn accepts_non_symlinks(self) -> bool {
        self.0 & Self::NOT_SYMLINK.0 != 0
    }
}

impl BitOr for LinkFilter {
    type Output = LinkFilter;

    fn bitor(self, rhs: LinkFilter) -> LinkFilter {
        LinkFilter(self.0 | rhs.0)
    }
}

/// A path, the root it resolves against, and the entry kinds it accepts.
///
/// Immutable once built; the resolver takes it by reference.
#[derive(Clone, Debug)]
pub struct Location {
    pub path: PathBuf,
    pub root: ResolveRoot,
    pub types: TypeFilter,
    pub links: LinkFilter,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, root: ResolveRoot) -> Self {
        Self {
            path: path.into(),
            root,
            types: TypeFilter::ANY,
            links: LinkFilter::ANY,
        }
    }

    /// Accept only regular files.
    pub fn files(mut self) -> Self {
        self.types = TypeFilter::FILE;
        self
    }

    /// Accept only directories.
    pub fn directories(mut self) -> Self {
        self.types = TypeFilter::DIRECTORY;
        self
    }

    pub fn with_types(mut self, types: TypeFilter) -> Self {
        self.types = types;
        self
    }

    pub fn with_links(mut self, links: LinkFilter) -> Self {
        self.links = links;
        self
    }

    /// A sibling location for `name` inside this location's path, keeping
    /// root and filters.
    pub fn join(&self, name: impl AsRef<Path>) -> Self {
        Self {
            path: self.path.join(name),
            ..self.clone()
        }
    }

    /// The host-filesystem candidate this location denotes before search
    /// paths and archives are consulted: the path itself when absolute, the
    /// working directory joined with it otherwise, or the named folder
    /// joined with it for named-folder roots. `None` when the named folder
    /// cannot be resolved.
    pub(crate) fn host_candidate(&self) -> Option<PathBuf> {
        if self.root.is_named_folder() {
            return Some(self.root.base_dir()?.join(&self.path));
        }
        if self.path.is_absolute() {
            return Some(self.path.clone());
        }
        match self.root {
            ResolveRoot::Absolute => None,
            _ => Some(env::current_dir().ok()?.join(&self.path)),
        }
    }
}

impl From<&str> for Location {
    fn from(path: &str) -> Self {
        Location::new(path, ResolveRoot::SearchPathsAndArchives)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Location::new(path, ResolveRoot::SearchPathsAndArchives)
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Location::new(path, ResolveRoot::SearchPathsAndArchives)
    }
}
