//! Logical path resolution.
//!
//! A logical path is either rooted at a [`SymbolicRoot`] (`"Cache/a.txt"`) or
//! an absolute path that already lies inside one of the configured roots.
//! Resolution is purely lexical: it never touches the filesystem.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{FileAccessError, Result};
use crate::root::{RootTable, SymbolicRoot};

const FILE_SCHEME: &str = "file://";

/// An absolute path validated against its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    root: SymbolicRoot,
    path: PathBuf,
}

impl ResolvedPath {
    /// The root this path was resolved under.
    pub fn root(&self) -> SymbolicRoot {
        self.root
    }

    /// The absolute filesystem path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Consume into the absolute filesystem path.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Resolves logical paths against a [`RootTable`].
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    roots: RootTable,
}

impl PathResolver {
    /// Create a resolver over the given root table.
    pub fn new(roots: RootTable) -> Self {
        Self { roots }
    }

    /// The root table in use.
    pub fn roots(&self) -> &RootTable {
        &self.roots
    }

    /// Resolve a logical path to an absolute path inside its root.
    pub fn resolve(&self, logical: &str) -> Result<ResolvedPath> {
        if logical.is_empty() {
            return Err(FileAccessError::invalid_path(logical, "path is empty"));
        }
        if logical.contains('\0') {
            return Err(FileAccessError::invalid_path(logical, "path contains NUL"));
        }

        let raw = logical.strip_prefix(FILE_SCHEME).unwrap_or(logical);
        let raw_path = Path::new(raw);

        if raw_path.has_root() {
            return self.resolve_absolute(logical, raw_path);
        }

        let mut components = raw_path.components();
        let first = match components.next() {
            Some(Component::Normal(name)) => name.to_string_lossy(),
            _ => {
                return Err(FileAccessError::invalid_path(
                    logical,
                    "path must start with a symbolic root",
                ));
            }
        };
        let root: SymbolicRoot = first.parse().map_err(|_| {
            FileAccessError::invalid_path(logical, format!("unknown root '{first}'"))
        })?;
        let base = self.roots.require(root)?;

        let path = join_within(base, components.as_path()).ok_or_else(|| {
            FileAccessError::invalid_path(logical, format!("escapes root {root}"))
        })?;

        Ok(ResolvedPath { root, path })
    }

    fn resolve_absolute(&self, logical: &str, raw: &Path) -> Result<ResolvedPath> {
        let normalized = normalize_absolute(raw)
            .ok_or_else(|| FileAccessError::invalid_path(logical, "escapes filesystem root"))?;

        // Longest matching root wins when roots nest.
        self.roots
            .iter()
            .filter(|(_, dir)| normalized.starts_with(dir))
            .max_by_key(|(_, dir)| dir.components().count())
            .map(|(root, _)| ResolvedPath {
                root,
                path: normalized.clone(),
            })
            .ok_or_else(|| {
                FileAccessError::invalid_path(logical, "outside every configured root")
            })
    }
}

/// Join a relative path onto `base`, refusing to climb above it.
fn join_within(base: &Path, relative: &Path) -> Option<PathBuf> {
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::Normal(name) => stack.push(name),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let mut path = base.to_path_buf();
    path.extend(stack);
    Some(path)
}

/// Lexically normalize an absolute path.
fn normalize_absolute(path: &Path) -> Option<PathBuf> {
    let mut prefix = PathBuf::new();
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix.push(p.as_os_str()),
            Component::RootDir => prefix.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::Normal(name) => stack.push(name),
        }
    }
    prefix.extend(stack);
    Some(prefix)
}
