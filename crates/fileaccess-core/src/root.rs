//! Symbolic roots and the table mapping them to real directories.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{FileAccessError, Result};

/// A named directory a logical path may be rooted at.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SymbolicRoot {
    /// The application's own installation/data directory.
    MainBundle,
    /// Persistent, user-created content.
    Documents,
    /// Temporary files the system may evict.
    Cache,
    /// Persistent application-internal data.
    Library,
    /// Recommended location for database files.
    Database,
    /// Removable or shared storage.
    External,
}

/// Produces the platform directory for a root, given the application name.
pub type DirectoryProvider = fn(&str) -> Option<PathBuf>;

fn main_bundle_dir(app: &str) -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(app))
}

fn documents_dir(app: &str) -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join(app))
}

fn cache_dir(app: &str) -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join(app))
}

fn library_dir(app: &str) -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(app).join("Library"))
}

fn database_dir(app: &str) -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(app).join("databases"))
}

fn external_dir(_app: &str) -> Option<PathBuf> {
    std::env::var_os("SECONDARY_STORAGE")
        .or_else(|| std::env::var_os("EXTERNAL_STORAGE"))
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
}

/// Directory providers used by [`RootTable::platform`].
pub const PLATFORM_PROVIDERS: &[(SymbolicRoot, DirectoryProvider)] = &[
    (SymbolicRoot::MainBundle, main_bundle_dir),
    (SymbolicRoot::Documents, documents_dir),
    (SymbolicRoot::Cache, cache_dir),
    (SymbolicRoot::Library, library_dir),
    (SymbolicRoot::Database, database_dir),
    (SymbolicRoot::External, external_dir),
];

/// Mapping from symbolic roots to absolute directories.
///
/// Built once at initialization; a root missing from the table is reported
/// as [`FileAccessError::Unsupported`] when a path names it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootTable {
    roots: IndexMap<SymbolicRoot, PathBuf>,
}

impl RootTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the platform directory providers.
    pub fn platform(app_name: &str) -> Self {
        let roots = PLATFORM_PROVIDERS
            .iter()
            .filter_map(|(root, provider)| provider(app_name).map(|dir| (*root, dir)))
            .filter(|(_, dir)| dir.is_absolute())
            .collect();
        Self { roots }
    }

    /// Build a table with every root as a subdirectory of `base`.
    ///
    /// Useful for sandboxed hosts and tests.
    pub fn rooted_at(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref();
        let mut table = Self::new();
        for root in SymbolicRoot::iter() {
            table.insert(root, base.join(root.as_ref()))?;
        }
        Ok(table)
    }

    /// Set the directory for a root, replacing any previous mapping.
    pub fn insert(&mut self, root: SymbolicRoot, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        if !dir.is_absolute() {
            return Err(FileAccessError::invalid_path(
                dir.display().to_string(),
                format!("directory for root {root} must be absolute"),
            ));
        }
        self.roots.insert(root, dir);
        Ok(())
    }

    /// Builder-style variant of [`RootTable::insert`].
    pub fn with_root(mut self, root: SymbolicRoot, dir: impl Into<PathBuf>) -> Result<Self> {
        self.insert(root, dir)?;
        Ok(self)
    }

    /// Directory for a root.
    pub fn get(&self, root: SymbolicRoot) -> Option<&Path> {
        self.roots.get(&root).map(PathBuf::as_path)
    }

    /// Directory for a root, or `Unsupported` when the platform lacks it.
    pub fn require(&self, root: SymbolicRoot) -> Result<&Path> {
        self.get(root)
            .ok_or_else(|| FileAccessError::unsupported(format!("root {root} on this platform")))
    }

    /// Iterate over configured roots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolicRoot, &Path)> {
        self.roots.iter().map(|(r, p)| (*r, p.as_path()))
    }

    /// Number of configured roots.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether no roots are configured.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
