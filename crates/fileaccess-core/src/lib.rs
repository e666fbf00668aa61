//! Core types and path resolution for fileaccess.
//!
//! This crate provides the data model shared by the executor and the
//! transfer engine: the error taxonomy, symbolic roots, the logical path
//! resolver, and engine configuration.

mod config;
mod error;
mod path;
mod root;
mod types;

pub use config::{AccessConfig, AccessConfigBuilder, ConfigError, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use error::{ErrorKind, FileAccessError, IoFault, Result};
pub use path::{PathResolver, ResolvedPath};
pub use root::{DirectoryProvider, PLATFORM_PROVIDERS, RootTable, SymbolicRoot};
pub use types::{Encoding, FileStat, HashAlgorithm};
