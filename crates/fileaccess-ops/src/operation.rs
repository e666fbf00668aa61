//! File operation requests and their results.

use std::path::PathBuf;

use fileaccess_core::{Encoding, FileStat, HashAlgorithm};
use serde::{Deserialize, Serialize};

/// Options for `write` and `append`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Create missing parent directories instead of failing with `NotFound`.
    pub create_parents: bool,
}

impl WriteOptions {
    /// Options that create missing parent directories.
    pub fn create_parents() -> Self {
        Self {
            create_parents: true,
        }
    }
}

/// A one-shot file operation, addressed by logical paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    /// Read a whole file, as bytes (`encoding == None`) or as text.
    Read {
        path: String,
        encoding: Option<Encoding>,
    },
    /// Read up to `length` bytes starting at `offset`.
    ReadChunk {
        path: String,
        offset: u64,
        length: usize,
        encoding: Option<Encoding>,
    },
    /// Atomically replace a file's content.
    Write {
        path: String,
        data: Vec<u8>,
        options: WriteOptions,
    },
    /// Append to a file, creating it if needed.
    Append {
        path: String,
        data: Vec<u8>,
        options: WriteOptions,
    },
    /// Copy a file or directory tree.
    Copy { source: String, destination: String },
    /// Move a file or directory tree.
    Move {
        source: String,
        destination: String,
        overwrite: bool,
    },
    /// Remove a file or directory tree.
    Delete { path: String, strict: bool },
    Exists { path: String },
    IsDir { path: String },
    Stat { path: String },
    /// Stat every entry of a directory.
    StatDir { path: String },
    /// Names of a directory's entries.
    List { path: String },
    /// Create a directory and its parents.
    Mkdir { path: String },
    /// Hex digest of a file.
    Hash {
        path: String,
        algorithm: HashAlgorithm,
    },
    /// Append `source` to `target`.
    Concat { source: String, target: String },
    /// Extract a zip archive into a directory.
    Unzip { source: String, target: String },
}

impl Operation {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::ReadChunk { .. } => "read_chunk",
            Self::Write { .. } => "write",
            Self::Append { .. } => "append",
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Delete { .. } => "delete",
            Self::Exists { .. } => "exists",
            Self::IsDir { .. } => "is_dir",
            Self::Stat { .. } => "stat",
            Self::StatDir { .. } => "stat_dir",
            Self::List { .. } => "list",
            Self::Mkdir { .. } => "mkdir",
            Self::Hash { .. } => "hash",
            Self::Concat { .. } => "concat",
            Self::Unzip { .. } => "unzip",
        }
    }

    /// Create a read operation returning text.
    pub fn read_text(path: impl Into<String>, encoding: Encoding) -> Self {
        Self::Read {
            path: path.into(),
            encoding: Some(encoding),
        }
    }

    /// Create a write operation.
    pub fn write(path: impl Into<String>, data: impl Into<Vec<u8>>, options: WriteOptions) -> Self {
        Self::Write {
            path: path.into(),
            data: data.into(),
            options,
        }
    }

    /// Create a delete operation.
    pub fn delete(path: impl Into<String>, strict: bool) -> Self {
        Self::Delete {
            path: path.into(),
            strict,
        }
    }

    /// Create a stat operation.
    pub fn stat(path: impl Into<String>) -> Self {
        Self::Stat { path: path.into() }
    }

    /// Create a mkdir operation.
    pub fn mkdir(path: impl Into<String>) -> Self {
        Self::Mkdir { path: path.into() }
    }
}

/// Successful result of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationOutput {
    Unit,
    Bytes(Vec<u8>),
    Text(String),
    Bool(bool),
    Stat(FileStat),
    Stats(Vec<FileStat>),
    Names(Vec<String>),
    Digest(String),
    Count(u64),
    Path(PathBuf),
}

impl OperationOutput {
    /// Text content, if this is a text result.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Raw content, if this is a bytes result.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Boolean value, if this is a boolean result.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}
