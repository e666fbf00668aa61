//! Error types for file access operations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Errors that can occur while executing a file operation or transfer.
#[derive(Debug, Error)]
pub enum FileAccessError {
    /// The logical path could not be resolved or escapes its root.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The source of an operation does not exist.
    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The destination exists and overwriting was not requested.
    #[error("Destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// I/O fault while reading.
    #[error("Read error at {location}: {source}")]
    ReadError {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O fault while writing.
    #[error("Write error at {location}: {source}")]
    WriteError {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled cooperatively.
    #[error("Operation cancelled")]
    Cancelled,

    /// The platform lacks a requested root, algorithm or scheme.
    #[error("Unsupported: {what}")]
    Unsupported { what: String },
}

/// Which side of an I/O call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFault {
    Read,
    Write,
}

impl FileAccessError {
    /// Create an error from an I/O failure at `path`.
    ///
    /// `NotFound` is preserved as its own variant; every other kind becomes a
    /// read or write error depending on `fault`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error, fault: IoFault) -> Self {
        let path = path.as_ref();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound {
                path: path.to_path_buf(),
            };
        }
        let location = path.display().to_string();
        match fault {
            IoFault::Read => Self::ReadError { location, source },
            IoFault::Write => Self::WriteError { location, source },
        }
    }

    /// Create a read error for a non-filesystem location such as a URL.
    pub fn read_at(location: impl Into<String>, message: impl ToString) -> Self {
        Self::ReadError {
            location: location.into(),
            source: std::io::Error::other(message.to_string()),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// The serializable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPath { .. } => ErrorKind::InvalidPath,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::DestinationExists { .. } => ErrorKind::DestinationExists,
            Self::ReadError { .. } => ErrorKind::ReadError,
            Self::WriteError { .. } => ErrorKind::WriteError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }
}

/// Error discriminant carried in error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidPath,
    NotFound,
    DestinationExists,
    ReadError,
    WriteError,
    Cancelled,
    Unsupported,
}

/// Result type alias for file access operations.
pub type Result<T> = std::result::Result<T, FileAccessError>;
