//! Value types shared by the executor and transfer engine.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::{FileAccessError, Result};

/// Text encoding used when file content crosses the API as a string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Base64,
}

impl Encoding {
    /// Encode raw bytes as a string.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Base64 => STANDARD.encode(bytes),
        }
    }

    /// Decode a string into raw bytes.
    pub fn decode(&self, data: &str) -> Result<Vec<u8>> {
        match self {
            Self::Utf8 => Ok(data.as_bytes().to_vec()),
            Self::Base64 => STANDARD
                .decode(data.trim())
                .map_err(|e| FileAccessError::WriteError {
                    location: "<base64 data>".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                }),
        }
    }
}

/// Digest algorithms accepted by `hash`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum HashAlgorithm {
    #[strum(serialize = "MD5")]
    #[serde(rename = "MD5")]
    Md5,
    #[strum(serialize = "SHA-1")]
    #[serde(rename = "SHA-1")]
    Sha1,
    #[strum(serialize = "SHA-224")]
    #[serde(rename = "SHA-224")]
    Sha224,
    #[strum(serialize = "SHA-256")]
    #[serde(rename = "SHA-256")]
    Sha256,
    #[strum(serialize = "SHA-384")]
    #[serde(rename = "SHA-384")]
    Sha384,
    #[strum(serialize = "SHA-512")]
    #[serde(rename = "SHA-512")]
    Sha512,
    #[strum(serialize = "BLAKE3")]
    #[serde(rename = "BLAKE3")]
    Blake3,
}

impl HashAlgorithm {
    /// Parse an algorithm name, reporting unknown names as `Unsupported`.
    pub fn parse(name: &str) -> Result<Self> {
        name.parse()
            .map_err(|_| FileAccessError::unsupported(format!("hash algorithm '{name}'")))
    }
}

/// Metadata for a path.
///
/// A missing path is represented by `exists == false` rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    /// Absolute path that was inspected.
    pub path: PathBuf,
    /// Final path component.
    pub filename: String,
    pub exists: bool,
    /// Size in bytes (0 for directories and missing paths).
    pub size: u64,
    /// Last modification time.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_modified: Option<DateTime<Utc>>,
    pub is_directory: bool,
}

impl FileStat {
    /// A stat record for a path that does not exist.
    pub fn absent(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            filename: file_name_of(&path),
            path,
            exists: false,
            size: 0,
            last_modified: None,
            is_directory: false,
        }
    }

    /// Build a stat record from filesystem metadata.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &std::fs::Metadata) -> Self {
        let path = path.into();
        let is_directory = metadata.is_dir();
        Self {
            filename: file_name_of(&path),
            path,
            exists: true,
            size: if is_directory { 0 } else { metadata.len() },
            last_modified: metadata.modified().ok().map(to_utc),
            is_directory,
        }
    }

    /// Modification time as milliseconds since the Unix epoch.
    pub fn last_modified_millis(&self) -> Option<i64> {
        self.last_modified.map(|t| t.timestamp_millis())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}
