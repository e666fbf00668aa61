//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Result;
use crate::root::{RootTable, SymbolicRoot};

/// Default transfer chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest accepted transfer chunk size (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the executor and transfer engine.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct AccessConfig {
    /// Namespace used when deriving platform directories.
    #[builder(default = "default_app_name()")]
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Bytes moved per transfer chunk.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum milliseconds between progress events for one transfer (0 = every chunk).
    #[builder(default = "0")]
    #[serde(default)]
    pub progress_interval_ms: u64,

    /// Keep partially written output when a transfer is cancelled or fails.
    #[builder(default = "false")]
    #[serde(default)]
    pub keep_partial: bool,

    /// Create missing parent directories on write/append.
    #[builder(default = "false")]
    #[serde(default)]
    pub create_parents: bool,

    /// Explicit root directories, overriding the platform table.
    #[builder(default)]
    #[serde(default)]
    pub roots: IndexMap<SymbolicRoot, PathBuf>,
}

fn default_app_name() -> String {
    "fileaccess".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn check_chunk_size(chunk_size: usize) -> std::result::Result<(), String> {
    if chunk_size == 0 {
        return Err("Chunk size cannot be zero".to_string());
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(format!("Chunk size cannot exceed {MAX_CHUNK_SIZE} bytes"));
    }
    Ok(())
}

impl AccessConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(chunk_size) = self.chunk_size {
            check_chunk_size(chunk_size)?;
        }
        if let Some(ref name) = self.app_name {
            if name.trim().is_empty() {
                return Err("App name cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl AccessConfig {
    /// Create a new config builder.
    pub fn builder() -> AccessConfigBuilder {
        AccessConfigBuilder::default()
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        check_chunk_size(config.chunk_size).map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Platform roots with the explicit overrides applied.
    pub fn root_table(&self) -> Result<RootTable> {
        let mut table = RootTable::platform(&self.app_name);
        for (root, dir) in &self.roots {
            table.insert(*root, dir.clone())?;
        }
        Ok(table)
    }

    /// Progress throttle interval, if any.
    pub fn progress_interval(&self) -> Option<Duration> {
        (self.progress_interval_ms > 0).then(|| Duration::from_millis(self.progress_interval_ms))
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval_ms: 0,
            keep_partial: false,
            create_parents: false,
            roots: IndexMap::new(),
        }
    }
}
