//! Synchronous operation executor.
//!
//! Every call blocks the calling thread for the duration of its I/O; hosts
//! dispatch these off their primary thread (see [`crate::FileAccess`] for
//! async wrappers that do so via `spawn_blocking`).

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fileaccess_core::{
    AccessConfig, Encoding, FileAccessError, FileStat, HashAlgorithm, IoFault, PathResolver,
    ResolvedPath, Result,
};
use tracing::debug;

use crate::archive;
use crate::copy::{copy_item, inherit_permissions, remove_item};
use crate::hash::hash_file;
use crate::move_op::move_item;
use crate::operation::{Operation, OperationOutput, WriteOptions};

/// Executes one-shot file operations against resolved paths.
#[derive(Debug, Clone)]
pub struct Executor {
    resolver: PathResolver,
    buffer_size: usize,
}

impl Executor {
    /// Create an executor using the default buffer size.
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            buffer_size: fileaccess_core::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create an executor from configuration.
    pub fn from_config(config: &AccessConfig) -> Result<Self> {
        Ok(Self {
            resolver: PathResolver::new(config.root_table()?),
            buffer_size: config.chunk_size,
        })
    }

    /// Set the buffer size used for streaming reads.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// The path resolver in use.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resolve a logical path.
    pub fn resolve(&self, path: &str) -> Result<ResolvedPath> {
        self.resolver.resolve(path)
    }

    /// Execute an operation.
    pub fn execute(&self, operation: Operation) -> Result<OperationOutput> {
        debug!(op = operation.name(), "executing");
        let output = match operation {
            Operation::Read { path, encoding } => match encoding {
                Some(encoding) => OperationOutput::Text(self.read_text(&path, encoding)?),
                None => OperationOutput::Bytes(self.read(&path)?),
            },
            Operation::ReadChunk {
                path,
                offset,
                length,
                encoding,
            } => {
                let bytes = self.read_chunk(&path, offset, length)?;
                match encoding {
                    Some(encoding) => OperationOutput::Text(encoding.encode(&bytes)),
                    None => OperationOutput::Bytes(bytes),
                }
            }
            Operation::Write {
                path,
                data,
                options,
            } => {
                self.write(&path, &data, options)?;
                OperationOutput::Unit
            }
            Operation::Append {
                path,
                data,
                options,
            } => {
                self.append(&path, &data, options)?;
                OperationOutput::Unit
            }
            Operation::Copy {
                source,
                destination,
            } => OperationOutput::Count(self.copy(&source, &destination)?),
            Operation::Move {
                source,
                destination,
                overwrite,
            } => {
                self.move_to(&source, &destination, overwrite)?;
                OperationOutput::Unit
            }
            Operation::Delete { path, strict } => {
                self.delete(&path, strict)?;
                OperationOutput::Unit
            }
            Operation::Exists { path } => OperationOutput::Bool(self.exists(&path)?),
            Operation::IsDir { path } => OperationOutput::Bool(self.is_dir(&path)?),
            Operation::Stat { path } => OperationOutput::Stat(self.stat(&path)?),
            Operation::StatDir { path } => OperationOutput::Stats(self.stat_dir(&path)?),
            Operation::List { path } => OperationOutput::Names(self.list(&path)?),
            Operation::Mkdir { path } => OperationOutput::Path(self.mkdir(&path)?),
            Operation::Hash { path, algorithm } => {
                OperationOutput::Digest(self.hash(&path, algorithm)?)
            }
            Operation::Concat { source, target } => {
                OperationOutput::Count(self.concat(&source, &target)?)
            }
            Operation::Unzip { source, target } => {
                OperationOutput::Count(self.unzip(&source, &target)?)
            }
        };
        Ok(output)
    }

    /// Read a whole file.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        fs::read(&resolved).map_err(|e| FileAccessError::io(&resolved, e, IoFault::Read))
    }

    /// Read a whole file as text in the given encoding.
    pub fn read_text(&self, path: &str, encoding: Encoding) -> Result<String> {
        Ok(encoding.encode(&self.read(path)?))
    }

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// A range past the end of the file yields the available prefix.
    pub fn read_chunk(&self, path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        let read_err = |e| FileAccessError::io(&resolved, e, IoFault::Read);

        let mut file = File::open(&resolved).map_err(read_err)?;
        file.seek(SeekFrom::Start(offset)).map_err(read_err)?;

        let mut data = Vec::with_capacity(length.min(self.buffer_size));
        file.take(length as u64)
            .read_to_end(&mut data)
            .map_err(read_err)?;
        Ok(data)
    }

    /// Replace a file's content atomically.
    ///
    /// Data goes to a temporary file in the same directory which is then
    /// renamed over the target, so readers never observe partial content.
    pub fn write(&self, path: &str, data: &[u8], options: WriteOptions) -> Result<()> {
        let resolved = self.resolve(path)?;
        let parent = ensure_parent(resolved.as_path(), options)?;
        let write_err = |e| FileAccessError::io(&resolved, e, IoFault::Write);

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        temp.write_all(data).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        inherit_permissions(temp.as_file(), resolved.as_path()).map_err(write_err)?;
        temp.persist(&resolved).map_err(|e| write_err(e.error))?;

        debug!(path = %resolved, bytes = data.len(), "wrote file");
        Ok(())
    }

    /// Write string data decoded with `encoding`.
    pub fn write_encoded(
        &self,
        path: &str,
        data: &str,
        encoding: Encoding,
        options: WriteOptions,
    ) -> Result<()> {
        self.write(path, &encoding.decode(data)?, options)
    }

    /// Append to a file, creating it if missing.
    pub fn append(&self, path: &str, data: &[u8], options: WriteOptions) -> Result<()> {
        let resolved = self.resolve(path)?;
        ensure_parent(resolved.as_path(), options)?;
        let write_err = |e| FileAccessError::io(&resolved, e, IoFault::Write);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .map_err(write_err)?;
        file.write_all(data).map_err(write_err)?;
        Ok(())
    }

    /// Copy a file or directory tree, overwriting files at the destination.
    pub fn copy(&self, source: &str, destination: &str) -> Result<u64> {
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;
        let metadata = fs::metadata(&source)
            .map_err(|e| FileAccessError::io(&source, e, IoFault::Read))?;

        if source == destination {
            return Ok(metadata.len());
        }
        if metadata.is_dir() && destination.as_path().starts_with(source.as_path()) {
            return Err(FileAccessError::invalid_path(
                destination.to_string(),
                "cannot copy a directory into itself",
            ));
        }

        let bytes = copy_item(source.as_path(), destination.as_path())?;
        debug!(source = %source, destination = %destination, bytes, "copied");
        Ok(bytes)
    }

    /// Move a file or directory tree.
    ///
    /// Fails with `DestinationExists` when the destination exists and
    /// `overwrite` is not set.
    pub fn move_to(&self, source: &str, destination: &str, overwrite: bool) -> Result<()> {
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;

        if fs::symlink_metadata(&source).is_err() {
            return Err(FileAccessError::NotFound {
                path: source.into_path_buf(),
            });
        }
        if source == destination {
            return Ok(());
        }
        if destination.as_path().starts_with(source.as_path()) {
            return Err(FileAccessError::invalid_path(
                destination.to_string(),
                "cannot move a directory into itself",
            ));
        }

        if fs::symlink_metadata(&destination).is_ok() {
            if !overwrite {
                return Err(FileAccessError::DestinationExists {
                    path: destination.into_path_buf(),
                });
            }
            remove_item(destination.as_path())
                .map_err(|e| FileAccessError::io(&destination, e, IoFault::Write))?;
        }

        move_item(source.as_path(), destination.as_path())?;
        debug!(source = %source, destination = %destination, "moved");
        Ok(())
    }

    /// Remove a file or directory tree.
    ///
    /// A missing path is success unless `strict` is set.
    pub fn delete(&self, path: &str, strict: bool) -> Result<()> {
        let resolved = self.resolve(path)?;
        match remove_item(resolved.as_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !strict => Ok(()),
            Err(e) => Err(FileAccessError::io(&resolved, e, IoFault::Write)),
        }
    }

    /// Whether anything exists at the path.
    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path)?.exists)
    }

    /// Whether the path is an existing directory.
    pub fn is_dir(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path)?.is_directory)
    }

    /// Metadata for a path; a missing path yields an absent record.
    pub fn stat(&self, path: &str) -> Result<FileStat> {
        let resolved = self.resolve(path)?;
        match fs::metadata(&resolved) {
            Ok(metadata) => Ok(FileStat::from_metadata(resolved.into_path_buf(), &metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(FileStat::absent(resolved.into_path_buf()))
            }
            Err(e) => Err(FileAccessError::io(&resolved, e, IoFault::Read)),
        }
    }

    /// Metadata for every entry of a directory, sorted by name.
    pub fn stat_dir(&self, path: &str) -> Result<Vec<FileStat>> {
        let resolved = self.resolve(path)?;
        let mut stats = read_entries(resolved.as_path())?
            .into_iter()
            .map(|entry| match fs::metadata(&entry) {
                Ok(metadata) => FileStat::from_metadata(entry, &metadata),
                // Raced with a removal, or a dangling symlink.
                Err(_) => FileStat::absent(entry),
            })
            .collect::<Vec<_>>();
        stats.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(stats)
    }

    /// Names of a directory's entries, sorted.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let resolved = self.resolve(path)?;
        let mut names = read_entries(resolved.as_path())?
            .into_iter()
            .filter_map(|entry| entry.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    /// Create a directory and any missing parents; existing directories are fine.
    pub fn mkdir(&self, path: &str) -> Result<PathBuf> {
        let resolved = self.resolve(path)?;
        if resolved.as_path().is_file() {
            return Err(FileAccessError::DestinationExists {
                path: resolved.into_path_buf(),
            });
        }
        fs::create_dir_all(&resolved)
            .map_err(|e| FileAccessError::io(&resolved, e, IoFault::Write))?;
        Ok(resolved.into_path_buf())
    }

    /// Hex digest of a file, streamed in buffer-sized chunks.
    pub fn hash(&self, path: &str, algorithm: HashAlgorithm) -> Result<String> {
        let resolved = self.resolve(path)?;
        hash_file(resolved.as_path(), algorithm, self.buffer_size)
    }

    /// Append `source` to `target`, returning the number of bytes appended.
    pub fn concat(&self, source: &str, target: &str) -> Result<u64> {
        let source = self.resolve(source)?;
        let target = self.resolve(target)?;

        let input =
            File::open(&source).map_err(|e| FileAccessError::io(&source, e, IoFault::Read))?;
        // Length is fixed before the target opens, so appending a file to
        // itself (or to a hard link of itself) copies it exactly once.
        let len = input
            .metadata()
            .map_err(|e| FileAccessError::io(&source, e, IoFault::Read))?
            .len();
        let mut output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|e| FileAccessError::io(&target, e, IoFault::Write))?;

        let copied = std::io::copy(&mut input.take(len), &mut output)
            .map_err(|e| FileAccessError::io(&target, e, IoFault::Write))?;
        debug!(source = %source, target = %target, bytes = copied, "concatenated");
        Ok(copied)
    }

    /// Extract a zip archive into a directory.
    pub fn unzip(&self, source: &str, target: &str) -> Result<u64> {
        let source = self.resolve(source)?;
        let target = self.resolve(target)?;
        archive::unzip(source.as_path(), target.as_path())
    }
}

/// Check (or create) the parent directory of a write target.
fn ensure_parent(path: &Path, options: WriteOptions) -> Result<&Path> {
    let parent = path
        .parent()
        .ok_or_else(|| FileAccessError::invalid_path(path.display().to_string(), "no parent"))?;

    if !parent.is_dir() {
        if !options.create_parents {
            return Err(FileAccessError::NotFound {
                path: parent.to_path_buf(),
            });
        }
        fs::create_dir_all(parent).map_err(|e| FileAccessError::io(parent, e, IoFault::Write))?;
    }
    Ok(parent)
}

fn read_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| FileAccessError::io(dir, e, IoFault::Read))?;
    entries
        .map(|entry| {
            entry
                .map(|e| e.path())
                .map_err(|e| FileAccessError::io(dir, e, IoFault::Read))
        })
        .collect()
}
