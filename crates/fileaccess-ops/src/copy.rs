//! Blocking copy helpers shared by `copy` and cross-filesystem `move`.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use fileaccess_core::{FileAccessError, IoFault, Result};
use tracing::debug;

/// Copy a file or a directory tree, returning the bytes copied.
pub(crate) fn copy_item(source: &Path, dest: &Path) -> Result<u64> {
    let metadata =
        fs::metadata(source).map_err(|e| FileAccessError::io(source, e, IoFault::Read))?;
    if metadata.is_dir() {
        copy_dir_recursive(source, dest)
    } else {
        copy_file(source, dest)
    }
}

/// Copy a single file.
fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    fs::copy(source, dest).map_err(|e| {
        // fs::copy does not say which side failed.
        if source.exists() {
            FileAccessError::io(dest, e, IoFault::Write)
        } else {
            FileAccessError::io(source, e, IoFault::Read)
        }
    })
}

/// Recursively copy a directory.
fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<u64> {
    fs::create_dir_all(dest).map_err(|e| FileAccessError::io(dest, e, IoFault::Write))?;

    let mut total_bytes = 0u64;

    let entries =
        fs::read_dir(source).map_err(|e| FileAccessError::io(source, e, IoFault::Read))?;

    for entry in entries {
        let entry = entry.map_err(|e| FileAccessError::io(source, e, IoFault::Read))?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        // file_type() does not follow symlinks.
        let file_type = entry
            .file_type()
            .map_err(|e| FileAccessError::io(&path, e, IoFault::Read))?;

        if file_type.is_symlink() {
            copy_symlink(&path, &dest_path)?;
        } else if file_type.is_dir() {
            total_bytes += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_bytes += copy_file(&path, &dest_path)?;
        }
    }

    Ok(total_bytes)
}

/// Recreate a symlink as a symlink; its target is never read.
#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let target =
        fs::read_link(source).map_err(|e| FileAccessError::io(source, e, IoFault::Read))?;
    std::os::unix::fs::symlink(&target, dest)
        .map_err(|e| FileAccessError::io(dest, e, IoFault::Write))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, _dest: &Path) -> Result<()> {
    debug!(path = %source.display(), "skipping symlink");
    Ok(())
}

/// Give `file` the permissions of `target` when `target` already exists.
///
/// Temp files are created `0600`; replacing a file through one would
/// otherwise tighten its mode.
pub(crate) fn inherit_permissions(file: &File, target: &Path) -> io::Result<()> {
    match fs::metadata(target) {
        Ok(metadata) => {
            debug!(path = %target.display(), "keeping permissions of replaced file");
            file.set_permissions(metadata.permissions())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a file or directory tree.
pub(crate) fn remove_item(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
