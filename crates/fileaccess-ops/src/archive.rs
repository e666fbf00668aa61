//! Zip extraction.

use std::fs::{self, File, OpenOptions};
use std::path::Path;

use fileaccess_core::{FileAccessError, IoFault, Result};
use tracing::debug;

/// Extract `source` into the `target` directory, returning the number of files written.
///
/// Entries whose names would land outside `target` are rejected, as are
/// entries whose destination file already exists.
pub(crate) fn unzip(source: &Path, target: &Path) -> Result<u64> {
    let file = File::open(source).map_err(|e| FileAccessError::io(source, e, IoFault::Read))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| FileAccessError::read_at(source.display().to_string(), e))?;

    fs::create_dir_all(target).map_err(|e| FileAccessError::io(target, e, IoFault::Write))?;

    let mut written = 0u64;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| FileAccessError::read_at(source.display().to_string(), e))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            FileAccessError::invalid_path(entry.name(), "archive entry escapes target directory")
        })?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| FileAccessError::io(&out_path, e, IoFault::Write))?;
            continue;
        }

        if out_path.exists() {
            return Err(FileAccessError::DestinationExists { path: out_path });
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FileAccessError::io(parent, e, IoFault::Write))?;
        }

        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&out_path)
            .map_err(|e| FileAccessError::io(&out_path, e, IoFault::Write))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| FileAccessError::io(&out_path, e, IoFault::Write))?;

        debug!(entry = %out_path.display(), "extracted");
        written += 1;
    }

    Ok(written)
}
