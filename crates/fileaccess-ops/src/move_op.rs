//! Move with a copy-and-delete fallback across filesystems.

use std::fs;
use std::path::Path;

use fileaccess_core::{FileAccessError, IoFault, Result};
use tracing::debug;

use crate::copy::{copy_item, remove_item};

/// Move a single item (file or directory).
///
/// Tries a rename first; if that fails for any reason other than a missing
/// source, falls back to copy followed by removal of the source.
pub(crate) fn move_item(source: &Path, dest: &Path) -> Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !source.exists() => {
            return Err(FileAccessError::io(source, e, IoFault::Read));
        }
        Err(e) => {
            debug!(
                source = %source.display(),
                dest = %dest.display(),
                error = %e,
                "rename failed, falling back to copy"
            );
        }
    }

    copy_item(source, dest)?;
    remove_item(source).map_err(|e| FileAccessError::io(source, e, IoFault::Write))?;
    Ok(())
}
