//! Crash-safe file writes.
//!
//! Cache files and the ETag map must never be partially visible: a reader
//! either sees the previous complete file or the new complete file.

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `bytes` to `path` transactionally: temp file in the same directory,
/// write, fsync, rename over the target.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no parent directory: {}", path.display()),
        )
    })?;
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
