//! Atomic file replacement.
//!
//! Write to a temp file in the target directory, fsync, then rename over the
//! target. Readers see either the old file or the new one, never a prefix.

use crate::error::{KdumpError, Result};
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `data`, leaving the file with permission bits `mode`
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|n| format!(".{}.", n.to_string_lossy()))
        .unwrap_or_else(|| ".tmp.".to_string());

    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(dir)
        .map_err(|e| KdumpError::io(format!("create temp file in {}", dir.display()), e))?;

    write_and_sync(&mut tmp, data, mode)
        .map_err(|e| KdumpError::io(format!("write {}", tmp.path().display()), e))?;

    // On failure the temp file is dropped and unlinked
    tmp.persist(path)
        .map_err(|e| KdumpError::io(format!("rename to {}", path.display()), e.error))?;
    Ok(())
}

fn write_and_sync(tmp: &mut NamedTempFile, data: &[u8], mode: u32) -> std::io::Result<()> {
    tmp.write_all(data)?;
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))?;
    tmp.as_file().sync_all()
}
