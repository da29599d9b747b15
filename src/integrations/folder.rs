//! Folder size summary

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySize {
    pub total_bytes: u64,
    pub file_count: u64,
    pub folder_count: u64,
}

/// Walk `root` without following symlinks, summing regular file sizes.
///
/// Sub-directories that cannot be read are skipped; only the root failing to
/// read is an error. `folder_count` excludes the root itself.
pub fn compute_directory_size(root: &Path) -> std::io::Result<DirectorySize> {
    let mut size = DirectorySize::default();
    let mut pending: Vec<PathBuf> = Vec::new();

    scan_dir(root, &mut size, &mut pending)?;

    while let Some(dir) = pending.pop() {
        if let Err(e) = scan_dir(&dir, &mut size, &mut pending) {
            tracing::debug!(path = %dir.display(), error = %e, "skipping unreadable folder");
        }
    }

    Ok(size)
}

fn scan_dir(dir: &Path, size: &mut DirectorySize, pending: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else { continue };

        if file_type.is_dir() {
            size.folder_count += 1;
            pending.push(entry.path());
        } else if file_type.is_file() {
            size.file_count += 1;
            size.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(())
}
