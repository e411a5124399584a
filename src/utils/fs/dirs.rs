//! Directory helpers used by staging, backup and apply.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Creates a directory and all parents if it does not exist yet.
///
/// Fails if the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| {
            format!(
                "Failed to create directory: {}\n\nCheck directory permissions and path validity",
                path.display()
            )
        })?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Recursively copies `src` into `dst`, creating `dst` as needed.
///
/// Symlinks are recreated with the same target, never followed. Special
/// files (sockets, fifos) are skipped.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!("Failed to copy file from {} to {}", src_path.display(), dst_path.display())
            })?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target =
        fs::read_link(src).with_context(|| format!("Failed to read symlink: {}", src.display()))?;
    std::os::unix::fs::symlink(&target, dst).with_context(|| {
        format!("Failed to create symlink {} -> {}", dst.display(), target.display())
    })
}

#[cfg(windows)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target =
        fs::read_link(src).with_context(|| format!("Failed to read symlink: {}", src.display()))?;
    let created = if fs::metadata(src).is_ok_and(|m| m.is_dir()) {
        std::os::windows::fs::symlink_dir(&target, dst)
    } else {
        std::os::windows::fs::symlink_file(&target, dst)
    };
    created.with_context(|| {
        format!("Failed to create symlink {} -> {}", dst.display(), target.display())
    })
}

#[cfg(not(any(unix, windows)))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<()> {
    Err(anyhow::anyhow!("Cannot copy symlink on this platform: {}", src.display()))
}

/// Removes a directory tree, treating a missing directory as success.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove directory: {}", path.display())),
    }
}
