//! Overlayfs mounting for layered container filesystems.
//!
//! Stacks a shared read-only lower layer with a per-container writable
//! upper layer, presenting a merged view that becomes the container root.

use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tinybox_common::error::{Result, TinyboxError};

/// Mounts an overlayfs onto `merged_dir`.
///
/// The directories must already exist; assembling them is the workspace
/// layer's job.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn mount_overlay(lower: &Path, upper: &Path, work: &Path, merged_dir: &Path) -> Result<()> {
    let opts = format!(
        "lowerdir={},upperdir={},workdir={}",
        lower.display(),
        upper.display(),
        work.display()
    );

    mount(
        Some("overlay"),
        merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(|e| TinyboxError::Syscall {
        message: format!("overlay mount on {} failed: {e}", merged_dir.display()),
    })?;

    tracing::info!(merged = %merged_dir.display(), "overlayfs mounted");
    Ok(())
}

/// Unmounts the overlayfs at the given path.
///
/// Uses `MNT_DETACH` to lazily detach the filesystem.
///
/// # Errors
///
/// Returns an error if the unmount syscall fails.
pub fn unmount_overlay(merged_dir: &Path) -> Result<()> {
    umount2(merged_dir, MntFlags::MNT_DETACH).map_err(|e| TinyboxError::Syscall {
        message: format!("unmount overlay at {} failed: {e}", merged_dir.display()),
    })?;
    tracing::info!(path = %merged_dir.display(), "overlayfs unmounted");
    Ok(())
}
