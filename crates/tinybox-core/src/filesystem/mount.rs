//! Mount utilities for container filesystem setup.
//!
//! Handles the in-namespace mounts (`/proc`, `/dev`, mount propagation)
//! and host-side bind mounts for volumes.

use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tinybox_common::error::{Result, TinyboxError};

/// Remounts `/` recursively as private so that mount events inside the
/// container do not propagate back to the host.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn make_root_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| TinyboxError::Syscall {
        message: format!("remounting / as private failed: {e}"),
    })
}

/// Mounts `proc` at `/proc` and a tmpfs at `/dev` inside the new root.
///
/// # Errors
///
/// Returns an error if either mount syscall fails.
pub fn mount_pseudo_filesystems() -> Result<()> {
    mount(
        Some("proc"),
        "/proc",
        Some("proc"),
        MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        None::<&str>,
    )
    .map_err(|e| TinyboxError::Syscall {
        message: format!("mounting /proc failed: {e}"),
    })?;

    mount(
        Some("tmpfs"),
        "/dev",
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| TinyboxError::Syscall {
        message: format!("mounting /dev failed: {e}"),
    })
}

/// Creates a recursive bind mount from `source` to `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| TinyboxError::Syscall {
        message: format!(
            "bind mount {} -> {} failed: {e}",
            source.display(),
            target.display()
        ),
    })
}

/// Lazily unmounts the given path.
///
/// # Errors
///
/// Returns an error if the unmount syscall fails.
pub fn unmount(target: &Path) -> Result<()> {
    umount2(target, MntFlags::MNT_DETACH).map_err(|e| TinyboxError::Syscall {
        message: format!("unmount of {} failed: {e}", target.display()),
    })
}
