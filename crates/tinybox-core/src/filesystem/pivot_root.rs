//! Root filesystem switching via `pivot_root(2)`.
//!
//! More thorough than `chroot` because it swaps the root mount itself
//! rather than just the process's view of `/`.

use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use tinybox_common::error::{Result, TinyboxError};

const PUT_OLD: &str = ".pivot_root";

/// Switches the root filesystem to `new_root`.
///
/// Performs the full pivot sequence:
/// 1. Bind-mount `new_root` onto itself — `pivot_root` requires the new
///    root to be a mount point distinct from the current root's mount.
/// 2. Create the `.pivot_root` directory inside `new_root` (removing a
///    stale one from a previous run).
/// 3. Call `pivot_root(2)`.
/// 4. Change the working directory to `/`.
/// 5. Lazily unmount and remove the old root at `/.pivot_root`.
///
/// # Errors
///
/// Returns an error if any mount, pivot, or cleanup step fails.
pub fn pivot_root(new_root: &Path) -> Result<()> {
    mount(
        Some(new_root),
        new_root,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| TinyboxError::Syscall {
        message: format!("bind mount of {} onto itself failed: {e}", new_root.display()),
    })?;

    let put_old = new_root.join(PUT_OLD);
    if put_old.exists() {
        std::fs::remove_dir_all(&put_old).map_err(|e| TinyboxError::Io {
            path: put_old.clone(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(&put_old).map_err(|e| TinyboxError::Io {
        path: put_old.clone(),
        source: e,
    })?;

    nix::unistd::pivot_root(new_root, &put_old).map_err(|e| TinyboxError::Syscall {
        message: format!("pivot_root to {} failed: {e}", new_root.display()),
    })?;

    std::env::set_current_dir("/").map_err(|e| TinyboxError::Io {
        path: "/".into(),
        source: e,
    })?;

    // The old root now lives under the new root.
    let old_root = Path::new("/").join(PUT_OLD);
    umount2(&old_root, MntFlags::MNT_DETACH).map_err(|e| TinyboxError::Syscall {
        message: format!("unmount of old root failed: {e}"),
    })?;
    std::fs::remove_dir(&old_root).map_err(|e| TinyboxError::Io {
        path: old_root,
        source: e,
    })?;

    tracing::info!(root = %new_root.display(), "pivot_root complete");
    Ok(())
}
