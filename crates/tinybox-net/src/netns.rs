//! RAII entry into another process's network namespace.
//!
//! Configuring a container's veth peer requires running netlink requests
//! from inside its netns. The guard captures the original namespace
//! before entering and restores it on every exit path, including errors.
//! Namespace membership is per OS thread; the calling thread must not
//! move between threads while the guard is alive (the runtime is
//! single-threaded, so this holds).

use std::fs::File;
use std::os::fd::AsFd;
use std::path::PathBuf;

use nix::sched::{setns, CloneFlags};
use tinybox_common::error::{Result, TinyboxError};

/// Path of a process's network namespace handle.
#[must_use]
pub fn netns_path(pid: i32) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/ns/net"))
}

/// Guard that keeps the calling thread inside a target netns until drop.
pub struct NetnsGuard {
    original: File,
}

impl NetnsGuard {
    /// Captures the current netns, then enters `target`.
    ///
    /// The caller keeps ownership of `target` and must drop it after the
    /// guard, so that its file descriptor closes last.
    ///
    /// # Errors
    ///
    /// Returns an error if the current namespace handle cannot be opened
    /// or `setns(2)` fails.
    pub fn enter(target: &File) -> Result<Self> {
        let original_path = PathBuf::from("/proc/self/ns/net");
        let original = File::open(&original_path).map_err(|e| TinyboxError::Io {
            path: original_path,
            source: e,
        })?;

        setns(target.as_fd(), CloneFlags::CLONE_NEWNET).map_err(|e| TinyboxError::Syscall {
            message: format!("entering netns failed: {e}"),
        })?;
        tracing::debug!("entered container netns");

        Ok(Self { original })
    }
}

impl Drop for NetnsGuard {
    fn drop(&mut self) {
        if let Err(e) = setns(self.original.as_fd(), CloneFlags::CLONE_NEWNET) {
            tracing::warn!(error = %e, "failed to restore original netns");
        } else {
            tracing::debug!("restored original netns");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netns_path_points_into_proc() {
        assert_eq!(netns_path(42), PathBuf::from("/proc/42/ns/net"));
    }

    #[test]
    fn entering_own_netns_roundtrips() {
        // Joining the namespace we are already in needs no privileges on
        // some kernels but CAP_SYS_ADMIN on others; only exercise it as
        // root, like the other privileged tests.
        if !nix::unistd::geteuid().is_root() {
            eprintln!("skipping test: requires root privileges");
            return;
        }
        let own = File::open("/proc/self/ns/net").expect("open own netns");
        let guard = NetnsGuard::enter(&own).expect("enter");
        drop(guard);
        drop(own);
    }
}
