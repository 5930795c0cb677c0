//! In-namespace container initialization (the internal `init` stage).
//!
//! This runs as the first process of the new namespaces, with the merged
//! overlay as its working directory and the argv pipe on fd 3. It pivots
//! into the new root, mounts the pseudo filesystems, then replaces
//! itself with the user command — which thereby becomes PID 1.

use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::{Path, PathBuf};

use tinybox_common::error::{Result, TinyboxError};
use tinybox_core::filesystem::{mount, pivot_root};

/// The pipe read end inherited from the parent.
const ARGS_FD: RawFd = 3;

/// Initializes the container and executes the user command.
///
/// Every step is fatal on failure; there is nothing to clean up in a
/// half-initialized namespace.
///
/// # Errors
///
/// Returns an error if a mount, the pivot, the argv read, or the final
/// `execv` fails.
pub fn run_container_init() -> Result<()> {
    setup_mount()?;

    let args = read_args()?;
    if args.is_empty() {
        return Err(TinyboxError::InvalidArgument {
            message: "no command received over the init pipe".into(),
        });
    }
    tracing::info!(?args, "initializing container");

    let exec_path = resolve_path(&args[0])?;
    let c_path = CString::new(exec_path.as_os_str().as_encoded_bytes()).map_err(|_| {
        TinyboxError::InvalidArgument {
            message: "NUL in resolved exec path".into(),
        }
    })?;
    let mut argv = vec![c_path.clone()];
    for arg in &args[1..] {
        argv.push(
            CString::new(arg.as_str()).map_err(|_| TinyboxError::InvalidArgument {
                message: format!("NUL in argument {arg:?}"),
            })?,
        );
    }

    // The environment assembled by the parent is inherited through execv.
    match nix::unistd::execv(&c_path, &argv) {
        Ok(infallible) => match infallible {},
        Err(e) => Err(TinyboxError::Syscall {
            message: format!("execv of {} failed: {e}", exec_path.display()),
        }),
    }
}

/// Contains mount propagation, pivots into the cwd, and mounts `/proc`
/// and `/dev`.
fn setup_mount() -> Result<()> {
    mount::make_root_private()?;

    let cwd = std::env::current_dir().map_err(|e| TinyboxError::Io {
        path: ".".into(),
        source: e,
    })?;
    tracing::info!(root = %cwd.display(), "pivoting into container root");
    pivot_root::pivot_root(&cwd)?;

    mount::mount_pseudo_filesystems()
}

/// Reads the argv handshake from fd 3 until the parent closes its end.
fn read_args() -> Result<Vec<String>> {
    // SAFETY: fd 3 was dup'ed onto the pipe read end by the parent's
    // clone callback and is owned by nothing else in this process.
    let mut pipe = unsafe { File::from_raw_fd(ARGS_FD) };
    let mut body = String::new();
    pipe.read_to_string(&mut body).map_err(|e| TinyboxError::Io {
        path: "pipe".into(),
        source: e,
    })?;
    Ok(body.split_whitespace().map(str::to_string).collect())
}

/// Resolves a command against `PATH` inside the new root.
fn resolve_path(command: &str) -> Result<PathBuf> {
    if command.contains('/') {
        let path = PathBuf::from(command);
        if is_executable(&path) {
            return Ok(path);
        }
        return Err(TinyboxError::NotFound {
            kind: "executable",
            id: command.to_string(),
        });
    }
    let path_var = std::env::var("PATH").unwrap_or_default();
    search_path(&path_var, command)
}

fn search_path(path_var: &str, command: &str) -> Result<PathBuf> {
    for dir in path_var.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(command);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
    }
    Err(TinyboxError::NotFound {
        kind: "executable",
        id: command.to_string(),
    })
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").expect("write");
        let mut perms = std::fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[test]
    fn search_path_finds_executables_in_order() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        make_executable(second.path(), "tool");
        let expected = second.path().join("tool");

        let path_var = format!("{}:{}", first.path().display(), second.path().display());
        let found = search_path(&path_var, "tool").expect("resolve");
        assert_eq!(found, expected);
    }

    #[test]
    fn search_path_skips_non_executable_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plain = dir.path().join("data");
        std::fs::write(&plain, "not a program").expect("write");
        let mut perms = std::fs::metadata(&plain).expect("meta").permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&plain, perms).expect("chmod");

        let err = search_path(&dir.path().display().to_string(), "data").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn resolve_path_accepts_explicit_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = make_executable(dir.path(), "tool");

        let found = resolve_path(tool.to_str().expect("utf-8")).expect("resolve");
        assert_eq!(found, tool);
    }

    #[test]
    fn resolve_path_rejects_missing_explicit_path() {
        let err = resolve_path("/does/not/exist").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn empty_path_entries_are_ignored() {
        let err = search_path(":::", "anything").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }
}
