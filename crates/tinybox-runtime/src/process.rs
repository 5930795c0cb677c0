//! Parent-side container construction.
//!
//! `run` clones a child into fresh UTS/PID/mount/network/IPC namespaces;
//! the child re-executes this binary's `init` stage from `/proc/self/exe`.
//! The parent finishes all setup (metadata, cgroups, network) and only
//! then closes the argv pipe — closing the pipe is the barrier that lets
//! the child proceed to `execv`.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::path::Path;

use nix::fcntl::OFlag;
use nix::sched::CloneFlags;
use nix::sys::signal::Signal;
use nix::sys::wait::waitpid;
use nix::unistd::{self, Pid};
use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::types::{ContainerMetadata, ResourceConfig};
use tinybox_core::cgroup::CgroupManager;
use tinybox_core::filesystem::workspace;
use tinybox_net::controller::NetworkController;

use crate::metadata::{resolve_name, MetadataStore};

const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// The pipe read end is passed to the child as this inherited fd.
const ARGS_FD: i32 = 3;

/// Everything `run` needs to construct a container.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Wire the child to the parent's terminal.
    pub tty: bool,
    /// Leave the container (and all its state) running on return.
    pub detach: bool,
    /// Container name; empty means the reserved default name.
    pub name: String,
    /// Image tarball, relative to the run directory.
    pub image_tar: String,
    /// Network to attach, if any.
    pub network: Option<String>,
    /// Extra `KEY=VALUE` environment entries for the container.
    pub envs: Vec<String>,
    /// The user command argv.
    pub args: Vec<String>,
    /// `"hostPath:containerPath"` bind volumes.
    pub volumes: Vec<String>,
    /// Host port to container port mapping.
    pub port_mappings: BTreeMap<u16, u16>,
    /// Cgroup resource limits.
    pub resources: ResourceConfig,
}

/// Creates and runs a container.
///
/// Foreground runs block until the init process exits and then tear
/// down every trace of the container; detached runs return immediately,
/// leaving metadata, cgroups, workspace, and network in place.
///
/// # Errors
///
/// Returns an error if any construction step fails. Construction
/// failures abort without transactional unwinding.
pub fn run_container(store: &MetadataStore, config: &RunConfig) -> Result<()> {
    let root_dir = std::env::current_dir().map_err(|e| TinyboxError::Io {
        path: ".".into(),
        source: e,
    })?;
    let name = resolve_name(&config.name);

    let ws = workspace::create_workspace(&root_dir, &config.image_tar, name, &config.volumes)?;

    let cgroups = CgroupManager::new(constants::CGROUP_NAME);
    cgroups.set(&config.resources)?;

    let (read_fd, write_fd) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| {
        TinyboxError::Syscall {
            message: format!("pipe creation failed: {e}"),
        }
    })?;

    let log_file = if config.tty {
        None
    } else {
        Some(store.create_log_file(name)?)
    };

    let child = spawn_init_child(&ws.merged, &read_fd, log_file.as_ref(), &config.envs)?;
    drop(read_fd);
    drop(log_file);
    tracing::info!(pid = child.as_raw(), "init child started");

    let mut metadata = store.create(
        child.as_raw(),
        &config.args,
        name,
        config.volumes.clone(),
        config.port_mappings.clone(),
    )?;

    cgroups.apply(child.as_raw())?;

    if let Some(network_name) = config.network.as_deref() {
        let controller = NetworkController::default();
        let endpoint = controller.connect(network_name, &metadata.id, metadata.pid)?;
        metadata.endpoints.push(endpoint);
        store.save(&metadata)?;
        tracing::info!(network = %network_name, container = %metadata.name, "network connected");
    }

    send_init_args(&config.args, write_fd)?;

    if config.detach {
        tracing::info!(name = %metadata.name, "container detached");
        return Ok(());
    }

    match waitpid(child, None) {
        Ok(status) => tracing::info!(?status, "init child exited"),
        Err(e) => tracing::warn!(error = %e, "waiting for init child failed"),
    }
    teardown(store, &root_dir, &cgroups, &metadata);
    Ok(())
}

/// Clones the init child into its new namespaces.
///
/// Inside the clone callback (still sharing this binary's text, before
/// `execve`) the pipe read end is dup'ed onto fd 3, stdout is redirected
/// to the log file unless a tty was requested, and the working directory
/// moves to the merged overlay — which the init stage pivots into.
fn spawn_init_child(
    merged: &Path,
    read_fd: &OwnedFd,
    log_file: Option<&File>,
    extra_envs: &[String],
) -> Result<Pid> {
    let exe = CString::new("/proc/self/exe").map_err(|_| TinyboxError::InvalidArgument {
        message: "NUL in exec path".into(),
    })?;
    let argv = [exe.clone(), CString::new("init").map_err(|_| {
        TinyboxError::InvalidArgument {
            message: "NUL in argv".into(),
        }
    })?];

    let mut env = Vec::new();
    for (key, value) in std::env::vars() {
        if let Ok(entry) = CString::new(format!("{key}={value}")) {
            env.push(entry);
        }
    }
    for extra in extra_envs {
        env.push(
            CString::new(extra.as_str()).map_err(|_| TinyboxError::InvalidArgument {
                message: format!("NUL in environment entry {extra:?}"),
            })?,
        );
    }

    let merged_c = CString::new(merged.as_os_str().as_bytes()).map_err(|_| {
        TinyboxError::InvalidArgument {
            message: "NUL in workspace path".into(),
        }
    })?;

    let read_raw = read_fd.as_raw_fd();
    let log_raw = log_file.map(File::as_raw_fd);

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let flags = CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWIPC;

    let callback = Box::new(|| -> isize {
        // dup2 clears O_CLOEXEC, so exactly the fds arranged here
        // survive the exec.
        if unistd::dup2(read_raw, ARGS_FD).is_err() {
            return 1;
        }
        if let Some(log) = log_raw {
            if unistd::dup2(log, 1).is_err() {
                return 1;
            }
        }
        if unistd::chdir(merged_c.as_c_str()).is_err() {
            return 1;
        }
        match unistd::execve(&exe, &argv, &env) {
            Ok(infallible) => match infallible {},
            Err(_) => 127,
        }
    });

    // SAFETY: the callback only calls async-signal-safe syscalls
    // (dup2/chdir/execve) on pre-built arguments; no allocation happens
    // between clone and execve.
    let pid = unsafe { nix::sched::clone(callback, &mut stack, flags, Some(Signal::SIGCHLD as i32)) }
        .map_err(|e| TinyboxError::Syscall {
            message: format!("clone of init child failed: {e}"),
        })?;
    Ok(pid)
}

/// Writes the space-joined argv into the pipe and closes it, releasing
/// the child from its blocking read.
fn send_init_args(args: &[String], write_fd: OwnedFd) -> Result<()> {
    let mut pipe = File::from(write_fd);
    pipe.write_all(args.join(" ").as_bytes())
        .map_err(|e| TinyboxError::Io {
            path: "pipe".into(),
            source: e,
        })?;
    tracing::debug!(?args, "init args sent");
    Ok(())
}

/// Best-effort teardown after a foreground run.
fn teardown(
    store: &MetadataStore,
    root_dir: &Path,
    cgroups: &CgroupManager,
    metadata: &ContainerMetadata,
) {
    if !metadata.endpoints.is_empty() {
        let controller = NetworkController::default();
        if let Err(e) = controller.disconnect(&metadata.endpoints) {
            tracing::warn!(error = %e, "network disconnect failed");
        }
    }
    if let Err(e) = store.remove(&metadata.name) {
        tracing::warn!(error = %e, "metadata removal failed");
    }
    if let Err(e) = cgroups.destroy() {
        tracing::warn!(error = %e, "cgroup destruction failed");
    }
    workspace::delete_workspace(root_dir, &metadata.name, &metadata.volumes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_defaults_are_foreground_without_network() {
        let config = RunConfig::default();
        assert!(!config.tty);
        assert!(!config.detach);
        assert!(config.network.is_none());
        assert!(config.args.is_empty());
    }

    #[test]
    fn namespace_flags_cover_the_five_kinds() {
        let flags = CloneFlags::CLONE_NEWUTS
            | CloneFlags::CLONE_NEWPID
            | CloneFlags::CLONE_NEWNS
            | CloneFlags::CLONE_NEWNET
            | CloneFlags::CLONE_NEWIPC;
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(!flags.contains(CloneFlags::CLONE_NEWUSER));
    }
}
