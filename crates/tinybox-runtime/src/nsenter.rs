//! Pre-main namespace entry for `exec`.
//!
//! Joining a PID namespace only affects children forked afterwards, and
//! `setns` on it must happen before the language runtime spawns any
//! threads. The hook therefore runs as an ELF constructor, before `main`
//! and before clap ever parses an argument. When the protocol variables
//! are absent it returns immediately and normal command handling
//! proceeds.

use std::os::fd::AsFd;
use std::process::{self, Command};

use nix::sched::{setns, CloneFlags};
use tinybox_common::constants;

/// Namespaces to join, in order. `mnt` comes last so that `/proc/<pid>`
/// stays resolvable while the earlier namespaces are joined.
const NAMESPACES: [&str; 5] = ["ipc", "uts", "net", "pid", "mnt"];

#[ctor::ctor]
fn enter_namespace() {
    let Ok(pid) = std::env::var(constants::ENV_NSENTER_PID) else {
        return;
    };
    let Ok(cmd) = std::env::var(constants::ENV_NSENTER_CMD) else {
        return;
    };

    // Restore the container's environment first; its /proc entry is out
    // of reach once the mount namespace is joined.
    restore_container_env(&pid);

    for ns in NAMESPACES {
        let path = format!("/proc/{pid}/ns/{ns}");
        match std::fs::File::open(&path) {
            Ok(file) => match setns(file.as_fd(), CloneFlags::empty()) {
                Ok(()) => {}
                Err(e) => eprintln!("setns on {ns} namespace failed: {e}"),
            },
            Err(e) => eprintln!("opening {path} failed: {e}"),
        }
    }

    // system(3) semantics: the shell child is forked inside the joined
    // PID namespace.
    match Command::new("sh").arg("-c").arg(&cmd).status() {
        Ok(status) => process::exit(status.code().unwrap_or(0)),
        Err(e) => {
            eprintln!("running {cmd:?} in container failed: {e}");
            process::exit(1);
        }
    }
}

fn restore_container_env(pid: &str) {
    let Ok(pid) = pid.parse::<i32>() else {
        return;
    };
    let Ok(entries) = crate::metadata::container_envs(pid) else {
        return;
    };
    for entry in entries {
        if let Some((key, value)) = entry.split_once('=') {
            if !key.is_empty() {
                std::env::set_var(key, value);
            }
        }
    }
}
