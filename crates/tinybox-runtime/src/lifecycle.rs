//! Container lifecycle commands over the on-disk state.

use std::path::Path;
use std::process::Command;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::types::Status;
use tinybox_core::filesystem::workspace;
use tinybox_net::controller::NetworkController;

use crate::metadata::{resolve_name, MetadataStore};

/// Stops a running container: SIGTERM to its init process, then record
/// `pid = 0, status = stopped`. A process that is already gone is not an
/// error.
///
/// # Errors
///
/// Returns `NotFound` for an unknown container or a signal failure other
/// than "no such process".
pub fn stop_container(store: &MetadataStore, name: &str) -> Result<()> {
    let mut metadata = store.read(name)?;

    if metadata.pid > 0 {
        match kill(Pid::from_raw(metadata.pid), Signal::SIGTERM) {
            Ok(()) => tracing::info!(pid = metadata.pid, "SIGTERM sent"),
            Err(Errno::ESRCH) => {
                tracing::warn!(pid = metadata.pid, "init process already gone");
            }
            Err(e) => {
                return Err(TinyboxError::Syscall {
                    message: format!("signaling pid {} failed: {e}", metadata.pid),
                });
            }
        }
    }

    metadata.pid = 0;
    metadata.status = Status::Stopped;
    store.save(&metadata)?;
    tracing::info!(name = %metadata.name, "container stopped");
    Ok(())
}

/// Removes a stopped container: releases its network endpoints, deletes
/// its workspace directories, and drops its metadata.
///
/// # Errors
///
/// Returns `InvariantViolation` while the container is running, without
/// modifying any state.
pub fn remove_container(
    store: &MetadataStore,
    controller: &NetworkController,
    root_dir: &Path,
    name: &str,
) -> Result<()> {
    let metadata = store.read(name)?;
    if metadata.status == Status::Running {
        return Err(TinyboxError::InvariantViolation {
            message: format!("please stop container {} first", resolve_name(name)),
        });
    }

    controller.disconnect(&metadata.endpoints)?;
    workspace::delete_workspace(root_dir, &metadata.name, &metadata.volumes);
    store.remove(name)?;
    tracing::info!(name = %metadata.name, "container removed");
    Ok(())
}

/// Packages a container's merged filesystem into `<name>.tar` in the run
/// directory, via the external archiver.
///
/// # Errors
///
/// Returns an error if `tar` cannot be spawned or reports failure.
pub fn commit_container(root_dir: &Path, name: &str) -> Result<()> {
    let merged = workspace::merged_dir(root_dir, resolve_name(name));
    let image_tar = root_dir.join(format!("{}.tar", resolve_name(name)));
    tracing::info!(image = %image_tar.display(), "committing container");

    let output = Command::new("tar")
        .arg("-czf")
        .arg(&image_tar)
        .arg("-C")
        .arg(&merged)
        .arg(".")
        .output()
        .map_err(|e| TinyboxError::Io {
            path: image_tar.clone(),
            source: e,
        })?;
    if !output.status.success() {
        return Err(TinyboxError::Syscall {
            message: format!(
                "committing {} failed: {}",
                merged.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tinybox_net::ipam::Ipam;

    use super::*;

    fn store(dir: &Path) -> MetadataStore {
        MetadataStore::new(dir.join("containers"))
    }

    fn controller(dir: &Path) -> NetworkController {
        NetworkController::new(dir.join("networks"), Ipam::new(dir.join("subnets.json")))
    }

    // A pid beyond the kernel's pid space: signaling it yields ESRCH,
    // which stop tolerates.
    const DEAD_PID: i32 = i32::MAX - 1;

    #[test]
    fn stop_tolerates_missing_process_and_updates_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        store
            .create(DEAD_PID, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");

        stop_container(&store, "c1").expect("stop");

        let metadata = store.read("c1").expect("read");
        assert_eq!(metadata.pid, 0);
        assert_eq!(metadata.status, Status::Stopped);
    }

    #[test]
    fn stop_is_idempotent_once_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        store
            .create(DEAD_PID, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");

        stop_container(&store, "c1").expect("first stop");
        stop_container(&store, "c1").expect("second stop");
        assert_eq!(store.read("c1").expect("read").status, Status::Stopped);
    }

    #[test]
    fn stop_unknown_container_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = stop_container(&store(dir.path()), "ghost").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn remove_refuses_running_container_without_modifying_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let controller = controller(dir.path());
        store
            .create(DEAD_PID, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");

        let err = remove_container(&store, &controller, dir.path(), "c1").unwrap_err();
        assert!(matches!(err, TinyboxError::InvariantViolation { .. }));
        assert_eq!(format!("{err}"), "please stop container c1 first");

        // The record is untouched.
        let metadata = store.read("c1").expect("read");
        assert_eq!(metadata.status, Status::Running);
    }

    #[test]
    fn remove_after_stop_deletes_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let controller = controller(dir.path());
        store
            .create(DEAD_PID, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");

        stop_container(&store, "c1").expect("stop");
        remove_container(&store, &controller, dir.path(), "c1").expect("rm");

        assert!(matches!(
            store.read("c1").unwrap_err(),
            TinyboxError::NotFound { .. }
        ));
    }

    #[test]
    fn remove_releases_endpoint_addresses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let controller = controller(dir.path());
        let subnet: ipnetwork::Ipv4Network = "192.168.5.0/24".parse().unwrap();

        let ipam = Ipam::new(dir.path().join("subnets.json"));
        ipam.allocate(&subnet).expect("gateway");
        let ip = ipam.allocate(&subnet).expect("container ip");

        let mut metadata = store
            .create(DEAD_PID, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");
        metadata.endpoints.push(tinybox_common::types::Endpoint {
            id: format!("{}-br0", metadata.id),
            device: tinybox_common::types::VethDevice {
                name: metadata.id.chars().take(5).collect(),
                peer_name: "vp-x".into(),
            },
            ip,
            mac: "aa:bb:cc:dd:ee:ff".into(),
            network: "br0".into(),
            gateway_ip: "192.168.5.1".parse().unwrap(),
            subnet,
        });
        store.save(&metadata).expect("save");

        stop_container(&store, "c1").expect("stop");
        remove_container(&store, &controller, dir.path(), "c1").expect("rm");

        // The container address is allocatable again.
        assert_eq!(ipam.allocate(&subnet).expect("realloc"), ip);
    }
}
