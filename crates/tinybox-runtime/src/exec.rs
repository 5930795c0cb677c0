//! Exec-into-container via the self-reexec protocol.
//!
//! The runtime cannot join another process's PID namespace after its own
//! threads exist, so `exec` re-executes this binary with two environment
//! variables set; the pre-main constructor in [`crate::nsenter`] sees
//! them and performs the `setns` dance before any runtime code runs.

use std::process::Command;

use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};

use crate::metadata::MetadataStore;

/// Runs a command inside a running container's namespaces.
///
/// Returns the command's exit code.
///
/// # Errors
///
/// Returns `NotFound` for an unknown container, `InvariantViolation` if
/// it is not running, or an I/O error from the re-exec.
pub fn exec_container(store: &MetadataStore, name: &str, args: &[String]) -> Result<i32> {
    let metadata = store.read(name)?;
    if metadata.pid == 0 {
        return Err(TinyboxError::InvariantViolation {
            message: format!("container {} is not running", metadata.name),
        });
    }
    tracing::info!(pid = metadata.pid, ?args, "entering container");

    let status = Command::new("/proc/self/exe")
        .arg("exec")
        .env(constants::ENV_NSENTER_PID, metadata.pid.to_string())
        .env(constants::ENV_NSENTER_CMD, args.join(" "))
        .status()
        .map_err(|e| TinyboxError::Io {
            path: "/proc/self/exe".into(),
            source: e,
        })?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::*;

    fn store(dir: &Path) -> MetadataStore {
        MetadataStore::new(dir.join("containers"))
    }

    #[test]
    fn exec_unknown_container_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = exec_container(&store(dir.path()), "ghost", &["sh".into()]).unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn exec_stopped_container_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let mut metadata = store
            .create(1234, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");
        metadata.pid = 0;
        metadata.status = tinybox_common::types::Status::Stopped;
        store.save(&metadata).expect("save");

        let err = exec_container(&store, "c1", &["sh".into()]).unwrap_err();
        assert!(matches!(err, TinyboxError::InvariantViolation { .. }));
    }
}
