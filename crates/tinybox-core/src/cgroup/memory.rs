//! Memory resource control via the cgroup v1 memory controller.
//!
//! Writes `memory.limit_in_bytes` and attaches PIDs through the `tasks`
//! file under `<memory mount point>/<cgroup name>`.

use std::path::PathBuf;

use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::types::ResourceConfig;
use tinybox_common::util;

use super::Subsystem;

/// The cgroup v1 `memory` controller.
pub struct MemorySubsystem;

impl MemorySubsystem {
    /// Resolves (and lazily creates) this controller's cgroup directory.
    fn cgroup_path(&self, cgroup_name: &str) -> Result<PathBuf> {
        let mount_point = util::find_cgroup_mount_point(self.name())?;
        let path = mount_point.join(cgroup_name);
        util::ensure_directory(&path)?;
        Ok(path)
    }
}

impl Subsystem for MemorySubsystem {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn set(&self, cgroup_name: &str, res: &ResourceConfig) -> Result<()> {
        let Some(limit) = res.memory_limit.as_deref() else {
            return Ok(());
        };
        let path = self.cgroup_path(cgroup_name)?;
        let limit_file = path.join("memory.limit_in_bytes");
        std::fs::write(&limit_file, limit).map_err(|e| TinyboxError::Io {
            path: limit_file,
            source: e,
        })?;
        tracing::info!(cgroup = %cgroup_name, %limit, "memory limit set");
        Ok(())
    }

    fn apply(&self, cgroup_name: &str, pid: i32) -> Result<()> {
        let path = self.cgroup_path(cgroup_name)?;
        let tasks_file = path.join("tasks");
        std::fs::write(&tasks_file, pid.to_string()).map_err(|e| TinyboxError::Io {
            path: tasks_file,
            source: e,
        })?;
        tracing::debug!(cgroup = %cgroup_name, pid, "pid added to memory cgroup");
        Ok(())
    }

    fn remove(&self, cgroup_name: &str) -> Result<()> {
        let mount_point = util::find_cgroup_mount_point(self.name())?;
        let path = mount_point.join(cgroup_name);
        if path.exists() {
            // cgroupfs control files cannot be unlinked; rmdir on the
            // (process-free) cgroup directory is the supported removal.
            std::fs::remove_dir(&path).map_err(|e| TinyboxError::Io { path, source: e })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_name_matches_mountinfo_option() {
        assert_eq!(MemorySubsystem.name(), "memory");
    }

    #[test]
    fn set_without_limit_is_a_noop() {
        // No limit requested: must succeed even where the memory
        // controller is not mounted at all.
        let res = ResourceConfig::default();
        MemorySubsystem.set("tinybox-test", &res).expect("noop");
    }
}
