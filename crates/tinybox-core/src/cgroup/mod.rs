//! Cgroups v1 resource management.
//!
//! Each kernel controller (memory, cpu, ...) is modeled as a [`Subsystem`];
//! the [`CgroupManager`] fans every operation across all registered
//! subsystems in order. Controllers live under per-controller mount points
//! (e.g. `/sys/fs/cgroup/memory`), located through `/proc/self/mountinfo`.

pub mod memory;

use tinybox_common::error::Result;
use tinybox_common::types::ResourceConfig;

use self::memory::MemorySubsystem;

/// One cgroup v1 controller.
///
/// Implementations write limits into their controller's control files and
/// attach PIDs to the named cgroup directory.
pub trait Subsystem {
    /// Controller name as it appears in the mountinfo option list.
    fn name(&self) -> &'static str;

    /// Writes the resource limits into the named cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup directory cannot be created or the
    /// control file cannot be written.
    fn set(&self, cgroup_name: &str, res: &ResourceConfig) -> Result<()>;

    /// Attaches a PID to the named cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if the `tasks` file cannot be written.
    fn apply(&self, cgroup_name: &str, pid: i32) -> Result<()>;

    /// Removes the named cgroup directory under this controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    fn remove(&self, cgroup_name: &str) -> Result<()>;
}

/// Returns the list of registered subsystems, in application order.
///
/// Only the memory controller is implemented; additional controllers are
/// registered by extending this list.
#[must_use]
pub fn subsystems() -> Vec<Box<dyn Subsystem>> {
    vec![Box::new(MemorySubsystem)]
}

/// Handle to a named cgroup across all registered controllers.
pub struct CgroupManager {
    cgroup_name: String,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl CgroupManager {
    /// Creates a manager for the named cgroup.
    #[must_use]
    pub fn new(cgroup_name: impl Into<String>) -> Self {
        Self {
            cgroup_name: cgroup_name.into(),
            subsystems: subsystems(),
        }
    }

    /// Writes the resource limits into every controller.
    ///
    /// # Errors
    ///
    /// Stops and returns on the first controller that fails.
    pub fn set(&self, res: &ResourceConfig) -> Result<()> {
        for subsystem in &self.subsystems {
            subsystem.set(&self.cgroup_name, res)?;
        }
        Ok(())
    }

    /// Attaches a PID to every controller.
    ///
    /// Stops on the first error; partial application is left for the
    /// caller to unwind via [`CgroupManager::destroy`].
    ///
    /// # Errors
    ///
    /// Returns the first controller failure.
    pub fn apply(&self, pid: i32) -> Result<()> {
        for subsystem in &self.subsystems {
            subsystem.apply(&self.cgroup_name, pid)?;
        }
        tracing::debug!(pid, cgroup = %self.cgroup_name, "pid attached to cgroups");
        Ok(())
    }

    /// Removes the named directory under every controller.
    ///
    /// # Errors
    ///
    /// Returns the first controller failure.
    pub fn destroy(&self) -> Result<()> {
        for subsystem in &self.subsystems {
            subsystem.remove(&self.cgroup_name)?;
        }
        tracing::debug!(cgroup = %self.cgroup_name, "cgroups destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_subsystem_is_registered() {
        let registered = subsystems();
        assert!(registered.iter().any(|s| s.name() == "memory"));
    }

    #[test]
    fn manager_holds_cgroup_name() {
        let manager = CgroupManager::new("tinybox-cgroup");
        assert_eq!(manager.cgroup_name, "tinybox-cgroup");
        assert!(!manager.subsystems.is_empty());
    }
}
