//! Filesystem and `/proc` helpers shared across the workspace.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::{Result, TinyboxError};

/// Creates a directory (and its parents) if it does not exist yet.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| TinyboxError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Generates a random lowercase alphanumeric identifier.
#[must_use]
pub fn random_id(len: usize) -> String {
    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Locates the mount point of a cgroup v1 controller.
///
/// Scans `/proc/self/mountinfo` line by line. The last
/// whitespace-separated field of each line is a comma-separated option
/// list; a controller's mount carries the controller name as one of those
/// options, and field index 4 is its mount point.
///
/// # Errors
///
/// Returns `NotFound` when no mount carries the controller name, or an
/// I/O error if `/proc/self/mountinfo` cannot be read.
pub fn find_cgroup_mount_point(subsystem: &str) -> Result<PathBuf> {
    let path = Path::new("/proc/self/mountinfo");
    let file = File::open(path).map_err(|e| TinyboxError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_cgroup_mount_point(BufReader::new(file), subsystem)
}

fn parse_cgroup_mount_point<R: BufRead>(reader: R, subsystem: &str) -> Result<PathBuf> {
    for line in reader.lines() {
        let line = line.map_err(|e| TinyboxError::Io {
            path: PathBuf::from("/proc/self/mountinfo"),
            source: e,
        })?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(options) = fields.last() else {
            continue;
        };
        if options.split(',').any(|opt| opt == subsystem) {
            if let Some(mount_point) = fields.get(4) {
                return Ok(PathBuf::from(mount_point));
            }
        }
    }
    Err(TinyboxError::NotFound {
        kind: "cgroup subsystem",
        id: subsystem.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTINFO: &str = "\
24 30 0:22 / /sys rw,nosuid,nodev,noexec,relatime shared:7 - sysfs sysfs rw
30 1 8:1 / / rw,relatime shared:1 - ext4 /dev/sda1 rw
34 25 0:29 / /sys/fs/cgroup/memory rw,nosuid,nodev,noexec,relatime shared:15 - cgroup cgroup rw,memory
35 25 0:30 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid,nodev,noexec,relatime shared:16 - cgroup cgroup rw,cpu,cpuacct
";

    #[test]
    fn parse_finds_memory_controller() {
        let mount = parse_cgroup_mount_point(MOUNTINFO.as_bytes(), "memory").unwrap();
        assert_eq!(mount, PathBuf::from("/sys/fs/cgroup/memory"));
    }

    #[test]
    fn parse_matches_option_inside_list() {
        let mount = parse_cgroup_mount_point(MOUNTINFO.as_bytes(), "cpuacct").unwrap();
        assert_eq!(mount, PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"));
    }

    #[test]
    fn parse_unknown_subsystem_is_not_found() {
        let err = parse_cgroup_mount_point(MOUNTINFO.as_bytes(), "pids").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn parse_does_not_match_substring_options() {
        // "memory" must not match a "memory_recursiveprot"-style option.
        let line = "34 25 0:29 / /x rw - cgroup cgroup rw,memory_extra\n";
        let err = parse_cgroup_mount_point(line.as_bytes(), "memory").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn ensure_directory_creates_nested_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a").join("b");
        ensure_directory(&target).expect("create");
        assert!(target.is_dir());
        // Idempotent on an existing directory.
        ensure_directory(&target).expect("noop");
    }

    #[test]
    fn random_id_length_and_charset() {
        let id = random_id(10);
        assert_eq!(id.len(), 10);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn random_id_is_not_constant() {
        assert_ne!(random_id(10), random_id(10));
    }
}
