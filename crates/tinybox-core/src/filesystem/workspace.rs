//! Per-container overlayfs workspace assembly.
//!
//! Each container mounts a merged view of the shared read-only image
//! layer (`./.read`, extracted once per image tarball and never deleted)
//! and a per-container writable layer. Bind volumes are mounted into the
//! merged tree after the overlay.

use std::path::{Path, PathBuf};
use std::process::Command;

use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::util;

use super::{mount, overlayfs};

/// Paths of one container's assembled workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Per-container writable upper layer.
    pub write_layer: PathBuf,
    /// Per-container overlay workdir.
    pub work_layer: PathBuf,
    /// Overlay mount point; becomes the container's root after pivot.
    pub merged: PathBuf,
}

/// Shared read-only lower layer under the run directory.
#[must_use]
pub fn read_dir(root_dir: &Path) -> PathBuf {
    root_dir.join(constants::READ_DIR)
}

/// Per-container writable layer under the run directory.
#[must_use]
pub fn write_dir(root_dir: &Path, container_name: &str) -> PathBuf {
    root_dir.join(constants::WRITE_DIR).join(container_name)
}

/// Per-container overlay workdir under the run directory.
#[must_use]
pub fn work_dir(root_dir: &Path, container_name: &str) -> PathBuf {
    root_dir.join(constants::WORK_DIR).join(container_name)
}

/// Per-container overlay mount point under the run directory.
#[must_use]
pub fn merged_dir(root_dir: &Path, container_name: &str) -> PathBuf {
    root_dir.join(constants::MERGE_DIR).join(container_name)
}

/// Splits a `"hostPath:containerPath"` volume spec.
///
/// # Errors
///
/// Returns `InvalidArgument` unless the spec has exactly two non-empty
/// parts.
pub fn parse_volume(spec: &str) -> Result<(PathBuf, String)> {
    let mut parts = spec.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(host), Some(container)) if !host.is_empty() && !container.is_empty() => {
            Ok((PathBuf::from(host), container.to_string()))
        }
        _ => Err(TinyboxError::InvalidArgument {
            message: format!("invalid volume {spec:?}, need hostPath:containerPath"),
        }),
    }
}

/// Resolves a container-side volume path inside the merged tree.
#[must_use]
pub fn volume_mount_point(merged: &Path, container_path: &str) -> PathBuf {
    merged.join(container_path.trim_start_matches('/'))
}

/// Assembles the overlay workspace for one container.
///
/// 1. Ensures `./.read/` and extracts the image tarball into it. The
///    read-only layer is shared across all containers of the image.
/// 2. Ensures the per-container write and work layers.
/// 3. Mounts the overlay onto the per-container merged dir.
/// 4. Bind-mounts each `host:container` volume into the merged tree. The
///    host path must already exist.
///
/// # Errors
///
/// Returns an error if extraction, any mount, or directory creation
/// fails, or if a volume spec is malformed or its host path is missing.
pub fn create_workspace(
    root_dir: &Path,
    image_tar: &str,
    container_name: &str,
    volumes: &[String],
) -> Result<Workspace> {
    let read = read_dir(root_dir);
    util::ensure_directory(&read)?;
    extract_image(&root_dir.join(image_tar), &read)?;

    let write_layer = write_dir(root_dir, container_name);
    let work_layer = work_dir(root_dir, container_name);
    let merged = merged_dir(root_dir, container_name);
    util::ensure_directory(&write_layer)?;
    util::ensure_directory(&work_layer)?;
    util::ensure_directory(&merged)?;

    overlayfs::mount_overlay(&read, &write_layer, &work_layer, &merged)?;

    for spec in volumes {
        let (host, container) = parse_volume(spec)?;
        if !host.exists() {
            return Err(TinyboxError::InvalidArgument {
                message: format!("volume host path {} does not exist", host.display()),
            });
        }
        let target = volume_mount_point(&merged, &container);
        util::ensure_directory(&target)?;
        mount::bind_mount(&host, &target)?;
        tracing::info!(host = %host.display(), target = %target.display(), "volume mounted");
    }

    Ok(Workspace {
        write_layer,
        work_layer,
        merged,
    })
}

/// Tears down a container's workspace after a foreground run.
///
/// Unmounts every volume, unmounts the overlay, and removes the merged,
/// work, and write directories. The shared read-only layer is preserved.
/// Cleanup is best-effort: failures are logged and the remaining steps
/// still run.
pub fn delete_workspace(root_dir: &Path, container_name: &str, volumes: &[String]) {
    let merged = merged_dir(root_dir, container_name);

    for spec in volumes {
        let Ok((_, container)) = parse_volume(spec) else {
            continue;
        };
        let target = volume_mount_point(&merged, &container);
        if let Err(e) = mount::unmount(&target) {
            tracing::warn!(target = %target.display(), error = %e, "volume unmount failed");
        }
    }

    if let Err(e) = overlayfs::unmount_overlay(&merged) {
        tracing::warn!(merged = %merged.display(), error = %e, "overlay unmount failed");
    }

    for dir in [
        merged,
        work_dir(root_dir, container_name),
        write_dir(root_dir, container_name),
    ] {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "workspace dir removal failed");
        }
    }
}

/// Extracts the image tarball into the read-only layer via the external
/// archiver.
fn extract_image(image_tar: &Path, target: &Path) -> Result<()> {
    let output = Command::new("tar")
        .arg("-xvf")
        .arg(image_tar)
        .arg("-C")
        .arg(target)
        .output()
        .map_err(|e| TinyboxError::Io {
            path: image_tar.to_path_buf(),
            source: e,
        })?;
    if !output.status.success() {
        return Err(TinyboxError::Syscall {
            message: format!(
                "tar extraction of {} failed: {}",
                image_tar.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    tracing::info!(image = %image_tar.display(), target = %target.display(), "image extracted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_paths_are_rooted_at_run_dir() {
        let root = Path::new("/work");
        assert_eq!(read_dir(root), PathBuf::from("/work/.read"));
        assert_eq!(write_dir(root, "c1"), PathBuf::from("/work/.write/c1"));
        assert_eq!(work_dir(root, "c1"), PathBuf::from("/work/.work/c1"));
        assert_eq!(merged_dir(root, "c1"), PathBuf::from("/work/.merge/c1"));
    }

    #[test]
    fn parse_volume_splits_host_and_container() {
        let (host, container) = parse_volume("/tmp/data:/data").unwrap();
        assert_eq!(host, PathBuf::from("/tmp/data"));
        assert_eq!(container, "/data");
    }

    #[test]
    fn parse_volume_rejects_missing_parts() {
        assert!(parse_volume("/tmp/data").is_err());
        assert!(parse_volume(":/data").is_err());
        assert!(parse_volume("/tmp/data:").is_err());
    }

    #[test]
    fn volume_mount_point_stays_inside_merged_tree() {
        let merged = Path::new("/work/.merge/c1");
        assert_eq!(
            volume_mount_point(merged, "/data"),
            PathBuf::from("/work/.merge/c1/data")
        );
        assert_eq!(
            volume_mount_point(merged, "data"),
            PathBuf::from("/work/.merge/c1/data")
        );
    }

    #[test]
    fn parse_volume_keeps_colons_in_container_path() {
        let (host, container) = parse_volume("/tmp/a:/data:ro").unwrap();
        assert_eq!(host, PathBuf::from("/tmp/a"));
        assert_eq!(container, "/data:ro");
    }
}
