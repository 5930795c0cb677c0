//! Persistent container metadata.
//!
//! Each container owns a directory under the metadata root holding its
//! `config.json` record and its `container.log`. The on-disk JSON is the
//! authoritative state between command invocations.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tinybox_common::constants;
use tinybox_common::error::{Result, TinyboxError};
use tinybox_common::types::{ContainerMetadata, Status};
use tinybox_common::util;

/// Maps an optionally empty user-facing name to the stored name.
#[must_use]
pub fn resolve_name(name: &str) -> &str {
    if name.is_empty() {
        constants::DEFAULT_CONTAINER_NAME
    } else {
        name
    }
}

/// CRUD over the per-container metadata directory tree.
pub struct MetadataStore {
    root: PathBuf,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new(constants::DEFAULT_METADATA_ROOT)
    }
}

impl MetadataStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Builds and persists the record for a freshly started container.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub fn create(
        &self,
        pid: i32,
        args: &[String],
        name: &str,
        volumes: Vec<String>,
        port_mappings: BTreeMap<u16, u16>,
    ) -> Result<ContainerMetadata> {
        let metadata = ContainerMetadata {
            pid,
            id: util::random_id(constants::CONTAINER_ID_LEN),
            name: resolve_name(name).to_string(),
            command: args.join(" "),
            create_time: Utc::now(),
            status: Status::Running,
            volumes,
            endpoints: Vec::new(),
            port_mappings,
        };
        self.save(&metadata)?;
        tracing::info!(id = %metadata.id, name = %metadata.name, pid, "metadata recorded");
        Ok(metadata)
    }

    /// Persists a record, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn save(&self, metadata: &ContainerMetadata) -> Result<()> {
        let dir = self.container_dir(&metadata.name);
        util::ensure_directory(&dir)?;
        let path = self.config_path(&metadata.name);
        let body = serde_json::to_string(metadata)?;
        std::fs::write(&path, body).map_err(|e| TinyboxError::Io { path, source: e })
    }

    /// Reads one container's record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no record exists under the given name.
    pub fn read(&self, name: &str) -> Result<ContainerMetadata> {
        let path = self.config_path(name);
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TinyboxError::NotFound {
                    kind: "container",
                    id: resolve_name(name).to_string(),
                });
            }
            Err(e) => return Err(TinyboxError::Io { path, source: e }),
        };
        Ok(serde_json::from_str(&body)?)
    }

    /// Removes a container's metadata directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn remove(&self, name: &str) -> Result<()> {
        let dir = self.container_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| TinyboxError::Io {
                path: dir,
                source: e,
            })?;
        }
        Ok(())
    }

    /// Lists every container record, sorted by ascending create time.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory or a record is unreadable.
    pub fn list(&self) -> Result<Vec<ContainerMetadata>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| TinyboxError::Io {
            path: self.root.clone(),
            source: e,
        })?;

        let mut containers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TinyboxError::Io {
                path: self.root.clone(),
                source: e,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            containers.push(self.read(&entry.file_name().to_string_lossy())?);
        }
        containers.sort_by_key(|c| c.create_time);
        Ok(containers)
    }

    /// Creates (truncating) the container's log file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_log_file(&self, name: &str) -> Result<File> {
        let dir = self.container_dir(name);
        util::ensure_directory(&dir)?;
        let path = self.log_path(name);
        File::create(&path).map_err(|e| TinyboxError::Io { path, source: e })
    }

    /// Reads the container's log file contents.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the container has no log file.
    pub fn read_log(&self, name: &str) -> Result<String> {
        let path = self.log_path(name);
        match std::fs::read_to_string(&path) {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TinyboxError::NotFound {
                kind: "container log",
                id: resolve_name(name).to_string(),
            }),
            Err(e) => Err(TinyboxError::Io { path, source: e }),
        }
    }

    fn container_dir(&self, name: &str) -> PathBuf {
        self.root.join(resolve_name(name))
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::CONFIG_NAME)
    }

    /// Path of the container's log file.
    #[must_use]
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.container_dir(name).join(constants::LOG_NAME)
    }
}

/// Reads a process's environment from `/proc/<pid>/environ`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn container_envs(pid: i32) -> Result<Vec<String>> {
    let path = Path::new("/proc").join(pid.to_string()).join("environ");
    let body = std::fs::read(&path).map_err(|e| TinyboxError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(body
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).into_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> MetadataStore {
        MetadataStore::new(dir.join("containers"))
    }

    #[test]
    fn empty_name_maps_to_default_directory() {
        assert_eq!(resolve_name(""), "default");
        assert_eq!(resolve_name("c1"), "c1");
    }

    #[test]
    fn create_and_read_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());

        let created = store
            .create(
                4321,
                &["sh".into(), "-c".into(), "true".into()],
                "c1",
                vec!["/tmp/a:/a".into()],
                [(8080, 80)].into_iter().collect(),
            )
            .expect("create");
        assert_eq!(created.id.len(), 10);
        assert_eq!(created.command, "sh -c true");
        assert_eq!(created.status, Status::Running);

        let read = store.read("c1").expect("read");
        assert_eq!(read, created);
    }

    #[test]
    fn read_unknown_container_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = store(dir.path()).read("ghost").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn save_updates_existing_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let mut metadata = store
            .create(100, &["sleep".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");

        metadata.pid = 0;
        metadata.status = Status::Stopped;
        store.save(&metadata).expect("save");

        let read = store.read("c1").expect("read");
        assert_eq!(read.pid, 0);
        assert_eq!(read.status, Status::Stopped);
    }

    #[test]
    fn remove_deletes_the_container_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        store
            .create(1, &["sh".into()], "c1", Vec::new(), BTreeMap::new())
            .expect("create");

        store.remove("c1").expect("remove");
        assert!(matches!(
            store.read("c1").unwrap_err(),
            TinyboxError::NotFound { .. }
        ));
        // Removing again is a no-op.
        store.remove("c1").expect("noop");
    }

    #[test]
    fn list_sorts_by_ascending_create_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());

        let mut first = store
            .create(1, &["a".into()], "older", Vec::new(), BTreeMap::new())
            .expect("create");
        let mut second = store
            .create(2, &["b".into()], "newer", Vec::new(), BTreeMap::new())
            .expect("create");

        // Pin the timestamps so ordering does not depend on call timing.
        first.create_time = "2026-01-01T00:00:00Z".parse().unwrap();
        second.create_time = "2026-01-02T00:00:00Z".parse().unwrap();
        store.save(&second).expect("save");
        store.save(&first).expect("save");

        let names: Vec<String> = store
            .list()
            .expect("list")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["older", "newer"]);
    }

    #[test]
    fn list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MetadataStore::new(dir.path().join("nonexistent"));
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn log_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());

        use std::io::Write;
        let mut file = store.create_log_file("c1").expect("create log");
        writeln!(file, "hello from the container").expect("write");
        drop(file);

        let body = store.read_log("c1").expect("read log");
        assert!(body.contains("hello from the container"));
    }

    #[test]
    fn missing_log_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = store(dir.path()).read_log("c1").unwrap_err();
        assert!(matches!(err, TinyboxError::NotFound { .. }));
    }

    #[test]
    fn container_envs_reads_proc_environ() {
        // Our own environ is as good a fixture as any.
        let entries = container_envs(std::process::id() as i32).expect("read environ");
        assert!(!entries.is_empty());
        assert!(entries.iter().any(|entry| entry.contains('=')));
    }

    #[test]
    fn container_envs_unknown_pid_errors() {
        let err = container_envs(i32::MAX - 1).unwrap_err();
        assert!(matches!(err, TinyboxError::Io { .. }));
    }
}
