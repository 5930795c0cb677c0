//! System-wide constants and default paths.

/// Runtime name; prefixes the persisted roots and the env-var protocol.
pub const RUNTIME_NAME: &str = "tinybox";

/// Root directory for per-container metadata.
pub const DEFAULT_METADATA_ROOT: &str = "/var/run/tinybox/containers";

/// Root directory for network state.
pub const DEFAULT_NETWORK_ROOT: &str = "/var/run/tinybox/network";

/// Directory holding one JSON file per network.
pub const DEFAULT_NETWORK_DIR: &str = "/var/run/tinybox/network/networks";

/// Path of the persisted IPAM bitmap file.
pub const DEFAULT_SUBNET_PATH: &str = "/var/run/tinybox/network/subnets.json";

/// Container name used when the user does not provide one.
pub const DEFAULT_CONTAINER_NAME: &str = "default";

/// File name of the per-container metadata record.
pub const CONFIG_NAME: &str = "config.json";

/// File name of the per-container log.
pub const LOG_NAME: &str = "container.log";

/// Cgroup directory name used for container resource limits.
pub const CGROUP_NAME: &str = "tinybox-cgroup";

/// Name of the only supported network driver.
pub const DRIVER_BRIDGE: &str = "bridge";

/// Shared read-only overlay layer, relative to the run directory.
pub const READ_DIR: &str = ".read";

/// Per-container writable upper layer, relative to the run directory.
pub const WRITE_DIR: &str = ".write";

/// Per-container overlay workdir, relative to the run directory.
pub const WORK_DIR: &str = ".work";

/// Per-container overlay mount point, relative to the run directory.
pub const MERGE_DIR: &str = ".merge";

/// Environment variable carrying the target PID for the nsenter hook.
pub const ENV_NSENTER_PID: &str = "tinybox_pid";

/// Environment variable carrying the command line for the nsenter hook.
pub const ENV_NSENTER_CMD: &str = "tinybox_cmd";

/// Number of characters in a generated container id.
pub const CONTAINER_ID_LEN: usize = 10;

/// Default image tarball name for `run`.
pub const DEFAULT_IMAGE_TAR: &str = "busybox.tar";
